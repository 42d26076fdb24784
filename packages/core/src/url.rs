//! URL helpers: base-URL normalization and query encoding.
//!
//! The broker namespaces every endpoint under `/api/v1`.  Callers may
//! configure the base URL with or without that suffix (or part of it, or a
//! trailing slash); [`normalize_base_url`] always yields exactly one.
//!
//! ```text
//! https://h          →  https://h/api/v1
//! https://h/api      →  https://h/api/v1
//! https://h/api/     →  https://h/api/v1
//! https://h/api/v    →  https://h/api/v1
//! https://h/api/v1/  →  https://h/api/v1
//! ```
//!
//! Only partial forms of the `/api/v1` suffix itself are completed; any
//! other path (`https://h/v1`, `https://h/api/v2`) is kept and gets the full
//! suffix appended.

use urlencoding::encode;

/// The version suffix every endpoint lives under.
pub const API_PREFIX: &str = "/api/v1";

/// Normalize a configured base URL so it ends in exactly one `/api/v1`.
pub fn normalize_base_url(base: &str) -> String {
    let trimmed = base.trim().trim_end_matches('/');
    if trimmed.ends_with(API_PREFIX) {
        trimmed.to_string()
    } else if trimmed.ends_with("/api/v") {
        format!("{trimmed}1")
    } else if trimmed.ends_with("/api") {
        format!("{trimmed}/v1")
    } else {
        format!("{trimmed}{API_PREFIX}")
    }
}

/// Join a normalized base URL with an endpoint path and optional query.
///
/// `path` may be given with or without a leading `/`.
pub fn endpoint_url(base: &str, path: &str, query: Option<&QueryParams>) -> String {
    let mut url = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    if let Some(query) = query {
        let encoded = query.to_query_string();
        if !encoded.is_empty() {
            url.push('?');
            url.push_str(&encoded);
        }
    }
    url
}

/// Percent-encode a single path segment (UAIDs contain `:` and `;`).
pub fn path_segment(value: &str) -> String {
    encode(value).into_owned()
}

/// Ordered query parameters.
///
/// Scalar values are appended once; list values become repeated keys in
/// input order (`capabilities=a&capabilities=b`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scalar parameter.
    pub fn push(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    /// Append a parameter only when `value` is present.
    pub fn push_opt<V: ToString>(&mut self, key: &str, value: Option<V>) -> &mut Self {
        if let Some(v) = value {
            self.push(key, v);
        }
        self
    }

    /// Append one `key=value` pair per element, preserving order.
    pub fn push_all<V: ToString>(&mut self, key: &str, values: &[V]) -> &mut Self {
        for v in values {
            self.push(key, v.to_string());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// `k1=v1&k2=v2…` with keys and values percent-encoded.
    pub fn to_query_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

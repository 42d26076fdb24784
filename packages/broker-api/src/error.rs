//! Standard error response body.

use serde::{Deserialize, Serialize};

/// The JSON body the broker returns for most error responses.
///
/// ```json
/// { "error": "insufficient credits", "code": "insufficient_credits" }
/// ```
///
/// Some endpoints add fields (a `402` carries the credit shortfall, see
/// [`crate::InsufficientCreditsBody`]); those are ignored here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Human-readable description of the problem.
    #[serde(alias = "message")]
    pub error: String,

    /// Machine-readable error code, when the broker supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            error: error.into(),
        }
    }
}

/// Well-known error codes.
pub mod codes {
    pub const INVALID_PARAMETER: &str = "invalid_parameter";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const INSUFFICIENT_CREDITS: &str = "insufficient_credits";
    pub const NOT_FOUND: &str = "not_found";
    pub const CONFLICT: &str = "conflict";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_alias_is_accepted() {
        let e: ErrorResponse = serde_json::from_str(r#"{"message":"boom"}"#).unwrap();
        assert_eq!(e.error, "boom");
        assert_eq!(e.code, None);
    }

    #[test]
    fn code_omitted_when_absent() {
        let e = ErrorResponse {
            error: "x".into(),
            code: None,
        };
        assert_eq!(serde_json::to_string(&e).unwrap(), r#"{"error":"x"}"#);
    }
}

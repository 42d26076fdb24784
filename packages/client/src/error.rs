//! Client error types.
//!
//! The two kinds callers most often need to tell apart are
//! [`ClientError::Status`] (the broker rejected the request) and
//! [`ClientError::Parse`] (the broker answered, but not with the shape we
//! expected).  Everything else is either a transport failure or a typed
//! protocol outcome.

use std::time::Duration;

use registry_broker_core::{
    CreditError, CreditShortfall, EnvelopeError, KeyError, LedgerError,
};
use reqwest::StatusCode;
use serde_json::Value;

/// A non-2xx response.
///
/// `body` is best effort: the parsed JSON body, else the raw text as a
/// JSON string, else `{"parseError": "<reason>"}`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("broker returned {} {status_text}: {}", .status.as_u16(), summarize(.body))]
pub struct StatusError {
    pub status: StatusCode,
    pub status_text: String,
    pub body: Value,
}

impl StatusError {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        }
    }

    pub fn is_payment_required(&self) -> bool {
        self.status == StatusCode::PAYMENT_REQUIRED
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }

    /// The credit shortfall carried by a `402` body, if any.
    pub fn credit_shortfall(&self) -> Option<CreditShortfall> {
        if !self.is_payment_required() {
            return None;
        }
        CreditShortfall::from_body(&self.body)
    }

    /// The broker's `error` / `message` text, when the body has one.
    pub fn message(&self) -> Option<&str> {
        self.body
            .get("error")
            .or_else(|| self.body.get("message"))
            .and_then(Value::as_str)
    }
}

fn summarize(body: &Value) -> String {
    match body {
        Value::Null => "(empty body)".into(),
        Value::String(s) => s.clone(),
        other => other
            .get("error")
            .or_else(|| other.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

/// A 2xx response whose body does not match the expected shape.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unexpected {context} payload: {cause}")]
pub struct ParseError {
    /// What was being decoded, e.g. `"register response"`.
    pub context: String,
    pub cause: String,
    pub raw: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Status(#[from] StatusError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A `402` that could not be recovered locally.
    #[error("insufficient credits: short by {} credits", .0.shortfall_credits)]
    InsufficientCredits(CreditShortfall),

    #[error("registration failed: {message}")]
    RegistrationFailed {
        attempt_id: Option<String>,
        message: String,
    },

    #[error("registration {attempt_id} did not finish within {elapsed:?}")]
    RegistrationTimeout { attempt_id: String, elapsed: Duration },

    #[error("operation cancelled")]
    Cancelled,

    #[error("encryption unavailable: {0}")]
    EncryptionUnavailable(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Credit(#[from] CreditError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Key(#[from] KeyError),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status(e) => Some(e.status),
            _ => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Chat session types: `/chat/session`, `/chat/message` and history.
//!
//! A session targets either a registered agent (by UAID) or a raw endpoint
//! URL.  The broker keeps the transcript; the client may ask for a longer
//! retention window (`historyTtlSeconds`), which is billed in credits.
//!
//! Every history entry carries exactly one of `content` (plaintext) or
//! `cipherEnvelope` (end-to-end encrypted).  The broker never sees the key.

use registry_broker_core::CipherEnvelope;
use serde::{Deserialize, Serialize};

use crate::Validate;

/// Who wrote a history entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Agent,
}

/// One turn in a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryEntry {
    pub message_id: String,
    pub role: ChatRole,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher_envelope: Option<CipherEnvelope>,

    /// RFC 3339.
    pub timestamp: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// The populated body of a [`ChatHistoryEntry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryBody<'a> {
    Plain(&'a str),
    Encrypted(&'a CipherEnvelope),
}

impl ChatHistoryEntry {
    /// The entry's body, or `None` if the entry breaks the one-of rule.
    pub fn body(&self) -> Option<EntryBody<'_>> {
        match (&self.content, &self.cipher_envelope) {
            (Some(text), None) => Some(EntryBody::Plain(text)),
            (None, Some(env)) => Some(EntryBody::Encrypted(env)),
            _ => None,
        }
    }
}

impl Validate for ChatHistoryEntry {
    fn validate(&self) -> Result<(), String> {
        match (&self.content, &self.cipher_envelope) {
            (Some(_), Some(_)) => Err(format!(
                "history entry {} has both content and cipherEnvelope",
                self.message_id
            )),
            (None, None) => Err(format!(
                "history entry {} has neither content nor cipherEnvelope",
                self.message_id
            )),
            _ => Ok(()),
        }
    }
}

/// Request body for `POST /chat/session`.
///
/// Exactly one of `uaid` and `agent_url` must be set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uaid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_url: Option<String>,

    /// Requested retention window; longer windows cost credits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_ttl_seconds: Option<u64>,

    /// UAID of the local agent opening the session, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_uaid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_requested: Option<bool>,
}

impl Validate for CreateSessionRequest {
    fn validate(&self) -> Result<(), String> {
        match (&self.uaid, &self.agent_url) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err("set either uaid or agentUrl, not both".into()),
            (None, None) => Err("a session needs a uaid or an agentUrl".into()),
        }
    }
}

/// Response body for `POST /chat/session`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uaid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_ttl_seconds: Option<u64>,
    #[serde(default)]
    pub encrypted: bool,
}

/// Request body for `POST /chat/message`.
///
/// Carries plaintext `message` or an encrypted `cipherEnvelope`, never both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher_envelope: Option<CipherEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Response body for `POST /chat/message`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub session_id: String,
    pub message_id: String,
    /// The agent's reply when the target answered synchronously.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ChatHistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_ttl_seconds: Option<u64>,
}

impl Validate for SendMessageResponse {
    fn validate(&self) -> Result<(), String> {
        self.reply.as_ref().map_or(Ok(()), Validate::validate)
    }
}

/// Response body for `GET /chat/session/{id}/history`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub session_id: String,
    pub history: Vec<ChatHistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_ttl_seconds: Option<u64>,
}

impl Validate for HistoryResponse {
    fn validate(&self) -> Result<(), String> {
        self.history.iter().try_for_each(Validate::validate)
    }
}

/// Request body for `POST /chat/session/{id}/compact`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompactHistoryRequest {
    /// Trailing turns kept verbatim; everything before is summarized.
    pub preserve_entries: u32,
}

/// Response body for `POST /chat/session/{id}/compact`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompactHistoryResponse {
    pub session_id: String,
    pub summary_entry: ChatHistoryEntry,
    pub preserved_entries: Vec<ChatHistoryEntry>,
    /// Full history after compaction: the summary followed by the tail.
    pub history: Vec<ChatHistoryEntry>,
    pub credits_debited: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_ttl_seconds: Option<u64>,
}

impl Validate for CompactHistoryResponse {
    fn validate(&self) -> Result<(), String> {
        self.summary_entry.validate()?;
        self.preserved_entries
            .iter()
            .chain(&self.history)
            .try_for_each(Validate::validate)
    }
}

//! Encryption key registry and the session handshake.
//!
//! Agents register the public half of an X25519 key against their UAID.
//! To open an encrypted session the requester posts its ephemeral and
//! long-term public keys to the session's handshake endpoint; the
//! responder reads them back, derives the same secret, and posts its own
//! long-term key to complete the handshake.  Only public keys are carried.

use serde::{Deserialize, Serialize};

/// Request body for `POST /encryption/keys`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterKeyRequest {
    pub uaid: String,
    /// Always `"x25519"` for keys produced by this client.
    pub key_type: String,
    /// Base64 public key.
    pub public_key: String,
}

/// A registered public key, as returned by both key endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionKeyRecord {
    pub uaid: String,
    pub key_type: String,
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeRole {
    Requester,
    Responder,
}

/// Request body for `POST /chat/session/{id}/encryption-handshake`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeRequest {
    pub role: HandshakeRole,
    pub uaid: String,
    /// Long-term public key (base64).
    pub public_key: String,
    /// Requester only: the handshake's ephemeral public key (base64).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_public_key: Option<String>,
}

/// One side of a handshake as recorded by the broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeParticipant {
    pub uaid: String,
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_public_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeStatus {
    #[default]
    Pending,
    Complete,
}

/// Encryption state of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionSummary {
    pub session_id: String,
    #[serde(default)]
    pub status: HandshakeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<HandshakeParticipant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder: Option<HandshakeParticipant>,
}

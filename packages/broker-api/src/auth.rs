//! Ledger authentication: `POST /auth/ledger/challenge` and `/auth/ledger/verify`.
//!
//! The client asks for a challenge bound to a ledger account, signs the
//! challenge message locally, and exchanges the signature for an API key.
//! Only the signature and public key are sent; the private key stays on
//! the host.

use serde::{Deserialize, Serialize};

/// Request body for `POST /auth/ledger/challenge`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerChallengeRequest {
    pub account_id: String,
    /// Canonical network string, e.g. `hedera:testnet` or `eip155:8453`.
    pub network: String,
}

/// Response body for `POST /auth/ledger/challenge`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerChallengeResponse {
    pub challenge_id: String,
    /// The exact message to sign.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// How the signature in a [`LedgerVerifyRequest`] was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignatureKind {
    /// Raw Ed25519 signature over the message bytes (ledger-native).
    Raw,
    /// EIP-191 `personal_sign` signature (EVM).
    Evm,
}

/// Request body for `POST /auth/ledger/verify`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerVerifyRequest {
    pub challenge_id: String,
    pub account_id: String,
    pub network: String,
    pub signature: String,
    pub signature_kind: SignatureKind,
    /// Required for ledger-native signatures; EVM signatures recover it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Response body for `POST /auth/ledger/verify`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerVerifyResponse {
    /// API key to present on subsequent requests.
    pub key: String,
    pub account_id: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

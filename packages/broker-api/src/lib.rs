//! Request and response types for the Agent Registry Broker HTTP API.
//!
//! This crate encodes the broker's JSON contract as Rust types.  Every
//! endpoint lives under the `/api/v1` prefix that the client appends to
//! its configured base URL.  Field names are camelCase on the wire.
//!
//! # Endpoints covered
//!
//! | Method | Path | Type |
//! |--------|------|------|
//! | GET | `/search` | [`SearchParams`] → [`SearchResponse`] |
//! | GET | `/stats` | → [`StatsResponse`] |
//! | GET | `/registries` | → [`RegistriesResponse`] |
//! | GET | `/resolve/{uaid}` | → [`ResolveResponse`] |
//! | POST | `/register` | [`AgentRegistrationRequest`] → [`RegisterAgentResponse`] |
//! | POST | `/register/quote` | [`AgentRegistrationRequest`] → [`RegistrationQuote`] |
//! | PATCH | `/register/{uaid}` | [`AgentRegistrationRequest`] → [`RegisterAgentResponse`] |
//! | GET | `/register/progress/{attemptId}` | → [`RegistrationProgressResponse`] |
//! | GET | `/register/additional-registries` | → [`AdditionalRegistriesResponse`] |
//! | POST | `/chat/session` | [`CreateSessionRequest`] → [`CreateSessionResponse`] |
//! | POST | `/chat/message` | [`SendMessageRequest`] → [`SendMessageResponse`] |
//! | GET | `/chat/session/{id}/history` | → [`HistoryResponse`] |
//! | POST | `/chat/session/{id}/compact` | [`CompactHistoryRequest`] → [`CompactHistoryResponse`] |
//! | DELETE | `/chat/session/{id}` | → `204` |
//! | POST | `/chat/session/{id}/encryption-handshake` | [`HandshakeRequest`] → [`EncryptionSummary`] |
//! | GET | `/chat/session/{id}/encryption` | → [`EncryptionSummary`] |
//! | POST | `/credits/purchase` | [`CreditPurchaseRequest`] → [`CreditPurchaseResponse`] |
//! | POST | `/encryption/keys` | [`RegisterKeyRequest`] → [`EncryptionKeyRecord`] |
//! | GET | `/encryption/keys/{uaid}` | → [`EncryptionKeyRecord`] |
//! | POST | `/auth/ledger/challenge` | [`LedgerChallengeRequest`] → [`LedgerChallengeResponse`] |
//! | POST | `/auth/ledger/verify` | [`LedgerVerifyRequest`] → [`LedgerVerifyResponse`] |

pub mod auth;
pub mod chat;
pub mod credits;
pub mod encryption;
pub mod error;
pub mod registration;
pub mod search;

pub use auth::{
    LedgerChallengeRequest, LedgerChallengeResponse, LedgerVerifyRequest, LedgerVerifyResponse,
    SignatureKind,
};
pub use chat::{
    ChatHistoryEntry, ChatRole, CompactHistoryRequest, CompactHistoryResponse,
    CreateSessionRequest, CreateSessionResponse, EntryBody, HistoryResponse, SendMessageRequest,
    SendMessageResponse,
};
pub use credits::{CreditPurchaseRequest, CreditPurchaseResponse, InsufficientCreditsBody};
pub use encryption::{
    EncryptionKeyRecord, EncryptionSummary, HandshakeParticipant, HandshakeRequest,
    HandshakeRole, HandshakeStatus, RegisterKeyRequest,
};
pub use error::ErrorResponse;
pub use registration::{
    AdditionalRegistriesResponse, AdditionalRegistry, AgentProfile, AgentRegistrationRequest,
    PrimaryResult, RegisterAgentResponse, RegistrationMode, RegistrationProgress,
    RegistrationProgressResponse, RegistrationQuote, SubRegistryResult,
};
pub use search::{
    AgentSummary, RegistriesResponse, ResolveResponse, SearchParams, SearchResponse,
    StatsResponse,
};

/// Shape checks that go beyond what serde enforces.
///
/// Implemented by payloads with cross-field invariants; the client runs
/// [`Validate::validate`] after deserialization and reports a failure as a
/// parse error, not a broker rejection.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

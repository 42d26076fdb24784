//! Async client for the Agent Registry Broker.
//!
//! The HTTP transport is `reqwest`; everything layered on top of it lives
//! here:
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`transport`] | URL building, header merging, body recovery, decoding |
//! | [`auth`] | Ledger challenge signing and credential headers |
//! | [`credits`] | Credit purchases and the pay-then-retry-once guard |
//! | [`registration`] | Register / update, outcome classification, progress polling |
//! | [`chat`] | Session create / send / history / compact / end |
//! | [`encryption`] | Agent keys, handshakes, per-session contexts |
//! | [`conversation`] | Required / preferred / plaintext conversations |
//! | `search` | Discovery endpoints |
//!
//! Pure protocol logic (URL normalization, purchase sizing, classification,
//! key agreement, envelopes) is in `registry-broker-core`; wire types are in
//! `registry-broker-api`.

pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod conversation;
pub mod credits;
pub mod encryption;
pub mod error;
pub mod registration;
mod search;
pub mod transport;

pub use auth::{
    AuthenticateOptions, ExternalSigner, LedgerCredential, LedgerSigner, LedgerVerification,
    SignedMessage,
};
pub use chat::{ChatHistory, ChatTarget, CreateSession, DecryptedEntry, HistoryOptions};
pub use client::{RegistryBrokerClient, ACCOUNT_ID_HEADER, API_KEY_HEADER};
pub use config::{AutoRegisterKey, AutoTopUp, ClientConfig, EncryptionConfig, KeyMaterialSource};
pub use conversation::{
    ConversationHandle, ConversationMode, EncryptionPreference, StartConversation,
};
pub use credits::PurchaseCredits;
pub use encryption::{EnsureAgentKey, EnsuredKey, SessionContext};
pub use error::{ClientError, ParseError, StatusError};
pub use registration::{classify_response, RegisterOptions, RegistrationOutcome, WaitOptions};
pub use transport::{decode, decode_validated, RawResponse, RequestParts};

pub use tokio_util::sync::CancellationToken;

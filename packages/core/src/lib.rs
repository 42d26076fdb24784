//! Pure-logic primitives for the Agent Registry Broker client.
//!
//! Nothing here touches the network, the filesystem or an async runtime,
//! so the crate builds unchanged for native and `wasm32` targets.  Every
//! HTTP call belongs to `registry-broker-client`; this crate holds the
//! parts of the protocol that are pure computation, such as URL
//! construction, signer selection, top-up sizing, outcome classification
//! and chat encryption.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`url`] | Base-URL normalization and repeated-key query encoding |
//! | [`ledger`] | Ledger networks, signer families and challenge signing |
//! | [`credits`] | Shortfall → ledger purchase amount, with an upper bound |
//! | [`registration`] | Primary / sub-registry statuses and outcome classification |
//! | [`keys`] | X25519 agent keys and conversation shared-secret derivation |
//! | [`envelope`] | AES-256-GCM cipher envelopes for chat history entries |

pub mod credits;
pub mod envelope;
pub mod keys;
pub mod ledger;
pub mod registration;
pub mod url;

pub use credits::{purchase_amount, CreditError, CreditShortfall, DEFAULT_MAX_PURCHASE};
pub use envelope::{
    decrypt_cipher_envelope, encrypt_cipher_envelope, CipherEnvelope, CipherRecipient,
    EncryptRequest, EnvelopeError,
};
pub use keys::{
    validate_public_key, AgentKeyPair, ConversationKeys, ConversationRole, KeyError, SharedSecret,
    KEY_TYPE,
};
pub use ledger::{
    ensure_signer_family, EvmKey, LedgerError, LedgerNetwork, NativeKey, SignerFamily,
};
pub use registration::{
    classify, PrimaryStatus, ProgressStatus, RegistrationStatus, SubRegistryStatus,
};
pub use url::{endpoint_url, normalize_base_url, path_segment, QueryParams};

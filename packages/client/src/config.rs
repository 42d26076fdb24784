//! Client configuration.

use std::time::Duration;

use registry_broker_core::{AgentKeyPair, DEFAULT_MAX_PURCHASE};
use reqwest::header::HeaderMap;

use crate::auth::LedgerCredential;

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://hol.org/registry/api/v1";

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a [`crate::RegistryBrokerClient`].
///
/// Everything the client does automatically (credit top-ups, encryption key
/// registration) is switched on here and nowhere else; the client never
/// consults the process environment on its own.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker base URL; `/api/v1` is appended when missing.
    pub base_url: String,

    /// Sent as `x-api-key` on every request.
    pub api_key: Option<String>,

    /// Sent as `x-account-id` on every request.
    pub account_id: Option<String>,

    /// Extra headers applied to every request. Per-call headers win.
    pub default_headers: HeaderMap,

    pub timeout: Duration,

    /// Funds registrations and updates when the broker answers `402`.
    pub registration_auto_top_up: Option<AutoTopUp>,

    /// Funds chat history retention when the broker answers `402`.
    pub history_auto_top_up: Option<AutoTopUp>,

    pub encryption: EncryptionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            account_id: None,
            default_headers: HeaderMap::new(),
            timeout: DEFAULT_TIMEOUT,
            registration_auto_top_up: None,
            history_auto_top_up: None,
            encryption: EncryptionConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Populate the transport fields from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `REGISTRY_BROKER_BASE_URL` | [`DEFAULT_BASE_URL`] | Broker base URL |
    /// | `REGISTRY_BROKER_API_KEY` | (absent) | API key |
    /// | `REGISTRY_BROKER_ACCOUNT_ID` | (absent) | Ledger account id header |
    /// | `REGISTRY_BROKER_TIMEOUT_SECS` | `30` | Per-request timeout |
    ///
    /// Top-ups and key auto-registration stay off; enable them explicitly.
    pub fn from_env() -> Self {
        let timeout = std::env::var("REGISTRY_BROKER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        Self {
            base_url: std::env::var("REGISTRY_BROKER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
            api_key: std::env::var("REGISTRY_BROKER_API_KEY").ok(),
            account_id: std::env::var("REGISTRY_BROKER_ACCOUNT_ID").ok(),
            timeout,
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_registration_top_up(mut self, top_up: AutoTopUp) -> Self {
        self.registration_auto_top_up = Some(top_up);
        self
    }

    pub fn with_history_top_up(mut self, top_up: AutoTopUp) -> Self {
        self.history_auto_top_up = Some(top_up);
        self
    }

    pub fn with_auto_register(mut self, key: AutoRegisterKey) -> Self {
        self.encryption.auto_register = Some(key);
        self
    }
}

/// Ledger funding for automatic credit purchases.
#[derive(Debug, Clone)]
pub struct AutoTopUp {
    pub credential: LedgerCredential,
    pub memo: Option<String>,
    /// Upper bound on one automatic purchase, in ledger units.
    pub max_purchase: f64,
}

impl AutoTopUp {
    pub fn new(credential: LedgerCredential) -> Self {
        Self {
            credential,
            memo: None,
            max_purchase: DEFAULT_MAX_PURCHASE,
        }
    }

    pub fn with_max_purchase(mut self, max_purchase: f64) -> Self {
        self.max_purchase = max_purchase;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct EncryptionConfig {
    /// Register an encryption key for this agent before the first
    /// conversation is opened.
    pub auto_register: Option<AutoRegisterKey>,
}

#[derive(Debug, Clone)]
pub struct AutoRegisterKey {
    pub uaid: String,
    pub key_source: KeyMaterialSource,
}

/// Where the auto-registered key pair comes from.
#[derive(Debug, Clone)]
pub enum KeyMaterialSource {
    /// Generate and register a fresh pair unless this client already holds
    /// the private half of the key the broker has on record.
    Generate,
    /// Use (and register, if the broker has none) this key pair.
    Provided(AgentKeyPair),
}

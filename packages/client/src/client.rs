//! The [`RegistryBrokerClient`] handle and its shared state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use registry_broker_core::{normalize_base_url, AgentKeyPair};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::sync::OnceCell;

use crate::auth::LedgerVerification;
use crate::config::{ClientConfig, KeyMaterialSource};
use crate::encryption::SessionContext;
use crate::error::ClientError;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const ACCOUNT_ID_HEADER: &str = "x-account-id";

/// Async client for one broker.
///
/// Cheap to share behind an [`Arc`]; every method takes `&self`.  Calls are
/// independent apart from two caches:
///
/// * the default headers, rewritten by
///   [`authenticate_with_ledger`](Self::authenticate_with_ledger)
///   (last writer wins, read by every request), and
/// * the per-session encryption contexts, written when a handshake
///   completes and read by later sends and decrypts.
pub struct RegistryBrokerClient {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) config: ClientConfig,
    pub(crate) default_headers: RwLock<HeaderMap>,
    pub(crate) verification: RwLock<Option<LedgerVerification>>,
    pub(crate) sessions: Mutex<HashMap<String, Arc<SessionContext>>>,
    pub(crate) agent_keys: Mutex<HashMap<String, AgentKeyPair>>,
    pub(crate) key_bootstrap: OnceCell<()>,
}

impl RegistryBrokerClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        if config.base_url.trim().is_empty() {
            return Err(ClientError::Config("base_url must not be empty".into()));
        }
        let base_url = normalize_base_url(&config.base_url);

        let mut headers = config.default_headers.clone();
        if let Some(key) = &config.api_key {
            headers.insert(API_KEY_HEADER, header_value(API_KEY_HEADER, key)?);
        }
        if let Some(account) = &config.account_id {
            headers.insert(ACCOUNT_ID_HEADER, header_value(ACCOUNT_ID_HEADER, account)?);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Http)?;

        let mut agent_keys = HashMap::new();
        if let Some(auto) = &config.encryption.auto_register {
            if let KeyMaterialSource::Provided(pair) = &auto.key_source {
                agent_keys.insert(auto.uaid.clone(), pair.clone());
            }
        }

        Ok(Self {
            http,
            base_url,
            config,
            default_headers: RwLock::new(headers),
            verification: RwLock::new(None),
            sessions: Mutex::new(HashMap::new()),
            agent_keys: Mutex::new(agent_keys),
            key_bootstrap: OnceCell::new(),
        })
    }

    /// The normalized base URL, always ending in `/api/v1`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A snapshot of the headers applied to every request.
    pub fn default_headers(&self) -> HeaderMap {
        self.default_headers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Set (replacing any prior value) a header applied to every request.
    pub fn set_default_header(&self, name: &str, value: &str) -> Result<(), ClientError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ClientError::Config(format!("invalid header name '{name}': {e}")))?;
        let value = header_value(name.as_str(), value)?;
        self.default_headers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(name, value);
        Ok(())
    }

    pub fn remove_default_header(&self, name: &str) {
        self.default_headers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(name);
    }

    /// The most recent successful ledger verification, if any.
    pub fn verification(&self) -> Option<LedgerVerification> {
        self.verification
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Make `pair` the local key for `uaid`.  It is used to derive
    /// conversation secrets and is never sent to the broker.
    pub fn set_agent_key(&self, uaid: &str, pair: AgentKeyPair) {
        self.agent_keys
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(uaid.to_string(), pair);
    }

    pub(crate) fn agent_key(&self, uaid: &str) -> Option<AgentKeyPair> {
        self.agent_keys
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(uaid)
            .cloned()
    }

    pub(crate) fn store_session(&self, context: SessionContext) {
        self.sessions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(context.session_id.clone(), Arc::new(context));
    }

    pub(crate) fn session(&self, session_id: &str) -> Option<Arc<SessionContext>> {
        self.sessions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(session_id)
            .cloned()
    }

    pub(crate) fn forget_session(&self, session_id: &str) {
        self.sessions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(session_id);
    }
}

pub(crate) fn header_value(name: &str, value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value)
        .map_err(|e| ClientError::Config(format!("invalid value for header '{name}': {e}")))
}

impl std::fmt::Debug for RegistryBrokerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBrokerClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized_on_construction() {
        for base in ["https://h/api", "https://h/api/", "https://h"] {
            let client = RegistryBrokerClient::new(ClientConfig::new(base)).unwrap();
            assert_eq!(client.base_url(), "https://h/api/v1");
        }
    }

    #[test]
    fn empty_base_url_is_a_config_error() {
        let err = RegistryBrokerClient::new(ClientConfig::new("  ")).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn credentials_become_default_headers() {
        let mut config = ClientConfig::new("https://h").with_api_key("k-1");
        config.account_id = Some("0.0.42".into());
        let client = RegistryBrokerClient::new(config).unwrap();
        let headers = client.default_headers();
        assert_eq!(headers[API_KEY_HEADER], "k-1");
        assert_eq!(headers[ACCOUNT_ID_HEADER], "0.0.42");
    }

    #[test]
    fn default_header_is_replaced_not_accumulated() {
        let client = RegistryBrokerClient::new(ClientConfig::new("https://h")).unwrap();
        client.set_default_header(ACCOUNT_ID_HEADER, "0.0.1").unwrap();
        client.set_default_header(ACCOUNT_ID_HEADER, "0.0.2").unwrap();
        let headers = client.default_headers();
        assert_eq!(headers.get_all(ACCOUNT_ID_HEADER).iter().count(), 1);
        assert_eq!(headers[ACCOUNT_ID_HEADER], "0.0.2");
    }

    #[test]
    fn invalid_header_value_is_rejected() {
        let client = RegistryBrokerClient::new(ClientConfig::new("https://h")).unwrap();
        assert!(client.set_default_header("x-test", "bad\nvalue").is_err());
    }
}

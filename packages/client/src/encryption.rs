//! Encryption subsystem: agent keys, handshakes and session contexts.
//!
//! Private keys and shared secrets live only in this process.  The broker
//! stores public keys (`/encryption/keys`) and relays handshake public keys
//! (`/chat/session/{id}/encryption-handshake`); it never receives anything
//! that would let it decrypt a session.

use registry_broker_api::{
    EncryptionKeyRecord, EncryptionSummary, HandshakeRequest, RegisterKeyRequest,
};
use registry_broker_core::{
    decrypt_cipher_envelope, encrypt_cipher_envelope, path_segment, AgentKeyPair,
    CipherEnvelope, ConversationRole, EncryptRequest, SharedSecret, KEY_TYPE,
};
use reqwest::Method;
use tracing::{debug, info};

use crate::client::RegistryBrokerClient;
use crate::config::KeyMaterialSource;
use crate::error::ClientError;
use crate::transport::decode;

/// Cached encryption state of one session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub role: ConversationRole,
    pub local_uaid: String,
    pub peer_uaid: String,
    pub(crate) secret: SharedSecret,
}

impl SessionContext {
    /// Both participants, the local agent first.
    pub fn recipients(&self) -> Vec<String> {
        vec![self.local_uaid.clone(), self.peer_uaid.clone()]
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<CipherEnvelope, ClientError> {
        let recipients = self.recipients();
        Ok(encrypt_cipher_envelope(EncryptRequest {
            plaintext,
            session_id: &self.session_id,
            shared_secret: &self.secret,
            recipients: &recipients,
        })?)
    }

    pub fn decrypt(&self, envelope: &CipherEnvelope) -> Result<String, ClientError> {
        Ok(decrypt_cipher_envelope(envelope, &self.secret)?)
    }
}

/// Input to [`RegistryBrokerClient::ensure_agent_key`].
#[derive(Debug, Clone)]
pub struct EnsureAgentKey<'a> {
    pub uaid: &'a str,
    pub generate_if_missing: bool,
}

/// Result of [`RegistryBrokerClient::ensure_agent_key`].
#[derive(Debug, Clone)]
pub struct EnsuredKey {
    pub record: EncryptionKeyRecord,
    /// Set when a key pair was generated and registered by this call.
    /// Persist it; the broker cannot give it back.
    pub generated: Option<AgentKeyPair>,
}

impl RegistryBrokerClient {
    /// Register the public half of `pair` for `uaid` and keep the pair as
    /// the local key for that agent.
    pub async fn register_key(
        &self,
        uaid: &str,
        pair: &AgentKeyPair,
    ) -> Result<EncryptionKeyRecord, ClientError> {
        let request = RegisterKeyRequest {
            uaid: uaid.to_string(),
            key_type: KEY_TYPE.to_string(),
            public_key: pair.public_key_base64(),
        };
        let record: EncryptionKeyRecord = self
            .send_json(Method::POST, "/encryption/keys", &request, "encryption key")
            .await?;
        self.set_agent_key(uaid, pair.clone());
        info!("encryption: registered {KEY_TYPE} key for {uaid}");
        Ok(record)
    }

    /// The registered public key for `uaid`, or `None` if it has none.
    pub async fn encryption_key(
        &self,
        uaid: &str,
    ) -> Result<Option<EncryptionKeyRecord>, ClientError> {
        let path = format!("/encryption/keys/{}", path_segment(uaid));
        match self.request(Method::GET, &path, Default::default()).await {
            Ok(raw) => Ok(Some(decode(raw.body, "encryption key")?)),
            Err(ClientError::Status(e)) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Look up `uaid`'s key; generate and register one if it is missing and
    /// `generate_if_missing` is set.
    pub async fn ensure_agent_key(
        &self,
        request: EnsureAgentKey<'_>,
    ) -> Result<Option<EnsuredKey>, ClientError> {
        if let Some(record) = self.encryption_key(request.uaid).await? {
            return Ok(Some(EnsuredKey {
                record,
                generated: None,
            }));
        }
        if !request.generate_if_missing {
            return Ok(None);
        }

        let pair = AgentKeyPair::generate();
        let record = self.register_key(request.uaid, &pair).await?;
        Ok(Some(EnsuredKey {
            record,
            generated: Some(pair),
        }))
    }

    /// Apply `encryption.auto_register` from the config, once per client.
    pub async fn bootstrap_encryption(&self) -> Result<(), ClientError> {
        let Some(auto) = &self.config.encryption.auto_register else {
            return Ok(());
        };
        self.key_bootstrap
            .get_or_try_init(|| async {
                match &auto.key_source {
                    KeyMaterialSource::Provided(pair) => {
                        let registered = self.encryption_key(&auto.uaid).await?;
                        let current = pair.public_key_base64();
                        if registered.map(|r| r.public_key) != Some(current) {
                            self.register_key(&auto.uaid, pair).await?;
                        }
                    }
                    KeyMaterialSource::Generate => {
                        let has_local = self.agent_key(&auto.uaid).is_some();
                        let registered = self.encryption_key(&auto.uaid).await?;
                        if registered.is_none() || !has_local {
                            // A registered key without its private half is useless here.
                            let pair = AgentKeyPair::generate();
                            self.register_key(&auto.uaid, &pair).await?;
                        }
                    }
                }
                Ok::<(), ClientError>(())
            })
            .await?;
        Ok(())
    }

    /// `POST /chat/session/{id}/encryption-handshake`.
    pub async fn submit_handshake(
        &self,
        session_id: &str,
        request: &HandshakeRequest,
    ) -> Result<EncryptionSummary, ClientError> {
        let path = format!(
            "/chat/session/{}/encryption-handshake",
            path_segment(session_id)
        );
        debug!("encryption: {:?} handshake for session {session_id}", request.role);
        self.send_json(Method::POST, &path, request, "encryption handshake")
            .await
    }

    /// `GET /chat/session/{id}/encryption`.
    pub async fn session_encryption(
        &self,
        session_id: &str,
    ) -> Result<EncryptionSummary, ClientError> {
        let path = format!("/chat/session/{}/encryption", path_segment(session_id));
        self.get_json(&path, None, "encryption summary").await
    }

    /// The cached context for `session_id`, if a handshake completed here.
    pub fn session_context(&self, session_id: &str) -> Option<SessionContext> {
        self.session(session_id).map(|c| (*c).clone())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    use crate::config::{AutoRegisterKey, ClientConfig};

    type Keys = Arc<Mutex<HashMap<String, Value>>>;

    async fn spawn_key_server(keys: Keys) -> String {
        async fn put(State(keys): State<Keys>, Json(body): Json<Value>) -> Json<Value> {
            let uaid = body["uaid"].as_str().unwrap_or_default().to_string();
            keys.lock().unwrap().insert(uaid, body.clone());
            Json(body)
        }
        async fn fetch(State(keys): State<Keys>, Path(uaid): Path<String>) -> impl IntoResponse {
            match keys.lock().unwrap().get(&uaid) {
                Some(record) => Json(record.clone()).into_response(),
                None => (StatusCode::NOT_FOUND, Json(json!({"error": "no key"}))).into_response(),
            }
        }

        let app = Router::new()
            .route("/api/v1/encryption/keys", post(put))
            .route("/api/v1/encryption/keys/{uaid}", get(fetch))
            .with_state(keys);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn ensure_generates_and_registers_only_the_public_key() {
        let keys = Keys::default();
        let base = spawn_key_server(keys.clone()).await;
        let client = RegistryBrokerClient::new(ClientConfig::new(base)).unwrap();

        assert!(client
            .ensure_agent_key(EnsureAgentKey {
                uaid: "uaid:aid:a",
                generate_if_missing: false
            })
            .await
            .unwrap()
            .is_none());

        let ensured = client
            .ensure_agent_key(EnsureAgentKey {
                uaid: "uaid:aid:a",
                generate_if_missing: true,
            })
            .await
            .unwrap()
            .unwrap();
        let pair = ensured.generated.unwrap();
        assert_eq!(ensured.record.public_key, pair.public_key_base64());
        assert_eq!(ensured.record.key_type, "x25519");

        let stored = keys.lock().unwrap()["uaid:aid:a"].to_string();
        let secret = base64_secret(&pair);
        assert!(!stored.contains(&secret));

        // A second call finds the registered key and generates nothing.
        let again = client
            .ensure_agent_key(EnsureAgentKey {
                uaid: "uaid:aid:a",
                generate_if_missing: true,
            })
            .await
            .unwrap()
            .unwrap();
        assert!(again.generated.is_none());
        assert_eq!(again.record.public_key, pair.public_key_base64());
    }

    #[tokio::test]
    async fn bootstrap_registers_the_provided_key_once() {
        let keys = Keys::default();
        let base = spawn_key_server(keys.clone()).await;
        let pair = AgentKeyPair::generate();
        let config = ClientConfig::new(base).with_auto_register(AutoRegisterKey {
            uaid: "uaid:aid:me".into(),
            key_source: KeyMaterialSource::Provided(pair.clone()),
        });
        let client = RegistryBrokerClient::new(config).unwrap();

        client.bootstrap_encryption().await.unwrap();
        client.bootstrap_encryption().await.unwrap();

        let stored = keys.lock().unwrap()["uaid:aid:me"]["publicKey"].clone();
        assert_eq!(stored, json!(pair.public_key_base64()));
        assert!(client.agent_key("uaid:aid:me").is_some());
    }

    #[test]
    fn session_context_round_trips_messages() {
        let context = SessionContext {
            session_id: "s1".into(),
            role: ConversationRole::Requester,
            local_uaid: "uaid:a".into(),
            peer_uaid: "uaid:b".into(),
            secret: SharedSecret::generate(),
        };
        let envelope = context.encrypt("hello").unwrap();
        assert_eq!(envelope.recipients.len(), 2);
        assert_eq!(context.decrypt(&envelope).unwrap(), "hello");
    }

    fn base64_secret(pair: &AgentKeyPair) -> String {
        SharedSecret::from_bytes(pair.secret_bytes()).to_base64()
    }
}

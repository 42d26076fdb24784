//! Chat session manager.
//!
//! Sessions and their transcripts live on the broker.  A retention window
//! beyond the broker's free tier is billed; `create_session` runs through
//! the credit guard with the client's history top-up.

use registry_broker_api::{
    ChatHistoryEntry, CompactHistoryRequest, CompactHistoryResponse, CreateSessionRequest,
    CreateSessionResponse, EntryBody, HistoryResponse, SendMessageRequest, SendMessageResponse,
    Validate,
};
use registry_broker_core::{path_segment, CipherEnvelope};
use reqwest::Method;
use tracing::{debug, info, warn};

use crate::client::RegistryBrokerClient;
use crate::config::AutoTopUp;
use crate::encryption::SessionContext;
use crate::error::ClientError;
use crate::transport::{decode_validated, RequestParts};

/// What a session talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatTarget {
    /// A registered agent.
    Uaid(String),
    /// A raw agent endpoint.
    Endpoint(String),
}

#[derive(Debug, Clone)]
pub struct CreateSession {
    pub target: ChatTarget,
    pub history_ttl_seconds: Option<u64>,
    pub sender_uaid: Option<String>,
    pub encryption_requested: bool,
    /// Overrides the client's `history_auto_top_up`.
    pub auto_top_up: Option<AutoTopUp>,
}

impl CreateSession {
    pub fn new(target: ChatTarget) -> Self {
        Self {
            target,
            history_ttl_seconds: None,
            sender_uaid: None,
            encryption_requested: false,
            auto_top_up: None,
        }
    }

    pub fn with_history_ttl(mut self, seconds: u64) -> Self {
        self.history_ttl_seconds = Some(seconds);
        self
    }

    fn to_request(&self) -> CreateSessionRequest {
        let (uaid, agent_url) = match &self.target {
            ChatTarget::Uaid(u) => (Some(u.clone()), None),
            ChatTarget::Endpoint(e) => (None, Some(e.clone())),
        };
        CreateSessionRequest {
            uaid,
            agent_url,
            history_ttl_seconds: self.history_ttl_seconds,
            sender_uaid: self.sender_uaid.clone(),
            encryption_requested: self.encryption_requested.then_some(true),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryOptions {
    /// Decrypt cipher entries with the session's cached context.
    pub decrypt: bool,
}

/// A history entry paired with its readable text.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedEntry {
    pub entry: ChatHistoryEntry,
    /// `None` when the entry could not be decrypted.
    pub plaintext: Option<String>,
}

/// Result of [`RegistryBrokerClient::get_history`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatHistory {
    pub session_id: String,
    pub history: Vec<ChatHistoryEntry>,
    pub history_ttl_seconds: Option<u64>,
    /// Aligned with `history` when decryption was requested and the session
    /// has a context here; empty otherwise.
    pub decrypted_history: Vec<DecryptedEntry>,
}

impl RegistryBrokerClient {
    /// `POST /chat/session`.
    pub async fn create_session(
        &self,
        options: &CreateSession,
    ) -> Result<CreateSessionResponse, ClientError> {
        let request = options.to_request();
        if let Err(cause) = request.validate() {
            return Err(ClientError::Config(cause));
        }
        let top_up = options
            .auto_top_up
            .as_ref()
            .or(self.config.history_auto_top_up.as_ref());

        let request = &request;
        let session: CreateSessionResponse = self
            .with_credit_top_up(top_up, move || {
                self.send_json(Method::POST, "/chat/session", request, "chat session")
            })
            .await?;
        info!("chat: session {} opened", session.session_id);
        Ok(session)
    }

    /// `POST /chat/message` with a plaintext body.
    pub async fn send_message(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<SendMessageResponse, ClientError> {
        self.post_message(SendMessageRequest {
            session_id: session_id.to_string(),
            message: Some(message.to_string()),
            ..Default::default()
        })
        .await
    }

    /// `POST /chat/message` with an already sealed envelope.
    pub async fn send_encrypted_message(
        &self,
        session_id: &str,
        envelope: CipherEnvelope,
    ) -> Result<SendMessageResponse, ClientError> {
        self.post_message(SendMessageRequest {
            session_id: session_id.to_string(),
            cipher_envelope: Some(envelope),
            ..Default::default()
        })
        .await
    }

    async fn post_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse, ClientError> {
        let raw = self
            .request(Method::POST, "/chat/message", RequestParts::json(&request)?)
            .await?;
        decode_validated(raw.body, "chat message")
    }

    /// `GET /chat/session/{id}/history`.
    pub async fn get_history(
        &self,
        session_id: &str,
        options: HistoryOptions,
    ) -> Result<ChatHistory, ClientError> {
        let path = format!("/chat/session/{}/history", path_segment(session_id));
        let raw = self.request(Method::GET, &path, Default::default()).await?;
        let resp: HistoryResponse = decode_validated(raw.body, "chat history")?;

        let decrypted_history = match (options.decrypt, self.session(session_id)) {
            (true, Some(context)) => decrypt_all(&context, &resp.history),
            (true, None) => {
                debug!("chat: no encryption context for {session_id}; history left sealed");
                Vec::new()
            }
            (false, _) => Vec::new(),
        };

        Ok(ChatHistory {
            session_id: resp.session_id,
            history: resp.history,
            history_ttl_seconds: resp.history_ttl_seconds,
            decrypted_history,
        })
    }

    /// `POST /chat/session/{id}/compact`: summarize all but the last
    /// `preserve_entries` turns on the broker.
    pub async fn compact_history(
        &self,
        session_id: &str,
        preserve_entries: u32,
    ) -> Result<CompactHistoryResponse, ClientError> {
        let path = format!("/chat/session/{}/compact", path_segment(session_id));
        let raw = self
            .request(
                Method::POST,
                &path,
                RequestParts::json(&CompactHistoryRequest { preserve_entries })?,
            )
            .await?;
        let resp: CompactHistoryResponse = decode_validated(raw.body, "history compaction")?;
        info!(
            "chat: compacted {session_id}, {} credits debited",
            resp.credits_debited
        );
        Ok(resp)
    }

    /// `DELETE /chat/session/{id}`.  Ending an ended session succeeds.
    pub async fn end_session(&self, session_id: &str) -> Result<(), ClientError> {
        let path = format!("/chat/session/{}", path_segment(session_id));
        let result = self.request(Method::DELETE, &path, Default::default()).await;
        self.forget_session(session_id);
        match result {
            Ok(_) => Ok(()),
            Err(ClientError::Status(e)) if e.is_not_found() => {
                debug!("chat: session {session_id} was already ended");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn decrypt_all(context: &SessionContext, history: &[ChatHistoryEntry]) -> Vec<DecryptedEntry> {
    history
        .iter()
        .map(|entry| {
            let plaintext = match entry.body() {
                Some(EntryBody::Plain(text)) => Some(text.to_string()),
                Some(EntryBody::Encrypted(envelope)) => match context.decrypt(envelope) {
                    Ok(text) => Some(text),
                    Err(e) => {
                        warn!("chat: could not decrypt {}: {e}", entry.message_id);
                        None
                    }
                },
                None => None,
            };
            DecryptedEntry {
                entry: entry.clone(),
                plaintext,
            }
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use registry_broker_core::{ConversationRole, SharedSecret};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    use crate::config::ClientConfig;

    async fn spawn_mock_server(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn plain(id: &str, text: &str) -> Value {
        json!({"messageId": id, "role": "user", "content": text, "timestamp": "2026-01-01T00:00:00Z"})
    }

    #[tokio::test]
    async fn malformed_history_is_a_parse_error_not_a_status_error() {
        let app = Router::new().route(
            "/api/v1/chat/session/{id}/history",
            get(|| async {
                Json(json!({
                    "sessionId": "s1",
                    "history": [{"messageId": "m1", "role": "user", "timestamp": "t"}]
                }))
            }),
        );
        let base = spawn_mock_server(app).await;
        let client = RegistryBrokerClient::new(ClientConfig::new(base)).unwrap();

        let err = client
            .get_history("s1", HistoryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Parse(_)));
    }

    #[tokio::test]
    async fn decrypt_without_context_yields_no_decrypted_entries() {
        let app = Router::new().route(
            "/api/v1/chat/session/{id}/history",
            get(|| async { Json(json!({"sessionId": "s1", "history": [plain("m1", "hi")]})) }),
        );
        let base = spawn_mock_server(app).await;
        let client = RegistryBrokerClient::new(ClientConfig::new(base)).unwrap();

        let history = client
            .get_history("s1", HistoryOptions { decrypt: true })
            .await
            .unwrap();
        assert_eq!(history.history.len(), 1);
        assert!(history.decrypted_history.is_empty());
    }

    #[tokio::test]
    async fn decrypted_history_is_aligned_with_history() {
        let context = SessionContext {
            session_id: "s1".into(),
            role: ConversationRole::Requester,
            local_uaid: "uaid:a".into(),
            peer_uaid: "uaid:b".into(),
            secret: SharedSecret::generate(),
        };
        let sealed = serde_json::to_value(context.encrypt("secret text").unwrap()).unwrap();
        let foreign = serde_json::to_value(
            SessionContext {
                secret: SharedSecret::generate(),
                ..context.clone()
            }
            .encrypt("not for us")
            .unwrap(),
        )
        .unwrap();

        let body = json!({
            "sessionId": "s1",
            "history": [
                plain("m1", "hello"),
                {"messageId": "m2", "role": "agent", "cipherEnvelope": sealed, "timestamp": "t"},
                {"messageId": "m3", "role": "agent", "cipherEnvelope": foreign, "timestamp": "t"}
            ]
        });
        let app = Router::new().route(
            "/api/v1/chat/session/{id}/history",
            get(move || async move { Json(body) }),
        );
        let base = spawn_mock_server(app).await;
        let client = RegistryBrokerClient::new(ClientConfig::new(base)).unwrap();
        client.store_session(context);

        let history = client
            .get_history("s1", HistoryOptions { decrypt: true })
            .await
            .unwrap();
        let texts: Vec<_> = history
            .decrypted_history
            .iter()
            .map(|d| d.plaintext.as_deref())
            .collect();
        assert_eq!(texts, vec![Some("hello"), Some("secret text"), None]);
        assert_eq!(history.decrypted_history[1].entry.message_id, "m2");
    }

    #[tokio::test]
    async fn end_session_is_idempotent() {
        let deletes = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/api/v1/chat/session/{id}",
                delete(|State(deletes): State<Arc<AtomicUsize>>| async move {
                    if deletes.fetch_add(1, Ordering::SeqCst) == 0 {
                        StatusCode::NO_CONTENT.into_response()
                    } else {
                        (StatusCode::NOT_FOUND, Json(json!({"error": "gone"}))).into_response()
                    }
                }),
            )
            .with_state(deletes.clone());
        let base = spawn_mock_server(app).await;
        let client = RegistryBrokerClient::new(ClientConfig::new(base)).unwrap();

        client.end_session("s1").await.unwrap();
        client.end_session("s1").await.unwrap();
        assert_eq!(deletes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn compaction_result_comes_from_the_broker() {
        let app = Router::new().route(
            "/api/v1/chat/session/{id}/compact",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["preserveEntries"], 1);
                let summary = plain("sum", "summary of 3 turns");
                let tail = plain("m4", "latest");
                Json(json!({
                    "sessionId": "s1",
                    "summaryEntry": summary,
                    "preservedEntries": [tail],
                    "history": [summary, tail],
                    "creditsDebited": 2
                }))
            }),
        );
        let base = spawn_mock_server(app).await;
        let client = RegistryBrokerClient::new(ClientConfig::new(base)).unwrap();

        let resp = client.compact_history("s1", 1).await.unwrap();
        assert_eq!(resp.history.len(), 2);
        assert_eq!(resp.credits_debited, 2.0);
        assert_eq!(resp.summary_entry.content.as_deref(), Some("summary of 3 turns"));
    }

    #[test]
    fn session_target_maps_to_exactly_one_field() {
        let req = CreateSession::new(ChatTarget::Endpoint("https://agent".into()))
            .with_history_ttl(60)
            .to_request();
        assert!(req.uaid.is_none());
        assert_eq!(req.agent_url.as_deref(), Some("https://agent"));
        assert!(req.validate().is_ok());
    }
}

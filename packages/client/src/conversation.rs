//! Conversation coordinator: a chat session plus, when both sides have
//! keys, an end-to-end encryption handshake.
//!
//! The requester opens the session, generates an ephemeral key and posts
//! its public half (with its long-term public key) as the handshake.  The
//! responder reads that back through [`RegistryBrokerClient::accept_conversation`]
//! and derives the same secret on its own side.

use registry_broker_api::{
    ChatHistoryEntry, CreateSessionResponse, EntryBody, HandshakeRequest, HandshakeRole,
    SendMessageResponse,
};
use registry_broker_core::{
    validate_public_key, AgentKeyPair, ConversationKeys, ConversationRole, SharedSecret,
};
use tracing::{info, warn};

use crate::chat::{ChatHistory, ChatTarget, CreateSession, HistoryOptions};
use crate::client::RegistryBrokerClient;
use crate::encryption::SessionContext;
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionPreference {
    /// Fail unless the session can be encrypted.
    Required,
    /// Encrypt when possible, else fall back to plaintext.
    #[default]
    Preferred,
    Plaintext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationMode {
    Encrypted,
    Plaintext,
}

/// Input to [`RegistryBrokerClient::start_conversation`].
#[derive(Debug, Clone)]
pub struct StartConversation {
    /// The agent to talk to.
    pub uaid: String,
    /// The local agent; defaults to `encryption.auto_register.uaid`.
    pub sender_uaid: Option<String>,
    pub preference: EncryptionPreference,
    pub history_ttl_seconds: Option<u64>,
}

impl StartConversation {
    pub fn new(uaid: impl Into<String>, preference: EncryptionPreference) -> Self {
        Self {
            uaid: uaid.into(),
            sender_uaid: None,
            preference,
            history_ttl_seconds: None,
        }
    }
}

/// An open conversation.
#[derive(Debug, Clone)]
pub struct ConversationHandle<'c> {
    client: &'c RegistryBrokerClient,
    pub session: CreateSessionResponse,
    pub mode: ConversationMode,
}

impl ConversationHandle<'_> {
    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    /// Send `text`, sealed when the conversation is encrypted.
    pub async fn send(&self, text: &str) -> Result<SendMessageResponse, ClientError> {
        match self.mode {
            ConversationMode::Plaintext => self.client.send_message(self.session_id(), text).await,
            ConversationMode::Encrypted => {
                let envelope = self.context()?.encrypt(text)?;
                self.client
                    .send_encrypted_message(self.session_id(), envelope)
                    .await
            }
        }
    }

    pub async fn fetch_history(&self) -> Result<ChatHistory, ClientError> {
        let decrypt = self.mode == ConversationMode::Encrypted;
        self.client
            .get_history(self.session_id(), HistoryOptions { decrypt })
            .await
    }

    /// Readable text of `entry`.
    pub fn decrypt_history_entry(&self, entry: &ChatHistoryEntry) -> Result<String, ClientError> {
        match entry.body() {
            Some(EntryBody::Plain(text)) => Ok(text.to_string()),
            Some(EntryBody::Encrypted(envelope)) => self.context()?.decrypt(envelope),
            None => Err(ClientError::EncryptionUnavailable(format!(
                "history entry {} has no readable body",
                entry.message_id
            ))),
        }
    }

    fn context(&self) -> Result<std::sync::Arc<SessionContext>, ClientError> {
        self.client.session(self.session_id()).ok_or_else(|| {
            ClientError::EncryptionUnavailable(format!(
                "no encryption context for session {}",
                self.session_id()
            ))
        })
    }
}

impl RegistryBrokerClient {
    /// Open a conversation with `request.uaid`, encrypted if the preference
    /// and both sides' keys allow it.
    pub async fn start_conversation(
        &self,
        request: StartConversation,
    ) -> Result<ConversationHandle<'_>, ClientError> {
        let mut session = CreateSession::new(ChatTarget::Uaid(request.uaid.clone()));
        session.history_ttl_seconds = request.history_ttl_seconds;
        session.sender_uaid = request.sender_uaid.clone().or_else(|| {
            self.config
                .encryption
                .auto_register
                .as_ref()
                .map(|a| a.uaid.clone())
        });

        if request.preference == EncryptionPreference::Plaintext {
            return self.open_plaintext(&session).await;
        }

        let keys = match self.negotiation_keys(&request, session.sender_uaid.as_deref()).await {
            Ok(keys) => keys,
            Err(reason) if request.preference == EncryptionPreference::Required => {
                return Err(ClientError::EncryptionUnavailable(reason));
            }
            Err(reason) => {
                warn!("conversation: falling back to plaintext with {}: {reason}", request.uaid);
                return self.open_plaintext(&session).await;
            }
        };
        let (local_uaid, local, peer_public) = keys;

        session.encryption_requested = true;
        let created = self.create_session(&session).await?;
        let session_id = created.session_id.clone();

        let secret = match self
            .requester_handshake(&session_id, &local_uaid, &local, &peer_public)
            .await
        {
            Ok(secret) => secret,
            Err(e) => {
                if let Err(end_err) = self.end_session(&session_id).await {
                    warn!("conversation: could not end half-open session {session_id}: {end_err}");
                }
                let reason = format!("handshake for session {session_id} failed: {e}");
                if request.preference == EncryptionPreference::Required {
                    return Err(ClientError::EncryptionUnavailable(reason));
                }
                warn!("conversation: falling back to plaintext with {}: {reason}", request.uaid);
                session.encryption_requested = false;
                return self.open_plaintext(&session).await;
            }
        };

        self.store_session(SessionContext {
            session_id: session_id.clone(),
            role: ConversationRole::Requester,
            local_uaid,
            peer_uaid: request.uaid.clone(),
            secret,
        });
        info!("conversation: encrypted session {session_id} with {}", request.uaid);

        Ok(ConversationHandle {
            client: self,
            session: created,
            mode: ConversationMode::Encrypted,
        })
    }

    /// Derive the requester's secret for `session_id` and publish the
    /// handshake.  Nothing is cached until both steps succeed.
    async fn requester_handshake(
        &self,
        session_id: &str,
        local_uaid: &str,
        local: &AgentKeyPair,
        peer_public: &str,
    ) -> Result<SharedSecret, ClientError> {
        let ephemeral = AgentKeyPair::generate();
        let secret = local.derive_conversation_secret(
            ConversationRole::Requester,
            session_id,
            ConversationKeys {
                peer_public,
                ephemeral: Some(&ephemeral),
                peer_ephemeral: None,
            },
        )?;

        self.submit_handshake(
            session_id,
            &HandshakeRequest {
                role: HandshakeRole::Requester,
                uaid: local_uaid.to_string(),
                public_key: local.public_key_base64(),
                ephemeral_public_key: Some(ephemeral.public_key_base64()),
            },
        )
        .await?;
        Ok(secret)
    }

    /// Responder half: complete the handshake of `session_id` as
    /// `responder_uaid` and derive the same secret as the requester.
    pub async fn accept_conversation(
        &self,
        session_id: &str,
        responder_uaid: &str,
    ) -> Result<ConversationHandle<'_>, ClientError> {
        self.bootstrap_encryption().await?;
        let local = self.agent_key(responder_uaid).ok_or_else(|| {
            ClientError::EncryptionUnavailable(format!("no local key for {responder_uaid}"))
        })?;

        let summary = self.session_encryption(session_id).await?;
        let requester = summary.requester.ok_or_else(|| {
            ClientError::EncryptionUnavailable(format!(
                "session {session_id} has no requester handshake"
            ))
        })?;

        let secret = local.derive_conversation_secret(
            ConversationRole::Responder,
            session_id,
            ConversationKeys {
                peer_public: &requester.public_key,
                ephemeral: None,
                peer_ephemeral: requester.ephemeral_public_key.as_deref(),
            },
        )?;

        self.submit_handshake(
            session_id,
            &HandshakeRequest {
                role: HandshakeRole::Responder,
                uaid: responder_uaid.to_string(),
                public_key: local.public_key_base64(),
                ephemeral_public_key: None,
            },
        )
        .await?;

        self.store_session(SessionContext {
            session_id: session_id.to_string(),
            role: ConversationRole::Responder,
            local_uaid: responder_uaid.to_string(),
            peer_uaid: requester.uaid.clone(),
            secret,
        });
        info!("conversation: accepted encrypted session {session_id} from {}", requester.uaid);

        Ok(ConversationHandle {
            client: self,
            session: CreateSessionResponse {
                session_id: session_id.to_string(),
                uaid: Some(requester.uaid),
                agent_url: None,
                history_ttl_seconds: None,
                encrypted: true,
            },
            mode: ConversationMode::Encrypted,
        })
    }

    async fn open_plaintext(
        &self,
        session: &CreateSession,
    ) -> Result<ConversationHandle<'_>, ClientError> {
        let created = self.create_session(session).await?;
        Ok(ConversationHandle {
            client: self,
            session: created,
            mode: ConversationMode::Plaintext,
        })
    }

    /// Local uaid, local key pair and the counterpart's public key, or the
    /// reason one of them is missing.  Broker errors other than "no key" are
    /// also reported as reasons so `Preferred` can still fall back.
    async fn negotiation_keys(
        &self,
        request: &StartConversation,
        sender_uaid: Option<&str>,
    ) -> Result<(String, AgentKeyPair, String), String> {
        self.bootstrap_encryption()
            .await
            .map_err(|e| format!("could not register the local key: {e}"))?;

        let sender = sender_uaid.ok_or("no local agent identity to encrypt as")?;
        let local = self
            .agent_key(sender)
            .ok_or_else(|| format!("no local encryption key for {sender}"))?;

        let peer = self
            .encryption_key(&request.uaid)
            .await
            .map_err(|e| format!("could not look up {}'s key: {e}", request.uaid))?
            .ok_or_else(|| format!("{} has no registered encryption key", request.uaid))?;
        validate_public_key(&peer.public_key)
            .map_err(|e| format!("{}'s registered key is unusable: {e}", request.uaid))?;

        Ok((sender.to_string(), local, peer.public_key))
    }
}

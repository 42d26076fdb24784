//! Agent encryption keys and conversation shared secrets.
//!
//! Each agent holds a long-term X25519 key pair whose public half is
//! registered with the broker against its UAID.  The private half never
//! leaves the host.
//!
//! # Shared-secret derivation
//!
//! The requester of an encrypted conversation generates an ephemeral key
//! and publishes only its public half in the handshake.  Both sides then
//! compute the same two Diffie-Hellman values from their own private keys:
//!
//! ```text
//! requester:  DH(ephemeral, responder)  ||  DH(requester, responder)
//! responder:  DH(responder, ephemeral)  ||  DH(responder, requester)
//!
//! secret = HKDF-SHA256(salt = session_id, ikm, info = "registry-broker/conversation/v1")
//! ```
//!
//! No secret, and no private key, crosses the broker.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key type string registered with the broker.
pub const KEY_TYPE: &str = "x25519";

const CONVERSATION_INFO: &[u8] = b"registry-broker/conversation/v1";

/// Errors raised while decoding key material.
#[derive(Debug, Error, PartialEq)]
pub enum KeyError {
    #[error("invalid base64 key encoding: {0}")]
    Encoding(String),

    #[error("key must be 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("handshake is missing the {0} key")]
    MissingHandshakeKey(&'static str),
}

/// Which side of the handshake this party plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationRole {
    Requester,
    Responder,
}

// ── SharedSecret ─────────────────────────────────────────────────────────────

/// A 32-byte symmetric secret shared by the two ends of a conversation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; 32],
}

impl SharedSecret {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength(bytes.len()))?;
        Ok(Self::from_bytes(arr))
    }

    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Raw bytes. **Keep these secret.**
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Standard base64 encoding of the raw secret.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    /// HKDF-SHA256 expansion of the secret for a specific purpose.
    pub fn derive(&self, salt: &[u8], info: &[u8]) -> [u8; 32] {
        let hkdf = Hkdf::<Sha256>::new(Some(salt), &self.bytes);
        let mut out = [0u8; 32];
        // 32 bytes is far below HKDF-SHA256's 8160-byte output limit.
        let _ = hkdf.expand(info, &mut out);
        out
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

// ── AgentKeyPair ─────────────────────────────────────────────────────────────

/// An agent's long-term (or a handshake's ephemeral) X25519 key pair.
///
/// The host is responsible for persisting [`AgentKeyPair::secret_bytes`]
/// and passing them back on restart.
#[derive(Clone)]
pub struct AgentKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl AgentKeyPair {
    /// Generate a fresh key pair using OS randomness.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Restore a key pair from its 32-byte private key.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn from_secret_base64(s: &str) -> Result<Self, KeyError> {
        let bytes = decode_32(s)?;
        Ok(Self::from_secret_bytes(bytes))
    }

    /// The raw private key. **Keep this secret.**
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Public key, standard base64; the form registered with the broker.
    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.public.as_bytes())
    }

    /// Derive the conversation secret for `session_id`.
    ///
    /// * Requester: `self` is the requester's long-term key, `ephemeral` its
    ///   handshake key, `peer_public` the responder's long-term key.
    /// * Responder: `self` is the responder's long-term key, `ephemeral` is
    ///   unused (`None`), `peer_public` is the requester's long-term key and
    ///   `peer_ephemeral` the requester's handshake key.
    pub fn derive_conversation_secret(
        &self,
        role: ConversationRole,
        session_id: &str,
        handshake: ConversationKeys<'_>,
    ) -> Result<SharedSecret, KeyError> {
        let peer_static = PublicKey::from(decode_32(handshake.peer_public)?);

        let mut ikm = Vec::with_capacity(64);
        match role {
            ConversationRole::Requester => {
                let ephemeral = handshake
                    .ephemeral
                    .ok_or(KeyError::MissingHandshakeKey("requester ephemeral"))?;
                ikm.extend_from_slice(ephemeral.secret.diffie_hellman(&peer_static).as_bytes());
                ikm.extend_from_slice(self.secret.diffie_hellman(&peer_static).as_bytes());
            }
            ConversationRole::Responder => {
                let encoded = handshake
                    .peer_ephemeral
                    .ok_or(KeyError::MissingHandshakeKey("peer ephemeral"))?;
                let peer_ephemeral = PublicKey::from(decode_32(encoded)?);
                ikm.extend_from_slice(self.secret.diffie_hellman(&peer_ephemeral).as_bytes());
                ikm.extend_from_slice(self.secret.diffie_hellman(&peer_static).as_bytes());
            }
        }

        let hkdf = Hkdf::<Sha256>::new(Some(session_id.as_bytes()), &ikm);
        let mut out = [0u8; 32];
        let _ = hkdf.expand(CONVERSATION_INFO, &mut out);
        ikm.zeroize();
        Ok(SharedSecret::from_bytes(out))
    }
}

impl std::fmt::Debug for AgentKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AgentKeyPair({})", self.public_key_base64())
    }
}

/// Public inputs to [`AgentKeyPair::derive_conversation_secret`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversationKeys<'a> {
    /// The counterpart's long-term public key (base64).
    pub peer_public: &'a str,
    /// Requester only: this side's ephemeral key pair.
    pub ephemeral: Option<&'a AgentKeyPair>,
    /// Responder only: the requester's ephemeral public key (base64).
    pub peer_ephemeral: Option<&'a str>,
}

/// Check that `encoded` is a base64 X25519 public key.
pub fn validate_public_key(encoded: &str) -> Result<(), KeyError> {
    decode_32(encoded).map(|_| ())
}

fn decode_32(s: &str) -> Result<[u8; 32], KeyError> {
    let bytes = STANDARD
        .decode(s.trim())
        .map_err(|e| KeyError::Encoding(e.to_string()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| KeyError::InvalidLength(bytes.len()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_derive_the_same_secret() {
        let requester = AgentKeyPair::generate();
        let responder = AgentKeyPair::generate();
        let ephemeral = AgentKeyPair::generate();

        let a = requester
            .derive_conversation_secret(
                ConversationRole::Requester,
                "session-1",
                ConversationKeys {
                    peer_public: &responder.public_key_base64(),
                    ephemeral: Some(&ephemeral),
                    peer_ephemeral: None,
                },
            )
            .unwrap();
        let b = responder
            .derive_conversation_secret(
                ConversationRole::Responder,
                "session-1",
                ConversationKeys {
                    peer_public: &requester.public_key_base64(),
                    ephemeral: None,
                    peer_ephemeral: Some(&ephemeral.public_key_base64()),
                },
            )
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_sessions_derive_different_secrets() {
        let requester = AgentKeyPair::generate();
        let ephemeral = AgentKeyPair::generate();
        let peer = AgentKeyPair::generate().public_key_base64();
        let keys = ConversationKeys {
            peer_public: &peer,
            ephemeral: Some(&ephemeral),
            peer_ephemeral: None,
        };
        let a = requester
            .derive_conversation_secret(ConversationRole::Requester, "s1", keys)
            .unwrap();
        let b = requester
            .derive_conversation_secret(ConversationRole::Requester, "s2", keys)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn requester_without_ephemeral_is_rejected() {
        let requester = AgentKeyPair::generate();
        let responder = AgentKeyPair::generate();
        let peer = responder.public_key_base64();
        let result = requester.derive_conversation_secret(
            ConversationRole::Requester,
            "s",
            ConversationKeys {
                peer_public: &peer,
                ..Default::default()
            },
        );
        assert_eq!(
            result.unwrap_err(),
            KeyError::MissingHandshakeKey("requester ephemeral")
        );
    }

    #[test]
    fn key_pair_restores_from_secret() {
        let kp = AgentKeyPair::generate();
        let restored = AgentKeyPair::from_secret_bytes(kp.secret_bytes());
        assert_eq!(kp.public_key_base64(), restored.public_key_base64());

        let b64 = STANDARD.encode(kp.secret_bytes());
        let again = AgentKeyPair::from_secret_base64(&b64).unwrap();
        assert_eq!(kp.public_key_base64(), again.public_key_base64());
    }

    #[test]
    fn malformed_public_key_is_rejected() {
        let kp = AgentKeyPair::generate();
        let eph = AgentKeyPair::generate();
        let err = kp
            .derive_conversation_secret(
                ConversationRole::Requester,
                "s",
                ConversationKeys {
                    peer_public: "AAAA",
                    ephemeral: Some(&eph),
                    peer_ephemeral: None,
                },
            )
            .unwrap_err();
        assert_eq!(err, KeyError::InvalidLength(3));
    }

    #[test]
    fn public_key_validation() {
        assert_eq!(
            validate_public_key(&AgentKeyPair::generate().public_key_base64()),
            Ok(())
        );
        assert_eq!(validate_public_key("AAAA"), Err(KeyError::InvalidLength(3)));
        assert!(matches!(
            validate_public_key("not base64!"),
            Err(KeyError::Encoding(_))
        ));
    }

    #[test]
    fn debug_output_hides_secret() {
        let secret = SharedSecret::generate();
        assert_eq!(format!("{secret:?}"), "SharedSecret(..)");
    }
}

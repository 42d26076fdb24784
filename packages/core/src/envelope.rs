//! Cipher envelopes: the encrypted-at-rest form of a chat history entry.
//!
//! An envelope is opaque to the broker.  It carries the AES-256-GCM
//! ciphertext, the nonce, the session id (bound as associated data) and one
//! wrapped share per recipient.  It never contains the shared secret or any
//! private key: each `encryptedShare` is a one-way HKDF expansion of the
//! secret, so equality with the secret's own encoding is impossible short
//! of a hash collision.
//!
//! ```text
//! content_key     = HKDF(secret, salt = session_id, info = "registry-broker/envelope/v1")
//! encrypted_share = HKDF(secret, salt = session_id, info = "registry-broker/share/v1:" ++ uaid)
//! ```

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

use crate::keys::SharedSecret;

/// The only algorithm this crate produces and accepts.
pub const ALGORITHM: &str = "aes-256-gcm";

const NONCE_SIZE: usize = 12;
const CONTENT_KEY_INFO: &[u8] = b"registry-broker/envelope/v1";
const SHARE_INFO_PREFIX: &str = "registry-broker/share/v1:";

/// Errors raised while sealing or opening an envelope.
#[derive(Debug, Error, PartialEq)]
pub enum EnvelopeError {
    #[error("unsupported envelope algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("envelope field '{field}' is not valid base64: {reason}")]
    Encoding { field: &'static str, reason: String },

    #[error("envelope nonce must be {NONCE_SIZE} bytes, got {0}")]
    InvalidNonce(usize),

    #[error("envelope must name at least one recipient")]
    NoRecipients,

    #[error("encryption failed")]
    EncryptionFailed,

    /// Wrong secret, or the envelope was tampered with.
    #[error("decryption failed: wrong shared secret or tampered envelope")]
    DecryptionFailed,

    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,
}

/// One recipient's wrapped share.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CipherRecipient {
    pub uaid: String,
    pub encrypted_share: String,
}

/// Encrypted representation of one chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CipherEnvelope {
    pub algorithm: String,
    /// Ciphertext with the GCM tag appended, base64.
    pub ciphertext: String,
    /// 96-bit nonce, base64.
    pub nonce: String,
    /// Session the envelope belongs to; authenticated as associated data.
    pub session_id: String,
    pub recipients: Vec<CipherRecipient>,
}

impl CipherEnvelope {
    pub fn recipient(&self, uaid: &str) -> Option<&CipherRecipient> {
        self.recipients.iter().find(|r| r.uaid == uaid)
    }
}

/// Inputs to [`encrypt_cipher_envelope`].
#[derive(Debug, Clone, Copy)]
pub struct EncryptRequest<'a> {
    pub plaintext: &'a str,
    pub session_id: &'a str,
    pub shared_secret: &'a SharedSecret,
    pub recipients: &'a [String],
}

/// Seal `plaintext` for every recipient under `shared_secret`.
pub fn encrypt_cipher_envelope(req: EncryptRequest<'_>) -> Result<CipherEnvelope, EnvelopeError> {
    if req.recipients.is_empty() {
        return Err(EnvelopeError::NoRecipients);
    }

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = {
        let mut key = content_key(req.shared_secret, req.session_id);
        let cipher = Aes256Gcm::new((&key).into());
        key.zeroize();
        cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: req.plaintext.as_bytes(),
                    aad: req.session_id.as_bytes(),
                },
            )
            .map_err(|_| EnvelopeError::EncryptionFailed)?
    };

    let recipients = req
        .recipients
        .iter()
        .map(|uaid| CipherRecipient {
            uaid: uaid.clone(),
            encrypted_share: wrapped_share(req.shared_secret, req.session_id, uaid),
        })
        .collect();

    Ok(CipherEnvelope {
        algorithm: ALGORITHM.to_string(),
        ciphertext: STANDARD.encode(ciphertext),
        nonce: STANDARD.encode(nonce_bytes),
        session_id: req.session_id.to_string(),
        recipients,
    })
}

/// Open `envelope` with `shared_secret`.
///
/// Fails with [`EnvelopeError::DecryptionFailed`] for a mismatched secret
/// or any modification of ciphertext, nonce or session id.
pub fn decrypt_cipher_envelope(
    envelope: &CipherEnvelope,
    shared_secret: &SharedSecret,
) -> Result<String, EnvelopeError> {
    if envelope.algorithm != ALGORITHM {
        return Err(EnvelopeError::UnsupportedAlgorithm(
            envelope.algorithm.clone(),
        ));
    }

    let nonce = decode_field("nonce", &envelope.nonce)?;
    if nonce.len() != NONCE_SIZE {
        return Err(EnvelopeError::InvalidNonce(nonce.len()));
    }
    let ciphertext = decode_field("ciphertext", &envelope.ciphertext)?;

    let mut key = content_key(shared_secret, &envelope.session_id);
    let cipher = Aes256Gcm::new((&key).into());
    key.zeroize();

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &ciphertext,
                aad: envelope.session_id.as_bytes(),
            },
        )
        .map_err(|_| EnvelopeError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| EnvelopeError::InvalidUtf8)
}

fn content_key(secret: &SharedSecret, session_id: &str) -> [u8; 32] {
    secret.derive(session_id.as_bytes(), CONTENT_KEY_INFO)
}

fn wrapped_share(secret: &SharedSecret, session_id: &str, uaid: &str) -> String {
    let info = format!("{SHARE_INFO_PREFIX}{uaid}");
    STANDARD.encode(secret.derive(session_id.as_bytes(), info.as_bytes()))
}

fn decode_field(field: &'static str, value: &str) -> Result<Vec<u8>, EnvelopeError> {
    STANDARD.decode(value).map_err(|e| EnvelopeError::Encoding {
        field,
        reason: e.to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn recipients() -> Vec<String> {
        vec!["uaid:alice".to_string(), "uaid:bob".to_string()]
    }

    fn seal(plaintext: &str, secret: &SharedSecret) -> CipherEnvelope {
        let recipients = recipients();
        encrypt_cipher_envelope(EncryptRequest {
            plaintext,
            session_id: "session-42",
            shared_secret: secret,
            recipients: &recipients,
        })
        .unwrap()
    }

    #[test]
    fn decrypt_inverts_encrypt() {
        let secret = SharedSecret::generate();
        let long = "x".repeat(10_000);
        for m in ["", "hello", "multi\nline ✓ unicode", long.as_str()] {
            let env = seal(m, &secret);
            assert_eq!(decrypt_cipher_envelope(&env, &secret).unwrap(), m);
        }
    }

    #[test]
    fn wrong_secret_fails() {
        let env = seal("top secret", &SharedSecret::generate());
        assert_eq!(
            decrypt_cipher_envelope(&env, &SharedSecret::generate()),
            Err(EnvelopeError::DecryptionFailed)
        );
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let secret = SharedSecret::generate();
        let mut env = seal("top secret", &secret);
        let mut raw = STANDARD.decode(&env.ciphertext).unwrap();
        raw[0] ^= 0x01;
        env.ciphertext = STANDARD.encode(raw);
        assert_eq!(
            decrypt_cipher_envelope(&env, &secret),
            Err(EnvelopeError::DecryptionFailed)
        );
    }

    #[test]
    fn moved_to_another_session_fails() {
        let secret = SharedSecret::generate();
        let mut env = seal("top secret", &secret);
        env.session_id = "session-43".into();
        assert_eq!(
            decrypt_cipher_envelope(&env, &secret),
            Err(EnvelopeError::DecryptionFailed)
        );
    }

    #[test]
    fn shares_never_equal_the_encoded_secret() {
        let secret = SharedSecret::generate();
        let env = seal("hi", &secret);
        let encoded = secret.to_base64();
        assert_eq!(env.recipients.len(), 2);
        for r in &env.recipients {
            assert_ne!(r.encrypted_share, encoded);
            assert!(!env.ciphertext.contains(&encoded));
        }
        let json = serde_json::to_string(&env).unwrap();
        assert!(!json.contains(&encoded));
    }

    #[test]
    fn shares_differ_per_recipient() {
        let env = seal("hi", &SharedSecret::generate());
        assert_ne!(
            env.recipients[0].encrypted_share,
            env.recipients[1].encrypted_share
        );
        assert!(env.recipient("uaid:bob").is_some());
    }

    #[test]
    fn empty_recipient_list_is_rejected() {
        let secret = SharedSecret::generate();
        let result = encrypt_cipher_envelope(EncryptRequest {
            plaintext: "x",
            session_id: "s",
            shared_secret: &secret,
            recipients: &[],
        });
        assert_eq!(result, Err(EnvelopeError::NoRecipients));
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let secret = SharedSecret::generate();
        let mut env = seal("x", &secret);
        env.algorithm = "rot13".into();
        assert!(matches!(
            decrypt_cipher_envelope(&env, &secret),
            Err(EnvelopeError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn envelope_uses_camel_case_wire_names() {
        let env = seal("x", &SharedSecret::generate());
        let json = serde_json::to_value(&env).unwrap();
        assert!(json.get("sessionId").is_some());
        assert!(json["recipients"][0].get("encryptedShare").is_some());
    }
}

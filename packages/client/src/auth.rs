//! Ledger authenticator.
//!
//! Exchanges a locally signed challenge for an API key.  The network string
//! picks the signer family; a signer from the other family is refused before
//! any request is sent.  On success the key and (unless disabled) the
//! account id become default headers for every later request.

use std::sync::Arc;

use async_trait::async_trait;
use registry_broker_api::{
    LedgerChallengeRequest, LedgerChallengeResponse, LedgerVerifyRequest, LedgerVerifyResponse,
    SignatureKind,
};
use registry_broker_core::{
    ensure_signer_family, EvmKey, LedgerError, LedgerNetwork, NativeKey, SignerFamily,
};
use reqwest::Method;
use tracing::{debug, info};

use crate::client::{header_value, RegistryBrokerClient, ACCOUNT_ID_HEADER, API_KEY_HEADER};
use crate::error::ClientError;

/// An EVM signer living outside this process (wallet, HSM, remote signer).
#[async_trait]
pub trait ExternalSigner: Send + Sync {
    /// `0x`-prefixed address of the signing account.
    fn address(&self) -> String;

    /// EIP-191 `personal_sign` over `message`; `0x`-prefixed 65-byte hex.
    async fn sign_message(
        &self,
        message: &[u8],
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

/// Signing capability for one ledger account.
#[derive(Clone)]
pub enum LedgerSigner {
    Native(NativeKey),
    Evm(EvmKey),
    /// EVM family only.
    External(Arc<dyn ExternalSigner>),
}

impl LedgerSigner {
    pub fn family(&self) -> SignerFamily {
        match self {
            LedgerSigner::Native(_) => SignerFamily::LedgerNative,
            LedgerSigner::Evm(_) | LedgerSigner::External(_) => SignerFamily::Evm,
        }
    }

    /// Sign `message`, returning the signature, its kind and, for
    /// ledger-native keys, the DER public key the broker verifies against.
    pub async fn sign(&self, message: &[u8]) -> Result<SignedMessage, LedgerError> {
        match self {
            LedgerSigner::Native(key) => Ok(SignedMessage {
                signature: key.sign_hex(message),
                kind: SignatureKind::Raw,
                public_key: Some(key.public_key_der_hex()),
            }),
            LedgerSigner::Evm(key) => Ok(SignedMessage {
                signature: key.sign_message(message)?,
                kind: SignatureKind::Evm,
                public_key: None,
            }),
            LedgerSigner::External(signer) => {
                let signature = signer
                    .sign_message(message)
                    .await
                    .map_err(|e| LedgerError::Signing(e.to_string()))?;
                Ok(SignedMessage {
                    signature,
                    kind: SignatureKind::Evm,
                    public_key: None,
                })
            }
        }
    }
}

impl std::fmt::Debug for LedgerSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerSigner::Native(key) => f.debug_tuple("Native").field(key).finish(),
            LedgerSigner::Evm(key) => f.debug_tuple("Evm").field(key).finish(),
            LedgerSigner::External(signer) => {
                f.debug_tuple("External").field(&signer.address()).finish()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignedMessage {
    pub signature: String,
    pub kind: SignatureKind,
    pub public_key: Option<String>,
}

/// A ledger account plus the means to sign for it.
#[derive(Debug, Clone)]
pub struct LedgerCredential {
    pub account_id: String,
    /// `hedera:testnet`, `testnet`, `eip155:8453`, …
    pub network: String,
    pub signer: LedgerSigner,
}

impl LedgerCredential {
    pub fn new(account_id: impl Into<String>, network: impl Into<String>, signer: LedgerSigner) -> Self {
        Self {
            account_id: account_id.into(),
            network: network.into(),
            signer,
        }
    }

    pub fn native(account_id: impl Into<String>, network: impl Into<String>, key: NativeKey) -> Self {
        Self::new(account_id, network, LedgerSigner::Native(key))
    }

    /// An EVM credential; the account id is the key's address.
    pub fn evm(network: impl Into<String>, key: EvmKey) -> Self {
        Self::new(key.address(), network, LedgerSigner::Evm(key))
    }

    pub fn external(network: impl Into<String>, signer: Arc<dyn ExternalSigner>) -> Self {
        Self::new(signer.address(), network, LedgerSigner::External(signer))
    }

    /// Parse the network and check the signer belongs to its family.
    pub fn resolve_network(&self) -> Result<LedgerNetwork, LedgerError> {
        let network = LedgerNetwork::parse(&self.network)?;
        ensure_signer_family(&network, self.signer.family())?;
        Ok(network)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AuthenticateOptions {
    /// Set `x-account-id` to the verified account.
    pub set_account_header: bool,
}

impl Default for AuthenticateOptions {
    fn default() -> Self {
        Self {
            set_account_header: true,
        }
    }
}

/// A successful ledger verification.
#[derive(Clone)]
pub struct LedgerVerification {
    pub api_key: String,
    pub account_id: String,
    pub network: String,
    pub expires_at: Option<String>,
}

impl std::fmt::Debug for LedgerVerification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerVerification")
            .field("account_id", &self.account_id)
            .field("network", &self.network)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl RegistryBrokerClient {
    /// Sign a broker challenge with `credential` and adopt the returned key.
    pub async fn authenticate_with_ledger(
        &self,
        credential: &LedgerCredential,
        options: AuthenticateOptions,
    ) -> Result<LedgerVerification, ClientError> {
        let network = credential.resolve_network()?.canonical();

        let challenge: LedgerChallengeResponse = self
            .send_json(
                Method::POST,
                "/auth/ledger/challenge",
                &LedgerChallengeRequest {
                    account_id: credential.account_id.clone(),
                    network: network.clone(),
                },
                "ledger challenge",
            )
            .await?;
        debug!(
            "ledger-auth: challenge {} issued for {}",
            challenge.challenge_id, credential.account_id
        );

        let signed = credential.signer.sign(challenge.message.as_bytes()).await?;
        let verified: LedgerVerifyResponse = self
            .send_json(
                Method::POST,
                "/auth/ledger/verify",
                &LedgerVerifyRequest {
                    challenge_id: challenge.challenge_id,
                    account_id: credential.account_id.clone(),
                    network: network.clone(),
                    signature: signed.signature,
                    signature_kind: signed.kind,
                    public_key: signed.public_key,
                },
                "ledger verification",
            )
            .await?;

        let verification = LedgerVerification {
            api_key: verified.key,
            account_id: verified.account_id,
            network: verified.network,
            expires_at: verified.expires_at,
        };

        {
            let mut headers = self
                .default_headers
                .write()
                .unwrap_or_else(|p| p.into_inner());
            headers.insert(
                API_KEY_HEADER,
                header_value(API_KEY_HEADER, &verification.api_key)?,
            );
            if options.set_account_header {
                headers.insert(
                    ACCOUNT_ID_HEADER,
                    header_value(ACCOUNT_ID_HEADER, &verification.account_id)?,
                );
            }
        }
        *self
            .verification
            .write()
            .unwrap_or_else(|p| p.into_inner()) = Some(verification.clone());

        info!(
            "ledger-auth: verified {} on {}",
            verification.account_id, verification.network
        );
        Ok(verification)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Ledger networks and signer families.
//!
//! A ledger network string selects exactly one of two disjoint signer
//! families:
//!
//! | Network string | Family | Accepted key |
//! |---|---|---|
//! | `hedera:mainnet`, `hedera:testnet`, `mainnet`, `testnet`, `previewnet` | [`SignerFamily::LedgerNative`] | Ed25519 private key ([`NativeKey`]) |
//! | `<namespace>:<chainId>`, e.g. `eip155:8453` | [`SignerFamily::Evm`] | secp256k1 private key ([`EvmKey`]) or an external signer |
//!
//! A credential for one family is never accepted for the other; the check
//! in [`ensure_signer_family`] runs before any network call is made.

use std::fmt;
use std::str::FromStr;

use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use ed25519_dalek::{Signer, SigningKey};
use thiserror::Error;

/// DER prefix for a PKCS#8-wrapped Ed25519 private key.
const ED25519_DER_PRIVATE_PREFIX: &str = "302e020100300506032b657004220420";

/// DER prefix for an SPKI-wrapped Ed25519 public key.
const ED25519_DER_PUBLIC_PREFIX: &str = "302a300506032b6570032100";

/// Errors raised while selecting or using a ledger signer.
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("unsupported ledger network '{0}': expected hedera:<net> or <namespace>:<chainId>")]
    InvalidNetwork(String),

    #[error(
        "network '{network}' requires a {expected} signer but a {actual} signer was supplied"
    )]
    SignerMismatch {
        network: String,
        expected: SignerFamily,
        actual: SignerFamily,
    },

    #[error("invalid {family} private key: {reason}")]
    InvalidKey {
        family: SignerFamily,
        reason: String,
    },

    #[error("signing failed: {0}")]
    Signing(String),
}

/// The two disjoint signer families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerFamily {
    LedgerNative,
    Evm,
}

impl fmt::Display for SignerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerFamily::LedgerNative => f.write_str("ledger-native"),
            SignerFamily::Evm => f.write_str("EVM"),
        }
    }
}

/// A parsed ledger network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerNetwork {
    /// A ledger-native network, e.g. `testnet`.
    Native(String),
    /// An EVM-compatible chain in `namespace:chainId` form.
    Evm { namespace: String, chain_id: u64 },
}

impl LedgerNetwork {
    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        let raw = s.trim();
        let lower = raw.to_ascii_lowercase();
        let native = lower.strip_prefix("hedera:").unwrap_or(&lower);
        if matches!(native, "mainnet" | "testnet" | "previewnet") {
            return Ok(LedgerNetwork::Native(native.to_string()));
        }

        let (namespace, chain) = lower
            .split_once(':')
            .ok_or_else(|| LedgerError::InvalidNetwork(raw.to_string()))?;
        if namespace.is_empty() || namespace == "hedera" {
            return Err(LedgerError::InvalidNetwork(raw.to_string()));
        }
        let chain_id = chain
            .parse::<u64>()
            .map_err(|_| LedgerError::InvalidNetwork(raw.to_string()))?;
        Ok(LedgerNetwork::Evm {
            namespace: namespace.to_string(),
            chain_id,
        })
    }

    pub fn family(&self) -> SignerFamily {
        match self {
            LedgerNetwork::Native(_) => SignerFamily::LedgerNative,
            LedgerNetwork::Evm { .. } => SignerFamily::Evm,
        }
    }

    /// The form the broker expects: `hedera:testnet`, `eip155:1`.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LedgerNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerNetwork::Native(net) => write!(f, "hedera:{net}"),
            LedgerNetwork::Evm {
                namespace,
                chain_id,
            } => write!(f, "{namespace}:{chain_id}"),
        }
    }
}

impl FromStr for LedgerNetwork {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Fail unless `signer` belongs to the family `network` requires.
pub fn ensure_signer_family(
    network: &LedgerNetwork,
    signer: SignerFamily,
) -> Result<(), LedgerError> {
    let expected = network.family();
    if expected == signer {
        Ok(())
    } else {
        Err(LedgerError::SignerMismatch {
            network: network.canonical(),
            expected,
            actual: signer,
        })
    }
}

// ── Ledger-native key ────────────────────────────────────────────────────────

/// A ledger-native Ed25519 private key.
///
/// Accepts raw 32-byte hex or the DER (PKCS#8) hex encoding, with or
/// without a `0x` prefix.
#[derive(Clone)]
pub struct NativeKey {
    signing_key: SigningKey,
}

impl NativeKey {
    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Parse from hex (raw or DER-wrapped).
    pub fn from_hex(s: &str) -> Result<Self, LedgerError> {
        let invalid = |reason: String| LedgerError::InvalidKey {
            family: SignerFamily::LedgerNative,
            reason,
        };
        let hex_str = s.trim().trim_start_matches("0x").to_ascii_lowercase();
        let raw = hex_str
            .strip_prefix(ED25519_DER_PRIVATE_PREFIX)
            .unwrap_or(&hex_str);
        let bytes = hex::decode(raw).map_err(|e| invalid(e.to_string()))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| invalid("expected 32 key bytes".into()))?;
        Ok(Self::from_bytes(&seed))
    }

    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Public key as DER (SPKI) hex, the form the ledger publishes.
    pub fn public_key_der_hex(&self) -> String {
        format!(
            "{ED25519_DER_PUBLIC_PREFIX}{}",
            hex::encode(self.signing_key.verifying_key().as_bytes())
        )
    }

    /// Raw 64-byte Ed25519 signature over `message`, hex-encoded.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for NativeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeKey({})", self.public_key_der_hex())
    }
}

impl FromStr for NativeKey {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// ── EVM key ──────────────────────────────────────────────────────────────────

/// An EVM secp256k1 private key, signing with EIP-191 `personal_sign`.
#[derive(Clone)]
pub struct EvmKey {
    signer: PrivateKeySigner,
}

impl EvmKey {
    pub fn from_hex(s: &str) -> Result<Self, LedgerError> {
        let signer = s
            .trim()
            .parse::<PrivateKeySigner>()
            .map_err(|e| LedgerError::InvalidKey {
                family: SignerFamily::Evm,
                reason: e.to_string(),
            })?;
        Ok(Self { signer })
    }

    pub fn generate() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    /// `0x`-prefixed lowercase address.
    pub fn address(&self) -> String {
        format!("{:#x}", self.signer.address())
    }

    /// 65-byte `r || s || v` signature, `0x`-prefixed hex.
    pub fn sign_message(&self, message: &[u8]) -> Result<String, LedgerError> {
        let signature = self
            .signer
            .sign_message_sync(message)
            .map_err(|e| LedgerError::Signing(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

impl fmt::Debug for EvmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EvmKey({})", self.address())
    }
}

impl FromStr for EvmKey {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

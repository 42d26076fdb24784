//! Credit purchases and the `402 Payment Required` body.

use registry_broker_core::CreditShortfall;
use serde::{Deserialize, Serialize};

use crate::auth::SignatureKind;

/// Request body for `POST /credits/purchase`.
///
/// The purchase is authorised by a signature over
/// `"{accountId}|{network}|{amount}|{nonce}|{memo}"` made with the funding
/// ledger account's key; the key itself is never sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreditPurchaseRequest {
    pub account_id: String,
    pub network: String,
    /// Ledger currency amount, eight-decimal precision.
    #[serde(rename = "hbarAmount")]
    pub amount: f64,
    /// Unique per purchase; the broker rejects replays.
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub signature: String,
    pub signature_kind: SignatureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl CreditPurchaseRequest {
    /// The exact bytes the funding account signs.
    pub fn authorization_message(
        account_id: &str,
        network: &str,
        amount: f64,
        nonce: &str,
        memo: Option<&str>,
    ) -> String {
        format!(
            "{account_id}|{network}|{amount:.8}|{nonce}|{}",
            memo.unwrap_or_default()
        )
    }
}

/// Response body for `POST /credits/purchase`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreditPurchaseResponse {
    pub account_id: String,
    /// Credits added by this purchase.
    pub credits: f64,
    #[serde(rename = "hbarAmount")]
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// Balance after the purchase, when the broker reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
}

/// Body of a `402 Payment Required` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InsufficientCreditsBody {
    pub error: String,
    #[serde(flatten)]
    pub shortfall: CreditShortfall,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_credits: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_credits: Option<f64>,
}

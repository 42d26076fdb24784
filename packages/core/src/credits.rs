//! Credit shortfall → ledger purchase arithmetic.
//!
//! When the broker answers `402 Payment Required` it reports how many
//! credits are missing.  The client converts that shortfall into a ledger
//! currency amount and buys it before retrying.  An explicit estimate from
//! the broker wins; otherwise the amount is
//!
//! ```text
//! ceil((shortfall + 1) / creditsPerUnit × 1e8) / 1e8
//! ```
//!
//! The `+ 1` guarantees at least one purchasable credit even when the
//! shortfall is fractional, and the result is rounded up to the ledger's
//! eight-decimal precision.  Every amount is checked against a cap before
//! it is returned.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest unit of the ledger currency (8 decimals).
pub const LEDGER_UNIT_SCALE: f64 = 1e8;

/// Default ceiling on a single automatic purchase, in ledger units.
pub const DEFAULT_MAX_PURCHASE: f64 = 1_000.0;

/// Errors raised while sizing a top-up purchase.
#[derive(Debug, Error, PartialEq)]
pub enum CreditError {
    #[error("shortfall of {0} credits is not a positive finite number")]
    InvalidShortfall(f64),

    #[error("broker reported no credit conversion rate and no purchase estimate")]
    MissingRate,

    #[error("top-up of {amount} exceeds the configured cap of {cap}")]
    ExceedsCap { amount: f64, cap: f64 },
}

/// Credit shortfall as reported in a `402` response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreditShortfall {
    /// Credits missing to complete the request.
    pub shortfall_credits: f64,

    /// How many credits one ledger unit buys.
    #[serde(default, rename = "creditsPerHbar", skip_serializing_if = "Option::is_none")]
    pub credits_per_unit: Option<f64>,

    /// The broker's own estimate of the ledger amount to purchase.
    #[serde(default, rename = "estimatedHbar", skip_serializing_if = "Option::is_none")]
    pub estimated_units: Option<f64>,
}

impl CreditShortfall {
    pub fn new(shortfall_credits: f64, credits_per_unit: f64) -> Self {
        Self {
            shortfall_credits,
            credits_per_unit: Some(credits_per_unit),
            estimated_units: None,
        }
    }

    /// Extract a shortfall from an arbitrary error body, if one is present.
    pub fn from_body(body: &serde_json::Value) -> Option<Self> {
        let shortfall = serde_json::from_value::<Self>(body.clone()).ok()?;
        (shortfall.shortfall_credits > 0.0).then_some(shortfall)
    }
}

/// Ledger amount to purchase for `shortfall`, bounded by `cap`.
pub fn purchase_amount(shortfall: &CreditShortfall, cap: f64) -> Result<f64, CreditError> {
    let credits = shortfall.shortfall_credits;
    if !credits.is_finite() || credits <= 0.0 {
        return Err(CreditError::InvalidShortfall(credits));
    }

    let amount = match shortfall.estimated_units.filter(|e| e.is_finite() && *e > 0.0) {
        Some(estimate) => estimate,
        None => {
            let rate = shortfall
                .credits_per_unit
                .filter(|r| r.is_finite() && *r > 0.0)
                .ok_or(CreditError::MissingRate)?;
            ((credits + 1.0) / rate * LEDGER_UNIT_SCALE).ceil() / LEDGER_UNIT_SCALE
        }
    };

    if amount > cap {
        return Err(CreditError::ExceedsCap { amount, cap });
    }
    Ok(amount)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_shortfall_buys_a_nonzero_amount() {
        let amount = purchase_amount(&CreditShortfall::new(0.04, 25.0), DEFAULT_MAX_PURCHASE)
            .unwrap();
        let expected = ((0.04_f64 + 1.0) / 25.0 * 1e8).ceil() / 1e8;
        assert_eq!(amount, expected);
        assert!(amount > 0.0);
        assert!((amount - 0.0416).abs() < 1e-7);
    }

    #[test]
    fn whole_shortfall_rounds_up_to_eight_decimals() {
        let amount = purchase_amount(&CreditShortfall::new(10.0, 3.0), DEFAULT_MAX_PURCHASE)
            .unwrap();
        // 11 / 3 = 3.666…; rounded up at the eighth decimal.
        assert_eq!(amount, 3.66666667);
    }

    #[test]
    fn broker_estimate_wins_over_formula() {
        let shortfall = CreditShortfall {
            shortfall_credits: 10.0,
            credits_per_unit: Some(25.0),
            estimated_units: Some(2.5),
        };
        assert_eq!(purchase_amount(&shortfall, DEFAULT_MAX_PURCHASE).unwrap(), 2.5);
    }

    #[test]
    fn zero_estimate_falls_back_to_formula() {
        let shortfall = CreditShortfall {
            shortfall_credits: 24.0,
            credits_per_unit: Some(25.0),
            estimated_units: Some(0.0),
        };
        assert_eq!(purchase_amount(&shortfall, DEFAULT_MAX_PURCHASE).unwrap(), 1.0);
    }

    #[test]
    fn missing_rate_is_an_error() {
        let shortfall = CreditShortfall {
            shortfall_credits: 5.0,
            credits_per_unit: None,
            estimated_units: None,
        };
        assert_eq!(
            purchase_amount(&shortfall, DEFAULT_MAX_PURCHASE),
            Err(CreditError::MissingRate)
        );
    }

    #[test]
    fn non_positive_shortfall_is_an_error() {
        for bad in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                purchase_amount(&CreditShortfall::new(bad, 25.0), DEFAULT_MAX_PURCHASE),
                Err(CreditError::InvalidShortfall(_))
            ));
        }
    }

    #[test]
    fn misreported_shortfall_hits_the_cap() {
        let huge = CreditShortfall::new(1e12, 25.0);
        assert!(matches!(
            purchase_amount(&huge, DEFAULT_MAX_PURCHASE),
            Err(CreditError::ExceedsCap { cap, .. }) if cap == DEFAULT_MAX_PURCHASE
        ));

        let inflated_estimate = CreditShortfall {
            shortfall_credits: 1.0,
            credits_per_unit: Some(25.0),
            estimated_units: Some(5_000.0),
        };
        assert_eq!(
            purchase_amount(&inflated_estimate, 100.0),
            Err(CreditError::ExceedsCap {
                amount: 5_000.0,
                cap: 100.0
            })
        );
    }

    #[test]
    fn shortfall_parses_from_402_body() {
        let body = serde_json::json!({
            "error": "insufficient credits",
            "shortfallCredits": 12.5,
            "creditsPerHbar": 25,
            "estimatedHbar": 0.54
        });
        let s = CreditShortfall::from_body(&body).unwrap();
        assert_eq!(s.shortfall_credits, 12.5);
        assert_eq!(s.credits_per_unit, Some(25.0));
        assert_eq!(s.estimated_units, Some(0.54));
    }

    #[test]
    fn body_without_shortfall_yields_none() {
        assert!(CreditShortfall::from_body(&serde_json::json!({"error": "nope"})).is_none());
        assert!(CreditShortfall::from_body(&serde_json::json!("plain text")).is_none());
    }
}

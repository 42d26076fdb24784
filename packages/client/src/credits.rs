//! Credit purchases and the pay-then-retry-once guard.
//!
//! [`RegistryBrokerClient::with_credit_top_up`] wraps one side-effecting
//! call.  When that call fails with a `402` carrying a shortfall and a
//! top-up is configured, the guard buys the missing credits and runs the
//! call exactly once more.  Whatever the second attempt returns is final:
//! the wrapped call runs at most twice.

use std::future::Future;

use registry_broker_api::{CreditPurchaseRequest, CreditPurchaseResponse};
use registry_broker_core::{purchase_amount, CreditError};
use reqwest::Method;
use tracing::{info, warn};

use crate::auth::LedgerCredential;
use crate::client::RegistryBrokerClient;
use crate::config::AutoTopUp;
use crate::error::ClientError;

/// A ledger-funded credit purchase.
#[derive(Debug, Clone)]
pub struct PurchaseCredits<'a> {
    pub credential: &'a LedgerCredential,
    /// Ledger currency amount; sent with eight-decimal precision.
    pub amount: f64,
    pub memo: Option<&'a str>,
    pub metadata: Option<serde_json::Value>,
}

impl RegistryBrokerClient {
    /// Buy credits for `credential.account_id`.
    ///
    /// The purchase authorization is signed locally; only the signature and
    /// public key are sent.
    pub async fn purchase_credits(
        &self,
        purchase: PurchaseCredits<'_>,
    ) -> Result<CreditPurchaseResponse, ClientError> {
        let credential = purchase.credential;
        let network = credential.resolve_network()?.canonical();
        let nonce = uuid::Uuid::now_v7().to_string();

        let message = CreditPurchaseRequest::authorization_message(
            &credential.account_id,
            &network,
            purchase.amount,
            &nonce,
            purchase.memo,
        );
        let signed = credential.signer.sign(message.as_bytes()).await?;

        let request = CreditPurchaseRequest {
            account_id: credential.account_id.clone(),
            network,
            amount: purchase.amount,
            nonce,
            memo: purchase.memo.map(str::to_string),
            metadata: purchase.metadata,
            signature: signed.signature,
            signature_kind: signed.kind,
            public_key: signed.public_key,
        };

        let response: CreditPurchaseResponse = self
            .send_json(Method::POST, "/credits/purchase", &request, "credit purchase")
            .await?;
        info!(
            "credits: purchased {} credits for {} ({:.8} units)",
            response.credits, response.account_id, response.amount
        );
        Ok(response)
    }

    /// Run `op`; on a recoverable `402`, top up and run it exactly once more.
    ///
    /// Without a top-up, a `402` with a shortfall becomes
    /// [`ClientError::InsufficientCredits`].  A purchase above
    /// [`AutoTopUp::max_purchase`] fails with [`CreditError::ExceedsCap`]
    /// before anything is bought.
    pub async fn with_credit_top_up<T, F, Fut>(
        &self,
        top_up: Option<&AutoTopUp>,
        mut op: F,
    ) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let err = match op().await {
            Err(ClientError::Status(err)) if err.is_payment_required() => err,
            other => return other,
        };

        let Some(shortfall) = err.credit_shortfall() else {
            return Err(err.into());
        };
        let Some(top_up) = top_up else {
            return Err(ClientError::InsufficientCredits(shortfall));
        };

        let amount = match purchase_amount(&shortfall, top_up.max_purchase) {
            Ok(amount) => amount,
            Err(CreditError::MissingRate) => {
                warn!("credits: 402 carried no conversion rate; cannot size a top-up");
                return Err(ClientError::InsufficientCredits(shortfall));
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "credits: short {} credits, buying {amount:.8} units for {}",
            shortfall.shortfall_credits, top_up.credential.account_id
        );
        self.purchase_credits(PurchaseCredits {
            credential: &top_up.credential,
            amount,
            memo: top_up.memo.as_deref(),
            metadata: None,
        })
        .await?;

        op().await
    }
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
    use axum::{routing::post, Json, Router};
    use registry_broker_core::NativeKey;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    use crate::config::ClientConfig;
    use crate::error::StatusError;

    #[derive(Clone, Default)]
    struct Counters {
        purchases: Arc<AtomicUsize>,
        last_amount: Arc<std::sync::Mutex<Option<f64>>>,
    }

    async fn spawn_mock_server(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn purchase(State(c): State<Counters>, Json(body): Json<Value>) -> impl IntoResponse {
        c.purchases.fetch_add(1, Ordering::SeqCst);
        *c.last_amount.lock().unwrap() = body["hbarAmount"].as_f64();
        assert!(body["signature"].is_string());
        assert_eq!(body["signatureKind"], "raw");
        Json(json!({
            "accountId": body["accountId"],
            "credits": 26,
            "hbarAmount": body["hbarAmount"]
        }))
    }

    async fn setup() -> (RegistryBrokerClient, Counters) {
        let counters = Counters::default();
        let app = Router::new()
            .route("/api/v1/credits/purchase", post(purchase))
            .with_state(counters.clone());
        let base = spawn_mock_server(app).await;
        (
            RegistryBrokerClient::new(ClientConfig::new(base)).unwrap(),
            counters,
        )
    }

    fn top_up() -> AutoTopUp {
        AutoTopUp::new(LedgerCredential::native(
            "0.0.1234",
            "hedera:testnet",
            NativeKey::generate(),
        ))
    }

    fn payment_required(shortfall: f64) -> ClientError {
        StatusError::new(
            StatusCode::PAYMENT_REQUIRED,
            json!({"error": "insufficient credits", "shortfallCredits": shortfall, "creditsPerHbar": 25}),
        )
        .into()
    }

    #[tokio::test]
    async fn tops_up_and_retries_exactly_once() {
        let (client, counters) = setup().await;
        let attempts = &AtomicUsize::new(0);
        let top_up = top_up();

        let result = client
            .with_credit_top_up(Some(&top_up), move || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(payment_required(0.04))
                } else {
                    Ok("registered")
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "registered");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(counters.purchases.load(Ordering::SeqCst), 1);
        let expected = ((0.04_f64 + 1.0) / 25.0 * 1e8).ceil() / 1e8;
        assert_eq!(*counters.last_amount.lock().unwrap(), Some(expected));
    }

    #[tokio::test]
    async fn second_failure_propagates_unchanged() {
        let (client, counters) = setup().await;
        let attempts = &AtomicUsize::new(0);
        let top_up = top_up();

        let err = client
            .with_credit_top_up(Some(&top_up), move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(payment_required(5.0))
            })
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::PAYMENT_REQUIRED));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(counters.purchases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn without_top_up_the_shortfall_is_typed() {
        let (client, counters) = setup().await;
        let err = client
            .with_credit_top_up(None, || async { Err::<(), _>(payment_required(5.0)) })
            .await
            .unwrap_err();
        match err {
            ClientError::InsufficientCredits(s) => assert_eq!(s.shortfall_credits, 5.0),
            other => panic!("expected insufficient credits, got {other:?}"),
        }
        assert_eq!(counters.purchases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_purchase_is_refused() {
        let (client, counters) = setup().await;
        let top_up = top_up().with_max_purchase(1.0);
        let err = client
            .with_credit_top_up(Some(&top_up), || async {
                Err::<(), _>(payment_required(1_000.0))
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Credit(CreditError::ExceedsCap { .. })
        ));
        assert_eq!(counters.purchases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn other_errors_pass_straight_through() {
        let (client, counters) = setup().await;
        let top_up = top_up();
        let attempts = &AtomicUsize::new(0);
        let err = client
            .with_credit_top_up(Some(&top_up), move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(StatusError::new(StatusCode::FORBIDDEN, Value::Null).into())
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.purchases.load(Ordering::SeqCst), 0);
    }
}

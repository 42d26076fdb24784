//! Shared helpers for the registry broker conformance suite.
//!
//! Provides [`spawn_broker`]: an in-process mock of the broker's `/api/v1`
//! surface bound to an ephemeral port.  The returned [`MockBroker`] is the
//! same state the server uses, so tests can seed balances and agents and
//! inspect call counters without going through HTTP.

pub mod broker;

use std::sync::Arc;

pub use broker::MockBroker;

/// Start an ephemeral mock broker and return `(base_url, state)`.
///
/// The base URL is the bare origin, e.g. `http://127.0.0.1:51234`; the
/// client appends `/api/v1` itself.
///
/// # Panics
///
/// Panics if the TCP listener cannot be bound or the server fails.
pub async fn spawn_broker() -> (String, Arc<MockBroker>) {
    spawn_broker_with(MockBroker::default()).await
}

/// [`spawn_broker`] with caller-chosen prices and polling behaviour.
///
/// # Panics
///
/// Panics if the TCP listener cannot be bound or the server fails.
pub async fn spawn_broker_with(state: MockBroker) -> (String, Arc<MockBroker>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("get local addr");

    let state = Arc::new(state);
    let router = broker::router(Arc::clone(&state));
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("mock broker error");
    });

    (format!("http://{addr}"), state)
}

/// Route client logs to the test harness.  `RUST_LOG` filters; safe to
/// call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("registry_broker_client=debug")),
        )
        .with_test_writer()
        .try_init();
}

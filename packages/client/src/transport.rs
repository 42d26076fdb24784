//! Transport adapter and response decoder.
//!
//! Every call funnels through [`RegistryBrokerClient::request`]: build the
//! URL from the normalized base, merge headers (defaults, then per-call),
//! send, read the body once.  A non-2xx status becomes a [`StatusError`]
//! whose body is recovered as far as possible; the error path itself never
//! fails on a malformed body.
//!
//! Decoding a 2xx body is a separate step so a schema mismatch surfaces as a
//! [`ParseError`] carrying the raw value, distinct from a broker rejection.

use registry_broker_api::Validate;
use registry_broker_core::{endpoint_url, QueryParams};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::client::RegistryBrokerClient;
use crate::error::{ClientError, ParseError, StatusError};

/// Optional parts of a request.
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    pub query: Option<QueryParams>,
    pub body: Option<Value>,
    /// Applied after the client's default headers; same-named headers win.
    pub headers: HeaderMap,
}

impl RequestParts {
    pub fn query(query: QueryParams) -> Self {
        Self {
            query: Some(query),
            ..Self::default()
        }
    }

    pub fn json<B: Serialize + ?Sized>(body: &B) -> Result<Self, ClientError> {
        let body = serde_json::to_value(body).map_err(|e| {
            ClientError::Config(format!("request body is not serializable: {e}"))
        })?;
        Ok(Self {
            body: Some(body),
            ..Self::default()
        })
    }
}

/// A successful (2xx) response with its body read.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    /// `Null` for an empty body.
    pub body: Value,
}

impl RegistryBrokerClient {
    /// Send one request to `path` (relative to the `/api/v1` base).
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        parts: RequestParts,
    ) -> Result<RawResponse, ClientError> {
        let url = endpoint_url(&self.base_url, path, parts.query.as_ref());

        let mut headers = self.default_headers();
        for (name, value) in &parts.headers {
            headers.insert(name.clone(), value.clone());
        }

        debug!("transport: {method} {url}");
        let mut req = self.http.request(method, &url).headers(headers);
        if let Some(body) = &parts.body {
            req = req.json(body);
        }

        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            debug!("transport: {url} returned {status}");
            let body = match response.bytes().await {
                Ok(bytes) => read_body(&bytes),
                Err(e) => json!({ "parseError": format!("body could not be read: {e}") }),
            };
            return Err(StatusError::new(status, body).into());
        }

        let bytes = response.bytes().await?;
        Ok(RawResponse {
            status,
            body: read_body(&bytes),
        })
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<QueryParams>,
        context: &str,
    ) -> Result<T, ClientError> {
        let parts = RequestParts {
            query,
            ..RequestParts::default()
        };
        let raw = self.request(Method::GET, path, parts).await?;
        decode(raw.body, context)
    }

    pub(crate) async fn send_json<T, B>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        context: &str,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let raw = self.request(method, path, RequestParts::json(body)?).await?;
        decode(raw.body, context)
    }
}

/// Recover a body as JSON, else text, else a synthetic parse-error record.
pub(crate) fn read_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => value,
        Err(json_err) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::String(text.to_string()),
            Err(utf8_err) => json!({
                "parseError": format!("body is neither JSON ({json_err}) nor text ({utf8_err})")
            }),
        },
    }
}

/// Decode a 2xx body into `T`.
pub fn decode<T: DeserializeOwned>(raw: Value, context: &str) -> Result<T, ClientError> {
    match serde_json::from_value::<T>(raw.clone()) {
        Ok(value) => Ok(value),
        Err(e) => Err(ParseError {
            context: context.to_string(),
            cause: e.to_string(),
            raw,
        }
        .into()),
    }
}

/// Decode a 2xx body into `T` and check its cross-field invariants.
pub fn decode_validated<T>(raw: Value, context: &str) -> Result<T, ClientError>
where
    T: DeserializeOwned + Validate,
{
    let value: T = decode(raw.clone(), context)?;
    match value.validate() {
        Ok(()) => Ok(value),
        Err(cause) => Err(ParseError {
            context: context.to_string(),
            cause,
            raw,
        }
        .into()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::StatusCode as AxumStatus;
    use axum::response::IntoResponse;
    use axum::{routing::get, Json, Router};
    use registry_broker_api::SearchResponse;
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

    fn client(base: &str) -> RegistryBrokerClient {
        RegistryBrokerClient::new(ClientConfig::new(base)).unwrap()
    }

    #[test]
    fn body_recovery_degrades_gracefully() {
        assert_eq!(read_body(b""), Value::Null);
        assert_eq!(read_body(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(read_body(b"Bad Gateway"), json!("Bad Gateway"));
        let binary = read_body(&[0xff, 0xfe, 0x00]);
        assert!(binary["parseError"].is_string());
    }

    #[test]
    fn schema_mismatch_is_a_parse_error() {
        let err = decode::<SearchResponse>(json!({"hits": 3}), "search response").unwrap_err();
        match err {
            ClientError::Parse(e) => {
                assert_eq!(e.context, "search response");
                assert_eq!(e.raw, json!({"hits": 3}));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn every_base_variant_reaches_the_versioned_path() {
        let app = Router::new().route(
            "/api/v1/stats",
            get(|| async { Json(json!({"totalAgents": 7})) }),
        );
        let base = spawn_mock_server(app).await;

        for variant in [format!("{base}/api"), format!("{base}/api/"), base.clone()] {
            let raw = client(&variant)
                .request(Method::GET, "/stats", RequestParts::default())
                .await
                .unwrap();
            assert_eq!(raw.body["totalAgents"], 7);
        }
    }

    #[tokio::test]
    async fn non_2xx_with_text_body_yields_status_error() {
        let app = Router::new().route(
            "/api/v1/stats",
            get(|| async { (AxumStatus::SERVICE_UNAVAILABLE, "maintenance").into_response() }),
        );
        let base = spawn_mock_server(app).await;

        let err = client(&base)
            .request(Method::GET, "/stats", RequestParts::default())
            .await
            .unwrap_err();
        match err {
            ClientError::Status(e) => {
                assert_eq!(e.status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(e.body, json!("maintenance"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_error_body_still_yields_status_error() {
        // Promises 512 bytes, sends a few, then hangs up.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(
                    b"HTTP/1.1 502 Bad Gateway\r\ncontent-type: application/json\r\n\
                      content-length: 512\r\n\r\n{\"error\":",
                )
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let err = client(&format!("http://{addr}"))
            .request(Method::GET, "/stats", RequestParts::default())
            .await
            .unwrap_err();
        match err {
            ClientError::Status(e) => {
                assert_eq!(e.status, StatusCode::BAD_GATEWAY);
                assert!(e.body["parseError"].is_string(), "body: {}", e.body);
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn per_call_headers_override_defaults() {
        let app = Router::new().route(
            "/api/v1/echo",
            get(|headers: axum::http::HeaderMap| async move {
                let value = headers
                    .get("x-account-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({ "account": value }))
            }),
        );
        let base = spawn_mock_server(app).await;

        let client = client(&base);
        client.set_default_header("x-account-id", "0.0.1").unwrap();

        let mut parts = RequestParts::default();
        parts
            .headers
            .insert("x-account-id", "0.0.9".parse().unwrap());
        let raw = client.request(Method::GET, "/echo", parts).await.unwrap();
        assert_eq!(raw.body["account"], "0.0.9");

        let raw = client
            .request(Method::GET, "/echo", RequestParts::default())
            .await
            .unwrap();
        assert_eq!(raw.body["account"], "0.0.1");
    }
}

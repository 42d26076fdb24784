//! Discovery endpoints.

use registry_broker_api::{
    AgentSummary, RegistriesResponse, ResolveResponse, SearchParams, SearchResponse,
    StatsResponse,
};
use registry_broker_core::path_segment;

use crate::client::RegistryBrokerClient;
use crate::error::ClientError;

impl RegistryBrokerClient {
    /// `GET /search`; list parameters are sent as repeated keys.
    pub async fn search(&self, params: &SearchParams) -> Result<SearchResponse, ClientError> {
        self.get_json("/search", Some(params.to_query()), "search response")
            .await
    }

    pub async fn stats(&self) -> Result<StatsResponse, ClientError> {
        self.get_json("/stats", None, "stats").await
    }

    /// Keys of the registries the broker indexes.
    pub async fn registries(&self) -> Result<Vec<String>, ClientError> {
        let resp: RegistriesResponse = self.get_json("/registries", None, "registries").await?;
        Ok(resp.registries)
    }

    pub async fn resolve_uaid(&self, uaid: &str) -> Result<AgentSummary, ClientError> {
        let path = format!("/resolve/{}", path_segment(uaid));
        let resp: ResolveResponse = self.get_json(&path, None, "resolve response").await?;
        Ok(resp.agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::extract::RawQuery;
    use axum::{routing::get, Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    use crate::config::ClientConfig;

    #[tokio::test]
    async fn search_sends_repeated_capability_keys() {
        let app = Router::new().route(
            "/api/v1/search",
            get(|RawQuery(query): RawQuery| async move {
                Json(json!({
                    "hits": [],
                    "total": 0,
                    "query": query.unwrap_or_default()
                }))
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = RegistryBrokerClient::new(ClientConfig::new(format!("http://{addr}/api"))).unwrap();
        let params = SearchParams {
            capabilities: vec!["a".into(), "b".into()],
            ..Default::default()
        };

        // The echoed query is not part of SearchResponse, so read it raw.
        let raw = client
            .request(
                reqwest::Method::GET,
                "/search",
                crate::transport::RequestParts::query(params.to_query()),
            )
            .await
            .unwrap();
        assert_eq!(raw.body["query"], "capabilities=a&capabilities=b");

        let typed = client.search(&params).await.unwrap();
        assert!(typed.hits.is_empty());
    }
}

//! Discovery types: `/search`, `/stats`, `/registries` and `/resolve/{uaid}`.

use registry_broker_core::QueryParams;
use serde::{Deserialize, Serialize};

/// Query for `GET /search`.
///
/// List fields are sent as repeated keys in the order given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    pub q: Option<String>,
    pub registry: Option<String>,
    pub capabilities: Vec<String>,
    pub protocols: Vec<String>,
    pub min_trust: Option<u32>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl SearchParams {
    pub fn query(q: impl Into<String>) -> Self {
        Self {
            q: Some(q.into()),
            ..Default::default()
        }
    }

    pub fn to_query(&self) -> QueryParams {
        let mut params = QueryParams::new();
        params
            .push_opt("q", self.q.as_deref())
            .push_opt("registry", self.registry.as_deref())
            .push_all("capabilities", &self.capabilities)
            .push_all("protocols", &self.protocols)
            .push_opt("minTrust", self.min_trust)
            .push_opt("page", self.page)
            .push_opt("limit", self.limit);
        params
    }
}

/// An agent as listed by search and resolve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub uaid: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub hits: Vec<AgentSummary>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_agents: u64,
    #[serde(default)]
    pub total_registries: u64,
    /// Agent counts keyed by registry.
    #[serde(default)]
    pub registries: std::collections::BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistriesResponse {
    pub registries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub agent: AgentSummary,
}

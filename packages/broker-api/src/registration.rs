//! Agent registration types: `/register`, `/register/{uaid}`,
//! `/register/progress/{attemptId}`, `/register/quote` and
//! `/register/additional-registries`.
//!
//! A registration publishes an agent profile to the broker's own directory
//! (the *primary* registration) and optionally to independently operated
//! sub-registries.  Sub-registry work may finish synchronously or be left
//! pending under an `attemptId` that the client polls.

use registry_broker_core::{
    classify, PrimaryStatus, ProgressStatus, RegistrationStatus, SubRegistryStatus,
};
use serde::{Deserialize, Serialize};

/// Public profile of a registered agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,

    /// Free-form extra properties, passed through unchanged.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Request body for `POST /register` and `PATCH /register/{uaid}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistrationRequest {
    pub profile: AgentProfile,

    /// Where the agent can be reached, e.g. an A2A or MCP endpoint URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// Primary registry to register with; the broker's default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    /// Sub-registries to publish to, by key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_registries: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Outcome of the primary registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryResult {
    pub status: PrimaryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of publishing to one sub-registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubRegistryResult {
    pub registry_key: String,
    pub status: SubRegistryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits_charged: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response body for `POST /register` and `PATCH /register/{uaid}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentResponse {
    pub uaid: String,

    /// Issued when sub-registry work continues asynchronously.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<String>,

    pub primary: PrimaryResult,

    #[serde(default)]
    pub additional_registries: Vec<SubRegistryResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits_charged: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RegisterAgentResponse {
    pub fn status(&self) -> RegistrationStatus {
        classify(
            self.primary.status,
            self.additional_registries.iter().map(|r| r.status),
        )
    }
}

/// Whether a progress record tracks a registration or an update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationMode {
    #[default]
    Register,
    Update,
}

/// Server-held projection of a registration attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationProgress {
    pub attempt_id: String,
    #[serde(default)]
    pub mode: RegistrationMode,
    pub status: ProgressStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uaid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<PrimaryResult>,
    #[serde(default)]
    pub additional_registries: Vec<SubRegistryResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl RegistrationProgress {
    /// Error messages from the record, falling back to failed sub-registries.
    pub fn failure_messages(&self) -> Vec<String> {
        if !self.errors.is_empty() {
            return self.errors.clone();
        }
        self.additional_registries
            .iter()
            .filter(|r| r.status == SubRegistryStatus::Failed)
            .map(|r| match &r.error {
                Some(e) => format!("{}: {e}", r.registry_key),
                None => format!("{}: failed", r.registry_key),
            })
            .collect()
    }
}

/// Response body for `GET /register/progress/{attemptId}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationProgressResponse {
    pub progress: RegistrationProgress,
}

/// Response body for `POST /register/quote`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationQuote {
    pub required_credits: f64,
    pub available_credits: f64,
    pub shortfall_credits: f64,
    #[serde(rename = "creditsPerHbar")]
    pub credits_per_unit: f64,
    #[serde(default, rename = "estimatedHbar", skip_serializing_if = "Option::is_none")]
    pub estimated_units: Option<f64>,
}

/// One sub-registry the broker can publish to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalRegistry {
    pub key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits_per_registration: Option<f64>,
}

/// Response body for `GET /register/additional-registries`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalRegistriesResponse {
    pub registries: Vec<AdditionalRegistry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(key: &str, status: SubRegistryStatus) -> SubRegistryResult {
        SubRegistryResult {
            registry_key: key.into(),
            status,
            external_agent_id: None,
            external_uri: None,
            credits_charged: None,
            error: None,
        }
    }

    #[test]
    fn request_omits_empty_fields() {
        let req = AgentRegistrationRequest {
            profile: AgentProfile {
                display_name: "Weather Bot".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"profile":{"displayName":"Weather Bot"}}"#);
    }

    #[test]
    fn response_status_follows_sub_registries() {
        let mut resp = RegisterAgentResponse {
            uaid: "uaid:aid:1".into(),
            attempt_id: Some("a1".into()),
            primary: PrimaryResult {
                status: PrimaryStatus::Created,
                error: None,
            },
            additional_registries: vec![
                sub("erc-8004", SubRegistryStatus::Completed),
                sub("nanda", SubRegistryStatus::Pending),
            ],
            credits_charged: None,
            message: None,
        };
        assert_eq!(resp.status(), RegistrationStatus::Pending);

        resp.additional_registries[1].status = SubRegistryStatus::Failed;
        assert_eq!(resp.status(), RegistrationStatus::Partial);
    }

    #[test]
    fn response_parses_wire_json() {
        let json = r#"{
            "uaid": "uaid:aid:xyz",
            "primary": {"status": "already-exists"},
            "additionalRegistries": [
                {"registryKey": "erc-8004", "status": "completed",
                 "externalAgentId": "42", "creditsCharged": 5}
            ]
        }"#;
        let resp: RegisterAgentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.primary.status, PrimaryStatus::AlreadyExists);
        assert_eq!(resp.additional_registries[0].credits_charged, Some(5.0));
        assert_eq!(resp.status(), RegistrationStatus::Success);
    }

    #[test]
    fn failure_messages_fall_back_to_sub_registries() {
        let progress = RegistrationProgress {
            attempt_id: "a1".into(),
            mode: RegistrationMode::Register,
            status: ProgressStatus::Failed,
            uaid: None,
            primary: None,
            additional_registries: vec![SubRegistryResult {
                error: Some("timeout".into()),
                ..sub("nanda", SubRegistryStatus::Failed)
            }],
            errors: vec![],
            started_at: None,
            completed_at: None,
        };
        assert_eq!(progress.failure_messages(), vec!["nanda: timeout"]);
    }
}

//! Registration orchestrator.
//!
//! ```text
//! submitted ──► Success
//!           ├─► Partial            (primary ok, a sub-registry failed)
//!           └─► Pending(attemptId) ──poll──► completed | partial | failed
//! ```
//!
//! A failed primary registration is an error.  Everything else is a
//! [`RegistrationOutcome`] the caller matches on: `Partial` is a successful
//! call whose payload reports a partial failure.

use std::time::Duration;

use registry_broker_api::{
    AdditionalRegistriesResponse, AdditionalRegistry, AgentRegistrationRequest,
    RegisterAgentResponse, RegistrationProgress, RegistrationProgressResponse, RegistrationQuote,
};
use registry_broker_core::{path_segment, ProgressStatus, RegistrationStatus};
use reqwest::Method;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::RegistryBrokerClient;
use crate::config::AutoTopUp;
use crate::error::{ClientError, ParseError};
use crate::transport::decode;

/// Classified result of a registration or update.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    /// Primary and every requested sub-registry finished.
    Success(RegisterAgentResponse),
    /// Sub-registry work continues; poll `attempt_id`.
    Pending {
        attempt_id: String,
        response: RegisterAgentResponse,
    },
    /// Primary succeeded but at least one sub-registry failed.
    Partial(RegisterAgentResponse),
}

impl RegistrationOutcome {
    pub fn response(&self) -> &RegisterAgentResponse {
        match self {
            RegistrationOutcome::Success(r)
            | RegistrationOutcome::Partial(r)
            | RegistrationOutcome::Pending { response: r, .. } => r,
        }
    }

    pub fn uaid(&self) -> &str {
        &self.response().uaid
    }

    pub fn attempt_id(&self) -> Option<&str> {
        match self {
            RegistrationOutcome::Pending { attempt_id, .. } => Some(attempt_id),
            _ => None,
        }
    }
}

/// Per-call registration options.
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Overrides the client's `registration_auto_top_up`.
    pub auto_top_up: Option<AutoTopUp>,
}

/// Polling options for [`RegistryBrokerClient::wait_for_registration_completion`].
pub struct WaitOptions<'a> {
    pub interval: Duration,
    pub timeout: Duration,
    /// Raise [`ClientError::RegistrationFailed`] on a terminal `failed`
    /// record instead of returning it.
    pub throw_on_failure: bool,
    /// Called with every record polled, changed or not.
    pub on_progress: Option<Box<dyn FnMut(&RegistrationProgress) + Send + 'a>>,
    /// Observed between polls; never interrupts a request in flight.
    pub cancel: Option<CancellationToken>,
}

impl Default for WaitOptions<'_> {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
            throw_on_failure: true,
            on_progress: None,
            cancel: None,
        }
    }
}

impl std::fmt::Debug for WaitOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitOptions")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("throw_on_failure", &self.throw_on_failure)
            .field("on_progress", &self.on_progress.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

/// Classify a register/update response.
pub fn classify_response(response: RegisterAgentResponse) -> Result<RegistrationOutcome, ClientError> {
    match response.status() {
        RegistrationStatus::Success => Ok(RegistrationOutcome::Success(response)),
        RegistrationStatus::Partial => Ok(RegistrationOutcome::Partial(response)),
        RegistrationStatus::Pending => match response.attempt_id.clone() {
            Some(attempt_id) => Ok(RegistrationOutcome::Pending {
                attempt_id,
                response,
            }),
            None => Err(ParseError {
                context: "register response".into(),
                cause: "pending sub-registry work without an attemptId".into(),
                raw: serde_json::to_value(&response).unwrap_or_default(),
            }
            .into()),
        },
        RegistrationStatus::Failed => Err(ClientError::RegistrationFailed {
            attempt_id: response.attempt_id.clone(),
            message: response
                .primary
                .error
                .clone()
                .unwrap_or_else(|| format!("primary registration of {} failed", response.uaid)),
        }),
    }
}

impl RegistryBrokerClient {
    /// `POST /register` through the credit guard.
    pub async fn register_agent(
        &self,
        request: &AgentRegistrationRequest,
        options: RegisterOptions,
    ) -> Result<RegistrationOutcome, ClientError> {
        self.submit_registration(Method::POST, "/register".to_string(), request, options)
            .await
    }

    /// `PATCH /register/{uaid}`; same protocol as [`Self::register_agent`].
    pub async fn update_agent(
        &self,
        uaid: &str,
        request: &AgentRegistrationRequest,
        options: RegisterOptions,
    ) -> Result<RegistrationOutcome, ClientError> {
        let path = format!("/register/{}", path_segment(uaid));
        self.submit_registration(Method::PATCH, path, request, options)
            .await
    }

    async fn submit_registration(
        &self,
        method: Method,
        path: String,
        request: &AgentRegistrationRequest,
        options: RegisterOptions,
    ) -> Result<RegistrationOutcome, ClientError> {
        let top_up = options
            .auto_top_up
            .as_ref()
            .or(self.config.registration_auto_top_up.as_ref());

        let path = path.as_str();
        let response: RegisterAgentResponse = self
            .with_credit_top_up(top_up, move || {
                self.send_json(method.clone(), path, request, "register response")
            })
            .await?;

        let outcome = classify_response(response)?;
        match &outcome {
            RegistrationOutcome::Success(r) => info!("registration: {} registered", r.uaid),
            RegistrationOutcome::Pending { attempt_id, response } => info!(
                "registration: {} pending (attempt {attempt_id})",
                response.uaid
            ),
            RegistrationOutcome::Partial(r) => {
                warn!("registration: {} registered with sub-registry failures", r.uaid)
            }
        }
        Ok(outcome)
    }

    /// `POST /register/quote`: credits a registration would cost.
    pub async fn registration_quote(
        &self,
        request: &AgentRegistrationRequest,
    ) -> Result<RegistrationQuote, ClientError> {
        self.send_json(Method::POST, "/register/quote", request, "registration quote")
            .await
    }

    /// The current progress record, or `None` while it is not yet visible.
    pub async fn registration_progress(
        &self,
        attempt_id: &str,
    ) -> Result<Option<RegistrationProgress>, ClientError> {
        let path = format!("/register/progress/{}", path_segment(attempt_id));
        match self
            .request(Method::GET, &path, Default::default())
            .await
        {
            Ok(raw) => {
                let resp: RegistrationProgressResponse = decode(raw.body, "registration progress")?;
                Ok(Some(resp.progress))
            }
            Err(ClientError::Status(e)) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Poll `attempt_id` until it reaches a terminal status.
    ///
    /// Fails with [`ClientError::RegistrationTimeout`] when `timeout`
    /// elapses first, and with [`ClientError::Cancelled`] when the token
    /// fires during a wait.
    pub async fn wait_for_registration_completion(
        &self,
        attempt_id: &str,
        mut options: WaitOptions<'_>,
    ) -> Result<RegistrationProgress, ClientError> {
        let started = Instant::now();
        let deadline = started + options.timeout;

        loop {
            match self.registration_progress(attempt_id).await? {
                Some(progress) => {
                    if let Some(callback) = options.on_progress.as_mut() {
                        callback(&progress);
                    }
                    if progress.status.is_terminal() {
                        return finish(attempt_id, progress, options.throw_on_failure);
                    }
                    debug!("registration: attempt {attempt_id} still pending");
                }
                None => debug!("registration: attempt {attempt_id} not visible yet"),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ClientError::RegistrationTimeout {
                    attempt_id: attempt_id.to_string(),
                    elapsed: now - started,
                });
            }
            let pause = options.interval.min(deadline - now);

            match &options.cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => {
                        info!("registration: polling of {attempt_id} cancelled");
                        return Err(ClientError::Cancelled);
                    }
                    _ = tokio::time::sleep(pause) => {}
                },
                None => tokio::time::sleep(pause).await,
            }
        }
    }

    /// `GET /register/additional-registries`.
    pub async fn additional_registries(&self) -> Result<Vec<AdditionalRegistry>, ClientError> {
        let resp: AdditionalRegistriesResponse = self
            .get_json("/register/additional-registries", None, "additional registries")
            .await?;
        Ok(resp.registries)
    }
}

fn finish(
    attempt_id: &str,
    progress: RegistrationProgress,
    throw_on_failure: bool,
) -> Result<RegistrationProgress, ClientError> {
    if progress.status == ProgressStatus::Failed && throw_on_failure {
        let messages = progress.failure_messages();
        let message = if messages.is_empty() {
            format!("attempt {attempt_id} failed")
        } else {
            messages.join("; ")
        };
        return Err(ClientError::RegistrationFailed {
            attempt_id: Some(attempt_id.to_string()),
            message,
        });
    }
    info!(
        "registration: attempt {attempt_id} finished as {:?}",
        progress.status
    );
    Ok(progress)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! An in-memory Registry Broker speaking the `/api/v1` JSON contract.
//!
//! Behaviour is scripted so tests can drive every client path:
//!
//! * Registration costs [`MockBroker::registration_cost`] credits, charged
//!   to the `x-account-id` header; a short balance answers `402` with the
//!   shortfall and the conversion rate.
//! * Sub-registry keys script their outcome: `async` goes pending and later
//!   completes, `async-broken` goes pending and later fails, `broken` fails
//!   at once, anything else completes at once.
//! * A progress record is invisible (`404`) on its first poll and pending
//!   for [`MockBroker::pending_polls`] more.
//! * A chat retention window beyond [`MockBroker::free_ttl_seconds`] costs
//!   [`MockBroker::ttl_cost`] credits.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use registry_broker_api::error::codes;
use registry_broker_api::{
    AdditionalRegistriesResponse, AdditionalRegistry, AgentRegistrationRequest, AgentSummary,
    ChatHistoryEntry, ChatRole, CompactHistoryRequest, CompactHistoryResponse,
    CreateSessionRequest, CreateSessionResponse, CreditPurchaseRequest, CreditPurchaseResponse,
    EncryptionKeyRecord, EncryptionSummary, ErrorResponse, HandshakeParticipant,
    HandshakeRequest, HandshakeRole, HandshakeStatus, HistoryResponse, InsufficientCreditsBody,
    LedgerChallengeRequest, LedgerChallengeResponse, LedgerVerifyRequest, LedgerVerifyResponse,
    PrimaryResult, RegisterAgentResponse, RegisterKeyRequest, RegistrationMode,
    RegistrationProgress, RegistrationProgressResponse, RegistrationQuote, RegistriesResponse,
    ResolveResponse, SearchResponse, SendMessageRequest, SendMessageResponse, SignatureKind,
    StatsResponse, SubRegistryResult,
};
use registry_broker_core::{
    CipherEnvelope, CreditShortfall, LedgerNetwork, PrimaryStatus, ProgressStatus, SignerFamily,
    SubRegistryStatus,
};
use serde::Serialize;

const ACCOUNT_HEADER: &str = "x-account-id";
const TIMESTAMP: &str = "2026-01-01T00:00:00Z";

/// Mock broker state, shared between the server task and the test.
pub struct MockBroker {
    pub credits_per_hbar: f64,
    pub registration_cost: f64,
    pub free_ttl_seconds: u64,
    pub ttl_cost: f64,
    pub pending_polls: usize,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    balances: HashMap<String, f64>,
    register_calls: usize,
    purchase_calls: usize,
    challenge_calls: usize,
    session_calls: usize,
    nonces: HashSet<String>,
    challenges: HashMap<String, String>,
    agents: HashMap<String, AgentSummary>,
    attempts: HashMap<String, Attempt>,
    sessions: HashMap<String, Session>,
    keys: HashMap<String, EncryptionKeyRecord>,
    reject_handshakes: bool,
}

struct Attempt {
    polls: usize,
    progress: RegistrationProgress,
}

struct Session {
    target: Option<String>,
    history: Vec<ChatHistoryEntry>,
    ttl: Option<u64>,
    encryption: EncryptionSummary,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self {
            credits_per_hbar: 25.0,
            registration_cost: 25.0,
            free_ttl_seconds: 3_600,
            ttl_cost: 10.0,
            pending_polls: 2,
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl MockBroker {
    /// A broker whose progress records stay pending for `polls` polls
    /// after first becoming visible.
    pub fn with_pending_polls(polls: usize) -> Self {
        Self {
            pending_polls: polls,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_balance(&self, account: &str, credits: f64) {
        self.lock().balances.insert(account.to_string(), credits);
    }

    pub fn balance(&self, account: &str) -> f64 {
        self.lock().balances.get(account).copied().unwrap_or(0.0)
    }

    /// Calls to `POST /register` and `PATCH /register/{uaid}`.
    pub fn register_calls(&self) -> usize {
        self.lock().register_calls
    }

    pub fn purchase_calls(&self) -> usize {
        self.lock().purchase_calls
    }

    pub fn challenge_calls(&self) -> usize {
        self.lock().challenge_calls
    }

    pub fn session_calls(&self) -> usize {
        self.lock().session_calls
    }

    /// The stored transcript of `session_id`, as the broker sees it.
    pub fn raw_history(&self, session_id: &str) -> Option<serde_json::Value> {
        let inner = self.lock();
        let session = inner.sessions.get(session_id)?;
        serde_json::to_value(&session.history).ok()
    }

    pub fn stored_key(&self, uaid: &str) -> Option<EncryptionKeyRecord> {
        self.lock().keys.get(uaid).cloned()
    }

    /// Sessions created and not yet ended.
    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Store `public_key` for `uaid` as-is, bypassing key-type checks.
    pub fn seed_key(&self, uaid: &str, public_key: &str) {
        let record = EncryptionKeyRecord {
            uaid: uaid.to_string(),
            key_type: "x25519".into(),
            public_key: public_key.to_string(),
            registered_at: Some(TIMESTAMP.into()),
        };
        self.lock().keys.insert(uaid.to_string(), record);
    }

    /// Answer every later handshake with `500`.
    pub fn reject_handshakes(&self) {
        self.lock().reject_handshakes = true;
    }

    /// Add a directory entry without going through registration.
    pub fn seed_agent(&self, agent: AgentSummary) {
        self.lock().agents.insert(agent.uaid.clone(), agent);
    }
}

pub fn router(broker: Arc<MockBroker>) -> Router {
    Router::new()
        .route("/api/v1/search", get(search))
        .route("/api/v1/stats", get(stats))
        .route("/api/v1/registries", get(registries))
        .route("/api/v1/resolve/{uaid}", get(resolve))
        .route("/api/v1/auth/ledger/challenge", post(challenge))
        .route("/api/v1/auth/ledger/verify", post(verify))
        .route("/api/v1/credits/purchase", post(purchase))
        .route("/api/v1/register", post(register))
        .route("/api/v1/register/{uaid}", patch(update))
        .route("/api/v1/register/quote", post(quote))
        .route("/api/v1/register/progress/{attempt_id}", get(progress))
        .route("/api/v1/register/additional-registries", get(additional_registries))
        .route("/api/v1/chat/session", post(create_session))
        .route("/api/v1/chat/message", post(send_message))
        .route("/api/v1/chat/session/{id}", axum::routing::delete(end_session))
        .route("/api/v1/chat/session/{id}/history", get(history))
        .route("/api/v1/chat/session/{id}/compact", post(compact))
        .route(
            "/api/v1/chat/session/{id}/encryption-handshake",
            post(handshake),
        )
        .route("/api/v1/chat/session/{id}/encryption", get(encryption_summary))
        .route("/api/v1/encryption/keys", post(register_key))
        .route("/api/v1/encryption/keys/{uaid}", get(fetch_key))
        .with_state(broker)
}

type Shared = State<Arc<MockBroker>>;

fn reply<T: Serialize>(body: &T) -> Response {
    Json(body).into_response()
}

fn error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(code, message))).into_response()
}

fn not_found(what: &str) -> Response {
    error(StatusCode::NOT_FOUND, codes::NOT_FOUND, format!("{what} not found"))
}

fn account(headers: &HeaderMap) -> String {
    headers
        .get(ACCOUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string()
}

fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

impl MockBroker {
    /// Debit `cost` from `account` or build the `402` the broker answers.
    fn charge(&self, inner: &mut Inner, account: &str, cost: f64) -> Result<(), Response> {
        let balance = inner.balances.entry(account.to_string()).or_insert(0.0);
        if *balance >= cost {
            *balance -= cost;
            return Ok(());
        }
        let body = InsufficientCreditsBody {
            error: "insufficient credits".into(),
            shortfall: CreditShortfall::new(cost - *balance, self.credits_per_hbar),
            required_credits: Some(cost),
            available_credits: Some(*balance),
        };
        Err((StatusCode::PAYMENT_REQUIRED, Json(body)).into_response())
    }
}

// ── Discovery ─────────────────────────────────────────────────────────────────

async fn search(State(broker): Shared, Query(pairs): Query<Vec<(String, String)>>) -> Response {
    let q = pairs
        .iter()
        .find(|(k, _)| k == "q")
        .map(|(_, v)| v.to_lowercase());
    let wanted: Vec<&str> = pairs
        .iter()
        .filter(|(k, _)| k == "capabilities")
        .map(|(_, v)| v.as_str())
        .collect();

    let inner = broker.lock();
    let mut hits: Vec<AgentSummary> = inner
        .agents
        .values()
        .filter(|a| q.as_ref().map_or(true, |q| a.name.to_lowercase().contains(q)))
        .filter(|a| wanted.iter().all(|c| a.capabilities.iter().any(|have| have == c)))
        .cloned()
        .collect();
    hits.sort_by(|a, b| a.uaid.cmp(&b.uaid));

    reply(&SearchResponse {
        total: hits.len() as u64,
        page: 1,
        limit: 20,
        hits,
    })
}

async fn stats(State(broker): Shared) -> Response {
    let inner = broker.lock();
    let mut registries = std::collections::BTreeMap::new();
    for agent in inner.agents.values() {
        let key = agent.registry.clone().unwrap_or_else(|| "hashgraph-online".into());
        *registries.entry(key).or_insert(0) += 1;
    }
    reply(&StatsResponse {
        total_agents: inner.agents.len() as u64,
        total_registries: registries.len() as u64,
        registries,
        last_updated: Some(TIMESTAMP.into()),
    })
}

async fn registries() -> Response {
    reply(&RegistriesResponse {
        registries: vec!["hashgraph-online".into(), "erc-8004".into(), "nanda".into()],
    })
}

async fn resolve(State(broker): Shared, Path(uaid): Path<String>) -> Response {
    match broker.lock().agents.get(&uaid) {
        Some(agent) => reply(&ResolveResponse {
            agent: agent.clone(),
        }),
        None => not_found("agent"),
    }
}

// ── Ledger auth and credits ───────────────────────────────────────────────────

async fn challenge(State(broker): Shared, Json(req): Json<LedgerChallengeRequest>) -> Response {
    if LedgerNetwork::parse(&req.network).is_err() {
        return error(StatusCode::BAD_REQUEST, codes::INVALID_PARAMETER, "bad network");
    }
    let id = new_id();
    let mut inner = broker.lock();
    inner.challenge_calls += 1;
    inner.challenges.insert(id.clone(), req.account_id.clone());
    reply(&LedgerChallengeResponse {
        message: format!("registry-broker login {id} for {}", req.account_id),
        challenge_id: id,
        expires_at: None,
    })
}

async fn verify(State(broker): Shared, Json(req): Json<LedgerVerifyRequest>) -> Response {
    let Some(account) = broker.lock().challenges.remove(&req.challenge_id) else {
        return error(StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED, "unknown challenge");
    };
    let family_ok = match LedgerNetwork::parse(&req.network).map(|n| n.family()) {
        Ok(SignerFamily::LedgerNative) => {
            req.signature_kind == SignatureKind::Raw && req.public_key.is_some()
        }
        Ok(SignerFamily::Evm) => req.signature_kind == SignatureKind::Evm,
        Err(_) => false,
    };
    if account != req.account_id || !family_ok || req.signature.is_empty() {
        return error(StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED, "verification failed");
    }
    reply(&LedgerVerifyResponse {
        key: format!("rbk_{}", new_id()),
        account_id: req.account_id,
        network: req.network,
        expires_at: None,
    })
}

async fn purchase(State(broker): Shared, Json(req): Json<CreditPurchaseRequest>) -> Response {
    if !(req.amount > 0.0) || req.signature.is_empty() {
        return error(StatusCode::BAD_REQUEST, codes::INVALID_PARAMETER, "bad purchase");
    }
    let mut inner = broker.lock();
    if !inner.nonces.insert(req.nonce.clone()) {
        return error(StatusCode::CONFLICT, codes::CONFLICT, "nonce already used");
    }
    inner.purchase_calls += 1;
    let credits = req.amount * broker.credits_per_hbar;
    let balance = inner.balances.entry(req.account_id.clone()).or_insert(0.0);
    *balance += credits;
    let balance = *balance;
    reply(&CreditPurchaseResponse {
        account_id: req.account_id,
        credits,
        amount: req.amount,
        transaction_id: Some(format!("0.0.2@{}", new_id())),
        balance: Some(balance),
    })
}

// ── Registration ──────────────────────────────────────────────────────────────

async fn register(
    State(broker): Shared,
    headers: HeaderMap,
    Json(req): Json<AgentRegistrationRequest>,
) -> Response {
    let uaid = format!(
        "uaid:aid:{}",
        req.profile.display_name.to_lowercase().replace(' ', "-")
    );
    submit(&broker, &account(&headers), uaid, req, RegistrationMode::Register)
}

async fn update(
    State(broker): Shared,
    headers: HeaderMap,
    Path(uaid): Path<String>,
    Json(req): Json<AgentRegistrationRequest>,
) -> Response {
    let known = broker.lock().agents.contains_key(&uaid);
    if !known {
        return not_found("agent");
    }
    submit(&broker, &account(&headers), uaid, req, RegistrationMode::Update)
}

fn submit(
    broker: &MockBroker,
    account: &str,
    uaid: String,
    req: AgentRegistrationRequest,
    mode: RegistrationMode,
) -> Response {
    let mut inner = broker.lock();
    inner.register_calls += 1;

    if req.profile.display_name.trim().is_empty() {
        return reply(&RegisterAgentResponse {
            uaid,
            attempt_id: None,
            primary: PrimaryResult {
                status: PrimaryStatus::Failed,
                error: Some("displayName is required".into()),
            },
            additional_registries: vec![],
            credits_charged: None,
            message: None,
        });
    }

    if let Err(resp) = broker.charge(&mut inner, account, broker.registration_cost) {
        return resp;
    }

    let primary = if mode == RegistrationMode::Register && inner.agents.contains_key(&uaid) {
        PrimaryStatus::AlreadyExists
    } else {
        PrimaryStatus::Created
    };
    inner.agents.insert(
        uaid.clone(),
        AgentSummary {
            uaid: uaid.clone(),
            name: req.profile.display_name.clone(),
            description: req.profile.bio.clone(),
            registry: req.registry.clone(),
            capabilities: req.profile.capabilities.clone(),
            endpoint: req.endpoint.clone(),
            trust_score: None,
        },
    );

    let subs: Vec<SubRegistryResult> = req
        .additional_registries
        .iter()
        .map(|key| {
            let status = match key.as_str() {
                "async" | "async-broken" => SubRegistryStatus::Pending,
                "broken" => SubRegistryStatus::Failed,
                _ => SubRegistryStatus::Completed,
            };
            SubRegistryResult {
                registry_key: key.clone(),
                status,
                external_agent_id: None,
                external_uri: None,
                credits_charged: None,
                error: (status == SubRegistryStatus::Failed)
                    .then(|| "registry rejected the profile".to_string()),
            }
        })
        .collect();

    let attempt_id = subs
        .iter()
        .any(|s| s.status == SubRegistryStatus::Pending)
        .then(new_id);
    if let Some(id) = &attempt_id {
        inner.attempts.insert(
            id.clone(),
            Attempt {
                polls: 0,
                progress: RegistrationProgress {
                    attempt_id: id.clone(),
                    mode,
                    status: ProgressStatus::Pending,
                    uaid: Some(uaid.clone()),
                    primary: Some(PrimaryResult {
                        status: primary,
                        error: None,
                    }),
                    additional_registries: subs.clone(),
                    errors: vec![],
                    started_at: Some(TIMESTAMP.into()),
                    completed_at: None,
                },
            },
        );
    }

    reply(&RegisterAgentResponse {
        uaid,
        attempt_id,
        primary: PrimaryResult {
            status: primary,
            error: None,
        },
        additional_registries: subs,
        credits_charged: Some(broker.registration_cost),
        message: None,
    })
}

async fn quote(
    State(broker): Shared,
    headers: HeaderMap,
    Json(_req): Json<AgentRegistrationRequest>,
) -> Response {
    let available = broker.balance(&account(&headers));
    let required = broker.registration_cost;
    let shortfall = (required - available).max(0.0);
    reply(&RegistrationQuote {
        required_credits: required,
        available_credits: available,
        shortfall_credits: shortfall,
        credits_per_unit: broker.credits_per_hbar,
        estimated_units: (shortfall > 0.0).then(|| shortfall / broker.credits_per_hbar),
    })
}

async fn progress(State(broker): Shared, Path(attempt_id): Path<String>) -> Response {
    let pending_polls = broker.pending_polls;
    let mut inner = broker.lock();
    let Some(attempt) = inner.attempts.get_mut(&attempt_id) else {
        return not_found("attempt");
    };
    attempt.polls += 1;
    if attempt.polls == 1 {
        return not_found("attempt");
    }
    if attempt.polls > pending_polls + 1 && !attempt.progress.status.is_terminal() {
        settle(&mut attempt.progress);
    }
    reply(&RegistrationProgressResponse {
        progress: attempt.progress.clone(),
    })
}

fn settle(progress: &mut RegistrationProgress) {
    for sub in &mut progress.additional_registries {
        if sub.status == SubRegistryStatus::Pending {
            if sub.registry_key == "async-broken" {
                sub.status = SubRegistryStatus::Failed;
                sub.error = Some("registry timed out".into());
            } else {
                sub.status = SubRegistryStatus::Completed;
                sub.external_agent_id = Some(new_id());
            }
        }
    }
    let failed = progress
        .additional_registries
        .iter()
        .filter(|s| s.status == SubRegistryStatus::Failed)
        .count();
    progress.status = match failed {
        0 => ProgressStatus::Completed,
        n if n == progress.additional_registries.len() => ProgressStatus::Failed,
        _ => ProgressStatus::Partial,
    };
    progress.errors = progress
        .additional_registries
        .iter()
        .filter_map(|s| s.error.as_ref().map(|e| format!("{}: {e}", s.registry_key)))
        .collect();
    progress.completed_at = Some(TIMESTAMP.into());
}

async fn additional_registries() -> Response {
    let registry = |key: &str, name: &str| AdditionalRegistry {
        key: key.into(),
        name: name.into(),
        description: None,
        credits_per_registration: Some(5.0),
    };
    reply(&AdditionalRegistriesResponse {
        registries: vec![
            registry("sync-ok", "Synchronous registry"),
            registry("async", "Asynchronous registry"),
            registry("async-broken", "Flaky asynchronous registry"),
            registry("broken", "Always failing registry"),
        ],
    })
}

// ── Chat ──────────────────────────────────────────────────────────────────────

async fn create_session(
    State(broker): Shared,
    headers: HeaderMap,
    Json(req): Json<CreateSessionRequest>,
) -> Response {
    let mut inner = broker.lock();
    inner.session_calls += 1;

    if let Some(ttl) = req.history_ttl_seconds {
        if ttl > broker.free_ttl_seconds {
            if let Err(resp) = broker.charge(&mut inner, &account(&headers), broker.ttl_cost) {
                return resp;
            }
        }
    }

    let session_id = new_id();
    inner.sessions.insert(
        session_id.clone(),
        Session {
            target: req.uaid.clone(),
            history: vec![],
            ttl: req.history_ttl_seconds,
            encryption: EncryptionSummary {
                session_id: session_id.clone(),
                status: HandshakeStatus::Pending,
                requester: None,
                responder: None,
            },
        },
    );
    reply(&CreateSessionResponse {
        session_id,
        uaid: req.uaid,
        agent_url: req.agent_url,
        history_ttl_seconds: req.history_ttl_seconds,
        encrypted: req.encryption_requested.unwrap_or(false),
    })
}

fn entry(
    role: ChatRole,
    content: Option<String>,
    cipher_envelope: Option<CipherEnvelope>,
) -> ChatHistoryEntry {
    ChatHistoryEntry {
        message_id: new_id(),
        role,
        content,
        cipher_envelope,
        timestamp: TIMESTAMP.into(),
        metadata: None,
    }
}

async fn send_message(State(broker): Shared, Json(req): Json<SendMessageRequest>) -> Response {
    let mut inner = broker.lock();
    let Some(session) = inner.sessions.get_mut(&req.session_id) else {
        return not_found("session");
    };
    if req.message.is_some() == req.cipher_envelope.is_some() {
        return error(
            StatusCode::BAD_REQUEST,
            codes::INVALID_PARAMETER,
            "send exactly one of message and cipherEnvelope",
        );
    }

    let sent = entry(ChatRole::User, req.message.clone(), req.cipher_envelope);
    let message_id = sent.message_id.clone();
    session.history.push(sent);

    // Only plaintext can be answered; the broker cannot read envelopes.
    let reply_entry = req.message.map(|text| {
        let answer = entry(ChatRole::Agent, Some(format!("echo: {text}")), None);
        session.history.push(answer.clone());
        answer
    });

    reply(&SendMessageResponse {
        session_id: req.session_id,
        message_id,
        reply: reply_entry,
        history_ttl_seconds: session.ttl,
    })
}

async fn history(State(broker): Shared, Path(id): Path<String>) -> Response {
    let inner = broker.lock();
    match inner.sessions.get(&id) {
        Some(session) => reply(&HistoryResponse {
            session_id: id,
            history: session.history.clone(),
            history_ttl_seconds: session.ttl,
        }),
        None => not_found("session"),
    }
}

async fn compact(
    State(broker): Shared,
    Path(id): Path<String>,
    Json(req): Json<CompactHistoryRequest>,
) -> Response {
    let mut inner = broker.lock();
    let Some(session) = inner.sessions.get_mut(&id) else {
        return not_found("session");
    };
    let keep = (req.preserve_entries as usize).min(session.history.len());
    let split = session.history.len() - keep;
    let preserved = session.history.split_off(split);
    let summary = entry(
        ChatRole::Agent,
        Some(format!("Summary of {split} earlier messages")),
        None,
    );

    session.history = std::iter::once(summary.clone())
        .chain(preserved.iter().cloned())
        .collect();
    reply(&CompactHistoryResponse {
        session_id: id,
        summary_entry: summary,
        preserved_entries: preserved,
        history: session.history.clone(),
        credits_debited: 1.0,
        history_ttl_seconds: session.ttl,
    })
}

async fn end_session(State(broker): Shared, Path(id): Path<String>) -> Response {
    match broker.lock().sessions.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found("session"),
    }
}

// ── Encryption ────────────────────────────────────────────────────────────────

async fn handshake(
    State(broker): Shared,
    Path(id): Path<String>,
    Json(req): Json<HandshakeRequest>,
) -> Response {
    let mut inner = broker.lock();
    if inner.reject_handshakes {
        return error(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL_ERROR,
            "handshake store unavailable",
        );
    }
    let Some(session) = inner.sessions.get_mut(&id) else {
        return not_found("session");
    };
    let participant = HandshakeParticipant {
        uaid: req.uaid,
        public_key: req.public_key,
        ephemeral_public_key: req.ephemeral_public_key,
    };
    match req.role {
        HandshakeRole::Requester => session.encryption.requester = Some(participant),
        HandshakeRole::Responder => {
            if session.target.as_deref().is_some_and(|t| t != participant.uaid) {
                return error(
                    StatusCode::FORBIDDEN,
                    codes::UNAUTHORIZED,
                    "responder is not the session target",
                );
            }
            session.encryption.responder = Some(participant)
        }
    }
    if session.encryption.requester.is_some() && session.encryption.responder.is_some() {
        session.encryption.status = HandshakeStatus::Complete;
    }
    reply(&session.encryption)
}

async fn encryption_summary(State(broker): Shared, Path(id): Path<String>) -> Response {
    match broker.lock().sessions.get(&id) {
        Some(session) => reply(&session.encryption),
        None => not_found("session"),
    }
}

async fn register_key(State(broker): Shared, Json(req): Json<RegisterKeyRequest>) -> Response {
    if req.key_type != "x25519" {
        return error(StatusCode::BAD_REQUEST, codes::INVALID_PARAMETER, "unsupported key type");
    }
    let record = EncryptionKeyRecord {
        uaid: req.uaid.clone(),
        key_type: req.key_type,
        public_key: req.public_key,
        registered_at: Some(TIMESTAMP.into()),
    };
    broker.lock().keys.insert(req.uaid, record.clone());
    reply(&record)
}

async fn fetch_key(State(broker): Shared, Path(uaid): Path<String>) -> Response {
    match broker.lock().keys.get(&uaid) {
        Some(record) => reply(record),
        None => not_found("encryption key"),
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The localhost-bound HTTP surface (§6): session lifecycle endpoints the
//! host's hook scripts POST to, liveness/build-info routes, and a handful
//! of localhost-only admin routes (restart, shutdown, settings, model
//! discovery proxy).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use mnemo_types::MessagePayload;
use mnemo_util::privacy;

use crate::error::{ApiError, ApiResult};
use crate::policy;
use crate::state::AppState;

/// Grace period `delete_session` waits for the loop to settle before giving
/// up on the join — matches the child-process exit wait budget in §5.
const DELETE_SESSION_GRACE: Duration = Duration::from_secs(5);

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/sessions/init", post(sessions_init))
        .route("/api/sessions/observations", post(sessions_observations))
        .route("/api/sessions/summarize", post(sessions_summarize))
        .route("/api/sessions/complete", post(sessions_complete))
        .route("/api/health", get(health))
        .route("/api/version", get(version))
        .route("/api/status", get(status))
        .route("/api/admin/restart", post(admin_restart))
        .route("/api/admin/shutdown", post(admin_shutdown))
        .route("/api/settings", get(settings_get).post(settings_post))
        .route("/api/models", get(models_get))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .with_state(state)
}

// ── /api/sessions/init ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct InitRequest {
    content_session_id: String,
    project: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct InitResponse {
    session_id: i64,
    prompt_number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

async fn sessions_init(State(state): State<Arc<AppState>>, Json(req): Json<InitRequest>) -> ApiResult<Json<InitResponse>> {
    if req.content_session_id.trim().is_empty() || req.project.trim().is_empty() {
        return Err(ApiError::Validation("content_session_id and project are required".into()));
    }

    let session_id = state.store.create_or_get_session(&req.content_session_id, &req.project)?;

    if privacy::is_entirely_private(&req.prompt) {
        return Ok(Json(InitResponse {
            session_id,
            prompt_number: state.store.get_prompt_number_from_prompts(&req.content_session_id)?,
            skipped: Some(true),
            reason: Some("private"),
        }));
    }

    let scrubbed = privacy::scrub(&req.prompt);
    let prompt_number = state.store.get_prompt_number_from_prompts(&req.content_session_id)? + 1;
    state.store.save_user_prompt(&req.content_session_id, prompt_number, &scrubbed)?;

    state.sessions.ensure_started(session_id, req.content_session_id.clone(), req.project.clone(), state.config());

    info!(session_id, prompt_number, "session prompt recorded");
    Ok(Json(InitResponse { session_id, prompt_number, skipped: None, reason: None }))
}

// ── /api/sessions/observations ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ObservationsRequest {
    content_session_id: String,
    tool_name: String,
    #[serde(default)]
    tool_input: serde_json::Value,
    #[serde(default)]
    tool_response: serde_json::Value,
    cwd: String,
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    enqueued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

impl EnqueueResponse {
    fn skipped(reason: &'static str) -> Self {
        Self { enqueued: false, message_id: None, skipped: Some(true), reason: Some(reason) }
    }
}

async fn sessions_observations(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ObservationsRequest>,
) -> ApiResult<Json<EnqueueResponse>> {
    let session = state.store.get_session_by_content_id(&req.content_session_id)?.ok_or(ApiError::SessionNotFound)?;

    if policy::is_excluded_tool(&req.tool_name) {
        return Ok(Json(EnqueueResponse::skipped("excluded_tool")));
    }
    if policy::is_meta_file_write(&req.tool_input) {
        return Ok(Json(EnqueueResponse::skipped("meta_file")));
    }

    let scrubbed_input = privacy::scrub_json(&req.tool_input);
    let scrubbed_response = privacy::scrub_json(&req.tool_response);
    if privacy::is_json_entirely_private(&scrubbed_input) && privacy::is_json_entirely_private(&scrubbed_response) {
        return Ok(Json(EnqueueResponse::skipped("private")));
    }

    let payload = MessagePayload::ToolObservation {
        tool_name: req.tool_name,
        tool_input: scrubbed_input,
        tool_response: scrubbed_response,
    };
    let message_id = state.queue.enqueue(session.session_id, &req.content_session_id, &payload, &req.cwd)?;
    state.sessions.ensure_started(session.session_id, req.content_session_id.clone(), session.project.clone(), state.config());

    Ok(Json(EnqueueResponse { enqueued: true, message_id: Some(message_id), skipped: None, reason: None }))
}

// ── /api/sessions/summarize ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SummarizeRequest {
    content_session_id: String,
    last_assistant_message: String,
}

async fn sessions_summarize(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SummarizeRequest>,
) -> ApiResult<Json<EnqueueResponse>> {
    let session = state.store.get_session_by_content_id(&req.content_session_id)?.ok_or(ApiError::SessionNotFound)?;

    if privacy::is_entirely_private(&req.last_assistant_message) {
        return Ok(Json(EnqueueResponse::skipped("private")));
    }
    let scrubbed = privacy::scrub(&req.last_assistant_message);

    let payload = MessagePayload::Summarize { last_assistant_message: scrubbed };
    let message_id = state.queue.enqueue(session.session_id, &req.content_session_id, &payload, "")?;
    state.sessions.ensure_started(session.session_id, req.content_session_id.clone(), session.project.clone(), state.config());

    Ok(Json(EnqueueResponse { enqueued: true, message_id: Some(message_id), skipped: None, reason: None }))
}

// ── /api/sessions/complete ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CompleteRequest {
    content_session_id: String,
}

#[derive(Debug, Serialize)]
struct CompleteResponse {
    removed: bool,
}

async fn sessions_complete(State(state): State<Arc<AppState>>, Json(req): Json<CompleteRequest>) -> ApiResult<Json<CompleteResponse>> {
    let Some(session) = state.store.get_session_by_content_id(&req.content_session_id)? else {
        return Ok(Json(CompleteResponse { removed: false }));
    };
    let was_active = state.sessions.is_active(session.session_id);
    state.sessions.delete_session(session.session_id, DELETE_SESSION_GRACE).await;
    Ok(Json(CompleteResponse { removed: was_active }))
}

// ── Liveness / build info ─────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    version: &'static str,
}

async fn version(State(state): State<Arc<AppState>>) -> Json<VersionResponse> {
    Json(VersionResponse { version: state.version })
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    initialized: bool,
    active_sessions: usize,
    pending_sessions: usize,
    uptime_secs: i64,
    vector_healthy: bool,
}

async fn status(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    let active_sessions = state.sessions.active_session_ids().len();
    let pending_sessions = state.queue.sessions_with_pending_messages()?.len();
    let vector_healthy = state.vector_server.as_ref().map(|s| s.is_healthy_recently()).unwrap_or(true);
    Ok(Json(StatusResponse {
        initialized: state.is_initialized(),
        active_sessions,
        pending_sessions,
        uptime_secs: chrono::Utc::now().timestamp() - state.started_at,
        vector_healthy,
    }))
}

// ── Admin (localhost-only) ────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
struct AdminRestartRequest {
    reason: Option<String>,
}

async fn admin_restart(State(state): State<Arc<AppState>>, body: Option<Json<AdminRestartRequest>>) -> Json<serde_json::Value> {
    let reason = body.and_then(|Json(b)| b.reason).unwrap_or_else(|| "admin requested".into());
    warn!(reason = %reason, "admin-triggered restart of all active sessions");
    state.sessions.schedule_restarts_for_settings_change(reason, &state.config());
    Json(json!({ "ok": true }))
}

async fn admin_shutdown(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    warn!("admin-triggered shutdown");
    state.request_shutdown();
    Json(json!({ "ok": true }))
}

// ── Settings ───────────────────────────────────────────────────────────────────

async fn settings_get(State(state): State<Arc<AppState>>) -> Json<mnemo_config::Config> {
    Json(state.config())
}

async fn settings_post(State(state): State<Arc<AppState>>, Json(new_config): Json<mnemo_config::Config>) -> ApiResult<Json<serde_json::Value>> {
    let previous = state.config();
    mnemo_config::save(&state.paths.settings_file(), &new_config).map_err(ApiError::Config)?;

    let triggers = new_config.diff_restart_triggers(&previous);
    state.set_config(new_config.clone());
    if !triggers.is_empty() {
        info!(?triggers, "settings changed via API, scheduling session restarts");
        state.sessions.schedule_restarts_for_settings_change("settings api update", &new_config);
    }
    Ok(Json(json!({ "ok": true, "restart_triggers": triggers.len() })))
}

// ── Model discovery proxy ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ModelsQuery {
    provider: Option<String>,
}

async fn models_get(State(state): State<Arc<AppState>>, Query(q): Query<ModelsQuery>) -> ApiResult<Json<serde_json::Value>> {
    let config = state.config();
    let Some(base_url) = config.base_url.as_deref() else {
        return Err(ApiError::Validation("no custom base_url configured for model discovery".into()));
    };

    let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build().expect("reqwest client");
    let url = mnemo_util::url::join(base_url, "models");
    let mut request = client.get(url);
    if let Some(env_var) = &config.api_key_env {
        if let Ok(key) = std::env::var(env_var) {
            request = request.bearer_auth(key);
        }
    }

    let resp = request.send().await.map_err(|e| ApiError::Validation(format!("model discovery request failed: {e}")))?;
    let body: serde_json::Value = resp.json().await.unwrap_or(json!({"data": []}));
    let _ = q.provider;
    Ok(Json(body))
}

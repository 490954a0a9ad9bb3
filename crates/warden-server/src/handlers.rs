//! Bridge route handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use tracing::debug;

use warden_agent::{ChangedEvent, CreatedEvent, NavigationEvent, PreStartEvent, PreStartReply};

use crate::error::Result;
use crate::models::{
    AckResponse, AuthTokenRequest, CommandsResponse, CreatedReplyBody, DownloadRef, EventsQuery,
    EventsResponse, LogsQuery, LogsResponse, PreStartReplyBody, PromptResponseReply,
    PromptResponseRequest, ProtectionResponse, ReinitFailedRequest, SetProtectionRequest,
    StatusResponse, TabRemovedRequest,
};
use crate::state::AppState;

// === Download hooks ===

/// POST /hook/download/pre-start - forward the pre-start hook and wait for
/// a decision up to the bridge deadline.
pub async fn download_pre_start(
    State(state): State<AppState>,
    Json(event): Json<PreStartEvent>,
) -> Result<Json<PreStartReplyBody>> {
    debug!(id = event.id, url = %event.source_url, "Pre-start hook");

    match state.agent.pre_start(event) {
        PreStartReply::Immediate(decision) => Ok(Json(PreStartReplyBody::decided(decision))),
        PreStartReply::Withheld(receiver) => {
            match tokio::time::timeout(state.decision_wait, receiver).await {
                Ok(Ok(decision)) => Ok(Json(PreStartReplyBody::decided(decision))),
                // Timed out or the token was dropped: the host proceeds on
                // its own and the created hook compensates.
                _ => Ok(Json(PreStartReplyBody::none())),
            }
        }
    }
}

/// POST /hook/download/created - the safety-net hook.
pub async fn download_created(
    State(state): State<AppState>,
    Json(event): Json<CreatedEvent>,
) -> Result<Json<CreatedReplyBody>> {
    debug!(id = event.id, url = %event.url, "Created hook");
    let action = state.agent.created(event);
    Ok(Json(CreatedReplyBody { action }))
}

/// POST /hook/download/changed.
pub async fn download_changed(
    State(state): State<AppState>,
    Json(event): Json<ChangedEvent>,
) -> Result<Json<AckResponse>> {
    state.agent.changed(event);
    Ok(Json(AckResponse::ok()))
}

/// POST /hook/download/removed.
pub async fn download_removed(
    State(state): State<AppState>,
    Json(body): Json<DownloadRef>,
) -> Result<Json<AckResponse>> {
    state.agent.removed(body.id);
    Ok(Json(AckResponse::ok()))
}

/// POST /hook/download/cancel-failed.
pub async fn download_cancel_failed(
    State(state): State<AppState>,
    Json(body): Json<DownloadRef>,
) -> Result<Json<AckResponse>> {
    state.agent.cancel_failed(body.id);
    Ok(Json(AckResponse::ok()))
}

/// POST /hook/download/reinit-failed.
pub async fn download_reinit_failed(
    State(state): State<AppState>,
    Json(body): Json<ReinitFailedRequest>,
) -> Result<Json<AckResponse>> {
    state.agent.reinitiation_failed(&body.url);
    Ok(Json(AckResponse::ok()))
}

// === Navigation and tab hooks ===

/// POST /hook/navigation/committed.
pub async fn navigation_committed(
    State(state): State<AppState>,
    Json(event): Json<NavigationEvent>,
) -> Result<Json<AckResponse>> {
    state.agent.navigation_committed(event);
    Ok(Json(AckResponse::ok()))
}

/// POST /hook/tab/removed.
pub async fn tab_removed(
    State(state): State<AppState>,
    Json(body): Json<TabRemovedRequest>,
) -> Result<Json<AckResponse>> {
    state.agent.tab_removed(body.tab_id);
    Ok(Json(AckResponse::ok()))
}

// === Extension/popup API ===

/// GET /api/commands - drain queued host commands.
pub async fn get_commands(State(state): State<AppState>) -> Result<Json<CommandsResponse>> {
    Ok(Json(CommandsResponse {
        commands: state.agent.commands().drain(),
    }))
}

/// POST /api/prompts/{id}/respond - user answered a prompt.
pub async fn respond_prompt(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
    Json(body): Json<PromptResponseRequest>,
) -> Result<Json<PromptResponseReply>> {
    let consumed = state.agent.prompt_response(&prompt_id, body.action);
    Ok(Json(PromptResponseReply { consumed }))
}

/// GET /api/protection.
pub async fn get_protection(State(state): State<AppState>) -> Result<Json<ProtectionResponse>> {
    let protection = state.agent.protection();
    Ok(Json(ProtectionResponse {
        state: protection.state(),
        pause_remaining_secs: protection.pause_remaining().map(|d| d.as_secs()),
    }))
}

/// PUT /api/protection.
pub async fn set_protection(
    State(state): State<AppState>,
    Json(body): Json<SetProtectionRequest>,
) -> Result<Json<ProtectionResponse>> {
    state.agent.apply_protection(body.state, body.pause);
    let protection = state.agent.protection();
    Ok(Json(ProtectionResponse {
        state: protection.state(),
        pause_remaining_secs: protection.pause_remaining().map(|d| d.as_secs()),
    }))
}

/// POST /api/auth/token - store the scan-service credential.
pub async fn set_auth_token(
    State(state): State<AppState>,
    Json(body): Json<AuthTokenRequest>,
) -> Result<Json<AckResponse>> {
    state.agent.sign_in(&body.token, &body.user);
    Ok(Json(AckResponse::ok()))
}

/// DELETE /api/auth/token - clear the credential.
pub async fn clear_auth_token(State(state): State<AppState>) -> Result<Json<AckResponse>> {
    state.agent.sign_out();
    Ok(Json(AckResponse::ok()))
}

/// GET /api/events - replay the popup event feed.
pub async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>> {
    let bus = state.agent.events();
    Ok(Json(EventsResponse {
        latest: bus.latest_seq(),
        events: bus.since(query.since),
    }))
}

/// GET /api/logs - recent local scan events.
pub async fn get_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>> {
    Ok(Json(LogsResponse {
        entries: state.agent.recent_scan_events(query.limit),
    }))
}

/// DELETE /api/logs - clear the local scan-event log.
pub async fn clear_logs(State(state): State<AppState>) -> Result<Json<AckResponse>> {
    state.agent.clear_scan_events();
    Ok(Json(AckResponse::ok()))
}

/// GET /api/status.
pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: state.agent.status(),
    }))
}

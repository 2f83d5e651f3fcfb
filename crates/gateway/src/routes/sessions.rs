// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session CRUD endpoints.

use crate::error::ApiError;
use crate::protocol::{
    CreateSessionRequest, ListQuery, LogsQuery, LogsResponse, MessagesResponse,
    SessionListResponse, SessionResponse, TerminateResponse, ENVIRONMENTS, PROMPT_MAX, PROMPT_MIN,
    TIMEOUT_MAX_S, TIMEOUT_MIN_S,
};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use otto_core::{
    Clock, IdGen, Job, JobId, JobKind, JobPayload, LogLevel, Session, SessionId, SessionStatus,
};
use otto_plane::SessionPatch;
use otto_sandbox::SandboxRuntime;
use otto_store::Store;
use std::time::Duration;

const DEFAULT_LIST_LIMIT: usize = 20;
const DEFAULT_LOGS_LIMIT: usize = 100;

fn respond<S, R, C, G>(state: &AppState<S, R, C, G>, session: &Session) -> SessionResponse
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    SessionResponse::new(
        session,
        session.desktop_port.map(|port| state.desktop_url(port)),
        state.chat_url(&session.id),
    )
}

pub async fn create<S, R, C, G>(
    State(state): State<AppState<S, R, C, G>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let prompt_len = req.initial_prompt.chars().count();
    if !(PROMPT_MIN..=PROMPT_MAX).contains(&prompt_len) {
        return Err(ApiError::Validation(format!(
            "initial_prompt must be {PROMPT_MIN}..{PROMPT_MAX} characters"
        )));
    }
    if let Some(timeout) = req.timeout {
        if !(TIMEOUT_MIN_S..=TIMEOUT_MAX_S).contains(&timeout) {
            return Err(ApiError::Validation(format!(
                "timeout must be {TIMEOUT_MIN_S}..{TIMEOUT_MAX_S} seconds"
            )));
        }
    }
    let environment = req.environment.as_deref().unwrap_or("node");
    if !ENVIRONMENTS.contains(&environment) {
        return Err(ApiError::Validation(format!(
            "unknown environment: {environment}"
        )));
    }

    let session = state
        .registry
        .create(
            &req.initial_prompt,
            environment,
            req.timeout.map(Duration::from_secs),
        )
        .await?;

    // Desktop port is reserved up front; without one the session cannot exist
    let Some(port) = state.desktop_ports.allocate(&session.id).await? else {
        state.registry.delete(&session.id).await?;
        return Err(ApiError::Unavailable(
            "No available desktop ports".to_string(),
        ));
    };
    let session = state
        .registry
        .update(&session.id, SessionPatch::default().desktop_port(port))
        .await?
        .ok_or_else(|| ApiError::Internal("session vanished during create".into()))?;

    state
        .registry
        .append_log(&session.id, LogLevel::Info, "session created", None)
        .await?;

    let job = Job::new(
        JobId::new(state.idgen.next()),
        JobKind::CreateSession,
        session.id.clone(),
        JobPayload::Create,
        state.clock.epoch_ms(),
    );
    state.queue.enqueue(&job).await?;

    Ok((StatusCode::CREATED, Json(respond(&state, &session))))
}

pub async fn list<S, R, C, G>(
    State(state): State<AppState<S, R, C, G>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<SessionListResponse>, ApiError>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let (sessions, total) = state.registry.list_active(limit, offset).await?;

    Ok(Json(SessionListResponse {
        sessions: sessions.iter().map(|s| respond(&state, s)).collect(),
        total,
        limit,
        offset,
    }))
}

pub async fn get_one<S, R, C, G>(
    State(state): State<AppState<S, R, C, G>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let id = SessionId::new(id);
    let session = state.registry.get(&id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(respond(&state, &session)))
}

pub async fn terminate<S, R, C, G>(
    State(state): State<AppState<S, R, C, G>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<TerminateResponse>), ApiError>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let id = SessionId::new(id);
    let session = state.registry.get(&id).await?.ok_or(ApiError::NotFound)?;
    if session.status.is_terminal() {
        return Err(ApiError::NotFound);
    }

    state
        .registry
        .set_status(&id, SessionStatus::Terminating, None)
        .await?;
    let job = Job::new(
        JobId::new(state.idgen.next()),
        JobKind::TerminateSession,
        id.clone(),
        JobPayload::Terminate,
        state.clock.epoch_ms(),
    );
    state.queue.enqueue(&job).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TerminateResponse {
            message: "Session termination requested".to_string(),
            session_id: id,
        }),
    ))
}

pub async fn logs<S, R, C, G>(
    State(state): State<AppState<S, R, C, G>>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, ApiError>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let id = SessionId::new(id);
    state.registry.get(&id).await?.ok_or(ApiError::NotFound)?;
    let logs = state
        .registry
        .read_logs(&id, Some(query.limit.unwrap_or(DEFAULT_LOGS_LIMIT)))
        .await?;
    Ok(Json(LogsResponse {
        session_id: id,
        logs,
    }))
}

pub async fn messages<S, R, C, G>(
    State(state): State<AppState<S, R, C, G>>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<MessagesResponse>, ApiError>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let id = SessionId::new(id);
    state.registry.get(&id).await?.ok_or(ApiError::NotFound)?;
    let messages = state.registry.read_messages(&id, query.limit).await?;
    Ok(Json(MessagesResponse {
        session_id: id,
        messages,
    }))
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health and metrics endpoints.

use crate::error::ApiError;
use crate::protocol::{
    rfc3339, HealthResponse, HealthServices, MetricsResponse, WorkerStatusEntry,
};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use otto_core::{Clock, IdGen, WorkerEntry, WorkerStatus};
use otto_plane::keys;
use otto_sandbox::SandboxRuntime;
use otto_store::Store;

pub async fn health<S, R, C, G>(
    State(state): State<AppState<S, R, C, G>>,
) -> Result<Json<HealthResponse>, ApiError>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let store_ok = state.store.ping().await.is_ok();
    let runtime_ok = state.runtime.ping().await.is_ok();
    let workers = if store_ok {
        active_workers(&state).await.unwrap_or_default().len()
    } else {
        0
    };

    let status = match (store_ok, runtime_ok, workers) {
        (true, true, 1..) => "healthy",
        (true, true, 0) | (true, false, _) => "degraded",
        _ => "unhealthy",
    };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_s: state.started_at.elapsed().as_secs(),
        services: HealthServices {
            store: store_ok,
            sandbox_runtime: runtime_ok,
            workers,
        },
        timestamp: rfc3339(state.clock.epoch_ms()),
    }))
}

pub async fn metrics<S, R, C, G>(
    State(state): State<AppState<S, R, C, G>>,
) -> Result<Json<MetricsResponse>, ApiError>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let active_sessions = state.registry.active_count().await?;
    let total_sessions = state.registry.total_sessions().await?;
    let lengths = state.queue.lengths().await?;

    let worker_status = all_workers(&state)
        .await?
        .into_iter()
        .map(|entry| WorkerStatusEntry {
            id: entry.worker_id.to_string(),
            active: entry.status == WorkerStatus::Active,
            current_jobs: entry.current_jobs,
        })
        .collect();

    Ok(Json(MetricsResponse {
        active_sessions,
        total_sessions,
        queue_length: lengths.total_pending(),
        worker_status,
        timestamp: rfc3339(state.clock.epoch_ms()),
    }))
}

async fn all_workers<S, R, C, G>(
    state: &AppState<S, R, C, G>,
) -> Result<Vec<WorkerEntry>, ApiError>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let mut entries = Vec::new();
    for key in state.store.keys(keys::WORKER_STATUS_PATTERN).await? {
        if let Some(raw) = state.store.get(&key).await? {
            if let Ok(entry) = serde_json::from_str::<WorkerEntry>(&raw) {
                entries.push(entry);
            }
        }
    }
    Ok(entries)
}

async fn active_workers<S, R, C, G>(
    state: &AppState<S, R, C, G>,
) -> Result<Vec<WorkerEntry>, ApiError>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    Ok(all_workers(state)
        .await?
        .into_iter()
        .filter(|entry| entry.status == WorkerStatus::Active)
        .collect())
}

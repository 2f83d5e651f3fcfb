// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Route table and middleware stack.

mod chat;
mod download;
mod health;
mod sessions;

use crate::state::AppState;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use otto_core::{Clock, IdGen};
use otto_sandbox::SandboxRuntime;
use otto_store::Store;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router<S, R, C, G>(state: AppState<S, R, C, G>) -> Router
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let cors = cors_layer(&state.config.cors_origins);
    let limit = GlobalConcurrencyLimitLayer::new(state.config.max_concurrent_requests);

    Router::new()
        .route(
            "/session",
            get(sessions::list::<S, R, C, G>).post(sessions::create::<S, R, C, G>),
        )
        .route(
            "/session/{id}",
            get(sessions::get_one::<S, R, C, G>).delete(sessions::terminate::<S, R, C, G>),
        )
        .route("/session/{id}/logs", get(sessions::logs::<S, R, C, G>))
        .route(
            "/session/{id}/messages",
            get(sessions::messages::<S, R, C, G>),
        )
        .route("/session/{id}/chat", get(chat::chat::<S, R, C, G>))
        .route("/download/{id}", get(download::download::<S, R, C, G>))
        .route("/health", get(health::health::<S, R, C, G>))
        .route("/health/metrics", get(health::metrics::<S, R, C, G>))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(limit)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
}

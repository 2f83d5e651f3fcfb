// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace download, proxied through the gateway.
//!
//! The tool port range is not generally reachable from browsers, so the
//! gateway streams the archive through, preserving `Content-Type`,
//! `Content-Disposition` and `Content-Length`.

use crate::error::ApiError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use otto_core::{Clock, IdGen, SessionId};
use otto_sandbox::SandboxRuntime;
use otto_store::Store;

const FORWARDED_HEADERS: [header::HeaderName; 3] = [
    header::CONTENT_TYPE,
    header::CONTENT_DISPOSITION,
    header::CONTENT_LENGTH,
];

pub async fn download<S, R, C, G>(
    State(state): State<AppState<S, R, C, G>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let id = SessionId::new(id);
    let session = state.registry.get(&id).await?.ok_or(ApiError::NotFound)?;
    let tool_port = session
        .tool_port
        .ok_or_else(|| ApiError::Validation("session has no tool port".to_string()))?;

    let url = format!("{}/download", state.tool_base(tool_port));
    let upstream = state
        .http
        .get(&url)
        .send()
        .await
        .map_err(|err| ApiError::Unavailable(format!("workspace download unavailable: {err}")))?;

    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::builder().status(status);
    for name in FORWARDED_HEADERS {
        if let Some(value) = upstream.headers().get(&name) {
            response = response.header(name, value.clone());
        }
    }
    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|err| ApiError::Internal(format!("download response: {err}")))
}

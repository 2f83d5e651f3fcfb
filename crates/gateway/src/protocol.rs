// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire DTOs for the HTTP surface.

use chrono::{DateTime, Utc};
use otto_core::{LogEntry, Session, SessionId};
use serde::{Deserialize, Serialize};

/// Stored messages replayed to a freshly connected chat socket.
pub const CHAT_REPLAY_COUNT: usize = 50;

/// Environment presets the create endpoint accepts.
pub const ENVIRONMENTS: [&str; 4] = ["node", "python", "full-stack", "data-science"];

/// Bounds on `initial_prompt` length.
pub const PROMPT_MIN: usize = 1;
pub const PROMPT_MAX: usize = 5000;
/// Bounds on a chat frame's content length.
pub const CHAT_CONTENT_MAX: usize = 10_000;
/// Bounds on the per-session timeout override, seconds.
pub const TIMEOUT_MIN_S: u64 = 300;
pub const TIMEOUT_MAX_S: u64 = 7200;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub initial_prompt: String,
    /// Session TTL override, seconds
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub environment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: SessionId,
    pub status: String,
    pub desktop_url: Option<String>,
    pub chat_url: String,
    pub created_at: String,
    pub expires_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_prompt: Option<String>,
}

impl SessionResponse {
    pub fn new(session: &Session, desktop_url: Option<String>, chat_url: String) -> Self {
        Self {
            session_id: session.id.clone(),
            status: session.status.to_string(),
            desktop_url,
            chat_url,
            created_at: rfc3339(session.created_at_ms),
            expires_at: rfc3339(session.expires_at_ms),
            initial_prompt: Some(session.initial_prompt.clone()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionResponse>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TerminateResponse {
    pub message: String,
    pub session_id: SessionId,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub session_id: SessionId,
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub session_id: SessionId,
    pub messages: Vec<otto_core::MessageEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_s: u64,
    pub services: HealthServices,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthServices {
    pub store: bool,
    pub sandbox_runtime: bool,
    pub workers: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub active_sessions: usize,
    pub total_sessions: i64,
    pub queue_length: usize,
    pub worker_status: Vec<WorkerStatusEntry>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerStatusEntry {
    pub id: String,
    pub active: bool,
    pub current_jobs: u32,
}

/// Inbound chat socket frame.
#[derive(Debug, Deserialize)]
pub struct ChatFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

pub fn rfc3339(epoch_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64)
        .unwrap_or_default()
        .to_rfc3339()
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;

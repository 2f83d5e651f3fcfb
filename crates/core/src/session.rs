// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session record and status machine.

use crate::clock::Clock;
use crate::sandbox::SandboxId;
use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

crate::define_id! {
    /// Unique identifier for a session.
    ///
    /// Short opaque string; appears in URLs, store keys and container names.
    pub struct SessionId;
}

/// Lifecycle status of a session.
///
/// `Terminated` and `Error` are terminal: a session never leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Record created, sandbox not yet ready
    Initializing,
    /// Sandbox up, agent idle
    Ready,
    /// Agent processing a prompt
    Running,
    /// Teardown requested or in progress
    Terminating,
    /// Clean lifecycle end
    Terminated,
    /// Failed lifecycle end
    Error,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Terminated | SessionStatus::Error)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Initializing => write!(f, "initializing"),
            SessionStatus::Ready => write!(f, "ready"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Terminating => write!(f, "terminating"),
            SessionStatus::Terminated => write!(f, "terminated"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

/// A session record as persisted in the coordination store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    pub initial_prompt: String,
    /// Environment preset tag (opaque to the orchestration plane)
    pub environment: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub expires_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desktop_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_id: Option<SandboxId>,
    /// Worker currently owning the session's compute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    /// Present iff `status == Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Session {
    /// Create a new record in `Initializing` with the given time-to-live.
    pub fn new(
        id: SessionId,
        initial_prompt: impl Into<String>,
        environment: impl Into<String>,
        ttl: Duration,
        clock: &impl Clock,
    ) -> Self {
        let now = clock.epoch_ms();
        Self {
            id,
            status: SessionStatus::Initializing,
            initial_prompt: initial_prompt.into(),
            environment: environment.into(),
            created_at_ms: now,
            updated_at_ms: now,
            expires_at_ms: now + ttl.as_millis() as u64,
            desktop_port: None,
            tool_port: None,
            sandbox_id: None,
            worker_id: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Bump `updated_at_ms`, clamped so `updated_at ≤ expires_at` holds.
    pub fn touch(&mut self, clock: &impl Clock) {
        self.updated_at_ms = clock.epoch_ms().min(self.expires_at_ms);
    }

    /// Set the desktop port (allocated once, at creation time)
    pub fn with_desktop_port(mut self, port: u16) -> Self {
        self.desktop_port = Some(port);
        self
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

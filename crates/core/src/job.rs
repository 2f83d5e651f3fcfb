// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue job record.

use crate::session::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for a queued job.
    pub struct JobId;
}

/// Kind of lifecycle work a job carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    CreateSession,
    ProcessMessage,
    TerminateSession,
}

impl JobKind {
    /// Queue lane for this kind.
    ///
    /// Convention: lower number is drained first. Termination rides the
    /// priority-2 lane so bursts of create/process work go first, and the
    /// queue's fairness poll keeps that lane from starving.
    pub fn priority(&self) -> u8 {
        match self {
            JobKind::CreateSession | JobKind::ProcessMessage => 1,
            JobKind::TerminateSession => 2,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::CreateSession => write!(f, "create_session"),
            JobKind::ProcessMessage => write!(f, "process_message"),
            JobKind::TerminateSession => write!(f, "terminate_session"),
        }
    }
}

/// Typed payload carried by a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    Create,
    Process { content: String, timestamp_ms: u64 },
    Terminate,
}

/// Queue-visible state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting in a ready lane
    Ready,
    /// Claimed by a worker, lease held
    Active,
    /// Waiting for its backoff deadline
    Retry,
    /// Handler failed after all attempts (record retained)
    Failed,
    /// Stalled too many times (record retained)
    Dead,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Ready => write!(f, "ready"),
            JobState::Active => write!(f, "active"),
            JobState::Retry => write!(f, "retry"),
            JobState::Failed => write!(f, "failed"),
            JobState::Dead => write!(f, "dead"),
        }
    }
}

/// A job as persisted in the coordination store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub session_id: SessionId,
    pub payload: JobPayload,
    pub state: JobState,
    /// Delivery attempts so far (first delivery counts as 1)
    pub attempts: u32,
    pub priority: u8,
    pub enqueued_at_ms: u64,
    /// Lifecycle progress percent reported by the handler
    #[serde(default)]
    pub progress: u8,
    /// Times the stall detector re-queued this job
    #[serde(default)]
    pub stalls: u32,
    /// Earliest epoch-ms at which a retry may run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(
        id: JobId,
        kind: JobKind,
        session_id: SessionId,
        payload: JobPayload,
        enqueued_at_ms: u64,
    ) -> Self {
        Self {
            id,
            kind,
            session_id,
            payload,
            state: JobState::Ready,
            attempts: 0,
            priority: kind.priority(),
            enqueued_at_ms,
            progress: 0,
            stalls: 0,
            retry_at_ms: None,
            error: None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;

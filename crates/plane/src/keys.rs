// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted key layout.
//!
//! Every key the plane writes is produced here so the full namespace is
//! visible in one place.

use crate::ports::PortKind;
use otto_core::{JobId, SessionId, WorkerId};

pub const SESSIONS_INDEX: &str = "sessions:index";
pub const METRICS_TOTAL_SESSIONS: &str = "metrics:total_sessions";
pub const QUEUE_ACTIVE: &str = "queue:active";
pub const QUEUE_RETRY: &str = "queue:retry";
pub const QUEUE_DEAD: &str = "queue:dead";

pub fn session(id: &SessionId) -> String {
    format!("session:{id}")
}

pub fn session_messages(id: &SessionId) -> String {
    format!("session:messages:{id}")
}

pub fn session_logs(id: &SessionId) -> String {
    format!("session:logs:{id}")
}

pub fn session_context(id: &SessionId) -> String {
    format!("session:context:{id}")
}

/// Pub/sub channel carrying a session's chat events.
pub fn session_channel(id: &SessionId) -> String {
    format!("session:{id}:messages")
}

pub fn sessions_by_worker(id: &WorkerId) -> String {
    format!("sessions:by-worker:{id}")
}

pub fn port(kind: PortKind, port: u16) -> String {
    format!("port:{kind}:{port}")
}

/// Scan pattern for one allocator's keys.
pub fn port_pattern(kind: PortKind) -> String {
    format!("port:{kind}:*")
}

/// Parse the port number back out of an allocator key.
pub fn port_from_key(key: &str) -> Option<u16> {
    key.rsplit(':').next()?.parse().ok()
}

pub fn worker_status(id: &WorkerId) -> String {
    format!("worker:{id}:status")
}

pub fn worker_jobs(id: &WorkerId) -> String {
    format!("worker:{id}:jobs")
}

pub const WORKER_STATUS_PATTERN: &str = "worker:*:status";

/// Parse the worker id back out of a status key.
pub fn worker_from_status_key(key: &str) -> Option<WorkerId> {
    let rest = key.strip_prefix("worker:")?;
    let id = rest.strip_suffix(":status")?;
    Some(WorkerId::new(id))
}

pub fn queue_ready(priority: u8) -> String {
    format!("queue:ready:{priority}")
}

pub fn queue_job(id: &JobId) -> String {
    format!("queue:job:{id}")
}

pub const QUEUE_JOB_PATTERN: &str = "queue:job:*";

pub fn queue_lease(id: &JobId) -> String {
    format!("queue:lease:{id}")
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;

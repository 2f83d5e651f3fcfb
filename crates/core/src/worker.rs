// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker identity and registration record.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for a worker process.
    pub struct WorkerId;
}

/// Registration status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Active,
    /// Draining in-flight jobs, not claiming new ones
    Stopping,
    Stopped,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Active => write!(f, "active"),
            WorkerStatus::Stopping => write!(f, "stopping"),
            WorkerStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Worker registration as persisted in the coordination store.
///
/// The record carries a TTL; an expired key means the worker is dead and
/// its sessions are recoverable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEntry {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
    pub last_heartbeat_ms: u64,
    /// Jobs currently in flight on this worker
    #[serde(default)]
    pub current_jobs: u32,
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

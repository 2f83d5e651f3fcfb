// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox identifier and observed status.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Opaque handle to a container managed by the sandbox supervisor.
    pub struct SandboxId;
}

/// Status of a sandbox as reported by the container runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    /// Created but not started
    Created,
    Running,
    /// Stopped or exited
    Exited,
    /// Unknown to the runtime (removed, or never existed)
    Missing,
}

impl fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxStatus::Created => write!(f, "created"),
            SandboxStatus::Running => write!(f, "running"),
            SandboxStatus::Exited => write!(f, "exited"),
            SandboxStatus::Missing => write!(f, "missing"),
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox runtime trait and specification.

use async_trait::async_trait;
use otto_core::{SandboxId, SandboxStatus, SessionId};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Port the remote-desktop proxy listens on inside the container.
pub const DESKTOP_CONTAINER_PORT: u16 = 6080;
/// Port the tool endpoint listens on inside the container.
pub const TOOL_CONTAINER_PORT: u16 = 8080;

/// Errors from sandbox operations
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox runtime error: {0}")]
    Runtime(String),
    #[error("sandbox not found: {0}")]
    NotFound(String),
    #[error("desktop not ready after {0:?}")]
    ReadinessTimeout(Duration),
}

/// Everything needed to materialize a session's container.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxSpec {
    pub session_id: SessionId,
    /// Environment preset tag, passed through to the image
    pub environment: String,
    /// Host port published to the container's desktop proxy
    pub desktop_port: u16,
    /// Host port published to the container's tool endpoint
    pub tool_port: u16,
    pub image: String,
    pub memory_limit_bytes: i64,
    pub cpu_shares: u32,
    pub network: Option<String>,
    /// Host directory under which per-session workspaces live
    pub data_root: PathBuf,
}

impl SandboxSpec {
    pub fn container_name(&self) -> String {
        format!("ottobot-session-{}", self.session_id)
    }

    /// Host side of the workspace bind mount.
    pub fn workspace_host_dir(&self) -> PathBuf {
        self.data_root
            .join("ottobot-session-data")
            .join(self.session_id.as_str())
    }

    pub fn env(&self) -> Vec<String> {
        vec![
            format!("SESSION_ID={}", self.session_id),
            format!("ENVIRONMENT={}", self.environment),
            format!("DESKTOP_PORT={}", self.desktop_port),
            format!("TOOL_PORT={}", self.tool_port),
        ]
    }
}

/// A container known to the runtime, for the stale-sandbox reaper.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedSandbox {
    pub sandbox_id: SandboxId,
    pub session_id: Option<SessionId>,
    pub created_at_ms: u64,
}

/// Container lifecycle operations.
///
/// `stop` and `remove` are idempotent: "already stopped" and "already
/// removed" are not errors.
#[async_trait]
pub trait SandboxRuntime: Clone + Send + Sync + 'static {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxId, SandboxError>;

    async fn start(&self, id: &SandboxId) -> Result<(), SandboxError>;

    async fn stop(&self, id: &SandboxId, grace: Duration) -> Result<(), SandboxError>;

    async fn remove(&self, id: &SandboxId) -> Result<(), SandboxError>;

    async fn status(&self, id: &SandboxId) -> Result<SandboxStatus, SandboxError>;

    /// Block until the desktop proxy answers HTTP on `desktop_port`, up to
    /// `max`. Any HTTP response proves the port proxy is up.
    async fn wait_for_desktop(
        &self,
        id: &SandboxId,
        desktop_port: u16,
        max: Duration,
    ) -> Result<(), SandboxError>;

    /// All containers this plane manages (for the stale reaper).
    async fn list_managed(&self) -> Result<Vec<ManagedSandbox>, SandboxError>;

    /// Runtime liveness for health reporting.
    async fn ping(&self) -> Result<(), SandboxError>;
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent collaborator contract.
//!
//! The reasoning loop is external. The engine hands a spawned agent its
//! session identity, the sandbox tool endpoint and an event callback, and
//! drives it with user prompts; everything the agent emits flows back
//! through the callback.

mod relay;
mod tool;

pub use relay::RelayAgentDriver;
pub use tool::ToolEndpoint;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod scripted;
#[cfg(any(test, feature = "test-support"))]
pub use scripted::ScriptedAgentDriver;

use async_trait::async_trait;
use otto_core::{MessageEvent, SessionId};
use std::sync::Arc;
use thiserror::Error;

/// Errors from the agent collaborator
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("tool endpoint unavailable at {0}")]
    ToolEndpointUnavailable(String),
    /// Recoverable: the session stays usable and may accept further prompts
    #[error("agent failed: {0}")]
    Failed(String),
    /// Unrecoverable: terminates the session
    #[error("fatal agent failure: {0}")]
    Fatal(String),
}

impl AgentError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::Fatal(_) | AgentError::ToolEndpointUnavailable(_))
    }
}

/// Callback the agent uses to emit chat events.
pub type OnEvent = Arc<dyn Fn(MessageEvent) + Send + Sync>;

/// Everything an agent needs to bind to its session.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub session_id: SessionId,
    /// Base URL of the sandbox tool endpoint
    pub tool_endpoint: String,
    /// Opaque context blob from a previous incarnation, if any
    pub context: Option<String>,
}

/// A live agent bound to one session's sandbox.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Drive the agent with one user prompt. Events stream through the
    /// callback given at spawn time.
    async fn process(&self, prompt: &str) -> Result<(), AgentError>;

    /// Stop the agent; returns a context blob to persist, if any.
    async fn shutdown(&self) -> Option<String>;
}

/// Factory spawning agents on the worker that owns the session.
#[async_trait]
pub trait AgentDriver: Clone + Send + Sync + 'static {
    async fn spawn(
        &self,
        ctx: AgentContext,
        on_event: OnEvent,
    ) -> Result<Arc<dyn Agent>, AgentError>;
}

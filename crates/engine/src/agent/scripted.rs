// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted agent driver for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::agent::{Agent, AgentContext, AgentDriver, AgentError, OnEvent};
use async_trait::async_trait;
use otto_core::{MessageEvent, MessageKind, SessionId};
use parking_lot::Mutex;
use std::sync::Arc;

struct ScriptState {
    /// Events emitted (with fresh timestamps preserved) per processed prompt
    respond_with: Vec<MessageEvent>,
    prompts: Vec<(SessionId, String)>,
    spawned: Vec<AgentContext>,
    shutdowns: u32,
    fail_spawn: Option<String>,
    fail_process: Option<AgentError>,
    context_on_shutdown: Option<String>,
}

/// Agent driver emitting a fixed event sequence per prompt.
#[derive(Clone)]
pub struct ScriptedAgentDriver {
    inner: Arc<Mutex<ScriptState>>,
}

impl ScriptedAgentDriver {
    /// Responds to every prompt with a single `AgentResponse "done"`.
    pub fn new() -> Self {
        Self::responding_with(vec![MessageEvent::new(MessageKind::AgentResponse, "done", 0)])
    }

    pub fn responding_with(events: Vec<MessageEvent>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ScriptState {
                respond_with: events,
                prompts: Vec::new(),
                spawned: Vec::new(),
                shutdowns: 0,
                fail_spawn: None,
                fail_process: None,
                context_on_shutdown: None,
            })),
        }
    }

    /// Prompts processed so far, in order.
    pub fn prompts(&self) -> Vec<(SessionId, String)> {
        self.inner.lock().prompts.clone()
    }

    /// Contexts handed to `spawn`, in order.
    pub fn spawned(&self) -> Vec<AgentContext> {
        self.inner.lock().spawned.clone()
    }

    pub fn shutdown_count(&self) -> u32 {
        self.inner.lock().shutdowns
    }

    /// Make the next `spawn` fail
    pub fn set_fail_spawn(&self, message: impl Into<String>) {
        self.inner.lock().fail_spawn = Some(message.into());
    }

    /// Make every `process` fail with the given error
    pub fn set_fail_process(&self, error: AgentError) {
        self.inner.lock().fail_process = Some(error);
    }

    /// Blob returned from `shutdown`
    pub fn set_context_on_shutdown(&self, blob: impl Into<String>) {
        self.inner.lock().context_on_shutdown = Some(blob.into());
    }
}

impl Default for ScriptedAgentDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentDriver for ScriptedAgentDriver {
    async fn spawn(
        &self,
        ctx: AgentContext,
        on_event: OnEvent,
    ) -> Result<Arc<dyn Agent>, AgentError> {
        let mut inner = self.inner.lock();
        inner.spawned.push(ctx.clone());
        if let Some(message) = inner.fail_spawn.take() {
            return Err(AgentError::Fatal(message));
        }
        Ok(Arc::new(ScriptedAgent {
            session_id: ctx.session_id,
            on_event,
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct ScriptedAgent {
    session_id: SessionId,
    on_event: OnEvent,
    inner: Arc<Mutex<ScriptState>>,
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn process(&self, prompt: &str) -> Result<(), AgentError> {
        let events = {
            let mut inner = self.inner.lock();
            inner
                .prompts
                .push((self.session_id.clone(), prompt.to_string()));
            if let Some(error) = &inner.fail_process {
                return Err(clone_error(error));
            }
            inner.respond_with.clone()
        };
        for event in events {
            (self.on_event)(event);
        }
        Ok(())
    }

    async fn shutdown(&self) -> Option<String> {
        let mut inner = self.inner.lock();
        inner.shutdowns += 1;
        inner.context_on_shutdown.clone()
    }
}

fn clone_error(error: &AgentError) -> AgentError {
    match error {
        AgentError::ToolEndpointUnavailable(s) => AgentError::ToolEndpointUnavailable(s.clone()),
        AgentError::Failed(s) => AgentError::Failed(s.clone()),
        AgentError::Fatal(s) => AgentError::Fatal(s.clone()),
    }
}

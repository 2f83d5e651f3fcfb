// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production agent driver: relays prompts to the sandbox tool endpoint.
//!
//! The container image hosts the reasoning loop; this driver only carries
//! prompts in and events out, so the plane stays agnostic to whichever
//! agent revision the image ships.

use crate::agent::tool::ToolEndpoint;
use crate::agent::{Agent, AgentContext, AgentDriver, AgentError, OnEvent};
use async_trait::async_trait;
use otto_core::{Clock, MessageEvent, MessageKind, SessionId, SystemClock};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct RelayAgentDriver;

impl RelayAgentDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentDriver for RelayAgentDriver {
    async fn spawn(
        &self,
        ctx: AgentContext,
        on_event: OnEvent,
    ) -> Result<Arc<dyn Agent>, AgentError> {
        let tool = ToolEndpoint::new(ctx.tool_endpoint.clone());
        tool.wait_until_available().await?;
        tracing::info!(session = %ctx.session_id, endpoint = %ctx.tool_endpoint, "agent attached");
        Ok(Arc::new(RelayAgent {
            session_id: ctx.session_id,
            context: ctx.context,
            tool,
            on_event,
        }))
    }
}

struct RelayAgent {
    session_id: SessionId,
    context: Option<String>,
    tool: ToolEndpoint,
    on_event: OnEvent,
}

impl RelayAgent {
    fn emit(&self, kind: MessageKind, content: impl Into<String>) {
        (self.on_event)(MessageEvent::new(kind, content, SystemClock.epoch_ms()));
    }
}

#[async_trait]
impl Agent for RelayAgent {
    async fn process(&self, prompt: &str) -> Result<(), AgentError> {
        let request = serde_json::json!({
            "prompt": prompt,
            "context": self.context,
        });
        let reply = self.tool.call(request).await?;

        let content = reply
            .get("response")
            .and_then(|v| v.as_str())
            .unwrap_or("(no response)")
            .to_string();
        self.emit(MessageKind::AgentResponse, content);
        Ok(())
    }

    async fn shutdown(&self) -> Option<String> {
        tracing::debug!(session = %self.session_id, "agent detached");
        self.context.clone()
    }
}

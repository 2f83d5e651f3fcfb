// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connectivity client for a sandbox's tool endpoint.
//!
//! The request/response protocol behind `/mcp` is the collaborator's
//! concern; this client owns connectivity, readiness and the download URL
//! only.

use crate::agent::AgentError;
use std::time::Duration;

/// Connection attempts before giving up on a fresh sandbox.
const CONNECT_RETRIES: u32 = 30;
/// Delay between connection attempts.
const CONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// HTTP client bound to one sandbox tool endpoint.
#[derive(Debug, Clone)]
pub struct ToolEndpoint {
    base: String,
    client: reqwest::Client,
    retries: u32,
    interval: Duration,
}

impl ToolEndpoint {
    /// `base` is `http://<host>:<tool_port>`, no trailing slash.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            client: reqwest::Client::new(),
            retries: CONNECT_RETRIES,
            interval: CONNECT_INTERVAL,
        }
    }

    /// Override the retry schedule (tests).
    pub fn with_retry(mut self, retries: u32, interval: Duration) -> Self {
        self.retries = retries;
        self.interval = interval;
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// URL serving the workspace archive.
    pub fn download_url(&self) -> String {
        format!("{}/download", self.base)
    }

    /// Block until the endpoint answers, or fail with
    /// `ToolEndpointUnavailable` after the retry budget.
    pub async fn wait_until_available(&self) -> Result<(), AgentError> {
        for attempt in 1..=self.retries {
            match self.client.get(&self.base).send().await {
                Ok(_) => return Ok(()),
                Err(err) if attempt == self.retries => {
                    tracing::warn!(base = %self.base, error = %err, "tool endpoint never came up");
                }
                Err(_) => tokio::time::sleep(self.interval).await,
            }
        }
        Err(AgentError::ToolEndpointUnavailable(self.base.clone()))
    }

    /// Relay an opaque request to the tool protocol endpoint.
    pub async fn call(&self, body: serde_json::Value) -> Result<serde_json::Value, AgentError> {
        let response = self
            .client
            .post(format!("{}/mcp", self.base))
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Failed(format!("tool call: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| AgentError::Failed(format!("tool response: {e}")))
    }
}

#[cfg(test)]
#[path = "tool_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed events on a session's chat channel.

use crate::session::SessionStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a chat-channel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    UserPrompt,
    AgentThinking,
    AgentAction,
    AgentResponse,
    SystemUpdate,
    DownloadReady,
    Error,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::UserPrompt => write!(f, "user_prompt"),
            MessageKind::AgentThinking => write!(f, "agent_thinking"),
            MessageKind::AgentAction => write!(f, "agent_action"),
            MessageKind::AgentResponse => write!(f, "agent_response"),
            MessageKind::SystemUpdate => write!(f, "system_update"),
            MessageKind::DownloadReady => write!(f, "download_ready"),
            MessageKind::Error => write!(f, "error"),
        }
    }
}

/// Optional metadata attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_used: Option<String>,
    /// Lifecycle progress percent (0..=100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desktop_ready: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_status: Option<SessionStatus>,
}

impl EventMeta {
    pub fn is_empty(&self) -> bool {
        self == &EventMeta::default()
    }
}

/// Dedupe stamp set by the message fabric on publish.
///
/// A process receiving its own broadcast back from the store recognizes it
/// by `publisher` and drops it, since it already delivered locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOrigin {
    pub publisher: String,
    pub seq: u64,
}

/// An event on a session's chat channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    /// Epoch milliseconds
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<EventOrigin>,
}

impl MessageEvent {
    pub fn new(kind: MessageKind, content: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp_ms,
            metadata: None,
            origin: None,
        }
    }

    pub fn with_meta(mut self, meta: EventMeta) -> Self {
        if !meta.is_empty() {
            self.metadata = Some(meta);
        }
        self
    }

    pub fn user_prompt(content: impl Into<String>, timestamp_ms: u64) -> Self {
        Self::new(MessageKind::UserPrompt, content, timestamp_ms)
    }

    pub fn system_update(content: impl Into<String>, timestamp_ms: u64) -> Self {
        Self::new(MessageKind::SystemUpdate, content, timestamp_ms)
    }

    pub fn error(content: impl Into<String>, timestamp_ms: u64) -> Self {
        Self::new(MessageKind::Error, content, timestamp_ms)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

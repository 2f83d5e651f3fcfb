// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! otto-engine: session lifecycle controller and worker runtime

pub mod agent;
mod error;
mod lifecycle;
mod worker;

pub use agent::{Agent, AgentContext, AgentDriver, AgentError, OnEvent, RelayAgentDriver, ToolEndpoint};
pub use error::EngineError;
pub use lifecycle::{EngineConfig, Lifecycle, LifecycleDeps};
pub use worker::WorkerRuntime;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use agent::ScriptedAgentDriver;

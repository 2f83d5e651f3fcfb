// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the lifecycle engine

use crate::agent::AgentError;
use otto_core::SessionId;
use otto_plane::{PublishError, QueueError, RegistryError};
use otto_sandbox::SandboxError;
use thiserror::Error;

/// Errors surfacing from lifecycle handlers.
///
/// Anything here (except a recoverable `Agent` failure) sends the session
/// down the cleanup path and counts the job as failed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("store error: {0}")]
    Store(#[from] otto_store::StoreError),
    #[error("no {0} port available")]
    ResourceExhausted(&'static str),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("fatal: {0}")]
    Fatal(String),
}

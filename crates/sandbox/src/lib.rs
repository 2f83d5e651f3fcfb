// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! otto-sandbox: container supervision for session sandboxes

mod docker;
mod reap;
mod runtime;

pub use docker::DockerSandbox;
pub use reap::reap_stale;
pub use runtime::{
    ManagedSandbox, SandboxError, SandboxRuntime, SandboxSpec, DESKTOP_CONTAINER_PORT,
    TOOL_CONTAINER_PORT,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSandbox, SandboxCall};

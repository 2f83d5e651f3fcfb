// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake sandbox runtime for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::runtime::{ManagedSandbox, SandboxError, SandboxRuntime, SandboxSpec};
use async_trait::async_trait;
use otto_core::{Clock, SandboxId, SandboxStatus, SessionId, SystemClock};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Recorded runtime call
#[derive(Debug, Clone, PartialEq)]
pub enum SandboxCall {
    Create {
        session_id: SessionId,
        desktop_port: u16,
        tool_port: u16,
    },
    Start {
        id: SandboxId,
    },
    Stop {
        id: SandboxId,
        grace: Duration,
    },
    Remove {
        id: SandboxId,
    },
    WaitForDesktop {
        id: SandboxId,
        desktop_port: u16,
    },
}

#[derive(Debug, Clone)]
struct FakeBox {
    spec: SandboxSpec,
    state: SandboxStatus,
    created_at_ms: u64,
}

struct FakeState {
    boxes: HashMap<String, FakeBox>,
    calls: Vec<SandboxCall>,
    next_id: u64,
    fail_create: Option<String>,
    fail_start: Option<String>,
    desktop_ready: bool,
}

/// Fake sandbox runtime for testing
#[derive(Clone)]
pub struct FakeSandbox<C: Clock = SystemClock> {
    clock: C,
    inner: Arc<Mutex<FakeState>>,
}

impl FakeSandbox<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for FakeSandbox<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> FakeSandbox<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            inner: Arc::new(Mutex::new(FakeState {
                boxes: HashMap::new(),
                calls: Vec::new(),
                next_id: 0,
                fail_create: None,
                fail_start: None,
                desktop_ready: true,
            })),
        }
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<SandboxCall> {
        self.inner.lock().calls.clone()
    }

    /// Containers ever created and not yet removed
    pub fn live_count(&self) -> usize {
        self.inner.lock().boxes.len()
    }

    pub fn get_state(&self, id: &SandboxId) -> Option<SandboxStatus> {
        self.inner.lock().boxes.get(id.as_str()).map(|b| b.state)
    }

    /// Make the next `create` fail
    pub fn set_fail_create(&self, message: impl Into<String>) {
        self.inner.lock().fail_create = Some(message.into());
    }

    /// Make the next `start` fail
    pub fn set_fail_start(&self, message: impl Into<String>) {
        self.inner.lock().fail_start = Some(message.into());
    }

    /// Control whether the desktop probe ever succeeds
    pub fn set_desktop_ready(&self, ready: bool) {
        self.inner.lock().desktop_ready = ready;
    }

    /// Force a sandbox into a state (e.g. crash simulation)
    pub fn set_state(&self, id: &SandboxId, state: SandboxStatus) {
        if let Some(sandbox) = self.inner.lock().boxes.get_mut(id.as_str()) {
            sandbox.state = state;
        }
    }
}

#[async_trait]
impl<C: Clock> SandboxRuntime for FakeSandbox<C> {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxId, SandboxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SandboxCall::Create {
            session_id: spec.session_id.clone(),
            desktop_port: spec.desktop_port,
            tool_port: spec.tool_port,
        });
        if let Some(message) = inner.fail_create.take() {
            return Err(SandboxError::Runtime(message));
        }
        inner.next_id += 1;
        let id = format!("sbx-{}", inner.next_id);
        inner.boxes.insert(
            id.clone(),
            FakeBox {
                spec: spec.clone(),
                state: SandboxStatus::Created,
                created_at_ms: self.clock.epoch_ms(),
            },
        );
        Ok(SandboxId::new(id))
    }

    async fn start(&self, id: &SandboxId) -> Result<(), SandboxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SandboxCall::Start { id: id.clone() });
        if let Some(message) = inner.fail_start.take() {
            return Err(SandboxError::Runtime(message));
        }
        match inner.boxes.get_mut(id.as_str()) {
            Some(sandbox) => {
                sandbox.state = SandboxStatus::Running;
                Ok(())
            }
            None => Err(SandboxError::NotFound(id.to_string())),
        }
    }

    async fn stop(&self, id: &SandboxId, grace: Duration) -> Result<(), SandboxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SandboxCall::Stop {
            id: id.clone(),
            grace,
        });
        // Already stopped or removed is not an error
        if let Some(sandbox) = inner.boxes.get_mut(id.as_str()) {
            sandbox.state = SandboxStatus::Exited;
        }
        Ok(())
    }

    async fn remove(&self, id: &SandboxId) -> Result<(), SandboxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SandboxCall::Remove { id: id.clone() });
        inner.boxes.remove(id.as_str());
        Ok(())
    }

    async fn status(&self, id: &SandboxId) -> Result<SandboxStatus, SandboxError> {
        let inner = self.inner.lock();
        Ok(inner
            .boxes
            .get(id.as_str())
            .map(|sandbox| sandbox.state)
            .unwrap_or(SandboxStatus::Missing))
    }

    async fn wait_for_desktop(
        &self,
        id: &SandboxId,
        desktop_port: u16,
        max: Duration,
    ) -> Result<(), SandboxError> {
        let ready = {
            let mut inner = self.inner.lock();
            inner.calls.push(SandboxCall::WaitForDesktop {
                id: id.clone(),
                desktop_port,
            });
            if !inner.boxes.contains_key(id.as_str()) {
                return Err(SandboxError::NotFound(id.to_string()));
            }
            inner.desktop_ready
        };
        if ready {
            Ok(())
        } else {
            Err(SandboxError::ReadinessTimeout(max))
        }
    }

    async fn list_managed(&self) -> Result<Vec<ManagedSandbox>, SandboxError> {
        let inner = self.inner.lock();
        Ok(inner
            .boxes
            .iter()
            .map(|(id, sandbox)| ManagedSandbox {
                sandbox_id: SandboxId::new(id.clone()),
                session_id: Some(sandbox.spec.session_id.clone()),
                created_at_ms: sandbox.created_at_ms,
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), SandboxError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;

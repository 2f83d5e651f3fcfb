// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive TCP port allocation with leak-safe leases.

use crate::keys;
use otto_core::{PortRange, SessionId};
use otto_store::{Store, StoreError};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Which of the two disjoint ranges an allocator manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Desktop,
    Tool,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortKind::Desktop => write!(f, "desktop"),
            PortKind::Tool => write!(f, "tool"),
        }
    }
}

/// Allocator for one port range.
///
/// A port is held from `set_nx` success until release or lease expiry. The
/// scan is linear so allocation order is deterministic and testable; race
/// losers simply advance to the next port.
#[derive(Clone)]
pub struct PortAllocator<S: Store> {
    store: S,
    kind: PortKind,
    range: PortRange,
    lease: Duration,
}

impl<S: Store> PortAllocator<S> {
    pub fn new(store: S, kind: PortKind, range: PortRange, lease: Duration) -> Self {
        Self {
            store,
            kind,
            range,
            lease,
        }
    }

    pub fn kind(&self) -> PortKind {
        self.kind
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Claim the lowest free port for `session`, or `None` on exhaustion.
    ///
    /// Idempotent per session: a port this session already holds (an earlier
    /// delivery claimed it, then crashed before recording it) is returned
    /// instead of claiming a second one.
    pub async fn allocate(&self, session: &SessionId) -> Result<Option<u16>, StoreError> {
        for port in self.range.lo..=self.range.hi {
            let key = keys::port(self.kind, port);
            if self.store.set_nx(&key, session.as_str()).await? {
                // Safety TTL: a crashed owner cannot leak the port forever
                self.store.expire(&key, self.lease).await?;
                tracing::debug!(kind = %self.kind, port, session = %session, "port allocated");
                return Ok(Some(port));
            }
            if self.store.get(&key).await?.as_deref() == Some(session.as_str()) {
                self.store.expire(&key, self.lease).await?;
                tracing::debug!(kind = %self.kind, port, session = %session, "port re-claimed");
                return Ok(Some(port));
            }
        }
        tracing::warn!(kind = %self.kind, "port range exhausted");
        Ok(None)
    }

    /// Release a port. Idempotent.
    pub async fn release(&self, port: u16) -> Result<(), StoreError> {
        self.store.del(&keys::port(self.kind, port)).await?;
        Ok(())
    }

    /// Session currently holding `port`, if any.
    pub async fn holder(&self, port: u16) -> Result<Option<SessionId>, StoreError> {
        Ok(self
            .store
            .get(&keys::port(self.kind, port))
            .await?
            .map(SessionId::new))
    }

    /// Free every key whose owning session no longer answers `is_live`.
    ///
    /// Expired leases vanish on their own; this closes the window where a
    /// session ended without releasing. Returns the number of ports freed.
    pub async fn reap<F, Fut>(&self, is_live: F) -> Result<u32, StoreError>
    where
        F: Fn(SessionId) -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut freed = 0;
        for key in self.store.keys(&keys::port_pattern(self.kind)).await? {
            let holder = match self.store.get(&key).await? {
                Some(value) => SessionId::new(value),
                None => continue,
            };
            if !is_live(holder.clone()).await {
                self.store.del(&key).await?;
                freed += 1;
                tracing::info!(
                    kind = %self.kind,
                    key,
                    session = %holder,
                    "reaped orphaned port"
                );
            }
        }
        Ok(freed)
    }
}

#[cfg(test)]
#[path = "ports_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store trait and shared types.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Single transport-failure kind surfaced by every store operation.
///
/// Callers treat the store as a black box: any failure is retried or
/// propagated as-is, never matched on.
#[derive(Debug, Error)]
#[error("store error: {message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist
    Missing,
    /// Key exists without an expiry
    NoExpiry,
    Remaining(Duration),
}

/// A live channel subscription yielding raw payloads.
///
/// Dropping the subscription unsubscribes.
pub struct Subscription {
    rx: mpsc::Receiver<Vec<u8>>,
    forwarder: JoinHandle<()>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<Vec<u8>>, forwarder: JoinHandle<()>) -> Self {
        Self { rx, forwarder }
    }

    /// Next payload, or `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Coordination store operations.
///
/// Every mutating operation is individually atomic. `set_nx` is the only
/// claim primitive: it returns `true` exactly once per key until deletion.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
    /// Create if absent; `true` when this call created the key
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError>;
    /// `true` when the key existed
    async fn del(&self, key: &str) -> Result<bool, StoreError>;
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;
    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError>;
    /// `true` when the key existed and the expiry was set
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;
    async fn scard(&self, key: &str) -> Result<usize, StoreError>;

    /// Append right; returns new length
    async fn rpush(&self, key: &str, value: &str) -> Result<usize, StoreError>;
    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Remove all occurrences of `value`; returns removed count
    async fn lrem(&self, key: &str, value: &str) -> Result<usize, StoreError>;
    async fn lrange(&self, key: &str, start: isize, stop: isize)
        -> Result<Vec<String>, StoreError>;
    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError>;
    async fn llen(&self, key: &str) -> Result<usize, StoreError>;

    /// Bounded key scan; reapers only
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), StoreError>;
    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError>;

    /// Transport liveness for health reporting
    async fn ping(&self) -> Result<(), StoreError>;
}

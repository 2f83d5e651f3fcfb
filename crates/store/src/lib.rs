// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! otto-store: coordination store adapter
//!
//! Typed KV, set, list, atomic-claim, TTL and pub/sub primitives over an
//! external store. All mutating operations are individually atomic; no
//! multi-key transactions are assumed anywhere above this crate.

mod kv;
mod redis_store;

pub use kv::{KeyTtl, Store, StoreError, Subscription};
pub use redis_store::RedisStore;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod memory;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryStore;

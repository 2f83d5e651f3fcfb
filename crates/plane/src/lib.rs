// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! otto-plane: coordination-plane services over the store
//!
//! Port allocation, the session registry, the cross-process message fabric
//! and the durable work queue. Everything here is built from the individually
//! atomic primitives of `otto-store`; no multi-key transactions.

pub mod fabric;
pub mod keys;
pub mod ports;
pub mod queue;
pub mod registry;

pub use fabric::{EventCallback, FabricHandle, MessageFabric, PublishError};
pub use ports::{PortAllocator, PortKind};
pub use queue::{QueueError, QueueLengths, WorkQueue, MAX_ATTEMPTS};
pub use registry::{RegistryError, SessionPatch, SessionRegistry};

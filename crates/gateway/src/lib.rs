// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! otto-gateway: HTTP/WebSocket frontend over the coordination plane

mod error;
mod protocol;
mod reaper;
mod routes;
mod state;

pub use error::ApiError;
pub use protocol::{
    HealthResponse, MetricsResponse, SessionListResponse, SessionResponse, CHAT_REPLAY_COUNT,
};
pub use reaper::{run_reap_cycle, spawn_reapers};
pub use routes::router;
pub use state::AppState;

//! Behavioral specifications for the ottobot orchestration plane.
//!
//! These tests are black-box where it counts: they drive the real axum
//! router over TCP with HTTP and WebSocket clients, backed by the
//! in-memory store, fake sandbox runtime and scripted agent.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

// http/
#[path = "specs/http/create.rs"]
mod http_create;
#[path = "specs/http/health.rs"]
mod http_health;
#[path = "specs/http/sessions.rs"]
mod http_sessions;
#[path = "specs/http/ttl.rs"]
mod http_ttl;

// chat/
#[path = "specs/chat/socket.rs"]
mod chat_socket;

// queue/
#[path = "specs/queue/delivery.rs"]
mod queue_delivery;

// lifecycle/
#[path = "specs/lifecycle/failure.rs"]
mod lifecycle_failure;
#[path = "specs/lifecycle/races.rs"]
mod lifecycle_races;

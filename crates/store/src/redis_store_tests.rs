// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offline tests; transport behavior is covered by the integration specs
//! against the in-memory store.

use super::*;
use yare::parameterized;

#[parameterized(
    first = { 1, 100 },
    second = { 2, 200 },
    third = { 3, 400 },
    capped = { 6, 2_000 },
    far_out = { 30, 2_000 },
)]
fn backoff_doubles_and_caps(attempt: u32, expected_ms: u64) {
    assert_eq!(backoff_delay(attempt), Duration::from_millis(expected_ms));
}

#[tokio::test]
async fn connect_to_unreachable_store_fails() {
    // Port 1 is never a redis server
    let err = RedisStore::connect("redis://127.0.0.1:1/").await.unwrap_err();
    assert!(err.message.contains("connect"));
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fake::FakeSandbox;
use crate::runtime::SandboxSpec;
use otto_core::{Clock, FakeClock, SessionId};

fn spec(session: &str) -> SandboxSpec {
    SandboxSpec {
        session_id: SessionId::new(session),
        environment: "node".into(),
        desktop_port: 6080,
        tool_port: 8080,
        image: "ottobot-sandbox:latest".into(),
        memory_limit_bytes: 1024,
        cpu_shares: 512,
        network: None,
        data_root: std::path::PathBuf::from("/srv/ottobot"),
    }
}

#[tokio::test]
async fn removes_only_old_sandboxes() {
    let clock = FakeClock::new();
    let runtime = FakeSandbox::with_clock(clock.clone());

    let old = runtime.create(&spec("s-old")).await.unwrap();
    clock.advance(Duration::from_secs(3 * 3600));
    let fresh = runtime.create(&spec("s-fresh")).await.unwrap();

    let removed = reap_stale(&runtime, clock.epoch_ms(), Duration::from_secs(2 * 3600))
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert!(runtime.get_state(&old).is_none());
    assert!(runtime.get_state(&fresh).is_some());
}

#[tokio::test]
async fn empty_runtime_is_a_noop() {
    let clock = FakeClock::new();
    let runtime = FakeSandbox::with_clock(clock.clone());

    let removed = reap_stale(&runtime, clock.epoch_ms(), Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(removed, 0);
}

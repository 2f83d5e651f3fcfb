// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn status_display_and_serde_agree() {
    for status in [
        WorkerStatus::Active,
        WorkerStatus::Stopping,
        WorkerStatus::Stopped,
    ] {
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, format!("\"{status}\""));
    }
}

#[test]
fn entry_roundtrips_through_json() {
    let entry = WorkerEntry {
        worker_id: WorkerId::new("w-1"),
        status: WorkerStatus::Active,
        last_heartbeat_ms: 42,
        current_jobs: 2,
    };

    let json = serde_json::to_string(&entry).unwrap();
    let parsed: WorkerEntry = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, entry);
}

#[test]
fn current_jobs_defaults_to_zero() {
    let parsed: WorkerEntry = serde_json::from_str(
        r#"{"worker_id":"w-2","status":"stopping","last_heartbeat_ms":1}"#,
    )
    .unwrap();
    assert_eq!(parsed.current_jobs, 0);
}

//! At-least-once delivery and stall recovery, observed end to end.

use crate::prelude::*;
use otto_core::{Job, JobId, JobKind, JobPayload, WorkerId};
use std::time::Duration;

#[tokio::test]
async fn duplicate_create_delivery_is_a_noop() {
    let plane = start_plane(PlaneOptions::default()).await;

    let body: serde_json::Value = plane
        .create_session(serde_json::json!({"initial_prompt": "hello"}))
        .await
        .json()
        .await
        .unwrap();
    let sid = plane.session_id(&body);
    plane.wait_for_status(sid.as_str(), "running").await;
    assert_eq!(plane.runtime.live_count(), 1);

    // A second delivery of the create work for the same session
    let duplicate = Job::new(
        JobId::new("dup-create"),
        JobKind::CreateSession,
        sid.clone(),
        JobPayload::Create,
        1,
    );
    plane.queue.enqueue(&duplicate).await.unwrap();

    // The duplicate completes (is GC'd) without touching the sandbox
    let deadline = std::time::Instant::now() + WAIT_MAX;
    while plane.queue.get(&duplicate.id).await.unwrap().is_some() {
        assert!(
            std::time::Instant::now() < deadline,
            "duplicate delivery never completed"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    assert_eq!(plane.runtime.live_count(), 1);
    assert_eq!(plane.driver.spawned().len(), 1);

    let current = plane.get_session(sid.as_str()).await;
    let current: serde_json::Value = current.json().await.unwrap();
    assert!(matches!(
        current["status"].as_str().unwrap(),
        "ready" | "running"
    ));

    plane.stop().await;
}

#[tokio::test]
async fn abandoned_claim_is_rescued_by_the_stall_scan() {
    let plane = start_plane(PlaneOptions {
        start_worker: false,
        stalled_interval: Duration::from_millis(200),
        ..PlaneOptions::default()
    })
    .await;

    let body: serde_json::Value = plane
        .create_session(serde_json::json!({"initial_prompt": "hello"}))
        .await
        .json()
        .await
        .unwrap();
    let sid = plane.session_id(&body);

    // A "crashed" worker claims the job and never finishes it
    let doomed = plane
        .queue
        .dequeue(&WorkerId::new("w-crashed"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doomed.session_id, sid);

    // Lease lapses; the scan returns the job to its lane
    tokio::time::sleep(Duration::from_millis(400)).await;
    plane.run_reapers().await;

    let rescued = plane
        .queue
        .dequeue(&WorkerId::new("w-live"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rescued.id, doomed.id);
    assert_eq!(rescued.stalls, 1);

    plane.stop().await;
}

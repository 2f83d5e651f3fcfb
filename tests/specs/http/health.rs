//! Health and metrics surfaces.

use crate::prelude::*;

#[tokio::test]
async fn health_reports_services_and_workers() {
    let plane = start_plane(PlaneOptions::default()).await;

    // The worker registers within its first heartbeat
    let deadline = std::time::Instant::now() + WAIT_MAX;
    loop {
        let health: serde_json::Value = plane
            .client
            .get(plane.url("/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["services"]["store"], true);
        assert_eq!(health["services"]["sandbox_runtime"], true);
        if health["services"]["workers"] == 1 {
            assert_eq!(health["status"], "healthy");
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "worker never registered"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    plane.stop().await;
}

#[tokio::test]
async fn health_without_workers_is_degraded() {
    let plane = start_plane(PlaneOptions {
        start_worker: false,
        ..PlaneOptions::default()
    })
    .await;

    let health: serde_json::Value = plane
        .client
        .get(plane.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["services"]["workers"], 0);

    plane.stop().await;
}

#[tokio::test]
async fn metrics_count_sessions_queue_and_workers() {
    let plane = start_plane(PlaneOptions::default()).await;

    let body: serde_json::Value = plane
        .create_session(serde_json::json!({"initial_prompt": "hello"}))
        .await
        .json()
        .await
        .unwrap();
    plane
        .wait_for_status(body["session_id"].as_str().unwrap(), "running")
        .await;

    let metrics: serde_json::Value = plane
        .client
        .get(plane.url("/health/metrics"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metrics["active_sessions"], 1);
    assert_eq!(metrics["total_sessions"], 1);
    assert!(metrics["queue_length"].as_u64().is_some());
    let workers = metrics["worker_status"].as_array().unwrap();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0]["id"], "w-1");
    assert_eq!(workers[0]["active"], true);

    plane.stop().await;
}

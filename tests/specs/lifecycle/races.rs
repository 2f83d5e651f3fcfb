//! Terminate racing create, end to end.

use crate::prelude::*;

#[tokio::test]
async fn terminate_immediately_after_create() {
    let plane = start_plane(PlaneOptions {
        desktop_ports: otto_core::PortRange::new(6080, 6080),
        tool_ports: otto_core::PortRange::new(8080, 8080),
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

    let response = plane
        .client
        .delete(plane.url(&format!("/session/{sid}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);

    // Final status converges on terminating/terminated before the purge
    let deadline = std::time::Instant::now() + WAIT_MAX;
    loop {
        let response = plane.get_session(sid.as_str()).await;
        if response.status() == 404 {
            break; // already purged: terminal reached
        }
        let current: serde_json::Value = response.json().await.unwrap();
        let status = current["status"].as_str().unwrap();
        assert!(
            matches!(status, "initializing" | "terminating" | "terminated"),
            "unexpected status {status}"
        );
        if status == "terminated" {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "terminate never converged"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    // No orphaned sandbox, both ports free after reconciliation
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    plane.run_reapers().await;
    assert_eq!(plane.runtime.live_count(), 0);
    assert_eq!(plane.desktop_ports.holder(6080).await.unwrap(), None);
    assert_eq!(plane.tool_ports.holder(8080).await.unwrap(), None);

    plane.stop().await;
}

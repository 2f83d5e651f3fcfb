//! Failure paths converge on Error with full cleanup.

use crate::prelude::*;
use otto_core::MessageKind;

#[tokio::test]
async fn sandbox_create_failure_ends_in_error_with_cleanup() {
    let plane = start_plane(PlaneOptions {
        desktop_ports: otto_core::PortRange::new(6080, 6080),
        tool_ports: otto_core::PortRange::new(8080, 8080),
        ..PlaneOptions::default()
    })
    .await;
    plane.runtime.set_fail_create("no space left on device");

    let body: serde_json::Value = plane
        .create_session(serde_json::json!({"initial_prompt": "hello"}))
        .await
        .json()
        .await
        .unwrap();
    let sid = plane.session_id(&body);

    plane.wait_for_status(sid.as_str(), "error").await;

    // Resources are conserved: no sandbox, both ports reclaimed
    plane.run_reapers().await;
    assert_eq!(plane.runtime.live_count(), 0);
    assert_eq!(plane.desktop_ports.holder(6080).await.unwrap(), None);
    assert_eq!(plane.tool_ports.holder(8080).await.unwrap(), None);

    plane.stop().await;
}

#[tokio::test]
async fn agent_spawn_failure_surfaces_on_the_channel() {
    let plane = start_plane(PlaneOptions::default()).await;
    plane.driver.set_fail_spawn("agent image broken");

    let body: serde_json::Value = plane
        .create_session(serde_json::json!({"initial_prompt": "hello"}))
        .await
        .json()
        .await
        .unwrap();
    let sid = plane.session_id(&body);

    plane.wait_for_status(sid.as_str(), "error").await;

    // The failure is recorded on the stored chat stream
    let messages = plane.registry.read_messages(&sid, None).await.unwrap();
    assert!(messages.iter().any(|m| m.kind == MessageKind::Error));

    plane.stop().await;
}

#[tokio::test]
async fn error_is_terminal() {
    let plane = start_plane(PlaneOptions::default()).await;
    plane.runtime.set_fail_create("boom");

    let body: serde_json::Value = plane
        .create_session(serde_json::json!({"initial_prompt": "hello"}))
        .await
        .json()
        .await
        .unwrap();
    let sid = plane.session_id(&body);
    plane.wait_for_status(sid.as_str(), "error").await;

    // A late terminate cannot resurrect the session
    let response = plane
        .client
        .delete(plane.url(&format!("/session/{sid}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // Still Error until the delayed purge removes the record entirely
    let response = plane.get_session(sid.as_str()).await;
    if response.status().is_success() {
        let current: serde_json::Value = response.json().await.unwrap();
        assert_eq!(current["status"], "error");
    } else {
        assert_eq!(response.status(), 404);
    }

    plane.stop().await;
}

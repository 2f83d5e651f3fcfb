//! Session TTL expiry takes the record and all derived streams with it.

use crate::prelude::*;
use std::time::Duration;

#[tokio::test]
async fn expiry_removes_record_streams_and_ports() {
    let plane = start_plane(PlaneOptions {
        session_timeout: Duration::from_secs(2),
        ..PlaneOptions::default()
    })
    .await;

    let body: serde_json::Value = plane
        .create_session(serde_json::json!({"initial_prompt": "short lived"}))
        .await
        .json()
        .await
        .unwrap();
    let sid = plane.session_id(&body);
    assert_eq!(plane.get_session(sid.as_str()).await.status(), 200);

    tokio::time::sleep(Duration::from_secs(3)).await;

    // Record and derived streams are gone together
    assert_eq!(plane.get_session(sid.as_str()).await.status(), 404);
    assert!(plane
        .registry
        .read_messages(&sid, None)
        .await
        .unwrap()
        .is_empty());
    assert!(plane.registry.read_logs(&sid, None).await.unwrap().is_empty());

    // The reaper frees any ports the dead session still held
    plane.run_reapers().await;
    assert_eq!(plane.desktop_ports.holder(6080).await.unwrap(), None);
    assert_eq!(plane.tool_ports.holder(8080).await.unwrap(), None);

    plane.stop().await;
}

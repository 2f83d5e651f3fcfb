//! Listing, fetching, terminating and observing sessions.

use crate::prelude::*;

#[tokio::test]
async fn get_unknown_session_is_404() {
    let plane = start_plane(PlaneOptions {
        start_worker: false,
        ..PlaneOptions::default()
    })
    .await;

    assert_eq!(plane.get_session("nope").await.status(), 404);
    assert_eq!(
        plane
            .client
            .get(plane.url("/session/nope/logs"))
            .send()
            .await
            .unwrap()
            .status(),
        404
    );
    assert_eq!(
        plane
            .client
            .delete(plane.url("/session/nope"))
            .send()
            .await
            .unwrap()
            .status(),
        404
    );

    plane.stop().await;
}

#[tokio::test]
async fn list_sorts_newest_first_and_excludes_terminated() {
    let plane = start_plane(PlaneOptions::default()).await;

    let first: serde_json::Value = plane
        .create_session(serde_json::json!({"initial_prompt": "first"}))
        .await
        .json()
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let second: serde_json::Value = plane
        .create_session(serde_json::json!({"initial_prompt": "second"}))
        .await
        .json()
        .await
        .unwrap();

    let first_id = first["session_id"].as_str().unwrap();
    let second_id = second["session_id"].as_str().unwrap();
    plane.wait_for_status(first_id, "running").await;

    // Terminate the first and wait for it to finish
    let response = plane
        .client
        .delete(plane.url(&format!("/session/{first_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["session_id"], *first_id);

    let deadline = std::time::Instant::now() + WAIT_MAX;
    loop {
        let list: serde_json::Value = plane
            .client
            .get(plane.url("/session"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if list["total"] == 1 {
            assert_eq!(list["sessions"][0]["session_id"], *second_id);
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "terminated session never left the list"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    plane.stop().await;
}

#[tokio::test]
async fn list_pages_with_limit_and_offset() {
    let plane = start_plane(PlaneOptions {
        start_worker: false,
        ..PlaneOptions::default()
    })
    .await;

    for i in 0..3 {
        plane
            .create_session(serde_json::json!({"initial_prompt": format!("p{i}")}))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let page: serde_json::Value = plane
        .client
        .get(plane.url("/session?limit=1&offset=1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 3);
    assert_eq!(page["limit"], 1);
    assert_eq!(page["offset"], 1);
    assert_eq!(page["sessions"].as_array().unwrap().len(), 1);
    assert_eq!(page["sessions"][0]["initial_prompt"], "p1");

    plane.stop().await;
}

#[tokio::test]
async fn logs_and_messages_are_observable() {
    let plane = start_plane(PlaneOptions::default()).await;

    let body: serde_json::Value = plane
        .create_session(serde_json::json!({"initial_prompt": "hello"}))
        .await
        .json()
        .await
        .unwrap();
    let sid = body["session_id"].as_str().unwrap();
    plane.wait_for_status(sid, "running").await;

    let logs: serde_json::Value = plane
        .client
        .get(plane.url(&format!("/session/{sid}/logs")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let messages_of = |log: &serde_json::Value| {
        log["logs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["message"].as_str().unwrap().to_string())
            .collect::<Vec<_>>()
    };
    let entries = messages_of(&logs);
    assert!(entries.contains(&"session created".to_string()));
    assert!(entries.contains(&"session ready".to_string()));

    let messages: serde_json::Value = plane
        .client
        .get(plane.url(&format!("/session/{sid}/messages")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let kinds: Vec<&str> = messages["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["type"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"system_update"));
    assert!(kinds.contains(&"user_prompt"));

    plane.stop().await;
}

#[tokio::test]
async fn download_without_tool_port_is_400() {
    let plane = start_plane(PlaneOptions {
        start_worker: false,
        ..PlaneOptions::default()
    })
    .await;

    let body: serde_json::Value = plane
        .create_session(serde_json::json!({"initial_prompt": "hello"}))
        .await
        .json()
        .await
        .unwrap();
    let sid = body["session_id"].as_str().unwrap();

    let response = plane
        .client
        .get(plane.url(&format!("/download/{sid}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    assert_eq!(
        plane
            .client
            .get(plane.url("/download/nope"))
            .send()
            .await
            .unwrap()
            .status(),
        404
    );

    plane.stop().await;
}

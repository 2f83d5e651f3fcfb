//! Session creation, the happy path end to end.

use crate::prelude::*;
use otto_core::MessageKind;

#[tokio::test]
async fn happy_path_create_ready_chat() {
    let plane = start_plane(PlaneOptions {
        desktop_ports: otto_core::PortRange::new(6080, 6081),
        tool_ports: otto_core::PortRange::new(8080, 8081),
        ..PlaneOptions::default()
    })
    .await;

    let response = plane
        .create_session(serde_json::json!({
            "initial_prompt": "make a hello world",
            "environment": "node",
            "timeout": 600,
        }))
        .await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    let sid = body["session_id"].as_str().unwrap().to_string();

    assert_eq!(body["desktop_url"], "http://127.0.0.1:6080/vnc.html");
    assert_eq!(
        body["chat_url"],
        format!("ws://127.0.0.1:{}/session/{sid}/chat", plane.addr.port())
    );
    assert_eq!(body["status"], "initializing");

    // The chat socket sees the whole lifecycle in order
    let mut chat = plane.connect_chat(&sid).await;
    let events = chat
        .events_until(|evt| evt.kind == MessageKind::AgentResponse)
        .await;

    assert_eq!(events[0].kind, MessageKind::SystemUpdate);
    assert_eq!(events[0].content, "Connected to session");

    let kinds: Vec<MessageKind> = events.iter().map(|e| e.kind).collect();
    let ready_at = events
        .iter()
        .position(|e| {
            e.kind == MessageKind::SystemUpdate && e.content.starts_with("Session is ready")
        })
        .expect("ready event missing");
    let prompt_at = kinds
        .iter()
        .position(|k| *k == MessageKind::UserPrompt)
        .expect("user prompt missing");
    let response_at = kinds.len() - 1;
    assert!(ready_at < prompt_at && prompt_at < response_at);

    assert_eq!(events[prompt_at].content, "make a hello world");
    assert_eq!(events[response_at].content, "done");
    let ready_meta = events[ready_at].metadata.as_ref().unwrap();
    assert_eq!(ready_meta.desktop_ready, Some(true));

    // Exactly one sandbox, bound to the advertised ports
    assert_eq!(plane.runtime.live_count(), 1);
    plane.wait_for_status(&sid, "running").await;

    chat.close().await;
    plane.stop().await;
}

#[tokio::test]
async fn create_validates_input() {
    let plane = start_plane(PlaneOptions::default()).await;

    // Empty prompt
    let response = plane
        .create_session(serde_json::json!({"initial_prompt": ""}))
        .await;
    assert_eq!(response.status(), 400);

    // Out-of-range timeout
    let response = plane
        .create_session(serde_json::json!({
            "initial_prompt": "hello",
            "timeout": 10,
        }))
        .await;
    assert_eq!(response.status(), 400);

    // Unknown environment
    let response = plane
        .create_session(serde_json::json!({
            "initial_prompt": "hello",
            "environment": "cobol",
        }))
        .await;
    assert_eq!(response.status(), 400);

    plane.stop().await;
}

#[tokio::test]
async fn desktop_port_exhaustion_returns_503() {
    let plane = start_plane(PlaneOptions {
        desktop_ports: otto_core::PortRange::new(6080, 6080),
        start_worker: false,
        ..PlaneOptions::default()
    })
    .await;

    let first = plane
        .create_session(serde_json::json!({"initial_prompt": "one"}))
        .await;
    assert_eq!(first.status(), 201);

    let second = plane
        .create_session(serde_json::json!({"initial_prompt": "two"}))
        .await;
    assert_eq!(second.status(), 503);
    let body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(body["error"], "Service Unavailable");
    assert!(body["message"].as_str().unwrap().starts_with("No available"));

    // The failed create left no record behind
    let list: serde_json::Value = plane
        .client
        .get(plane.url("/session"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["total"], 1);

    plane.stop().await;
}

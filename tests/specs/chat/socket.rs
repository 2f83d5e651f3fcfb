//! Chat socket protocol: ack, validation, error events without close.

use crate::prelude::*;
use otto_core::MessageKind;

#[tokio::test]
async fn prompt_is_acked_and_processed() {
    let plane = start_plane(PlaneOptions::default()).await;

    let body: serde_json::Value = plane
        .create_session(serde_json::json!({"initial_prompt": "hello"}))
        .await
        .json()
        .await
        .unwrap();
    let sid = body["session_id"].as_str().unwrap();
    plane.wait_for_status(sid, "running").await;

    let mut chat = plane.connect_chat(sid).await;
    // Drain the connected banner and replayed history
    chat.events_until(|evt| evt.kind == MessageKind::AgentResponse)
        .await;

    chat.send_prompt("add a test for it").await;
    let events = chat
        .events_until(|evt| evt.kind == MessageKind::AgentResponse)
        .await;

    let ack_at = events
        .iter()
        .position(|evt| {
            evt.kind == MessageKind::SystemUpdate
                && evt.content == "Message received and queued for processing"
        })
        .expect("ack missing");
    let prompt_at = events
        .iter()
        .position(|evt| evt.kind == MessageKind::UserPrompt && evt.content == "add a test for it")
        .expect("prompt echo missing");
    assert!(ack_at < prompt_at);

    // The second prompt reached the agent
    let prompts = plane.driver.prompts();
    assert_eq!(prompts.last().unwrap().1, "add a test for it");

    chat.close().await;
    plane.stop().await;
}

#[tokio::test]
async fn invalid_frames_get_error_events_without_close() {
    let plane = start_plane(PlaneOptions::default()).await;

    let body: serde_json::Value = plane
        .create_session(serde_json::json!({"initial_prompt": "hello"}))
        .await
        .json()
        .await
        .unwrap();
    let sid = body["session_id"].as_str().unwrap();
    plane.wait_for_status(sid, "running").await;

    let mut chat = plane.connect_chat(sid).await;
    chat.events_until(|evt| evt.kind == MessageKind::AgentResponse)
        .await;

    // Not JSON
    chat.send_raw("not json").await;
    let event = chat.next_event().await;
    assert_eq!(event.kind, MessageKind::Error);

    // Wrong type tag
    chat.send_raw(r#"{"type":"telemetry","content":"x","timestamp":1}"#)
        .await;
    let event = chat.next_event().await;
    assert_eq!(event.kind, MessageKind::Error);

    // Empty content
    chat.send_raw(r#"{"type":"user_prompt","content":"","timestamp":1}"#)
        .await;
    let event = chat.next_event().await;
    assert_eq!(event.kind, MessageKind::Error);

    // The socket is still usable afterwards
    chat.send_prompt("still alive?").await;
    let events = chat
        .events_until(|evt| evt.kind == MessageKind::AgentResponse)
        .await;
    assert!(!events.is_empty());

    chat.close().await;
    plane.stop().await;
}

#[tokio::test]
async fn chat_on_unknown_or_terminated_session_is_rejected() {
    let plane = start_plane(PlaneOptions {
        start_worker: false,
        ..PlaneOptions::default()
    })
    .await;

    let url = format!("ws://{}/session/nope/chat", plane.addr);
    assert!(tokio_tungstenite::connect_async(url.as_str()).await.is_err());

    plane.stop().await;
}

#[tokio::test]
async fn replay_catches_up_reconnecting_clients() {
    let plane = start_plane(PlaneOptions::default()).await;

    let body: serde_json::Value = plane
        .create_session(serde_json::json!({"initial_prompt": "hello"}))
        .await
        .json()
        .await
        .unwrap();
    let sid = body["session_id"].as_str().unwrap();
    plane.wait_for_status(sid, "running").await;
    // Give the agent response time to land in the stored stream
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    // A client connecting after the fact still sees the history
    let mut chat = plane.connect_chat(sid).await;
    let events = chat
        .events_until(|evt| evt.kind == MessageKind::AgentResponse)
        .await;
    assert_eq!(events[0].content, "Connected to session");
    assert!(events
        .iter()
        .any(|evt| evt.kind == MessageKind::UserPrompt && evt.content == "hello"));

    chat.close().await;
    plane.stop().await;
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn kind_serializes_as_type_tag() {
    let evt = MessageEvent::user_prompt("hi", 42);
    let json = serde_json::to_value(&evt).unwrap();

    assert_eq!(json["type"], "user_prompt");
    assert_eq!(json["content"], "hi");
    assert_eq!(json["timestamp"], 42);
    assert!(json.get("metadata").is_none());
    assert!(json.get("origin").is_none());
}

#[test]
fn empty_meta_is_not_attached() {
    let evt = MessageEvent::system_update("ok", 1).with_meta(EventMeta::default());
    assert!(evt.metadata.is_none());
}

#[test]
fn meta_fields_roundtrip() {
    let evt = MessageEvent::system_update("Session is ready", 7).with_meta(EventMeta {
        desktop_ready: Some(true),
        session_status: Some(SessionStatus::Ready),
        ..EventMeta::default()
    });

    let json = serde_json::to_string(&evt).unwrap();
    let parsed: MessageEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, evt);

    let meta = parsed.metadata.unwrap();
    assert_eq!(meta.desktop_ready, Some(true));
    assert_eq!(meta.session_status, Some(SessionStatus::Ready));
    assert!(meta.tool_used.is_none());
}

#[test]
fn origin_stamp_roundtrips() {
    let mut evt = MessageEvent::error("boom", 3);
    evt.origin = Some(EventOrigin {
        publisher: "proc-a".into(),
        seq: 9,
    });

    let json = serde_json::to_string(&evt).unwrap();
    let parsed: MessageEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.origin.unwrap().seq, 9);
}

#[test]
fn deserializes_client_frames_without_origin() {
    // Inbound socket frames carry only the public fields.
    let parsed: MessageEvent =
        serde_json::from_str(r#"{"type":"user_prompt","content":"do it","timestamp":5}"#).unwrap();
    assert_eq!(parsed.kind, MessageKind::UserPrompt);
    assert!(parsed.origin.is_none());
}

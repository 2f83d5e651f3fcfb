// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use otto_core::MessageKind;
use otto_store::MemoryStore;
use parking_lot::Mutex as SyncMutex;
use std::time::Duration;

fn collector() -> (EventCallback, Arc<SyncMutex<Vec<MessageEvent>>>) {
    let seen = Arc::new(SyncMutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: EventCallback = Arc::new(move |evt| sink.lock().push(evt));
    (callback, seen)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn publisher_delivers_locally_exactly_once() {
    let store = MemoryStore::new();
    let fabric = MessageFabric::new(store, "proc-a");
    let sid = SessionId::new("s-1");

    let (callback, seen) = collector();
    let handle = fabric.subscribe(&sid, callback).await.unwrap();

    fabric
        .publish(&sid, MessageEvent::system_update("hello", 1))
        .await
        .unwrap();
    settle().await;

    // Locally delivered once; the broadcast echo is filtered out
    let events = seen.lock().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].content, "hello");
    assert_eq!(events[0].origin.as_ref().unwrap().publisher, "proc-a");

    handle.unsubscribe().await;
}

#[tokio::test]
async fn cross_process_delivery() {
    let store = MemoryStore::new();
    let frontend = MessageFabric::new(store.clone(), "frontend");
    let worker = MessageFabric::new(store, "worker");
    let sid = SessionId::new("s-1");

    let (callback, seen) = collector();
    let _handle = frontend.subscribe(&sid, callback).await.unwrap();
    settle().await;

    worker
        .publish(&sid, MessageEvent::system_update("from worker", 2))
        .await
        .unwrap();
    settle().await;

    let events = seen.lock().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].content, "from worker");
}

#[tokio::test]
async fn publish_order_is_preserved_per_subscriber() {
    let store = MemoryStore::new();
    let fabric = MessageFabric::new(store, "proc-a");
    let sid = SessionId::new("s-1");

    let (callback, seen) = collector();
    let _handle = fabric.subscribe(&sid, callback).await.unwrap();

    for i in 0..10 {
        fabric
            .publish(&sid, MessageEvent::system_update(format!("e{i}"), i))
            .await
            .unwrap();
    }
    settle().await;

    let contents: Vec<String> = seen.lock().iter().map(|e| e.content.clone()).collect();
    let expected: Vec<String> = (0..10).map(|i| format!("e{i}")).collect();
    assert_eq!(contents, expected);
}

#[tokio::test]
async fn events_are_scoped_per_session() {
    let store = MemoryStore::new();
    let fabric = MessageFabric::new(store, "proc-a");

    let (callback, seen) = collector();
    let _handle = fabric
        .subscribe(&SessionId::new("s-1"), callback)
        .await
        .unwrap();

    fabric
        .publish(&SessionId::new("s-2"), MessageEvent::system_update("other", 1))
        .await
        .unwrap();
    settle().await;

    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn unsubscribe_stops_delivery_and_closes_channel() {
    let store = MemoryStore::new();
    let fabric = MessageFabric::new(store, "proc-a");
    let sid = SessionId::new("s-1");

    let (callback, seen) = collector();
    let handle = fabric.subscribe(&sid, callback).await.unwrap();
    handle.unsubscribe().await;

    assert_eq!(fabric.local_subscribers(&sid).await, 0);

    let _ = fabric
        .publish(&sid, MessageEvent::system_update("late", 1))
        .await;
    settle().await;
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn transport_failure_still_delivers_locally() {
    let store = MemoryStore::new();
    let fabric = MessageFabric::new(store.clone(), "proc-a");
    let sid = SessionId::new("s-1");

    let (callback, seen) = collector();
    let _handle = fabric.subscribe(&sid, callback).await.unwrap();

    store.set_fail_publish(true);
    let result = fabric
        .publish(&sid, MessageEvent::error("boom", 1))
        .await;

    assert!(matches!(result, Err(PublishError::Store(_))));
    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test]
async fn one_failing_subscriber_does_not_affect_others() {
    let store = MemoryStore::new();
    let fabric = MessageFabric::new(store, "proc-a");
    let sid = SessionId::new("s-1");

    let panicking: EventCallback = Arc::new(|_| panic!("subscriber bug"));
    let (callback, seen) = collector();

    let _h1 = fabric.subscribe(&sid, panicking).await.unwrap();
    let _h2 = fabric.subscribe(&sid, callback).await.unwrap();

    fabric
        .publish(&sid, MessageEvent::system_update("still delivered", 1))
        .await
        .unwrap();
    settle().await;

    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test]
async fn multiple_local_subscribers_each_get_a_copy() {
    let store = MemoryStore::new();
    let fabric = MessageFabric::new(store, "proc-a");
    let sid = SessionId::new("s-1");

    let (cb1, seen1) = collector();
    let (cb2, seen2) = collector();
    let _h1 = fabric.subscribe(&sid, cb1).await.unwrap();
    let _h2 = fabric.subscribe(&sid, cb2).await.unwrap();
    assert_eq!(fabric.local_subscribers(&sid).await, 2);

    fabric
        .publish(&sid, MessageEvent::system_update("fan out", 1))
        .await
        .unwrap();
    settle().await;

    assert_eq!(seen1.lock().len(), 1);
    assert_eq!(seen2.lock().len(), 1);
}

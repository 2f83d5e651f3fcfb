// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process per-session event fan-out.
//!
//! `publish` delivers to local subscribers directly and broadcasts through
//! the store's pub/sub for every other process. Each event carries a
//! `(publisher, seq)` stamp; the pub/sub pump drops events stamped with its
//! own process id, so a local subscriber sees each publish exactly once.

use crate::keys;
use otto_core::{EventOrigin, MessageEvent, SessionId};
use otto_store::{Store, StoreError};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Errors from fabric operations
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish transport error: {0}")]
    Store(#[from] StoreError),
    #[error("event codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Callback invoked for every event on a subscribed session.
pub type EventCallback = Arc<dyn Fn(MessageEvent) + Send + Sync>;

struct SessionSubs {
    next_token: u64,
    callbacks: HashMap<u64, EventCallback>,
    pump: JoinHandle<()>,
}

type SubsMap = Arc<Mutex<HashMap<SessionId, SessionSubs>>>;

/// Per-process fabric endpoint.
#[derive(Clone)]
pub struct MessageFabric<S: Store> {
    store: S,
    publisher_id: String,
    seq: Arc<AtomicU64>,
    sessions: SubsMap,
}

impl<S: Store> MessageFabric<S> {
    /// `publisher_id` must be unique per process (the worker/frontend id).
    pub fn new(store: S, publisher_id: impl Into<String>) -> Self {
        Self {
            store,
            publisher_id: publisher_id.into(),
            seq: Arc::new(AtomicU64::new(0)),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn publisher_id(&self) -> &str {
        &self.publisher_id
    }

    /// Register a local subscriber for `session`.
    ///
    /// The first subscriber opens the store subscription for the session's
    /// channel; the handle unsubscribes on drop, and the last handle closes
    /// the channel subscription.
    pub async fn subscribe(
        &self,
        session: &SessionId,
        callback: EventCallback,
    ) -> Result<FabricHandle, PublishError> {
        let mut sessions = self.sessions.lock().await;
        if !sessions.contains_key(session) {
            let subscription = self.store.subscribe(&keys::session_channel(session)).await?;
            let pump = spawn_pump(
                subscription,
                Arc::clone(&self.sessions),
                session.clone(),
                self.publisher_id.clone(),
            );
            sessions.insert(
                session.clone(),
                SessionSubs {
                    next_token: 0,
                    callbacks: HashMap::new(),
                    pump,
                },
            );
        }

        let subs = match sessions.get_mut(session) {
            Some(subs) => subs,
            // Just inserted above
            None => return Err(PublishError::Store(StoreError::new("subscriber map lost"))),
        };
        let token = subs.next_token;
        subs.next_token += 1;
        subs.callbacks.insert(token, callback);

        tracing::debug!(session = %session, token, "fabric subscriber added");
        Ok(FabricHandle {
            sessions: Arc::clone(&self.sessions),
            session: session.clone(),
            token,
            released: AtomicBool::new(false),
        })
    }

    /// Publish an event: broadcast to other processes and deliver locally.
    ///
    /// Local delivery happens even when the broadcast fails; the transport
    /// error is returned afterwards.
    pub async fn publish(
        &self,
        session: &SessionId,
        mut event: MessageEvent,
    ) -> Result<(), PublishError> {
        event.origin = Some(EventOrigin {
            publisher: self.publisher_id.clone(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
        });
        let payload = serde_json::to_vec(&event)?;

        let broadcast = self
            .store
            .publish(&keys::session_channel(session), &payload)
            .await;

        dispatch_local(&self.sessions, session, &event).await;

        if let Err(err) = &broadcast {
            tracing::warn!(session = %session, error = %err, "event broadcast failed");
        }
        broadcast.map_err(PublishError::Store)
    }

    /// Number of local subscribers for a session (observability only).
    pub async fn local_subscribers(&self, session: &SessionId) -> usize {
        self.sessions
            .lock()
            .await
            .get(session)
            .map(|subs| subs.callbacks.len())
            .unwrap_or(0)
    }
}

/// Handle for one local subscriber; unsubscribes on drop.
pub struct FabricHandle {
    sessions: SubsMap,
    session: SessionId,
    token: u64,
    released: AtomicBool,
}

impl FabricHandle {
    /// Remove this subscriber now instead of waiting for drop.
    pub async fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        remove_subscriber(&self.sessions, &self.session, self.token).await;
    }
}

impl Drop for FabricHandle {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let sessions = Arc::clone(&self.sessions);
        let session = self.session.clone();
        let token = self.token;
        // Detached cleanup: Drop cannot await
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                remove_subscriber(&sessions, &session, token).await;
            });
        }
    }
}

async fn remove_subscriber(sessions: &SubsMap, session: &SessionId, token: u64) {
    let mut map = sessions.lock().await;
    let remove_session = match map.get_mut(session) {
        Some(subs) => {
            subs.callbacks.remove(&token);
            subs.callbacks.is_empty()
        }
        None => false,
    };
    if remove_session {
        if let Some(subs) = map.remove(session) {
            // Aborting the pump drops the store subscription
            subs.pump.abort();
            tracing::debug!(session = %session, "last subscriber gone, channel closed");
        }
    }
}

/// Deliver to every local subscriber; one failing callback cannot affect
/// the others.
async fn dispatch_local(sessions: &SubsMap, session: &SessionId, event: &MessageEvent) {
    let callbacks: Vec<EventCallback> = {
        let map = sessions.lock().await;
        match map.get(session) {
            Some(subs) => subs.callbacks.values().cloned().collect(),
            None => return,
        }
    };
    for callback in callbacks {
        let evt = event.clone();
        if catch_unwind(AssertUnwindSafe(|| callback(evt))).is_err() {
            tracing::warn!(session = %session, "fabric subscriber callback panicked");
        }
    }
}

fn spawn_pump(
    mut subscription: otto_store::Subscription,
    sessions: SubsMap,
    session: SessionId,
    publisher_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = subscription.recv().await {
            let event: MessageEvent = match serde_json::from_slice(&payload) {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(session = %session, error = %err, "undecodable fabric payload");
                    continue;
                }
            };
            // Our own broadcast: already delivered locally at publish time
            if event
                .origin
                .as_ref()
                .is_some_and(|origin| origin.publisher == publisher_id)
            {
                continue;
            }
            dispatch_local(&sessions, &session, &event).await;
        }
    })
}

#[cfg(test)]
#[path = "fabric_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session bidirectional chat socket.
//!
//! Outbound: every fabric event for the session. Inbound: `user_prompt`
//! frames appended to the store and enqueued as ProcessMessage jobs.
//! Invalid frames answer with an Error event; the socket stays open.

use crate::error::ApiError;
use crate::protocol::{ChatFrame, CHAT_CONTENT_MAX, CHAT_REPLAY_COUNT};
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use otto_core::{
    Clock, EventMeta, IdGen, Job, JobId, JobKind, JobPayload, MessageEvent, SessionId,
    SessionStatus,
};
use otto_sandbox::SandboxRuntime;
use otto_store::Store;
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn chat<S, R, C, G>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<S, R, C, G>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let id = SessionId::new(id);
    let session = state.registry.get(&id).await?.ok_or(ApiError::NotFound)?;
    if session.status.is_terminal() {
        return Err(ApiError::NotFound);
    }
    Ok(ws.on_upgrade(move |socket| serve_chat(socket, state, id, session.status)))
}

async fn serve_chat<S, R, C, G>(
    socket: WebSocket,
    state: AppState<S, R, C, G>,
    id: SessionId,
    status: SessionStatus,
) where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let (mut sink, mut stream) = socket.split();

    // Bridge the fabric callback into this task
    let (tx, mut events) = mpsc::channel::<MessageEvent>(256);
    let subscription = match state
        .fabric
        .subscribe(
            &id,
            Arc::new(move |event| {
                // A slow client drops events rather than blocking the fabric
                let _ = tx.try_send(event);
            }),
        )
        .await
    {
        Ok(subscription) => subscription,
        Err(err) => {
            tracing::warn!(session = %id, error = %err, "chat subscribe failed");
            return;
        }
    };

    let hello = MessageEvent::system_update("Connected to session", state.clock.epoch_ms())
        .with_meta(EventMeta {
            session_status: Some(status),
            ..EventMeta::default()
        });
    if !send_event(&mut sink, hello).await {
        subscription.unsubscribe().await;
        return;
    }

    // Replay stored history so a reconnecting client catches up
    match state.registry.read_messages(&id, Some(CHAT_REPLAY_COUNT)).await {
        Ok(history) => {
            for event in history {
                if !send_event(&mut sink, event).await {
                    subscription.unsubscribe().await;
                    return;
                }
            }
        }
        Err(err) => tracing::warn!(session = %id, error = %err, "history replay failed"),
    }

    loop {
        tokio::select! {
            outbound = events.recv() => {
                match outbound {
                    Some(event) => {
                        if !send_event(&mut sink, event).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state, &id, &mut sink, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong handled by axum
                    Some(Err(err)) => {
                        tracing::debug!(session = %id, error = %err, "chat socket error");
                        break;
                    }
                }
            }
        }
    }

    subscription.unsubscribe().await;
    tracing::debug!(session = %id, "chat socket closed");
}

async fn handle_frame<S, R, C, G>(
    state: &AppState<S, R, C, G>,
    id: &SessionId,
    sink: &mut SplitSink<WebSocket, Message>,
    text: &str,
) where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let now = state.clock.epoch_ms();

    let frame: ChatFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            send_event(sink, MessageEvent::error("Invalid message format", now)).await;
            return;
        }
    };
    if frame.kind != "user_prompt" {
        send_event(
            sink,
            MessageEvent::error(format!("Unsupported message type: {}", frame.kind), now),
        )
        .await;
        return;
    }
    let content_len = frame.content.chars().count();
    if content_len == 0 || content_len > CHAT_CONTENT_MAX {
        send_event(
            sink,
            MessageEvent::error(
                format!("content must be 1..{CHAT_CONTENT_MAX} characters"),
                now,
            ),
        )
        .await;
        return;
    }

    if let Err(err) = accept_prompt(state, id, &frame).await {
        tracing::warn!(session = %id, error = %err, "prompt not accepted");
        send_event(sink, MessageEvent::error("Failed to queue message", now)).await;
        return;
    }

    send_event(
        sink,
        MessageEvent::system_update("Message received and queued for processing", now),
    )
    .await;
}

async fn accept_prompt<S, R, C, G>(
    state: &AppState<S, R, C, G>,
    id: &SessionId,
    frame: &ChatFrame,
) -> Result<(), ApiError>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let now = state.clock.epoch_ms();
    let timestamp_ms = frame.timestamp.map(|t| t.max(0) as u64).unwrap_or(now);

    state
        .registry
        .append_message(id, &MessageEvent::user_prompt(frame.content.clone(), timestamp_ms))
        .await?;

    let session = state.registry.get(id).await?.ok_or(ApiError::NotFound)?;
    if session.status == SessionStatus::Ready {
        state
            .registry
            .set_status(id, SessionStatus::Running, None)
            .await?;
    }

    let job = Job::new(
        JobId::new(state.idgen.next()),
        JobKind::ProcessMessage,
        id.clone(),
        JobPayload::Process {
            content: frame.content.clone(),
            timestamp_ms,
        },
        now,
    );
    state.queue.enqueue(&job).await?;
    Ok(())
}

/// Send one event, origin stamp stripped. Returns false when the socket is
/// gone.
async fn send_event(sink: &mut SplitSink<WebSocket, Message>, mut event: MessageEvent) -> bool {
    event.origin = None;
    let json = match serde_json::to_string(&event) {
        Ok(json) => json,
        Err(_) => return true,
    };
    sink.send(Message::Text(json.into())).await.is_ok()
}

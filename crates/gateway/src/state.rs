// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared handler state.

use otto_core::{Clock, Config, IdGen, SessionId, ShortUuidGen};
use otto_plane::{MessageFabric, PortAllocator, SessionRegistry, WorkQueue};
use otto_sandbox::SandboxRuntime;
use otto_store::Store;
use std::sync::Arc;
use std::time::Instant;

/// Everything the HTTP surface needs; thin over the plane crates.
pub struct AppState<S, R, C, G = ShortUuidGen>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    pub config: Arc<Config>,
    pub store: S,
    pub registry: SessionRegistry<S, C, G>,
    pub fabric: MessageFabric<S>,
    pub queue: WorkQueue<S, C>,
    pub desktop_ports: PortAllocator<S>,
    pub tool_ports: PortAllocator<S>,
    pub runtime: R,
    pub clock: C,
    pub idgen: G,
    pub started_at: Instant,
    /// Client used to proxy workspace downloads from sandboxes
    pub http: reqwest::Client,
}

impl<S, R, C, G> Clone for AppState<S, R, C, G>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            store: self.store.clone(),
            registry: self.registry.clone(),
            fabric: self.fabric.clone(),
            queue: self.queue.clone(),
            desktop_ports: self.desktop_ports.clone(),
            tool_ports: self.tool_ports.clone(),
            runtime: self.runtime.clone(),
            clock: self.clock.clone(),
            idgen: self.idgen.clone(),
            started_at: self.started_at,
            http: self.http.clone(),
        }
    }
}

impl<S, R, C, G> AppState<S, R, C, G>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    pub fn desktop_url(&self, desktop_port: u16) -> String {
        format!(
            "http://{}:{}/vnc.html",
            self.config.public_host(),
            desktop_port
        )
    }

    pub fn chat_url(&self, id: &SessionId) -> String {
        format!(
            "ws://{}:{}/session/{}/chat",
            self.config.public_host(),
            self.config.api_port,
            id
        )
    }

    pub fn tool_base(&self, tool_port: u16) -> String {
        format!("http://{}:{}", self.config.public_host(), tool_port)
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! otto-daemon: process assembly for the `ottod` binary.
//!
//! `MODE=api` serves the HTTP/WS gateway plus the background reapers;
//! `MODE=worker` runs the job loop that owns sandboxes and agents.

use otto_core::{Config, ConfigError, IdGen, Mode, ShortUuidGen, SystemClock, WorkerId};
use otto_engine::{
    EngineConfig, EngineError, Lifecycle, LifecycleDeps, RelayAgentDriver, WorkerRuntime,
};
use otto_gateway::{router, spawn_reapers, AppState};
use otto_plane::{MessageFabric, PortAllocator, PortKind, SessionRegistry, WorkQueue};
use otto_sandbox::{DockerSandbox, SandboxError};
use otto_store::{RedisStore, StoreError};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Notify;

/// Errors from daemon startup and shutdown
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("sandbox runtime error: {0}")]
    Sandbox(#[from] SandboxError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The coordination-plane services shared by both process roles.
struct Plane {
    store: RedisStore,
    registry: SessionRegistry<RedisStore, SystemClock>,
    fabric: MessageFabric<RedisStore>,
    queue: WorkQueue<RedisStore, SystemClock>,
    desktop_ports: PortAllocator<RedisStore>,
    tool_ports: PortAllocator<RedisStore>,
}

async fn build_plane(config: &Config, process_id: &str) -> Result<Plane, DaemonError> {
    let store = RedisStore::connect(&config.store_url()).await?;
    let clock = SystemClock;
    let registry = SessionRegistry::new(
        store.clone(),
        clock,
        ShortUuidGen,
        config.session_timeout,
    );
    Ok(Plane {
        registry,
        fabric: MessageFabric::new(store.clone(), process_id),
        queue: WorkQueue::new(
            store.clone(),
            clock,
            config.stalled_interval,
            config.max_stalled,
        ),
        desktop_ports: PortAllocator::new(
            store.clone(),
            PortKind::Desktop,
            config.desktop_ports,
            config.port_lease,
        ),
        tool_ports: PortAllocator::new(
            store.clone(),
            PortKind::Tool,
            config.tool_ports,
            config.port_lease,
        ),
        store,
    })
}

fn engine_config(config: &Config) -> EngineConfig {
    EngineConfig {
        agent_image: config.agent_image.clone(),
        memory_limit_bytes: config.memory_limit_bytes(),
        cpu_shares: config.container_cpu_shares,
        network: config.container_network.clone(),
        data_root: config.session_data_root.clone(),
        public_host: config.public_host().to_string(),
        ..EngineConfig::default()
    }
}

/// Run the configured role until `shutdown` fires.
pub async fn run(config: Config, shutdown: Arc<Notify>) -> Result<(), DaemonError> {
    match config.mode {
        Mode::Api => run_api(config, shutdown).await,
        Mode::Worker => run_worker(config, shutdown).await,
    }
}

async fn run_api(config: Config, shutdown: Arc<Notify>) -> Result<(), DaemonError> {
    let process_id = format!("api-{}", ShortUuidGen.next());
    let plane = build_plane(&config, &process_id).await?;
    let runtime = DockerSandbox::connect(config.public_host())?;

    let state = AppState {
        config: Arc::new(config.clone()),
        store: plane.store,
        registry: plane.registry,
        fabric: plane.fabric,
        queue: plane.queue,
        desktop_ports: plane.desktop_ports,
        tool_ports: plane.tool_ports,
        runtime,
        clock: SystemClock,
        idgen: ShortUuidGen,
        started_at: Instant::now(),
        http: reqwest::Client::new(),
    };

    let reapers = spawn_reapers(state.clone());
    let app = router(state);

    let listener =
        tokio::net::TcpListener::bind((config.api_host.as_str(), config.api_port)).await?;
    tracing::info!(
        host = %config.api_host,
        port = config.api_port,
        "api listening"
    );

    let serve = axum::serve(listener, app).with_graceful_shutdown({
        let shutdown = Arc::clone(&shutdown);
        async move { shutdown.notified().await }
    });
    let result = serve.await;
    reapers.abort();
    result?;
    tracing::info!("api stopped");
    Ok(())
}

async fn run_worker(config: Config, shutdown: Arc<Notify>) -> Result<(), DaemonError> {
    let worker_id = WorkerId::new(format!("worker-{}", ShortUuidGen.next()));
    let plane = build_plane(&config, worker_id.as_str()).await?;
    let runtime = DockerSandbox::connect(config.public_host())?;

    let lifecycle = Arc::new(Lifecycle::new(
        LifecycleDeps {
            registry: plane.registry,
            desktop_ports: plane.desktop_ports,
            tool_ports: plane.tool_ports,
            fabric: plane.fabric,
            queue: plane.queue,
            runtime,
            driver: RelayAgentDriver::new(),
            clock: SystemClock,
            idgen: ShortUuidGen,
        },
        worker_id,
        engine_config(&config),
    ));

    let worker = WorkerRuntime::new(
        lifecycle,
        plane.store,
        SystemClock,
        config.worker_concurrency,
        config.max_sessions_per_worker,
    );
    worker.run(shutdown).await?;
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

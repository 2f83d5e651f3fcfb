//! Test harness for behavioral specifications.
//!
//! Boots an api "process" (real router over TCP) and a worker "process"
//! (real worker runtime) against one in-memory store, mirroring a
//! two-process deployment.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use futures::{SinkExt, StreamExt};
use otto_core::{
    Config, LogFormat, MessageEvent, Mode, PortRange, SequentialIdGen, SessionId, SystemClock,
    WorkerId,
};
use otto_engine::{EngineConfig, Lifecycle, LifecycleDeps, ScriptedAgentDriver, WorkerRuntime};
use otto_gateway::{router, run_reap_cycle, AppState};
use otto_plane::{MessageFabric, PortAllocator, PortKind, SessionRegistry, WorkQueue};
use otto_sandbox::FakeSandbox;
use otto_store::MemoryStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub const POLL_INTERVAL: Duration = Duration::from_millis(20);
pub const WAIT_MAX: Duration = Duration::from_secs(10);

pub type SpecState = AppState<MemoryStore, FakeSandbox, SystemClock, SequentialIdGen>;
type SpecLifecycle =
    Lifecycle<MemoryStore, FakeSandbox, ScriptedAgentDriver, SystemClock, SequentialIdGen>;

pub struct PlaneOptions {
    pub desktop_ports: PortRange,
    pub tool_ports: PortRange,
    pub session_timeout: Duration,
    pub stalled_interval: Duration,
    pub start_worker: bool,
}

impl Default for PlaneOptions {
    fn default() -> Self {
        Self {
            desktop_ports: PortRange::new(6080, 6089),
            tool_ports: PortRange::new(8080, 8089),
            session_timeout: Duration::from_secs(3600),
            stalled_interval: Duration::from_secs(1),
            start_worker: true,
        }
    }
}

pub struct Plane {
    pub addr: SocketAddr,
    pub state: SpecState,
    pub store: MemoryStore,
    pub registry: SessionRegistry<MemoryStore, SystemClock, SequentialIdGen>,
    pub queue: WorkQueue<MemoryStore, SystemClock>,
    pub desktop_ports: PortAllocator<MemoryStore>,
    pub tool_ports: PortAllocator<MemoryStore>,
    pub runtime: FakeSandbox,
    pub driver: ScriptedAgentDriver,
    pub lifecycle: Arc<SpecLifecycle>,
    pub client: reqwest::Client,
    pub shutdown: Arc<Notify>,
    worker: Option<tokio::task::JoinHandle<()>>,
    server: tokio::task::JoinHandle<()>,
}

pub async fn start_plane(options: PlaneOptions) -> Plane {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = Config {
        mode: Mode::Api,
        api_host: "127.0.0.1".into(),
        api_port: addr.port(),
        store_host: "127.0.0.1".into(),
        store_port: 6379,
        store_password: None,
        worker_concurrency: 2,
        max_sessions_per_worker: 10,
        session_timeout: options.session_timeout,
        desktop_ports: options.desktop_ports,
        tool_ports: options.tool_ports,
        container_memory_limit: "2g".into(),
        container_cpu_shares: 1024,
        container_network: None,
        agent_image: "ottobot-sandbox:latest".into(),
        session_data_root: PathBuf::from("/tmp/ottobot-specs"),
        cors_origins: vec!["*".into()],
        max_concurrent_requests: 64,
        log_level: "info".into(),
        log_format: LogFormat::Pretty,
        port_lease: Duration::from_secs(7200),
        reclaim_interval: Duration::from_secs(60),
        stalled_interval: options.stalled_interval,
        max_stalled: 3,
        sandbox_stale_age: Duration::from_secs(7200),
    };

    let store = MemoryStore::new();
    let clock = SystemClock;
    let registry = SessionRegistry::new(
        store.clone(),
        clock,
        SequentialIdGen::new("sess"),
        config.session_timeout,
    );
    let queue = WorkQueue::new(
        store.clone(),
        clock,
        config.stalled_interval,
        config.max_stalled,
    );
    let desktop_ports = PortAllocator::new(
        store.clone(),
        PortKind::Desktop,
        config.desktop_ports,
        config.port_lease,
    );
    let tool_ports = PortAllocator::new(
        store.clone(),
        PortKind::Tool,
        config.tool_ports,
        config.port_lease,
    );
    let runtime = FakeSandbox::new();
    let driver = ScriptedAgentDriver::new();

    let state = AppState {
        config: Arc::new(config),
        store: store.clone(),
        registry: registry.clone(),
        fabric: MessageFabric::new(store.clone(), "api-proc"),
        queue: queue.clone(),
        desktop_ports: desktop_ports.clone(),
        tool_ports: tool_ports.clone(),
        runtime: runtime.clone(),
        clock,
        idgen: SequentialIdGen::new("api-job"),
        started_at: Instant::now(),
        http: reqwest::Client::new(),
    };

    let lifecycle = Arc::new(Lifecycle::new(
        LifecycleDeps {
            registry: registry.clone(),
            desktop_ports: desktop_ports.clone(),
            tool_ports: tool_ports.clone(),
            fabric: MessageFabric::new(store.clone(), "worker-proc"),
            queue: queue.clone(),
            runtime: runtime.clone(),
            driver: driver.clone(),
            clock,
            idgen: SequentialIdGen::new("worker-job"),
        },
        WorkerId::new("w-1"),
        EngineConfig {
            readiness_timeout: Duration::from_secs(5),
            purge_delay: Duration::from_millis(300),
            drain_pause: Duration::ZERO,
            ..EngineConfig::default()
        },
    ));

    let shutdown = Arc::new(Notify::new());
    let worker = if options.start_worker {
        let worker_runtime = WorkerRuntime::new(
            Arc::clone(&lifecycle),
            store.clone(),
            clock,
            2,
            10,
        )
        .with_timing(
            Duration::from_millis(20),
            Duration::from_millis(100),
            Duration::from_secs(300),
            Duration::from_secs(5),
        );
        let shutdown = Arc::clone(&shutdown);
        Some(tokio::spawn(async move {
            let _ = worker_runtime.run(shutdown).await;
        }))
    } else {
        None
    };

    let app = router(state.clone());
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Plane {
        addr,
        state,
        store,
        registry,
        queue,
        desktop_ports,
        tool_ports,
        runtime,
        driver,
        lifecycle,
        client: reqwest::Client::new(),
        shutdown,
        worker,
        server,
    }
}

impl Plane {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn create_session(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url("/session"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn get_session(&self, id: &str) -> reqwest::Response {
        self.client
            .get(self.url(&format!("/session/{id}")))
            .send()
            .await
            .unwrap()
    }

    /// Poll until the session reports `status`, panicking after `WAIT_MAX`.
    pub async fn wait_for_status(&self, id: &str, status: &str) {
        let deadline = Instant::now() + WAIT_MAX;
        loop {
            let response = self.get_session(id).await;
            if response.status().is_success() {
                let body: serde_json::Value = response.json().await.unwrap();
                if body["status"] == status {
                    return;
                }
            }
            if Instant::now() > deadline {
                panic!("session {id} never reached {status}");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn run_reapers(&self) {
        run_reap_cycle(&self.state, true).await;
    }

    pub async fn connect_chat(&self, id: &str) -> ChatClient {
        let url = format!("ws://{}/session/{id}/chat", self.addr);
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        ChatClient { socket }
    }

    pub async fn stop(mut self) {
        self.shutdown.notify_one();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
        self.server.abort();
    }

    pub fn session_id(&self, body: &serde_json::Value) -> SessionId {
        SessionId::new(body["session_id"].as_str().unwrap())
    }
}

pub struct ChatClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ChatClient {
    /// Next chat event, skipping transport frames.
    pub async fn next_event(&mut self) -> MessageEvent {
        let deadline = Instant::now() + WAIT_MAX;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let frame = tokio::time::timeout(remaining, self.socket.next())
                .await
                .expect("timed out waiting for chat event")
                .expect("chat socket closed")
                .unwrap();
            if let WsMessage::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    /// Collect events until one matches `stop`, inclusive.
    pub async fn events_until(&mut self, stop: impl Fn(&MessageEvent) -> bool) -> Vec<MessageEvent> {
        let mut events = Vec::new();
        loop {
            let event = self.next_event().await;
            let done = stop(&event);
            events.push(event);
            if done {
                return events;
            }
        }
    }

    pub async fn send_prompt(&mut self, content: &str) {
        let frame = serde_json::json!({
            "type": "user_prompt",
            "content": content,
            "timestamp": 1,
        });
        self.socket
            .send(WsMessage::Text(frame.to_string().into()))
            .await
            .unwrap();
    }

    pub async fn send_raw(&mut self, raw: &str) {
        self.socket
            .send(WsMessage::Text(raw.to_string().into()))
            .await
            .unwrap();
    }

    pub async fn close(mut self) {
        let _ = self.socket.close(None).await;
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle controller.
//!
//! Drives a session through Initializing → Ready → Running → Terminating →
//! Terminated, with Error reachable from any non-terminal state. Handlers
//! are idempotent (the queue delivers at-least-once) and re-read the session
//! record after every suspension point, so a frontend terminate racing a
//! create is observed at the next step and short-circuits into cleanup.

use crate::agent::{Agent, AgentContext, AgentDriver, OnEvent};
use crate::error::EngineError;
use otto_core::{
    Clock, EventMeta, IdGen, Job, JobId, JobKind, JobPayload, LogLevel, MessageEvent,
    SandboxStatus, Session, SessionId, SessionStatus, ShortUuidGen, WorkerId,
};
use otto_plane::{MessageFabric, PortAllocator, SessionPatch, SessionRegistry, WorkQueue};
use otto_sandbox::{SandboxRuntime, SandboxSpec};
use otto_store::Store;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Grace handed to the container runtime on a normal stop.
const STOP_GRACE: Duration = Duration::from_secs(10);

/// Engine knobs carried from process configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub agent_image: String,
    pub memory_limit_bytes: i64,
    pub cpu_shares: u32,
    pub network: Option<String>,
    pub data_root: PathBuf,
    /// Host the published sandbox ports are reachable on
    pub public_host: String,
    pub readiness_timeout: Duration,
    /// Wait after a Terminated session before its keys are purged, so a
    /// just-disconnected client can still fetch logs
    pub purge_delay: Duration,
    /// Pause between stop and remove so sandbox processes can drain
    pub drain_pause: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            agent_image: "ottobot-sandbox:latest".into(),
            memory_limit_bytes: 2 * 1024 * 1024 * 1024,
            cpu_shares: 1024,
            network: None,
            data_root: PathBuf::from("/srv/ottobot"),
            public_host: "localhost".into(),
            readiness_timeout: Duration::from_secs(30),
            purge_delay: Duration::from_secs(300),
            drain_pause: Duration::from_secs(2),
        }
    }
}

struct AgentEntry {
    agent: Arc<dyn Agent>,
    /// Ordered append+publish pump; ends when the agent drops its callback
    _pump: JoinHandle<()>,
}

/// Lifecycle controller bound to one worker.
pub struct Lifecycle<S, R, D, C, G = ShortUuidGen>
where
    S: Store,
    R: SandboxRuntime,
    D: AgentDriver,
    C: Clock,
    G: IdGen,
{
    registry: SessionRegistry<S, C, G>,
    desktop_ports: PortAllocator<S>,
    tool_ports: PortAllocator<S>,
    fabric: MessageFabric<S>,
    queue: WorkQueue<S, C>,
    runtime: R,
    driver: D,
    clock: C,
    idgen: G,
    worker_id: WorkerId,
    config: EngineConfig,
    agents: Mutex<HashMap<SessionId, AgentEntry>>,
}

/// Constructor dependencies, grouped so call sites stay readable.
pub struct LifecycleDeps<S, R, D, C, G>
where
    S: Store,
    R: SandboxRuntime,
    D: AgentDriver,
    C: Clock,
    G: IdGen,
{
    pub registry: SessionRegistry<S, C, G>,
    pub desktop_ports: PortAllocator<S>,
    pub tool_ports: PortAllocator<S>,
    pub fabric: MessageFabric<S>,
    pub queue: WorkQueue<S, C>,
    pub runtime: R,
    pub driver: D,
    pub clock: C,
    pub idgen: G,
}

impl<S, R, D, C, G> Lifecycle<S, R, D, C, G>
where
    S: Store,
    R: SandboxRuntime,
    D: AgentDriver,
    C: Clock,
    G: IdGen,
{
    pub fn new(deps: LifecycleDeps<S, R, D, C, G>, worker_id: WorkerId, config: EngineConfig) -> Self {
        Self {
            registry: deps.registry,
            desktop_ports: deps.desktop_ports,
            tool_ports: deps.tool_ports,
            fabric: deps.fabric,
            queue: deps.queue,
            runtime: deps.runtime,
            driver: deps.driver,
            clock: deps.clock,
            idgen: deps.idgen,
            worker_id,
            config,
            agents: Mutex::new(HashMap::new()),
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    pub fn registry(&self) -> &SessionRegistry<S, C, G> {
        &self.registry
    }

    pub fn queue(&self) -> &WorkQueue<S, C> {
        &self.queue
    }

    pub async fn agent_count(&self) -> usize {
        self.agents.lock().await.len()
    }

    pub async fn has_agent(&self, id: &SessionId) -> bool {
        self.agents.lock().await.contains_key(id)
    }

    /// Dispatch a claimed job to its handler.
    pub async fn handle(&self, job: &mut Job) -> Result<(), EngineError> {
        match job.kind {
            JobKind::CreateSession => self.handle_create(job).await,
            JobKind::ProcessMessage => self.handle_process(job).await,
            JobKind::TerminateSession => self.handle_terminate(job).await,
        }
    }

    /// Create handler: tool port → sandbox → readiness → agent → Ready.
    ///
    /// Idempotent: a replay after Ready repeats the ready event without a
    /// second sandbox; a replay of a partially-run create skips the steps
    /// whose results the record already carries.
    pub async fn handle_create(&self, job: &mut Job) -> Result<(), EngineError> {
        let sid = job.session_id.clone();
        let session = self.require(&sid).await?;

        if session.status.is_terminal() {
            return Ok(());
        }
        if session.status == SessionStatus::Terminating {
            self.finish_termination(&sid).await;
            return Ok(());
        }
        if matches!(session.status, SessionStatus::Ready | SessionStatus::Running) {
            // Replay after Ready: repeat the signal, no second sandbox
            self.publish_ready(&sid).await?;
            self.progress(&job.id, 100).await;
            return Ok(());
        }

        self.progress(&job.id, 10).await;
        let mut session = self
            .registry
            .update(&sid, SessionPatch::default().worker(self.worker_id.clone()))
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(sid.clone()))?;

        // Tool port: reuse what a previous delivery reserved
        let tool_port = match session.tool_port {
            Some(port) => port,
            None => self
                .tool_ports
                .allocate(&sid)
                .await?
                .ok_or(EngineError::ResourceExhausted("tool"))?,
        };
        self.progress(&job.id, 30).await;
        let Some(current) = self.guard(&sid).await? else {
            return Ok(());
        };
        session = current;

        let sandbox_id = match session.sandbox_id.clone() {
            Some(id) => id,
            None => {
                let spec = self.sandbox_spec(&session, tool_port)?;
                let id = self.runtime.create(&spec).await?;
                session = self
                    .registry
                    .update(
                        &sid,
                        SessionPatch::default().sandbox(id.clone()).tool_port(tool_port),
                    )
                    .await?
                    .ok_or_else(|| EngineError::SessionNotFound(sid.clone()))?;
                id
            }
        };
        self.progress(&job.id, 50).await;

        self.runtime.start(&sandbox_id).await?;
        let Some(current) = self.guard(&sid).await? else {
            return Ok(());
        };
        session = current;
        self.progress(&job.id, 70).await;

        let desktop_port = session
            .desktop_port
            .ok_or_else(|| EngineError::Fatal(format!("session {sid} has no desktop port")))?;
        self.runtime
            .wait_for_desktop(&sandbox_id, desktop_port, self.config.readiness_timeout)
            .await?;
        let Some(current) = self.guard(&sid).await? else {
            return Ok(());
        };
        session = current;
        self.progress(&job.id, 90).await;

        if !self.has_agent(&sid).await {
            self.spawn_agent(&session).await?;
        }

        self.registry
            .set_status(&sid, SessionStatus::Ready, None)
            .await?;
        self.registry
            .append_log(&sid, LogLevel::Info, "session ready", None)
            .await?;
        self.publish_ready(&sid).await?;
        self.progress(&job.id, 100).await;

        // Drive the initial prompt through the normal process path
        self.enqueue_prompt(&sid, &session.initial_prompt).await?;
        tracing::info!(session = %sid, sandbox = %sandbox_id, "session ready");
        Ok(())
    }

    /// Process handler: UserPrompt out first, then the agent runs.
    pub async fn handle_process(&self, job: &mut Job) -> Result<(), EngineError> {
        let sid = job.session_id.clone();
        let content = match &job.payload {
            JobPayload::Process { content, .. } => content.clone(),
            _ => return Err(EngineError::Fatal("process job without prompt payload".into())),
        };

        let session = self.require(&sid).await?;
        if session.status.is_terminal() || session.status == SessionStatus::Terminating {
            // Prompt arrived after the end of the session's life
            return Ok(());
        }

        let agent = match self.get_agent(&sid).await {
            Some(agent) => agent,
            None => self.rehydrate(&session).await?,
        };

        // The prompt must be observable before any agent output
        let prompt_evt = MessageEvent::user_prompt(content.clone(), self.clock.epoch_ms());
        if let Err(err) = self.fabric.publish(&sid, prompt_evt).await {
            tracing::warn!(session = %sid, error = %err, "user prompt broadcast failed");
        }
        if session.status == SessionStatus::Ready {
            self.registry
                .set_status(&sid, SessionStatus::Running, None)
                .await?;
        }

        match agent.process(&content).await {
            Ok(()) => Ok(()),
            Err(err) if !err.is_fatal() => {
                // The session stays usable; surface the failure on the channel
                tracing::warn!(session = %sid, error = %err, "agent failed on prompt");
                let evt = MessageEvent::error(err.to_string(), self.clock.epoch_ms());
                self.emit(&sid, evt).await?;
                self.registry
                    .append_log(&sid, LogLevel::Warn, "agent error", Some(serde_json::json!({
                        "error": err.to_string(),
                    })))
                    .await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Terminate handler: every step independently idempotent.
    pub async fn handle_terminate(&self, job: &mut Job) -> Result<(), EngineError> {
        self.terminate_session(&job.session_id).await
    }

    /// Shared terminate path (also used for local drain on shutdown).
    pub async fn terminate_session(&self, sid: &SessionId) -> Result<(), EngineError> {
        // Already purged: replay is a no-op
        let Some(session) = self.registry.get(sid).await? else {
            return Ok(());
        };
        if session.status == SessionStatus::Terminated {
            return Ok(());
        }

        self.shutdown_agent(sid).await;

        if let Some(sandbox_id) = &session.sandbox_id {
            self.runtime.stop(sandbox_id, STOP_GRACE).await?;
            // Let in-flight sandbox processes drain before removal
            tokio::time::sleep(self.config.drain_pause).await;
            self.runtime.remove(sandbox_id).await?;
        }
        self.release_ports(&session).await;

        self.registry
            .set_status(sid, SessionStatus::Terminated, None)
            .await?;
        self.registry
            .append_log(sid, LogLevel::Info, "session terminated", None)
            .await?;
        let evt = MessageEvent::system_update("Session terminated", self.clock.epoch_ms())
            .with_meta(EventMeta {
                session_status: Some(SessionStatus::Terminated),
                ..EventMeta::default()
            });
        if let Err(err) = self.emit(sid, evt).await {
            tracing::warn!(session = %sid, error = %err, "terminate event not recorded");
        }
        self.schedule_purge(sid);
        tracing::info!(session = %sid, "session terminated");
        Ok(())
    }

    /// Failure path: best-effort superset of terminate, then `Error`.
    ///
    /// Every step is individually guarded; cleanup failures are logged and
    /// never propagated.
    pub async fn fail_session(&self, sid: &SessionId, reason: &str) {
        tracing::warn!(session = %sid, reason, "session failed, cleaning up");
        self.teardown_resources(sid).await;

        if let Err(err) = self
            .registry
            .set_status(sid, SessionStatus::Error, Some(reason.to_string()))
            .await
        {
            tracing::warn!(session = %sid, error = %err, "error status not recorded");
        }
        if let Err(err) = self
            .registry
            .append_log(sid, LogLevel::Error, reason, None)
            .await
        {
            tracing::warn!(session = %sid, error = %err, "failure log not recorded");
        }
        let evt = MessageEvent::error(reason, self.clock.epoch_ms()).with_meta(EventMeta {
            session_status: Some(SessionStatus::Error),
            ..EventMeta::default()
        });
        if let Err(err) = self.emit(sid, evt).await {
            tracing::warn!(session = %sid, error = %err, "failure event not recorded");
        }
        self.schedule_purge(sid);
    }

    /// Terminate every session with a local agent (worker drain).
    pub async fn shutdown_all(&self) {
        let sids: Vec<SessionId> = self.agents.lock().await.keys().cloned().collect();
        for sid in sids {
            if let Err(err) = self.terminate_session(&sid).await {
                tracing::warn!(session = %sid, error = %err, "drain terminate failed");
            }
        }
    }

    /// Append to the stored stream and fan out on the fabric. Broadcast
    /// failures are logged; local subscribers were still served.
    async fn emit(&self, sid: &SessionId, event: MessageEvent) -> Result<(), EngineError> {
        self.registry.append_message(sid, &event).await?;
        if let Err(err) = self.fabric.publish(sid, event).await {
            tracing::warn!(session = %sid, error = %err, "event broadcast failed");
        }
        Ok(())
    }

    async fn publish_ready(&self, sid: &SessionId) -> Result<(), EngineError> {
        let evt = MessageEvent::system_update(
            "Session is ready. Desktop is available.",
            self.clock.epoch_ms(),
        )
        .with_meta(EventMeta {
            desktop_ready: Some(true),
            session_status: Some(SessionStatus::Ready),
            ..EventMeta::default()
        });
        self.emit(sid, evt).await
    }

    /// Store the prompt and enqueue a ProcessMessage job, exactly like the
    /// chat socket does for an inbound frame.
    pub async fn enqueue_prompt(&self, sid: &SessionId, content: &str) -> Result<JobId, EngineError> {
        let now = self.clock.epoch_ms();
        self.registry
            .append_message(sid, &MessageEvent::user_prompt(content, now))
            .await?;
        let job = Job::new(
            JobId::new(self.idgen.next()),
            JobKind::ProcessMessage,
            sid.clone(),
            JobPayload::Process {
                content: content.to_string(),
                timestamp_ms: now,
            },
            now,
        );
        self.queue.enqueue(&job).await?;
        Ok(job.id)
    }

    async fn require(&self, sid: &SessionId) -> Result<Session, EngineError> {
        self.registry
            .get(sid)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(sid.clone()))
    }

    /// Re-read after a suspension point. A session that turned Terminating
    /// (or vanished) short-circuits the caller into cleanup.
    async fn guard(&self, sid: &SessionId) -> Result<Option<Session>, EngineError> {
        match self.registry.get(sid).await? {
            None => {
                // Record expired mid-create: free whatever we hold
                self.teardown_resources(sid).await;
                Ok(None)
            }
            Some(session) if session.status == SessionStatus::Terminating => {
                self.finish_termination(sid).await;
                Ok(None)
            }
            Some(session) if session.status.is_terminal() => Ok(None),
            Some(session) => Ok(Some(session)),
        }
    }

    /// Best-effort terminate used when create observes a raced terminate.
    async fn finish_termination(&self, sid: &SessionId) {
        if let Err(err) = self.terminate_session(sid).await {
            tracing::warn!(session = %sid, error = %err, "raced terminate cleanup failed");
            self.teardown_resources(sid).await;
        }
    }

    /// Free agent, sandbox and ports; every step guarded.
    async fn teardown_resources(&self, sid: &SessionId) {
        self.shutdown_agent(sid).await;

        let session = match self.registry.get(sid).await {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(session = %sid, error = %err, "cleanup could not read session");
                return;
            }
        };
        if let Some(sandbox_id) = &session.sandbox_id {
            if let Err(err) = self.runtime.stop(sandbox_id, STOP_GRACE).await {
                tracing::warn!(sandbox = %sandbox_id, error = %err, "cleanup stop failed");
            }
            if let Err(err) = self.runtime.remove(sandbox_id).await {
                tracing::warn!(sandbox = %sandbox_id, error = %err, "cleanup remove failed");
            }
        }
        self.release_ports(&session).await;
    }

    async fn release_ports(&self, session: &Session) {
        if let Some(port) = session.desktop_port {
            if let Err(err) = self.desktop_ports.release(port).await {
                tracing::warn!(port, error = %err, "desktop port release failed");
            }
        }
        if let Some(port) = session.tool_port {
            if let Err(err) = self.tool_ports.release(port).await {
                tracing::warn!(port, error = %err, "tool port release failed");
            }
        }
    }

    async fn get_agent(&self, sid: &SessionId) -> Option<Arc<dyn Agent>> {
        self.agents
            .lock()
            .await
            .get(sid)
            .map(|entry| Arc::clone(&entry.agent))
    }

    /// Re-spawn the agent against a still-live sandbox (worker restart, or
    /// a ProcessMessage landing on a worker that lost its in-memory agent).
    async fn rehydrate(&self, session: &Session) -> Result<Arc<dyn Agent>, EngineError> {
        let sid = &session.id;
        let recoverable = match &session.sandbox_id {
            Some(sandbox_id) => {
                self.runtime.status(sandbox_id).await? == SandboxStatus::Running
                    && session.tool_port.is_some()
            }
            None => false,
        };
        if !recoverable {
            return Err(EngineError::Fatal(format!(
                "agent for {sid} not running and sandbox not recoverable"
            )));
        }
        tracing::info!(session = %sid, "re-spawning agent against live sandbox");
        self.spawn_agent(session).await?;
        self.get_agent(sid)
            .await
            .ok_or_else(|| EngineError::Fatal(format!("agent for {sid} vanished after spawn")))
    }

    async fn spawn_agent(&self, session: &Session) -> Result<(), EngineError> {
        let sid = session.id.clone();
        let tool_port = session
            .tool_port
            .ok_or_else(|| EngineError::Fatal(format!("session {sid} has no tool port")))?;
        let ctx = AgentContext {
            session_id: sid.clone(),
            tool_endpoint: format!("http://{}:{}", self.config.public_host, tool_port),
            context: self.registry.load_context(&sid).await?,
        };
        let (on_event, pump) = self.spawn_event_pump(sid.clone());
        let agent = self.driver.spawn(ctx, on_event).await?;
        self.agents
            .lock()
            .await
            .insert(sid, AgentEntry { agent, _pump: pump });
        Ok(())
    }

    async fn shutdown_agent(&self, sid: &SessionId) {
        let entry = self.agents.lock().await.remove(sid);
        if let Some(entry) = entry {
            if let Some(blob) = entry.agent.shutdown().await {
                if let Err(err) = self.registry.save_context(sid, &blob).await {
                    tracing::warn!(session = %sid, error = %err, "context blob not saved");
                }
            }
        }
    }

    /// Agent events are appended and published strictly in emission order;
    /// the pump serializes them through one task.
    fn spawn_event_pump(&self, sid: SessionId) -> (OnEvent, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<MessageEvent>();
        let registry = self.registry.clone();
        let fabric = self.fabric.clone();
        let pump_sid = sid.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = registry.append_message(&pump_sid, &event).await {
                    tracing::warn!(session = %pump_sid, error = %err, "agent event not stored");
                }
                if let Err(err) = fabric.publish(&pump_sid, event).await {
                    tracing::warn!(session = %pump_sid, error = %err, "agent event broadcast failed");
                }
            }
        });
        let on_event: OnEvent = Arc::new(move |event| {
            let _ = tx.send(event);
        });
        (on_event, pump)
    }

    fn sandbox_spec(&self, session: &Session, tool_port: u16) -> Result<SandboxSpec, EngineError> {
        let desktop_port = session
            .desktop_port
            .ok_or_else(|| EngineError::Fatal(format!("session {} has no desktop port", session.id)))?;
        Ok(SandboxSpec {
            session_id: session.id.clone(),
            environment: session.environment.clone(),
            desktop_port,
            tool_port,
            image: self.config.agent_image.clone(),
            memory_limit_bytes: self.config.memory_limit_bytes,
            cpu_shares: self.config.cpu_shares,
            network: self.config.network.clone(),
            data_root: self.config.data_root.clone(),
        })
    }

    fn schedule_purge(&self, sid: &SessionId) {
        let registry = self.registry.clone();
        let sid = sid.clone();
        let delay = self.config.purge_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = registry.delete(&sid).await {
                tracing::warn!(session = %sid, error = %err, "delayed purge failed");
            }
        });
    }

    /// Progress is observability only; failures are logged, never fatal.
    async fn progress(&self, job_id: &JobId, percent: u8) {
        if let Err(err) = self.queue.report_progress(job_id, percent).await {
            tracing::debug!(job = %job_id, error = %err, "progress not recorded");
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker runtime: registration, heartbeat, concurrent job loop, drain.

use crate::agent::AgentDriver;
use crate::error::EngineError;
use crate::lifecycle::Lifecycle;
use otto_core::{Clock, IdGen, Job, JobKind, ShortUuidGen, WorkerEntry, WorkerId, WorkerStatus};
use otto_plane::keys;
use otto_sandbox::SandboxRuntime;
use otto_store::Store;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinSet;

/// Worker registration TTL; an expired key means the worker is dead.
const HEARTBEAT_TTL: Duration = Duration::from_secs(300);
/// Registration refresh cadence.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
/// Queue poll cadence when idle.
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// How long drain waits for in-flight jobs before aborting them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Concurrent job loop around one lifecycle controller.
pub struct WorkerRuntime<S, R, D, C, G = ShortUuidGen>
where
    S: Store,
    R: SandboxRuntime,
    D: AgentDriver,
    C: Clock,
    G: IdGen,
{
    lifecycle: Arc<Lifecycle<S, R, D, C, G>>,
    store: S,
    clock: C,
    concurrency: usize,
    max_sessions: usize,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    heartbeat_ttl: Duration,
    drain_timeout: Duration,
    in_flight: Arc<AtomicUsize>,
}

impl<S, R, D, C, G> WorkerRuntime<S, R, D, C, G>
where
    S: Store,
    R: SandboxRuntime,
    D: AgentDriver,
    C: Clock,
    G: IdGen,
{
    pub fn new(
        lifecycle: Arc<Lifecycle<S, R, D, C, G>>,
        store: S,
        clock: C,
        concurrency: usize,
        max_sessions: usize,
    ) -> Self {
        Self {
            lifecycle,
            store,
            clock,
            concurrency: concurrency.max(1),
            max_sessions: max_sessions.max(1),
            poll_interval: POLL_INTERVAL,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            heartbeat_ttl: HEARTBEAT_TTL,
            drain_timeout: DRAIN_TIMEOUT,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Override timing knobs (tests).
    pub fn with_timing(
        mut self,
        poll_interval: Duration,
        heartbeat_interval: Duration,
        heartbeat_ttl: Duration,
        drain_timeout: Duration,
    ) -> Self {
        self.poll_interval = poll_interval;
        self.heartbeat_interval = heartbeat_interval;
        self.heartbeat_ttl = heartbeat_ttl;
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn worker_id(&self) -> &WorkerId {
        self.lifecycle.worker_id()
    }

    /// Run until `shutdown` fires, then drain.
    pub async fn run(&self, shutdown: Arc<Notify>) -> Result<(), EngineError> {
        self.register(WorkerStatus::Active).await?;
        let heartbeat = self.spawn_heartbeat();
        tracing::info!(worker = %self.worker_id(), concurrency = self.concurrency, "worker started");

        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut poll = tokio::time::interval(self.poll_interval);
        let mut stall_scan = tokio::time::interval(self.lifecycle.queue().stall_interval());

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,

                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = result {
                        tracing::error!(worker = %self.worker_id(), error = %err, "job task panicked");
                    }
                    self.set_jobs_gauge(tasks.len()).await;
                }

                _ = stall_scan.tick() => {
                    if let Err(err) = self.lifecycle.queue().reap_stalled().await {
                        tracing::warn!(worker = %self.worker_id(), error = %err, "stall scan failed");
                    }
                }

                _ = poll.tick() => {
                    self.claim_up_to_capacity(&mut tasks).await;
                }
            }
        }

        // Drain: stop claiming, finish in-flight work, terminate local agents
        tracing::info!(worker = %self.worker_id(), in_flight = tasks.len(), "worker draining");
        if let Err(err) = self.register(WorkerStatus::Stopping).await {
            tracing::warn!(worker = %self.worker_id(), error = %err, "stopping status not recorded");
        }
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(self.drain_timeout, drain).await.is_err() {
            tracing::warn!(worker = %self.worker_id(), "drain timeout, aborting in-flight jobs");
            tasks.abort_all();
        }
        self.lifecycle.shutdown_all().await;

        heartbeat.abort();
        self.store
            .del(&keys::worker_status(self.worker_id()))
            .await?;
        self.store.del(&keys::worker_jobs(self.worker_id())).await?;
        tracing::info!(worker = %self.worker_id(), "worker stopped");
        Ok(())
    }

    async fn claim_up_to_capacity(&self, tasks: &mut JoinSet<()>) {
        while tasks.len() < self.concurrency {
            let job = match self.lifecycle.queue().dequeue(self.worker_id()).await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(worker = %self.worker_id(), error = %err, "dequeue failed");
                    break;
                }
            };

            // Soft session cap: decline creates while at capacity
            if job.kind == JobKind::CreateSession
                && self.lifecycle.agent_count().await >= self.max_sessions
            {
                let mut declined = job;
                if let Err(err) = self.lifecycle.queue().release(&mut declined).await {
                    tracing::warn!(job = %declined.id, error = %err, "release failed");
                }
                break;
            }

            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let lifecycle = Arc::clone(&self.lifecycle);
            let in_flight = Arc::clone(&self.in_flight);
            tasks.spawn(async move {
                run_job(lifecycle, job).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            });
            self.set_jobs_gauge(tasks.len()).await;
        }
    }

    async fn register(&self, status: WorkerStatus) -> Result<(), EngineError> {
        let entry = WorkerEntry {
            worker_id: self.worker_id().clone(),
            status,
            last_heartbeat_ms: self.clock.epoch_ms(),
            current_jobs: self.in_flight.load(Ordering::SeqCst) as u32,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| EngineError::Fatal(format!("worker entry codec: {e}")))?;
        self.store
            .set_ex(&keys::worker_status(self.worker_id()), &json, self.heartbeat_ttl)
            .await?;
        Ok(())
    }

    fn spawn_heartbeat(&self) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let clock = self.clock.clone();
        let worker_id = self.worker_id().clone();
        let interval = self.heartbeat_interval;
        let ttl = self.heartbeat_ttl;
        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // immediate first tick is the registration
            loop {
                tick.tick().await;
                let entry = WorkerEntry {
                    worker_id: worker_id.clone(),
                    status: WorkerStatus::Active,
                    last_heartbeat_ms: clock.epoch_ms(),
                    current_jobs: in_flight.load(Ordering::SeqCst) as u32,
                };
                let Ok(json) = serde_json::to_string(&entry) else {
                    continue;
                };
                if let Err(err) = store
                    .set_ex(&keys::worker_status(&worker_id), &json, ttl)
                    .await
                {
                    tracing::warn!(worker = %worker_id, error = %err, "heartbeat failed");
                }
            }
        })
    }

    async fn set_jobs_gauge(&self, count: usize) {
        if let Err(err) = self
            .store
            .set(&keys::worker_jobs(self.worker_id()), &count.to_string())
            .await
        {
            tracing::debug!(worker = %self.worker_id(), error = %err, "jobs gauge not updated");
        }
    }
}

/// Handle one claimed job to completion, renewing its lease while it runs.
async fn run_job<S, R, D, C, G>(lifecycle: Arc<Lifecycle<S, R, D, C, G>>, mut job: Job)
where
    S: Store,
    R: SandboxRuntime,
    D: AgentDriver,
    C: Clock,
    G: IdGen,
{
    let queue = lifecycle.queue().clone();
    let renew_every = queue.stall_interval() / 3;
    let renewal = {
        let queue = queue.clone();
        let job_id = job.id.clone();
        let worker = lifecycle.worker_id().clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(renew_every.max(Duration::from_millis(100)));
            tick.tick().await;
            loop {
                tick.tick().await;
                if let Err(err) = queue.renew_lease(&job_id, &worker).await {
                    tracing::warn!(job = %job_id, error = %err, "lease renewal failed");
                }
            }
        })
    };

    let outcome = lifecycle.handle(&mut job).await;
    renewal.abort();

    match outcome {
        Ok(()) => {
            if let Err(err) = queue.complete(&job.id).await {
                tracing::warn!(job = %job.id, error = %err, "completion not recorded");
            }
        }
        Err(err) => {
            let reason = err.to_string();
            tracing::error!(job = %job.id, session = %job.session_id, error = %reason, "job failed");
            lifecycle.fail_session(&job.session_id, &reason).await;
            if let Err(err) = queue.fail(&mut job, &reason).await {
                tracing::warn!(job = %job.id, error = %err, "failure not recorded");
            }
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, prioritized work queue with at-least-once delivery.
//!
//! Layout: one ready list per priority lane, a job record per id, a lease
//! key per in-flight job, and sets for retrying, in-flight and dead jobs.
//!
//! Lane convention: lower priority number drains first (create/process = 1,
//! terminate = 2). Every fourth dequeue inverts the lane order, so a
//! saturated lane 1 cannot starve termination.
//!
//! Delivery is at-least-once: a claim is `lpop` + lease, and the stall scan
//! re-queues any in-flight job whose lease lapsed. Handlers must be
//! idempotent.

use crate::keys;
use otto_core::{Clock, Job, JobId, JobState, WorkerId};
use otto_store::{KeyTtl, Store, StoreError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Delivery attempts before a job is marked failed.
pub const MAX_ATTEMPTS: u32 = 3;

/// First retry delay; doubles per attempt.
const RETRY_BASE: Duration = Duration::from_secs(2);
/// Retry delay cap.
const RETRY_CAP: Duration = Duration::from_secs(60);

/// Every Nth dequeue polls the terminate lane first.
const FAIRNESS_CYCLE: u64 = 4;

/// Errors from queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Queue depth snapshot for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueLengths {
    pub ready: usize,
    pub active: usize,
    pub retry: usize,
    pub dead: usize,
}

impl QueueLengths {
    pub fn total_pending(&self) -> usize {
        self.ready + self.retry
    }
}

/// Work queue endpoint.
#[derive(Clone)]
pub struct WorkQueue<S: Store, C: Clock> {
    store: S,
    clock: C,
    stalled_interval: Duration,
    max_stalled: u32,
    polls: Arc<AtomicU64>,
}

impl<S: Store, C: Clock> WorkQueue<S, C> {
    pub fn new(store: S, clock: C, stalled_interval: Duration, max_stalled: u32) -> Self {
        Self {
            store,
            clock,
            stalled_interval,
            max_stalled,
            polls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn stall_interval(&self) -> Duration {
        self.stalled_interval
    }

    /// Persist the job record and append it to its ready lane.
    pub async fn enqueue(&self, job: &Job) -> Result<(), QueueError> {
        self.save(job).await?;
        self.store
            .rpush(&keys::queue_ready(job.priority), job.id.as_str())
            .await?;
        tracing::info!(job = %job.id, kind = %job.kind, session = %job.session_id, "job enqueued");
        Ok(())
    }

    /// Claim the next ready job for `worker`, or `None` when idle.
    ///
    /// Promotes due retries first, then polls the lanes in fairness order.
    pub async fn dequeue(&self, worker: &WorkerId) -> Result<Option<Job>, QueueError> {
        self.promote_due_retries().await?;

        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        let lanes: [u8; 2] = if poll % FAIRNESS_CYCLE == FAIRNESS_CYCLE - 1 {
            [2, 1]
        } else {
            [1, 2]
        };

        for lane in lanes {
            while let Some(raw_id) = self.store.lpop(&keys::queue_ready(lane)).await? {
                let id = JobId::new(raw_id);
                let mut job = match self.get(&id).await? {
                    Some(job) => job,
                    // Record gone (completed elsewhere or GC'd): skip
                    None => continue,
                };
                job.state = JobState::Active;
                job.attempts += 1;
                self.save(&job).await?;
                self.store.sadd(keys::QUEUE_ACTIVE, id.as_str()).await?;
                self.store
                    .set_ex(&keys::queue_lease(&id), worker.as_str(), self.stalled_interval)
                    .await?;
                tracing::debug!(job = %id, worker = %worker, attempt = job.attempts, "job claimed");
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    /// Return a claimed job to its ready lane without counting the
    /// delivery (e.g. a worker at its session cap declining work).
    pub async fn release(&self, job: &mut Job) -> Result<(), QueueError> {
        self.store.del(&keys::queue_lease(&job.id)).await?;
        self.store.srem(keys::QUEUE_ACTIVE, job.id.as_str()).await?;
        job.state = JobState::Ready;
        job.attempts = job.attempts.saturating_sub(1);
        self.save(job).await?;
        self.store
            .rpush(&keys::queue_ready(job.priority), job.id.as_str())
            .await?;
        Ok(())
    }

    /// Extend the claim on an in-flight job. Call at least once per
    /// stall interval while handling.
    pub async fn renew_lease(&self, id: &JobId, worker: &WorkerId) -> Result<(), QueueError> {
        self.store
            .set_ex(&keys::queue_lease(id), worker.as_str(), self.stalled_interval)
            .await?;
        Ok(())
    }

    /// Handler finished: completed jobs are garbage-collected.
    pub async fn complete(&self, id: &JobId) -> Result<(), QueueError> {
        self.store.del(&keys::queue_lease(id)).await?;
        self.store.srem(keys::QUEUE_ACTIVE, id.as_str()).await?;
        self.store.del(&keys::queue_job(id)).await?;
        tracing::debug!(job = %id, "job completed");
        Ok(())
    }

    /// Handler failed: schedule a retry with backoff, or mark the job
    /// failed once attempts are exhausted. Failed records are retained.
    pub async fn fail(&self, job: &mut Job, error: &str) -> Result<JobState, QueueError> {
        self.store.del(&keys::queue_lease(&job.id)).await?;
        self.store.srem(keys::QUEUE_ACTIVE, job.id.as_str()).await?;
        job.error = Some(error.to_string());

        if job.attempts >= MAX_ATTEMPTS {
            job.state = JobState::Failed;
            self.save(job).await?;
            tracing::warn!(job = %job.id, attempts = job.attempts, error, "job failed");
        } else {
            job.state = JobState::Retry;
            job.retry_at_ms = Some(self.clock.epoch_ms() + retry_delay(job.attempts).as_millis() as u64);
            self.save(job).await?;
            self.store.sadd(keys::QUEUE_RETRY, job.id.as_str()).await?;
            tracing::info!(job = %job.id, attempt = job.attempts, error, "job scheduled for retry");
        }
        Ok(job.state)
    }

    /// Record handler progress percent on the job (observability only).
    pub async fn report_progress(&self, id: &JobId, percent: u8) -> Result<(), QueueError> {
        if let Some(mut job) = self.get(id).await? {
            job.progress = percent.min(100);
            self.save(&job).await?;
        }
        Ok(())
    }

    pub async fn get(&self, id: &JobId) -> Result<Option<Job>, QueueError> {
        match self.store.get(&keys::queue_job(id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Re-queue in-flight jobs whose lease lapsed, dead-lettering after
    /// `max_stalled` rescues, and recover claim-crash orphans.
    pub async fn reap_stalled(&self) -> Result<u32, QueueError> {
        let mut rescued = 0;

        for raw_id in self.store.smembers(keys::QUEUE_ACTIVE).await? {
            let id = JobId::new(raw_id);
            if self.store.ttl(&keys::queue_lease(&id)).await? != KeyTtl::Missing {
                continue;
            }
            self.store.srem(keys::QUEUE_ACTIVE, id.as_str()).await?;
            let mut job = match self.get(&id).await? {
                Some(job) => job,
                None => continue,
            };
            job.stalls += 1;
            if job.stalls > self.max_stalled {
                job.state = JobState::Dead;
                self.save(&job).await?;
                self.store.sadd(keys::QUEUE_DEAD, id.as_str()).await?;
                tracing::warn!(job = %id, stalls = job.stalls, "job dead-lettered");
            } else {
                job.state = JobState::Ready;
                self.save(&job).await?;
                self.store
                    .rpush(&keys::queue_ready(job.priority), id.as_str())
                    .await?;
                rescued += 1;
                tracing::info!(job = %id, stalls = job.stalls, "stalled job re-queued");
            }
        }

        rescued += self.requeue_orphans().await?;
        Ok(rescued)
    }

    /// Queue depths for metrics.
    pub async fn lengths(&self) -> Result<QueueLengths, QueueError> {
        let ready = self.store.llen(&keys::queue_ready(1)).await?
            + self.store.llen(&keys::queue_ready(2)).await?;
        Ok(QueueLengths {
            ready,
            active: self.store.scard(keys::QUEUE_ACTIVE).await?,
            retry: self.store.scard(keys::QUEUE_RETRY).await?,
            dead: self.store.scard(keys::QUEUE_DEAD).await?,
        })
    }

    async fn save(&self, job: &Job) -> Result<(), QueueError> {
        let json = serde_json::to_string(job)?;
        self.store.set(&keys::queue_job(&job.id), &json).await?;
        Ok(())
    }

    /// Move retry-set jobs whose backoff deadline passed back to ready.
    async fn promote_due_retries(&self) -> Result<(), QueueError> {
        let now = self.clock.epoch_ms();
        for raw_id in self.store.smembers(keys::QUEUE_RETRY).await? {
            let id = JobId::new(raw_id);
            let mut job = match self.get(&id).await? {
                Some(job) => job,
                None => {
                    self.store.srem(keys::QUEUE_RETRY, id.as_str()).await?;
                    continue;
                }
            };
            if job.retry_at_ms.is_some_and(|at| at <= now) {
                job.state = JobState::Ready;
                job.retry_at_ms = None;
                self.save(&job).await?;
                self.store.srem(keys::QUEUE_RETRY, id.as_str()).await?;
                self.store
                    .rpush(&keys::queue_ready(job.priority), id.as_str())
                    .await?;
            }
        }
        Ok(())
    }

    /// Recover jobs lost in the claim window (popped from a lane, crash
    /// before the lease was written): record says Ready but no lane holds
    /// the id.
    async fn requeue_orphans(&self) -> Result<u32, QueueError> {
        let mut laned: HashSet<String> = HashSet::new();
        for lane in [1u8, 2] {
            laned.extend(self.store.lrange(&keys::queue_ready(lane), 0, -1).await?);
        }
        let retrying: HashSet<String> =
            self.store.smembers(keys::QUEUE_RETRY).await?.into_iter().collect();

        let mut rescued = 0;
        let cutoff = self.clock.epoch_ms().saturating_sub(self.stalled_interval.as_millis() as u64);
        for key in self.store.keys(keys::QUEUE_JOB_PATTERN).await? {
            let json = match self.store.get(&key).await? {
                Some(json) => json,
                None => continue,
            };
            let job: Job = match serde_json::from_str(&json) {
                Ok(job) => job,
                Err(_) => continue,
            };
            if job.state != JobState::Ready
                || laned.contains(job.id.as_str())
                || retrying.contains(job.id.as_str())
                || job.enqueued_at_ms > cutoff
            {
                continue;
            }
            self.store
                .rpush(&keys::queue_ready(job.priority), job.id.as_str())
                .await?;
            rescued += 1;
            tracing::info!(job = %job.id, "orphaned ready job re-queued");
        }
        Ok(rescued)
    }
}

/// Backoff before retry `attempt` (1-based): 2s, 4s, 8s … capped at 60s.
fn retry_delay(attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(16);
    RETRY_BASE.saturating_mul(factor).min(RETRY_CAP)
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

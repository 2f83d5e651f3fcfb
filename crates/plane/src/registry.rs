// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable session records and their derived streams.

use crate::keys;
use otto_core::{
    Clock, IdGen, LogEntry, LogLevel, MessageEvent, SandboxId, Session, SessionId, SessionStatus,
    ShortUuidGen, WorkerId, SESSION_LOG_CAP,
};
use otto_store::{KeyTtl, Store, StoreError};
use std::time::Duration;
use thiserror::Error;

/// Errors from registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Partial update applied to a session record.
///
/// Absent fields are left untouched; the registry re-reads the record and
/// rewrites it with the residual TTL preserved.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub worker_id: Option<WorkerId>,
    pub sandbox_id: Option<SandboxId>,
    pub desktop_port: Option<u16>,
    pub tool_port: Option<u16>,
    pub error: Option<String>,
}

impl SessionPatch {
    pub fn status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn worker(mut self, worker_id: WorkerId) -> Self {
        self.worker_id = Some(worker_id);
        self
    }

    pub fn sandbox(mut self, sandbox_id: SandboxId) -> Self {
        self.sandbox_id = Some(sandbox_id);
        self
    }

    pub fn desktop_port(mut self, port: u16) -> Self {
        self.desktop_port = Some(port);
        self
    }

    pub fn tool_port(mut self, port: u16) -> Self {
        self.tool_port = Some(port);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}

/// Session registry over the coordination store.
///
/// The record key carries the session TTL; every derived stream is re-synced
/// to the record's residual TTL on append, so an expiring record takes its
/// streams with it.
#[derive(Clone)]
pub struct SessionRegistry<S: Store, C: Clock, G: IdGen = ShortUuidGen> {
    store: S,
    clock: C,
    idgen: G,
    default_ttl: Duration,
}

impl<S: Store, C: Clock, G: IdGen> SessionRegistry<S, C, G> {
    pub fn new(store: S, clock: C, idgen: G, default_ttl: Duration) -> Self {
        Self {
            store,
            clock,
            idgen,
            default_ttl,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Create a session record in `Initializing` and index it.
    pub async fn create(
        &self,
        initial_prompt: &str,
        environment: &str,
        ttl: Option<Duration>,
    ) -> Result<Session, RegistryError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let id = SessionId::new(self.idgen.next());
        let session = Session::new(id.clone(), initial_prompt, environment, ttl, &self.clock);

        let json = serde_json::to_string(&session)?;
        self.store.set_ex(&keys::session(&id), &json, ttl).await?;
        self.store.sadd(keys::SESSIONS_INDEX, id.as_str()).await?;
        self.store.incr(keys::METRICS_TOTAL_SESSIONS).await?;

        tracing::info!(session = %id, environment, "session created");
        Ok(session)
    }

    pub async fn get(&self, id: &SessionId) -> Result<Option<Session>, RegistryError> {
        match self.store.get(&keys::session(id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Apply `patch`, preserving the record's residual TTL.
    ///
    /// Returns the updated record, or `None` when the session is gone. A
    /// worker change moves the id between `sessions:by-worker` sets.
    pub async fn update(
        &self,
        id: &SessionId,
        patch: SessionPatch,
    ) -> Result<Option<Session>, RegistryError> {
        let key = keys::session(id);
        let mut session = match self.get(id).await? {
            Some(s) => s,
            None => return Ok(None),
        };
        let residual = match self.store.ttl(&key).await? {
            KeyTtl::Remaining(d) => d,
            KeyTtl::NoExpiry => self.default_ttl,
            KeyTtl::Missing => return Ok(None),
        };

        if let Some(status) = patch.status {
            session.status = status;
        }
        if let Some(new_worker) = patch.worker_id {
            if session.worker_id.as_ref() != Some(&new_worker) {
                if let Some(old) = &session.worker_id {
                    self.store
                        .srem(&keys::sessions_by_worker(old), id.as_str())
                        .await?;
                }
                self.store
                    .sadd(&keys::sessions_by_worker(&new_worker), id.as_str())
                    .await?;
                session.worker_id = Some(new_worker);
            }
        }
        if let Some(sandbox_id) = patch.sandbox_id {
            session.sandbox_id = Some(sandbox_id);
        }
        if let Some(port) = patch.desktop_port {
            session.desktop_port = Some(port);
        }
        if let Some(port) = patch.tool_port {
            session.tool_port = Some(port);
        }
        if let Some(error) = patch.error {
            session.error = Some(error);
        }
        session.touch(&self.clock);

        let json = serde_json::to_string(&session)?;
        self.store.set_ex(&key, &json, residual).await?;
        Ok(Some(session))
    }

    pub async fn set_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
        error: Option<String>,
    ) -> Result<Option<Session>, RegistryError> {
        let mut patch = SessionPatch::default().status(status);
        if let Some(message) = error {
            patch = patch.error(message);
        }
        self.update(id, patch).await
    }

    /// Remove the record, its derived streams and its index entries.
    pub async fn delete(&self, id: &SessionId) -> Result<bool, RegistryError> {
        let session = self.get(id).await?;
        if let Some(worker) = session.as_ref().and_then(|s| s.worker_id.as_ref()) {
            self.store
                .srem(&keys::sessions_by_worker(worker), id.as_str())
                .await?;
        }
        self.store.srem(keys::SESSIONS_INDEX, id.as_str()).await?;
        self.store.del(&keys::session_messages(id)).await?;
        self.store.del(&keys::session_logs(id)).await?;
        self.store.del(&keys::session_context(id)).await?;
        let existed = self.store.del(&keys::session(id)).await?;
        if existed {
            tracing::info!(session = %id, "session deleted");
        }
        Ok(existed)
    }

    pub async fn append_message(
        &self,
        id: &SessionId,
        event: &MessageEvent,
    ) -> Result<(), RegistryError> {
        let json = serde_json::to_string(event)?;
        self.store.rpush(&keys::session_messages(id), &json).await?;
        self.resync_stream_ttl(id, &keys::session_messages(id))
            .await?;
        Ok(())
    }

    /// Last `last_n` stored events (all when `None`), oldest first.
    pub async fn read_messages(
        &self,
        id: &SessionId,
        last_n: Option<usize>,
    ) -> Result<Vec<MessageEvent>, RegistryError> {
        let start = match last_n {
            Some(n) => -(n as isize),
            None => 0,
        };
        let raw = self
            .store
            .lrange(&keys::session_messages(id), start, -1)
            .await?;
        Ok(raw
            .iter()
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect())
    }

    pub async fn append_log(
        &self,
        id: &SessionId,
        level: LogLevel,
        message: &str,
        meta: Option<serde_json::Value>,
    ) -> Result<(), RegistryError> {
        let mut entry = LogEntry::new(self.clock.epoch_ms(), level, message);
        if let Some(meta) = meta {
            entry = entry.with_meta(meta);
        }
        let key = keys::session_logs(id);
        let json = serde_json::to_string(&entry)?;
        self.store.rpush(&key, &json).await?;
        // Keep only the newest SESSION_LOG_CAP entries
        self.store
            .ltrim(&key, -(SESSION_LOG_CAP as isize), -1)
            .await?;
        self.resync_stream_ttl(id, &key).await?;
        Ok(())
    }

    pub async fn read_logs(
        &self,
        id: &SessionId,
        limit: Option<usize>,
    ) -> Result<Vec<LogEntry>, RegistryError> {
        let start = match limit {
            Some(n) => -(n as isize),
            None => 0,
        };
        let raw = self.store.lrange(&keys::session_logs(id), start, -1).await?;
        Ok(raw
            .iter()
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect())
    }

    /// Store the agent's opaque context blob.
    pub async fn save_context(&self, id: &SessionId, blob: &str) -> Result<(), RegistryError> {
        let key = keys::session_context(id);
        self.store.set(&key, blob).await?;
        self.resync_stream_ttl(id, &key).await?;
        Ok(())
    }

    pub async fn load_context(&self, id: &SessionId) -> Result<Option<String>, RegistryError> {
        Ok(self.store.get(&keys::session_context(id)).await?)
    }

    /// Non-terminated sessions, newest first; returns the page and the
    /// total count before paging.
    pub async fn list_active(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Session>, usize), RegistryError> {
        let ids = self.store.smembers(keys::SESSIONS_INDEX).await?;
        let mut sessions = Vec::new();
        for id in ids {
            let id = SessionId::new(id);
            match self.get(&id).await? {
                Some(s) if s.status != SessionStatus::Terminated => sessions.push(s),
                // Expired record still indexed: drop the stale entry
                None => {
                    self.store.srem(keys::SESSIONS_INDEX, id.as_str()).await?;
                }
                _ => {}
            }
        }
        sessions.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        let total = sessions.len();
        let page = sessions.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    /// Count of non-terminated sessions.
    pub async fn active_count(&self) -> Result<usize, RegistryError> {
        let (_, total) = self.list_active(usize::MAX, 0).await?;
        Ok(total)
    }

    /// Monotonic all-time session counter.
    pub async fn total_sessions(&self) -> Result<i64, RegistryError> {
        Ok(self
            .store
            .get(keys::METRICS_TOTAL_SESSIONS)
            .await?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0))
    }

    /// Sessions owned by a worker.
    pub async fn sessions_for_worker(
        &self,
        worker: &WorkerId,
    ) -> Result<Vec<SessionId>, RegistryError> {
        Ok(self
            .store
            .smembers(&keys::sessions_by_worker(worker))
            .await?
            .into_iter()
            .map(SessionId::new)
            .collect())
    }

    /// Align a derived stream's TTL with the record's residual TTL.
    async fn resync_stream_ttl(&self, id: &SessionId, key: &str) -> Result<(), RegistryError> {
        if let KeyTtl::Remaining(residual) = self.store.ttl(&keys::session(id)).await? {
            self.store.expire(key, residual).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

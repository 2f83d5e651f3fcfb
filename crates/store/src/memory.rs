// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::kv::{KeyTtl, Store, StoreError, Subscription};
use async_trait::async_trait;
use otto_core::{Clock, SystemClock};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
    List(VecDeque<String>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Set(_) => "set",
            Value::List(_) => "list",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at_ms: Option<u64>,
}

struct State {
    entries: HashMap<String, Entry>,
    channels: HashMap<String, broadcast::Sender<Vec<u8>>>,
    fail_publish: bool,
}

/// In-memory store with real TTL semantics, driven by a `Clock`.
///
/// Expiry is enforced lazily: an expired entry reads as missing and is
/// dropped on the next access or key scan, matching what callers can
/// observe of a real store.
#[derive(Clone)]
pub struct MemoryStore<C: Clock = SystemClock> {
    clock: C,
    inner: Arc<Mutex<State>>,
}

impl MemoryStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            inner: Arc::new(Mutex::new(State {
                entries: HashMap::new(),
                channels: HashMap::new(),
                fail_publish: false,
            })),
        }
    }

    /// Make subsequent `publish` calls fail with a transport error.
    pub fn set_fail_publish(&self, fail: bool) {
        self.inner.lock().fail_publish = fail;
    }

    fn now(&self) -> u64 {
        self.clock.epoch_ms()
    }

    fn wrong_type(key: &str, found: &Value) -> StoreError {
        StoreError::new(format!("wrong type for {key}: {}", found.type_name()))
    }
}

fn live_entry<'a>(state: &'a mut State, key: &str, now: u64) -> Option<&'a mut Entry> {
    let expired = matches!(
        state.entries.get(key),
        Some(entry) if entry.expires_at_ms.is_some_and(|at| at <= now)
    );
    if expired {
        state.entries.remove(key);
        return None;
    }
    state.entries.get_mut(key)
}

/// Redis-style `*` glob.
fn glob_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == text;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0;
    let last = parts.len() - 1;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !text.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if i == last {
            return text.len() >= pos + part.len() && text[pos..].ends_with(part);
        } else {
            match text[pos..].find(part) {
                Some(idx) => pos += idx + part.len(),
                None => return false,
            }
        }
    }
    true
}

/// Resolve redis-style inclusive range with negative indices.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let n = len as isize;
    if n == 0 {
        return None;
    }
    let mut s = if start < 0 { n + start } else { start };
    let mut e = if stop < 0 { n + stop } else { stop };
    if s < 0 {
        s = 0;
    }
    if e >= n {
        e = n - 1;
    }
    if s > e || s >= n || e < 0 {
        return None;
    }
    Some((s as usize, e as usize))
}

#[async_trait]
impl<C: Clock> Store for MemoryStore<C> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        match live_entry(&mut state, key, now) {
            Some(entry) => match &entry.value {
                Value::Str(s) => Ok(Some(s.clone())),
                other => Err(Self::wrong_type(key, other)),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut state = self.inner.lock();
        state.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at_ms: None,
            },
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires = self.now() + ttl.as_millis() as u64;
        let mut state = self.inner.lock();
        state.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at_ms: Some(expires),
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        if live_entry(&mut state, key, now).is_some() {
            return Ok(false);
        }
        state.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at_ms: None,
            },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        let existed = live_entry(&mut state, key, now).is_some();
        state.entries.remove(key);
        Ok(existed)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        let (current, expires) = match live_entry(&mut state, key, now) {
            Some(entry) => match &entry.value {
                Value::Str(s) => {
                    let n = s
                        .parse::<i64>()
                        .map_err(|_| StoreError::new(format!("not an integer at {key}")))?;
                    (n, entry.expires_at_ms)
                }
                other => return Err(Self::wrong_type(key, other)),
            },
            None => (0, None),
        };
        let next = current + 1;
        state.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(next.to_string()),
                expires_at_ms: expires,
            },
        );
        Ok(next)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        Ok(match live_entry(&mut state, key, now) {
            None => KeyTtl::Missing,
            Some(entry) => match entry.expires_at_ms {
                None => KeyTtl::NoExpiry,
                Some(at) => KeyTtl::Remaining(Duration::from_millis(at.saturating_sub(now))),
            },
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = self.now();
        let expires = now + ttl.as_millis() as u64;
        let mut state = self.inner.lock();
        match live_entry(&mut state, key, now) {
            Some(entry) => {
                entry.expires_at_ms = Some(expires);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        match live_entry(&mut state, key, now) {
            Some(entry) => match &mut entry.value {
                Value::Set(set) => Ok(set.insert(member.to_string())),
                other => Err(Self::wrong_type(key, other)),
            },
            None => {
                let mut set = BTreeSet::new();
                set.insert(member.to_string());
                state.entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Set(set),
                        expires_at_ms: None,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        let (removed, now_empty) = match live_entry(&mut state, key, now) {
            Some(entry) => match &mut entry.value {
                Value::Set(set) => {
                    let removed = set.remove(member);
                    (removed, set.is_empty())
                }
                other => return Err(Self::wrong_type(key, other)),
            },
            None => (false, false),
        };
        if now_empty {
            state.entries.remove(key);
        }
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        match live_entry(&mut state, key, now) {
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.iter().cloned().collect()),
                other => Err(Self::wrong_type(key, other)),
            },
            None => Ok(Vec::new()),
        }
    }

    async fn scard(&self, key: &str) -> Result<usize, StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        match live_entry(&mut state, key, now) {
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.len()),
                other => Err(Self::wrong_type(key, other)),
            },
            None => Ok(0),
        }
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        match live_entry(&mut state, key, now) {
            Some(entry) => match &mut entry.value {
                Value::List(list) => {
                    list.push_back(value.to_string());
                    Ok(list.len())
                }
                other => Err(Self::wrong_type(key, other)),
            },
            None => {
                let mut list = VecDeque::new();
                list.push_back(value.to_string());
                state.entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::List(list),
                        expires_at_ms: None,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        let (popped, now_empty) = match live_entry(&mut state, key, now) {
            Some(entry) => match &mut entry.value {
                Value::List(list) => {
                    let popped = list.pop_front();
                    (popped, list.is_empty())
                }
                other => return Err(Self::wrong_type(key, other)),
            },
            None => (None, false),
        };
        if now_empty {
            state.entries.remove(key);
        }
        Ok(popped)
    }

    async fn lrem(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        let (removed, now_empty) = match live_entry(&mut state, key, now) {
            Some(entry) => match &mut entry.value {
                Value::List(list) => {
                    let before = list.len();
                    list.retain(|v| v != value);
                    (before - list.len(), list.is_empty())
                }
                other => return Err(Self::wrong_type(key, other)),
            },
            None => (0, false),
        };
        if now_empty {
            state.entries.remove(key);
        }
        Ok(removed)
    }

    async fn lrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        match live_entry(&mut state, key, now) {
            Some(entry) => match &entry.value {
                Value::List(list) => Ok(match resolve_range(list.len(), start, stop) {
                    Some((s, e)) => list.iter().skip(s).take(e - s + 1).cloned().collect(),
                    None => Vec::new(),
                }),
                other => Err(Self::wrong_type(key, other)),
            },
            None => Ok(Vec::new()),
        }
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        let drop_key = match live_entry(&mut state, key, now) {
            Some(entry) => match &mut entry.value {
                Value::List(list) => match resolve_range(list.len(), start, stop) {
                    Some((s, e)) => {
                        let kept: VecDeque<String> =
                            list.iter().skip(s).take(e - s + 1).cloned().collect();
                        *list = kept;
                        false
                    }
                    None => true,
                },
                other => return Err(Self::wrong_type(key, other)),
            },
            None => false,
        };
        if drop_key {
            state.entries.remove(key);
        }
        Ok(())
    }

    async fn llen(&self, key: &str) -> Result<usize, StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        match live_entry(&mut state, key, now) {
            Some(entry) => match &entry.value {
                Value::List(list) => Ok(list.len()),
                other => Err(Self::wrong_type(key, other)),
            },
            None => Ok(0),
        }
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let now = self.now();
        let mut state = self.inner.lock();
        state
            .entries
            .retain(|_, entry| !entry.expires_at_ms.is_some_and(|at| at <= now));
        let mut matched: Vec<String> = state
            .entries
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        matched.sort();
        Ok(matched)
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), StoreError> {
        let sender = {
            let state = self.inner.lock();
            if state.fail_publish {
                return Err(StoreError::new("publish: injected failure"));
            }
            state.channels.get(channel).cloned()
        };
        if let Some(sender) = sender {
            // No receivers is fine; matches fire-and-forget publish
            let _ = sender.send(payload.to_vec());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        let mut receiver = {
            let mut state = self.inner.lock();
            state
                .channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(256).0)
                .subscribe()
        };
        let (tx, rx) = mpsc::channel(256);
        let forwarder = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(Subscription::new(rx, forwarder))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

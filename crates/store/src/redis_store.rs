// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis-backed coordination store.

use crate::kv::{KeyTtl, Store, StoreError, Subscription};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

/// Maximum attempts per operation (first try included).
const MAX_ATTEMPTS: u32 = 5;
/// First retry delay; doubles per attempt.
const BASE_DELAY: Duration = Duration::from_millis(100);
/// Retry delay cap.
const MAX_DELAY: Duration = Duration::from_secs(2);

/// Backoff delay before retry `attempt` (1-based).
fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(16);
    BASE_DELAY.saturating_mul(factor).min(MAX_DELAY)
}

fn is_transient(err: &redis::RedisError) -> bool {
    err.is_io_error()
        || err.is_timeout()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
}

/// Coordination store over a single Redis instance.
///
/// Operations share a multiplexed connection; each subscription holds its
/// own pub/sub connection.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to the store at a `redis://` URL.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::new(format!("open {url}: {e}")))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| StoreError::new(format!("connect: {e}")))?;
        Ok(Self { client, conn })
    }

    /// Run `f` with transient-failure retries and capped backoff.
    async fn retry<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, StoreError>
    where
        F: FnMut(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match f(self.conn.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) && attempt < MAX_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "store operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(StoreError::new(format!("{op}: {err}"))),
            }
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.retry("get", |mut conn| async move {
            conn.get::<_, Option<String>>(key).await
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.retry("set", |mut conn| async move {
            conn.set::<_, _, ()>(key, value).await
        })
        .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let secs = ttl.as_secs().max(1);
        self.retry("set_ex", |mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value, secs).await
        })
        .await
    }

    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        self.retry("set_nx", |mut conn| async move {
            conn.set_nx::<_, _, bool>(key, value).await
        })
        .await
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.retry("del", |mut conn| async move {
            conn.del::<_, i64>(key).await
        })
        .await
        .map(|n| n > 0)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.retry("incr", |mut conn| async move {
            conn.incr::<_, _, i64>(key, 1).await
        })
        .await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let secs = self
            .retry("ttl", |mut conn| async move {
                conn.ttl::<_, i64>(key).await
            })
            .await?;
        Ok(match secs {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::NoExpiry,
            n => KeyTtl::Remaining(Duration::from_secs(n.max(0) as u64)),
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let secs = ttl.as_secs().max(1) as i64;
        self.retry("expire", |mut conn| async move {
            conn.expire::<_, bool>(key, secs).await
        })
        .await
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.retry("sadd", |mut conn| async move {
            conn.sadd::<_, _, i64>(key, member).await
        })
        .await
        .map(|n| n > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.retry("srem", |mut conn| async move {
            conn.srem::<_, _, i64>(key, member).await
        })
        .await
        .map(|n| n > 0)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.retry("smembers", |mut conn| async move {
            conn.smembers::<_, Vec<String>>(key).await
        })
        .await
    }

    async fn scard(&self, key: &str) -> Result<usize, StoreError> {
        self.retry("scard", |mut conn| async move {
            conn.scard::<_, usize>(key).await
        })
        .await
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        self.retry("rpush", |mut conn| async move {
            conn.rpush::<_, _, usize>(key, value).await
        })
        .await
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.retry("lpop", |mut conn| async move {
            conn.lpop::<_, Option<String>>(key, None).await
        })
        .await
    }

    async fn lrem(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        self.retry("lrem", |mut conn| async move {
            conn.lrem::<_, _, usize>(key, 0, value).await
        })
        .await
    }

    async fn lrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        self.retry("lrange", |mut conn| async move {
            conn.lrange::<_, Vec<String>>(key, start, stop).await
        })
        .await
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError> {
        self.retry("ltrim", |mut conn| async move {
            conn.ltrim::<_, ()>(key, start, stop).await
        })
        .await
    }

    async fn llen(&self, key: &str) -> Result<usize, StoreError> {
        self.retry("llen", |mut conn| async move {
            conn.llen::<_, usize>(key).await
        })
        .await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.retry("keys", |mut conn| async move {
            conn.keys::<_, Vec<String>>(pattern).await
        })
        .await
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), StoreError> {
        self.retry("publish", |mut conn| async move {
            conn.publish::<_, _, ()>(channel, payload).await
        })
        .await
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| StoreError::new(format!("subscribe {channel}: {e}")))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| StoreError::new(format!("subscribe {channel}: {e}")))?;

        let (tx, rx) = mpsc::channel(256);
        let forwarder = tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload = msg.get_payload_bytes().to_vec();
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });
        Ok(Subscription::new(rx, forwarder))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.retry("ping", |mut conn| async move {
            redis::cmd("PING").query_async::<String>(&mut conn).await
        })
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
#[path = "redis_store_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stale sandbox sweep.

use crate::runtime::{SandboxError, SandboxRuntime};
use std::time::Duration;

/// Stop grace for reaped containers; nothing inside is worth waiting for.
const REAP_STOP_GRACE: Duration = Duration::from_secs(2);

/// Remove every managed container older than `age`.
///
/// Crash cleanup of last resort: a worker death can leave a container
/// running with no owning session. Returns the number removed; per-container
/// failures are logged, never propagated.
pub async fn reap_stale<R: SandboxRuntime>(
    runtime: &R,
    now_ms: u64,
    age: Duration,
) -> Result<u32, SandboxError> {
    let cutoff = now_ms.saturating_sub(age.as_millis() as u64);
    let mut removed = 0;

    for sandbox in runtime.list_managed().await? {
        if sandbox.created_at_ms > cutoff {
            continue;
        }
        if let Err(err) = runtime.stop(&sandbox.sandbox_id, REAP_STOP_GRACE).await {
            tracing::warn!(sandbox = %sandbox.sandbox_id, error = %err, "stale stop failed");
        }
        match runtime.remove(&sandbox.sandbox_id).await {
            Ok(()) => {
                removed += 1;
                tracing::info!(
                    sandbox = %sandbox.sandbox_id,
                    session = ?sandbox.session_id,
                    "stale sandbox removed"
                );
            }
            Err(err) => {
                tracing::warn!(sandbox = %sandbox.sandbox_id, error = %err, "stale remove failed");
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
#[path = "reap_tests.rs"]
mod tests;

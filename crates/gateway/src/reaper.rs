// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background reconciliation on the api process.
//!
//! Ports: allocator keys whose session is gone or Terminated are freed
//! (the lease TTL provides correctness even without this pass). Sandboxes:
//! containers older than the stale age are removed. The queue's stall scan
//! also runs here so a fleet with no live worker still rescues jobs.

use crate::state::AppState;
use otto_core::{Clock, IdGen, SessionStatus};
use otto_sandbox::{reap_stale, SandboxRuntime};
use otto_store::Store;
use tokio::task::JoinHandle;

/// Sandbox sweeps run every Nth port-reclaim tick.
const SANDBOX_SWEEP_EVERY: u32 = 10;

/// Spawn the periodic reconciliation task.
pub fn spawn_reapers<S, R, C, G>(state: AppState<S, R, C, G>) -> JoinHandle<()>
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(state.config.reclaim_interval);
        tick.tick().await; // first tick is immediate; nothing to reap yet
        let mut ticks: u32 = 0;

        loop {
            tick.tick().await;
            ticks = ticks.wrapping_add(1);
            run_reap_cycle(&state, ticks % SANDBOX_SWEEP_EVERY == 0).await;
        }
    })
}

/// One reconciliation pass; exposed for the integration specs.
pub async fn run_reap_cycle<S, R, C, G>(state: &AppState<S, R, C, G>, sweep_sandboxes: bool)
where
    S: Store,
    R: SandboxRuntime,
    C: Clock,
    G: IdGen,
{
    let registry = state.registry.clone();
    let is_live = |sid| {
        let registry = registry.clone();
        async move {
            matches!(
                registry.get(&sid).await,
                Ok(Some(session)) if session.status != SessionStatus::Terminated
            )
        }
    };

    if let Err(err) = state.desktop_ports.reap(&is_live).await {
        tracing::warn!(error = %err, "desktop port reap failed");
    }
    if let Err(err) = state.tool_ports.reap(&is_live).await {
        tracing::warn!(error = %err, "tool port reap failed");
    }
    if let Err(err) = state.queue.reap_stalled().await {
        tracing::warn!(error = %err, "queue stall scan failed");
    }

    if sweep_sandboxes {
        if let Err(err) = reap_stale(
            &state.runtime,
            state.clock.epoch_ms(),
            state.config.sandbox_stale_age,
        )
        .await
        {
            tracing::warn!(error = %err, "stale sandbox sweep failed");
        }
    }
}

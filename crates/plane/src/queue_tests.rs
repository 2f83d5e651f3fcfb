// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use otto_core::{FakeClock, JobKind, JobPayload, SessionId};
use otto_store::MemoryStore;

const STALL: Duration = Duration::from_secs(30);

type TestQueue = WorkQueue<MemoryStore<FakeClock>, FakeClock>;

fn queue() -> (TestQueue, MemoryStore<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    let store = MemoryStore::with_clock(clock.clone());
    let queue = WorkQueue::new(store.clone(), clock.clone(), STALL, 3);
    (queue, store, clock)
}

fn job(queue_clock: &FakeClock, id: &str, kind: JobKind) -> Job {
    let payload = match kind {
        JobKind::CreateSession => JobPayload::Create,
        JobKind::ProcessMessage => JobPayload::Process {
            content: "prompt".into(),
            timestamp_ms: 1,
        },
        JobKind::TerminateSession => JobPayload::Terminate,
    };
    Job::new(
        JobId::new(id),
        kind,
        SessionId::new("s-1"),
        payload,
        queue_clock.epoch_ms(),
    )
}

fn worker() -> WorkerId {
    WorkerId::new("w-1")
}

#[tokio::test]
async fn enqueue_dequeue_roundtrip() {
    let (queue, _, clock) = queue();
    queue
        .enqueue(&job(&clock, "j-1", JobKind::CreateSession))
        .await
        .unwrap();

    let claimed = queue.dequeue(&worker()).await.unwrap().unwrap();
    assert_eq!(claimed.id, JobId::new("j-1"));
    assert_eq!(claimed.state, JobState::Active);
    assert_eq!(claimed.attempts, 1);

    assert!(queue.dequeue(&worker()).await.unwrap().is_none());
}

#[tokio::test]
async fn lane_one_drains_before_lane_two() {
    let (queue, _, clock) = queue();
    queue
        .enqueue(&job(&clock, "j-term", JobKind::TerminateSession))
        .await
        .unwrap();
    queue
        .enqueue(&job(&clock, "j-create", JobKind::CreateSession))
        .await
        .unwrap();

    let first = queue.dequeue(&worker()).await.unwrap().unwrap();
    let second = queue.dequeue(&worker()).await.unwrap().unwrap();
    assert_eq!(first.id, JobId::new("j-create"));
    assert_eq!(second.id, JobId::new("j-term"));
}

#[tokio::test]
async fn terminate_lane_cannot_starve() {
    let (queue, _, clock) = queue();
    // A standing supply of lane-1 work
    for i in 0..8 {
        queue
            .enqueue(&job(&clock, &format!("j-{i}"), JobKind::ProcessMessage))
            .await
            .unwrap();
    }
    queue
        .enqueue(&job(&clock, "j-term", JobKind::TerminateSession))
        .await
        .unwrap();

    let mut claimed = Vec::new();
    for _ in 0..5 {
        claimed.push(queue.dequeue(&worker()).await.unwrap().unwrap().id);
    }
    // The fairness poll drains the terminate lane within the first cycle
    assert!(claimed.contains(&JobId::new("j-term")));
}

#[tokio::test]
async fn complete_garbage_collects_the_record() {
    let (queue, store, clock) = queue();
    queue
        .enqueue(&job(&clock, "j-1", JobKind::CreateSession))
        .await
        .unwrap();
    let claimed = queue.dequeue(&worker()).await.unwrap().unwrap();

    queue.complete(&claimed.id).await.unwrap();

    assert!(queue.get(&claimed.id).await.unwrap().is_none());
    assert_eq!(store.scard(keys::QUEUE_ACTIVE).await.unwrap(), 0);
    assert_eq!(queue.lengths().await.unwrap(), QueueLengths::default());
}

#[tokio::test]
async fn failure_retries_with_backoff_then_fails() {
    let (queue, _, clock) = queue();
    queue
        .enqueue(&job(&clock, "j-1", JobKind::CreateSession))
        .await
        .unwrap();

    // Attempt 1 fails: retry in 2s
    let mut claimed = queue.dequeue(&worker()).await.unwrap().unwrap();
    assert_eq!(queue.fail(&mut claimed, "boom").await.unwrap(), JobState::Retry);

    // Not due yet
    assert!(queue.dequeue(&worker()).await.unwrap().is_none());
    clock.advance(Duration::from_secs(3));

    // Attempt 2 fails: retry in 4s
    let mut claimed = queue.dequeue(&worker()).await.unwrap().unwrap();
    assert_eq!(claimed.attempts, 2);
    assert_eq!(queue.fail(&mut claimed, "boom").await.unwrap(), JobState::Retry);
    clock.advance(Duration::from_secs(5));

    // Attempt 3 fails: out of attempts, record retained
    let mut claimed = queue.dequeue(&worker()).await.unwrap().unwrap();
    assert_eq!(claimed.attempts, MAX_ATTEMPTS);
    assert_eq!(queue.fail(&mut claimed, "boom").await.unwrap(), JobState::Failed);

    clock.advance(Duration::from_secs(120));
    assert!(queue.dequeue(&worker()).await.unwrap().is_none());
    let record = queue.get(&JobId::new("j-1")).await.unwrap().unwrap();
    assert_eq!(record.state, JobState::Failed);
    assert_eq!(record.error.as_deref(), Some("boom"));
}

#[tokio::test]
async fn retry_backoff_is_not_due_early() {
    let (queue, _, clock) = queue();
    queue
        .enqueue(&job(&clock, "j-1", JobKind::CreateSession))
        .await
        .unwrap();
    let mut claimed = queue.dequeue(&worker()).await.unwrap().unwrap();
    queue.fail(&mut claimed, "boom").await.unwrap();

    clock.advance(Duration::from_millis(1_999));
    assert!(queue.dequeue(&worker()).await.unwrap().is_none());

    clock.advance(Duration::from_millis(2));
    assert!(queue.dequeue(&worker()).await.unwrap().is_some());
}

#[tokio::test]
async fn stalled_job_is_requeued_until_dead() {
    let (queue, _, clock) = queue();
    queue
        .enqueue(&job(&clock, "j-1", JobKind::CreateSession))
        .await
        .unwrap();

    for stall in 1..=3u32 {
        let claimed = queue.dequeue(&worker()).await.unwrap().unwrap();
        assert_eq!(claimed.stalls, stall - 1);
        // Lease lapses without completion
        clock.advance(STALL + Duration::from_secs(1));
        assert_eq!(queue.reap_stalled().await.unwrap(), 1);
    }

    // Fourth stall dead-letters
    queue.dequeue(&worker()).await.unwrap().unwrap();
    clock.advance(STALL + Duration::from_secs(1));
    assert_eq!(queue.reap_stalled().await.unwrap(), 0);

    let record = queue.get(&JobId::new("j-1")).await.unwrap().unwrap();
    assert_eq!(record.state, JobState::Dead);
    assert_eq!(queue.lengths().await.unwrap().dead, 1);
}

#[tokio::test]
async fn lease_renewal_prevents_stall_rescue() {
    let (queue, _, clock) = queue();
    queue
        .enqueue(&job(&clock, "j-1", JobKind::CreateSession))
        .await
        .unwrap();
    let claimed = queue.dequeue(&worker()).await.unwrap().unwrap();

    clock.advance(Duration::from_secs(20));
    queue.renew_lease(&claimed.id, &worker()).await.unwrap();
    clock.advance(Duration::from_secs(20));

    assert_eq!(queue.reap_stalled().await.unwrap(), 0);
    let record = queue.get(&claimed.id).await.unwrap().unwrap();
    assert_eq!(record.state, JobState::Active);
}

#[tokio::test]
async fn claim_crash_orphan_is_recovered() {
    let (queue, store, clock) = queue();
    let j = job(&clock, "j-1", JobKind::CreateSession);
    queue.enqueue(&j).await.unwrap();

    // Simulate a crash inside the claim window: popped from the lane but
    // never leased.
    store.lpop(&keys::queue_ready(1)).await.unwrap();

    clock.advance(STALL + Duration::from_secs(1));
    assert_eq!(queue.reap_stalled().await.unwrap(), 1);
    assert!(queue.dequeue(&worker()).await.unwrap().is_some());
}

#[tokio::test]
async fn progress_is_persisted() {
    let (queue, _, clock) = queue();
    let j = job(&clock, "j-1", JobKind::CreateSession);
    queue.enqueue(&j).await.unwrap();

    queue.report_progress(&j.id, 70).await.unwrap();
    assert_eq!(queue.get(&j.id).await.unwrap().unwrap().progress, 70);

    queue.report_progress(&j.id, 150).await.unwrap();
    assert_eq!(queue.get(&j.id).await.unwrap().unwrap().progress, 100);
}

#[tokio::test]
async fn lengths_reflect_queue_shape() {
    let (queue, _, clock) = queue();
    queue
        .enqueue(&job(&clock, "j-1", JobKind::CreateSession))
        .await
        .unwrap();
    queue
        .enqueue(&job(&clock, "j-2", JobKind::TerminateSession))
        .await
        .unwrap();
    queue.dequeue(&worker()).await.unwrap().unwrap();

    let lengths = queue.lengths().await.unwrap();
    assert_eq!(lengths.ready, 1);
    assert_eq!(lengths.active, 1);
    assert_eq!(lengths.total_pending(), 1);
}

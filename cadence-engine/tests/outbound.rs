//! Outbound notification queue retries and dead-lettering
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::sync::Arc;

use cadence_common::{Clock, ManualClock};
use cadence_engine::{
    OutboundConfig, OutboundEmail, OutboundQueue, OutboundReport, RetryPolicy, TaskStatus,
};
use chrono::Duration;
use pretty_assertions::assert_eq;
use support::{MockTransport, harness::start};

fn queue(max_attempts: u32) -> (OutboundQueue, Arc<MockTransport>, Arc<ManualClock>) {
    let transport = Arc::new(MockTransport::new());
    let clock = Arc::new(ManualClock::new(start()));
    let queue = OutboundQueue::new(
        transport.clone(),
        clock.clone(),
        OutboundConfig {
            process_interval_secs: 1,
            max_concurrent: 2,
            failed_retention_secs: 3600,
            retry: RetryPolicy {
                max_attempts,
                base_retry_delay_secs: 60,
                max_retry_delay_secs: 600,
                retry_jitter_factor: 0.0,
            },
        },
    );
    (queue, transport, clock)
}

fn email(to: &str) -> OutboundEmail {
    OutboundEmail::new(to, "Heads up", "<p>Hi</p>")
}

#[tokio::test]
async fn test_pending_tasks_are_sent() {
    let (queue, transport, _) = queue(3);
    let id = queue.enqueue(email("a@x.com"));
    queue.enqueue(email("b@x.com"));

    let report = queue.process_ready().await;

    assert_eq!(
        report,
        OutboundReport {
            attempted: 2,
            sent: 2,
            retrying: 0,
            failed: 0,
        }
    );
    assert_eq!(transport.count(), 2);
    let task = queue.get(id).unwrap();
    assert_eq!(task.attempts, 1);
    assert!(matches!(task.status, TaskStatus::Sent { message_id: Some(_) }));

    // Nothing left to do
    assert_eq!(queue.process_ready().await, OutboundReport::default());
    assert_eq!(queue.purge_sent(), 2);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_failures_back_off_then_dead_letter() {
    let (queue, transport, clock) = queue(3);
    transport.fail_for("a@x.com");
    let id = queue.enqueue(email("a@x.com"));

    assert_eq!(queue.process_ready().await.retrying, 1);
    let task = queue.get(id).unwrap();
    assert_eq!(task.next_attempt_at, Some(clock.now() + Duration::seconds(60)));
    assert!(matches!(task.status, TaskStatus::Retry { attempts: 1, .. }));

    // Not ready before the backoff elapses
    clock.advance(Duration::seconds(30));
    assert_eq!(queue.process_ready().await.attempted, 0);

    clock.advance(Duration::seconds(30));
    assert_eq!(queue.process_ready().await.retrying, 1);
    assert_eq!(
        queue.get(id).unwrap().next_attempt_at,
        Some(clock.now() + Duration::seconds(120))
    );

    clock.advance(Duration::seconds(120));
    assert_eq!(queue.process_ready().await.failed, 1);
    let task = queue.get(id).unwrap();
    assert_eq!(task.attempts, 3);
    assert_eq!(task.next_attempt_at, None);
    match task.status {
        TaskStatus::Failed {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(last_error, "mailbox unavailable: a@x.com");
        }
        other => panic!("expected failed task, got {other:?}"),
    }

    clock.advance(Duration::days(1));
    assert_eq!(queue.process_ready().await.attempted, 0);
    assert_eq!(transport.count(), 3);
}

#[tokio::test]
async fn test_failed_task_can_be_requeued() {
    let (queue, transport, _) = queue(1);
    transport.fail_everything();
    let id = queue.enqueue(email("a@x.com"));
    assert_eq!(queue.process_ready().await.failed, 1);

    assert!(queue.requeue(id));
    assert!(!queue.requeue(id));

    transport.recover();
    assert_eq!(queue.process_ready().await.sent, 1);
}

#[tokio::test]
async fn test_expired_failures_are_purged() {
    let (queue, transport, clock) = queue(1);
    transport.fail_for("a@x.com");
    let failed = queue.enqueue(email("a@x.com"));
    queue.process_ready().await;
    assert_eq!(queue.get(failed).unwrap().finished_at, Some(clock.now()));

    clock.advance(Duration::minutes(59));
    assert_eq!(queue.purge_expired_failures(), 0);

    let pending = queue.enqueue(email("b@x.com"));
    clock.advance(Duration::minutes(1));
    assert_eq!(queue.purge_expired_failures(), 1);
    assert!(queue.get(failed).is_none());
    assert!(queue.get(pending).is_some());
}

#[tokio::test]
async fn test_serve_drops_delivered_tasks() {
    let (queue, transport, _) = queue(3);
    transport.fail_for("b@x.com");
    queue.enqueue(email("a@x.com"));
    let retrying = queue.enqueue(email("b@x.com"));
    let (tx, rx) = tokio::sync::broadcast::channel(1);

    let handle = tokio::spawn({
        let queue = queue.clone();
        async move { queue.serve(rx).await }
    });

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    tx.send(cadence_common::Signal::Shutdown).unwrap();
    handle.await.unwrap();

    assert_eq!(transport.count(), 2);
    let remaining: Vec<_> = queue.all().into_iter().map(|task| task.id).collect();
    assert_eq!(remaining, vec![retrying]);
}

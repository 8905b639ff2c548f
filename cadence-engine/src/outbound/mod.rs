//! Queue for one-off notification emails
//!
//! Tasks live in memory. Each pass sends every task that is pending or whose
//! retry time has come; failures back off per [`RetryPolicy`] until the
//! attempt budget runs out and the task is parked as [`TaskStatus::Failed`].

mod retry;

use std::{fmt, sync::Arc, time::Duration};

use cadence_common::{Clock, Signal, internal};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

pub use self::retry::{RetryPolicy, backoff_delay};
use crate::transport::{EmailTransport, OutboundEmail, SendOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(ulid::Ulid);

impl TaskId {
    fn generate() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Retry { attempts: u32, last_error: String },
    Sent { message_id: Option<String> },
    Failed { attempts: u32, last_error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundTask {
    pub id: TaskId,
    pub email: OutboundEmail,
    pub status: TaskStatus,
    /// Sends tried so far
    pub attempts: u32,
    pub queued_at: DateTime<Utc>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// When the task reached `Sent` or `Failed`
    pub finished_at: Option<DateTime<Utc>>,
}

impl OutboundTask {
    fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            TaskStatus::Pending => true,
            TaskStatus::Retry { .. } => self.next_attempt_at.is_none_or(|at| at <= now),
            _ => false,
        }
    }
}

/// ```ron
/// outbound: (
///     process_interval_secs: 30,
///     max_concurrent: 4,
///     failed_retention_secs: 604800,
///     retry: (max_attempts: 5),
/// ),
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundConfig {
    #[serde(default = "defaults::process_interval_secs")]
    pub process_interval_secs: u64,

    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// How long dead-lettered tasks stay inspectable before `serve` drops them
    #[serde(default = "defaults::failed_retention_secs")]
    pub failed_retention_secs: u64,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            process_interval_secs: defaults::process_interval_secs(),
            max_concurrent: defaults::max_concurrent(),
            failed_retention_secs: defaults::failed_retention_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

mod defaults {
    pub const fn process_interval_secs() -> u64 {
        30
    }

    pub const fn max_concurrent() -> usize {
        4
    }

    pub const fn failed_retention_secs() -> u64 {
        7 * 24 * 60 * 60
    }
}

/// Counts from one [`OutboundQueue::process_ready`] pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundReport {
    pub attempted: usize,
    pub sent: usize,
    pub retrying: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tasks: Arc<DashMap<TaskId, OutboundTask>>,
    transport: Arc<dyn EmailTransport>,
    clock: Arc<dyn Clock>,
    config: OutboundConfig,
}

impl OutboundQueue {
    pub fn new(
        transport: Arc<dyn EmailTransport>,
        clock: Arc<dyn Clock>,
        config: OutboundConfig,
    ) -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            transport,
            clock,
            config,
        }
    }

    pub fn enqueue(&self, email: OutboundEmail) -> TaskId {
        let id = TaskId::generate();
        internal!("Queued notification {id} for {}", email.to);
        self.tasks.insert(
            id,
            OutboundTask {
                id,
                email,
                status: TaskStatus::Pending,
                attempts: 0,
                queued_at: self.clock.now(),
                next_attempt_at: None,
                finished_at: None,
            },
        );
        id
    }

    pub fn get(&self, id: TaskId) -> Option<OutboundTask> {
        self.tasks.get(&id).map(|entry| entry.value().clone())
    }

    /// Every task, oldest first
    pub fn all(&self) -> Vec<OutboundTask> {
        let mut tasks: Vec<_> = self.tasks.iter().map(|entry| entry.value().clone()).collect();
        tasks.sort_by_key(|task| task.id);
        tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Put a failed task back in line. Returns `false` if it is not failed.
    pub fn requeue(&self, id: TaskId) -> bool {
        self.tasks.get_mut(&id).is_some_and(|mut entry| {
            let task = entry.value_mut();
            if !matches!(task.status, TaskStatus::Failed { .. }) {
                return false;
            }

            task.status = TaskStatus::Pending;
            task.attempts = 0;
            task.next_attempt_at = None;
            task.finished_at = None;
            true
        })
    }

    /// Drop delivered tasks, returning how many went
    pub fn purge_sent(&self) -> usize {
        let before = self.tasks.len();
        self.tasks
            .retain(|_, task| !matches!(task.status, TaskStatus::Sent { .. }));
        before.saturating_sub(self.tasks.len())
    }

    /// Drop failed tasks that finished longer than `failed_retention_secs` ago
    pub fn purge_expired_failures(&self) -> usize {
        let retention = i64::try_from(self.config.failed_retention_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);
        let Some(cutoff) = self.clock.now().checked_sub_signed(retention) else {
            return 0;
        };

        let before = self.tasks.len();
        self.tasks.retain(|_, task| {
            !(matches!(task.status, TaskStatus::Failed { .. })
                && task.finished_at.is_some_and(|at| at <= cutoff))
        });
        before.saturating_sub(self.tasks.len())
    }

    /// Remove everything that no longer needs tracking
    fn cleanup(&self) {
        let sent = self.purge_sent();
        let expired = self.purge_expired_failures();
        if sent + expired > 0 {
            internal!("Outbound cleanup removed {sent} sent and {expired} expired failed tasks");
        }
    }

    /// Send every ready task once
    pub async fn process_ready(&self) -> OutboundReport {
        let now = self.clock.now();
        let ready: Vec<TaskId> = self
            .tasks
            .iter_mut()
            .filter_map(|mut entry| {
                let task = entry.value_mut();
                task.is_ready(now).then(|| {
                    task.status = TaskStatus::InProgress;
                    task.id
                })
            })
            .collect();

        if ready.is_empty() {
            return OutboundReport::default();
        }

        let outcomes: Vec<TaskStatus> = stream::iter(ready)
            .map(|id| self.attempt(id))
            .buffer_unordered(self.config.max_concurrent.max(1))
            .filter_map(|status| async move { status })
            .collect()
            .await;

        let mut report = OutboundReport::default();
        for status in outcomes {
            report.attempted += 1;
            match status {
                TaskStatus::Sent { .. } => report.sent += 1,
                TaskStatus::Retry { .. } => report.retrying += 1,
                TaskStatus::Failed { .. } => report.failed += 1,
                TaskStatus::Pending | TaskStatus::InProgress => {}
            }
        }

        debug!(
            attempted = report.attempted,
            sent = report.sent,
            retrying = report.retrying,
            failed = report.failed,
            "Outbound pass finished"
        );
        report
    }

    async fn attempt(&self, id: TaskId) -> Option<TaskStatus> {
        let (email, attempts) = {
            let task = self.tasks.get(&id)?;
            (task.email.clone(), task.attempts + 1)
        };

        let now = self.clock.now();
        let (status, next_attempt_at) = match self.transport.send(&email).await {
            SendOutcome::Sent { message_id } => {
                info!(task = %id, to = %email.to, "Notification sent");
                (TaskStatus::Sent { message_id }, None)
            }
            SendOutcome::Failed { error } if self.config.retry.should_retry(attempts) => {
                let at = self.config.retry.next_attempt_at(attempts, now);
                warn!(task = %id, attempts, %error, retry_at = %at, "Notification failed, will retry");
                (
                    TaskStatus::Retry {
                        attempts,
                        last_error: error,
                    },
                    Some(at),
                )
            }
            SendOutcome::Failed { error } => {
                error!(task = %id, attempts, %error, "Notification failed permanently");
                (
                    TaskStatus::Failed {
                        attempts,
                        last_error: error,
                    },
                    None,
                )
            }
        };

        let mut task = self.tasks.get_mut(&id)?;
        task.finished_at = next_attempt_at.is_none().then_some(now);
        task.status = status.clone();
        task.next_attempt_at = next_attempt_at;
        task.attempts = attempts;
        Some(status)
    }

    /// Run passes every `process_interval_secs` until shutdown.
    ///
    /// Delivered tasks are dropped after each pass, failed ones once their
    /// retention has passed.
    pub async fn serve(&self, mut shutdown: tokio::sync::broadcast::Receiver<Signal>) {
        internal!("Outbound queue starting");

        let mut timer =
            tokio::time::interval(Duration::from_secs(self.config.process_interval_secs.max(1)));
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.process_ready().await;
                    self.cleanup();
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            let pending = self
                                .tasks
                                .iter()
                                .filter(|entry| !matches!(
                                    entry.value().status,
                                    TaskStatus::Sent { .. } | TaskStatus::Failed { .. }
                                ))
                                .count();
                            if pending > 0 {
                                warn!("Outbound queue stopping with {pending} unsent notifications");
                            }
                            internal!("Outbound queue shutdown complete");
                            break;
                        }
                        Err(e) => {
                            error!("Outbound queue shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }
    }
}

//! Per-recipient progress through a drip sequence.
//!
//! An enrollment is the only stateful entity of the drip side. The transition
//! methods keep two invariants intact regardless of which store persists it:
//! `next_send_at` is set exactly while the enrollment is `Active`, and
//! `current_step` never moves backwards.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    id::{EnrollmentId, SequenceId},
    sequence::Step,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Cancelled,
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub sequence_id: SequenceId,
    pub email: String,
    /// Order of the last step sent; 0 until the first send succeeds
    pub current_step: u32,
    pub status: EnrollmentStatus,
    pub next_send_at: Option<DateTime<Utc>>,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// `now` plus a step's day delay
#[must_use]
pub fn after_delay(now: DateTime<Utc>, step: &Step) -> DateTime<Utc> {
    now + Duration::days(i64::from(step.delay_days))
}

impl Enrollment {
    /// A fresh enrollment, due once the first step's delay has elapsed
    #[must_use]
    pub fn new(
        sequence_id: SequenceId,
        email: impl Into<String>,
        first_step: &Step,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EnrollmentId::generate(),
            sequence_id,
            email: email.into(),
            current_step: 0,
            status: EnrollmentStatus::Active,
            next_send_at: Some(after_delay(now, first_step)),
            enrolled_at: now,
            completed_at: None,
            cancelled_at: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.next_send_at.is_some_and(|at| at <= now)
    }

    /// Order of the step that should go out next
    #[must_use]
    pub const fn next_step_order(&self) -> u32 {
        self.current_step.saturating_add(1)
    }

    /// Record that step `sent` went out and schedule `following`
    pub fn advance(&mut self, sent: u32, following: &Step, now: DateTime<Utc>) {
        self.current_step = self.current_step.max(sent);
        self.next_send_at = Some(after_delay(now, following));
    }

    /// Record that step `sent` went out and nothing follows it
    pub fn finish(&mut self, sent: u32, now: DateTime<Utc>) {
        self.current_step = self.current_step.max(sent);
        self.complete(now);
    }

    /// Terminate normally
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = EnrollmentStatus::Completed;
        self.completed_at = Some(now);
        self.next_send_at = None;
    }

    /// Cancel if still active. Returns `false` for terminal enrollments.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }

        self.status = EnrollmentStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.next_send_at = None;
        true
    }
}

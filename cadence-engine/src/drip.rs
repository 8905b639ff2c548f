//! Drip sequences: enrollment, step advancement and cancellation.
//!
//! The engine holds no state of its own. Every run reads the due set from the
//! [`SequenceStore`], sends each enrollment's next step and writes the result
//! back, so a crash between ticks loses nothing but the in-flight sends.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use cadence_common::{
    Clock, Enrollment, NewSequence, Sequence, SequenceId, Trigger, internal, validation,
};
use cadence_store::SequenceStore;
use futures_util::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::{EngineError, Rejection},
    layout::{self, Links},
    transport::{EmailTransport, OutboundEmail, SendOutcome},
};

/// ```ron
/// drip: (max_concurrent: 8),
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DripConfig {
    /// Enrollments processed at once during a run
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

const fn default_max_concurrent() -> usize {
    8
}

impl Default for DripConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollReport {
    pub enrolled: usize,
}

/// Counts from one [`DripEngine::process_due_steps`] run.
///
/// `completed` overlaps with `sent` when the final step went out during the
/// run; enrollments that had already run out of steps count only as
/// `completed`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DripRunReport {
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
    pub completed: usize,
}

impl DripRunReport {
    fn record(&mut self, outcome: StepOutcome) {
        self.processed += 1;
        match outcome {
            StepOutcome::Sent => self.sent += 1,
            StepOutcome::Finished => {
                self.sent += 1;
                self.completed += 1;
            }
            StepOutcome::Exhausted => self.completed += 1,
            StepOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    /// Step delivered, more to come
    Sent,
    /// Final step delivered
    Finished,
    /// Nothing left to send
    Exhausted,
    /// Transport refused; the enrollment stays due
    Failed,
}

/// Partial edit applied by [`DripEngine::update_sequence`]
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug)]
pub struct DripEngine {
    store: Arc<dyn SequenceStore>,
    transport: Arc<dyn EmailTransport>,
    clock: Arc<dyn Clock>,
    links: Links,
    config: DripConfig,
}

impl DripEngine {
    pub fn new(
        store: Arc<dyn SequenceStore>,
        transport: Arc<dyn EmailTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            links: Links::default(),
            config: DripConfig::default(),
        }
    }

    #[must_use]
    pub fn with_links(mut self, links: Links) -> Self {
        self.links = links;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: DripConfig) -> Self {
        self.config = config;
        self
    }

    /// Enroll `email` in every active sequence listening for `trigger`.
    ///
    /// Sequences the address is already enrolled in, in any status, are
    /// skipped and not counted. Nothing is sent until the next run.
    pub async fn enroll(&self, email: &str, trigger: Trigger) -> Result<EnrollReport, EngineError> {
        let now = self.clock.now();
        let mut report = EnrollReport::default();

        for sequence in self.store.active_sequences(trigger).await? {
            let Some(first) = sequence.first_step() else {
                continue;
            };

            let enrollment = Enrollment::new(sequence.id, email, first, now);
            match self.store.insert_enrollment(enrollment).await {
                Ok(()) => {
                    debug!(%email, sequence = %sequence.name, "Enrolled");
                    report.enrolled += 1;
                }
                Err(err) if err.is_already_exists() => {
                    internal!("{email} already enrolled in {}", sequence.id);
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(%email, %trigger, enrolled = report.enrolled, "Processed enrollment trigger");
        Ok(report)
    }

    /// Send the next step of every due enrollment.
    ///
    /// Transport failures leave the enrollment untouched so the same step is
    /// retried on the next run. A store failure for one enrollment does not
    /// stop the others; the first such error is returned once all of them
    /// have been handled.
    pub async fn process_due_steps(&self) -> Result<DripRunReport, EngineError> {
        let due = self.store.due_enrollments(self.clock.now()).await?;
        if due.is_empty() {
            internal!("No drip steps due");
            return Ok(DripRunReport::default());
        }

        let ids: BTreeSet<SequenceId> = due.iter().map(|e| e.sequence_id).collect();
        let mut sequences = HashMap::with_capacity(ids.len());
        for id in ids {
            sequences.insert(id, self.store.sequence(id).await?.map(Arc::new));
        }

        let outcomes: Vec<Result<StepOutcome, EngineError>> = stream::iter(due)
            .map(|enrollment| {
                let sequence = sequences.get(&enrollment.sequence_id).cloned().flatten();
                self.process_enrollment(enrollment, sequence)
            })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        let mut report = DripRunReport::default();
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    warn!("Failed to record drip step: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }

        info!(
            processed = report.processed,
            sent = report.sent,
            failed = report.failed,
            completed = report.completed,
            "Drip run finished"
        );

        first_error.map_or(Ok(report), Err)
    }

    async fn process_enrollment(
        &self,
        enrollment: Enrollment,
        sequence: Option<Arc<Sequence>>,
    ) -> Result<StepOutcome, EngineError> {
        let order = enrollment.next_step_order();
        let Some((sequence, step)) = sequence
            .as_deref()
            .and_then(|sequence| sequence.step(order).map(|step| (sequence, step)))
        else {
            if let Some(mut current) = self.refresh(&enrollment).await? {
                current.complete(self.clock.now());
                self.store.update_enrollment(&current).await?;
            }
            return Ok(StepOutcome::Exhausted);
        };

        let email = OutboundEmail::new(
            &enrollment.email,
            &step.subject,
            layout::with_footer(&step.html_content, &self.links.unsubscribe()),
        );

        if let SendOutcome::Failed { error } = self.transport.send(&email).await {
            warn!(
                email = %enrollment.email,
                sequence = %sequence.id,
                step = order,
                %error,
                "Drip step failed, will retry next run"
            );
            return Ok(StepOutcome::Failed);
        }

        let following = sequence.step(order + 1);

        // A cancellation that landed while the send was in flight wins.
        let Some(mut current) = self.refresh(&enrollment).await? else {
            internal!("{} left {} during send", enrollment.email, sequence.id);
            return Ok(StepOutcome::Sent);
        };

        let now = self.clock.now();
        let outcome = if let Some(following) = following {
            current.advance(order, following, now);
            StepOutcome::Sent
        } else {
            current.finish(order, now);
            StepOutcome::Finished
        };
        self.store.update_enrollment(&current).await?;

        Ok(outcome)
    }

    /// The stored copy of `enrollment` if it is still active
    async fn refresh(&self, enrollment: &Enrollment) -> Result<Option<Enrollment>, EngineError> {
        Ok(self
            .store
            .enrollment(enrollment.sequence_id, &enrollment.email)
            .await?
            .filter(Enrollment::is_active))
    }

    /// Cancel one enrollment. Returns `false` if there is none or it already
    /// finished.
    pub async fn cancel(&self, email: &str, sequence_id: SequenceId) -> Result<bool, EngineError> {
        let Some(mut enrollment) = self.store.enrollment(sequence_id, email).await? else {
            return Ok(false);
        };

        if !enrollment.cancel(self.clock.now()) {
            return Ok(false);
        }

        self.store.update_enrollment(&enrollment).await?;
        info!(%email, sequence = %sequence_id, "Enrollment cancelled");
        Ok(true)
    }

    /// Cancel every active enrollment for `email`
    pub async fn cancel_all(&self, email: &str) -> Result<usize, EngineError> {
        let cancelled = self
            .store
            .cancel_active_enrollments(email, self.clock.now())
            .await?;

        info!(%email, cancelled, "Cancelled all enrollments");
        Ok(cancelled)
    }

    pub async fn create_sequence(&self, new: NewSequence) -> Result<Sequence, EngineError> {
        new.validate()?;
        let sequence = new.into_sequence(SequenceId::generate(), self.clock.now());
        self.store.insert_sequence(sequence.clone()).await?;

        info!(
            id = %sequence.id,
            name = %sequence.name,
            trigger = %sequence.trigger,
            steps = sequence.step_count(),
            "Sequence created"
        );
        Ok(sequence)
    }

    pub async fn update_sequence(
        &self,
        id: SequenceId,
        update: SequenceUpdate,
    ) -> Result<Sequence, EngineError> {
        let Some(mut sequence) = self.store.sequence(id).await? else {
            return Err(Rejection::SequenceNotFound.into());
        };

        if let Some(name) = update.name {
            validation::title("Name", &name)?;
            sequence.name = name;
        }
        if let Some(active) = update.active {
            sequence.active = active;
        }

        self.store.update_sequence(&sequence).await?;
        Ok(sequence)
    }

    pub async fn sequences(&self) -> Result<Vec<Sequence>, EngineError> {
        Ok(self.store.sequences().await?)
    }

    /// Enrollments of one sequence, newest first
    pub async fn enrollments(&self, sequence_id: SequenceId) -> Result<Vec<Enrollment>, EngineError> {
        if self.store.sequence(sequence_id).await?.is_none() {
            return Err(Rejection::SequenceNotFound.into());
        }

        let mut enrollments = self.store.enrollments_for_sequence(sequence_id).await?;
        enrollments.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at).then(b.id.cmp(&a.id)));
        Ok(enrollments)
    }
}

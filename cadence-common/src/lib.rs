//! Shared data model and runtime plumbing for the cadence engine.
//!
//! The types here mirror the persisted shape of drip sequences, enrollments,
//! campaigns and their per-recipient send records. State transitions that
//! carry invariants (enrollment progress, campaign status) are methods on the
//! types themselves so every store and engine goes through the same rules.

pub mod campaign;
pub mod clock;
pub mod enrollment;
pub mod id;
pub mod logging;
pub mod sequence;
pub mod subscriber;
pub mod validation;

pub use campaign::{Campaign, CampaignStatus, EmailSendRecord, SendStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use enrollment::{Enrollment, EnrollmentStatus};
pub use id::{CampaignId, EnrollmentId, SendRecordId, SequenceId, SubscriberId};
pub use sequence::{NewSequence, NewStep, Sequence, Step, Trigger, TriggerParseError};
pub use subscriber::Subscriber;
pub use tracing;
pub use validation::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}

//! Error types for engine operations.
//!
//! Expected outcomes that an operator or caller acts on (missing campaign,
//! wrong status) are [`Rejection`]s. Everything else, mostly persistence
//! failures, is an [`EngineError`] and propagates to whoever invoked the job.

use cadence_common::{CampaignStatus, ValidationError};
use cadence_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Rejected(#[from] Rejection),
}

impl EngineError {
    /// The rejection behind this error, if it is one
    #[must_use]
    pub const fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

/// Operation refused because of the target's current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Campaign not found")]
    CampaignNotFound,

    #[error("Campaign status is {0}, expected DRAFT or SCHEDULED")]
    NotSendable(CampaignStatus),

    #[error("Only draft campaigns can be edited")]
    NotDraft(CampaignStatus),

    #[error("Sequence not found")]
    SequenceNotFound,
}

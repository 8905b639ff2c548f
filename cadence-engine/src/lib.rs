//! Drip sequence and campaign delivery.
//!
//! This crate provides:
//! - [`DripEngine`]: enrollment, cancellation and scheduled step advancement
//! - [`CampaignSender`]: batched full-list campaign sends
//! - [`SubscriptionManager`]: rate-limited sign-up and token unsubscribe
//! - [`OutboundQueue`]: observable, retried one-off notification emails
//! - [`Scheduler`]: the periodic tick driving all of the above

mod campaign;
mod drip;
mod error;
pub mod layout;
pub mod outbound;
pub mod rate_limiter;
mod scheduler;
mod subscription;
pub mod transport;

pub use campaign::{
    CampaignConfig, CampaignDetail, CampaignReport, CampaignSendResult, CampaignSender,
    CampaignUpdate, SendSummary,
};
pub use drip::{DripConfig, DripEngine, DripRunReport, EnrollReport, SequenceUpdate};
pub use error::{EngineError, Rejection};
pub use layout::Links;
pub use outbound::{OutboundConfig, OutboundQueue, OutboundReport, RetryPolicy, TaskId, TaskStatus};
pub use rate_limiter::{RateLimitConfig, RateLimiter, TokenBucketLimiter};
pub use scheduler::{Scheduler, TickReport};
pub use subscription::{
    SubscribeOutcome, SubscriptionConfig, SubscriptionManager, UnsubscribeOutcome,
};
pub use transport::{EmailTransport, OutboundEmail, SendOutcome, TransportConfig};

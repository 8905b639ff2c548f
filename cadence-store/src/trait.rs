use std::fmt::Debug;

use async_trait::async_trait;
use cadence_common::{
    Campaign, CampaignId, EmailSendRecord, Enrollment, Sequence, SequenceId, Subscriber, Trigger,
};
use chrono::{DateTime, Utc};

use crate::Result;

/// Drip sequence definitions and per-recipient enrollments.
///
/// Enrollments are keyed by `(sequence_id, email)`; implementations must
/// reject a second insert for the same key with
/// [`StoreError::AlreadyExists`](crate::StoreError::AlreadyExists).
#[async_trait]
pub trait SequenceStore: Send + Sync + Debug {
    async fn insert_sequence(&self, sequence: Sequence) -> Result<()>;

    /// Replace a stored sequence
    ///
    /// # Errors
    /// [`StoreError::NotFound`](crate::StoreError::NotFound) if it does not exist
    async fn update_sequence(&self, sequence: &Sequence) -> Result<()>;

    async fn sequence(&self, id: SequenceId) -> Result<Option<Sequence>>;

    /// All sequences, oldest first
    async fn sequences(&self) -> Result<Vec<Sequence>>;

    /// Active sequences listening for `trigger`
    async fn active_sequences(&self, trigger: Trigger) -> Result<Vec<Sequence>>;

    async fn insert_enrollment(&self, enrollment: Enrollment) -> Result<()>;

    async fn enrollment(&self, sequence_id: SequenceId, email: &str)
    -> Result<Option<Enrollment>>;

    async fn update_enrollment(&self, enrollment: &Enrollment) -> Result<()>;

    /// Active enrollments whose `next_send_at` is at or before `now`
    async fn due_enrollments(&self, now: DateTime<Utc>) -> Result<Vec<Enrollment>>;

    async fn enrollments_for_sequence(&self, sequence_id: SequenceId) -> Result<Vec<Enrollment>>;

    /// Cancel every active enrollment for `email` in one write, returning how
    /// many were cancelled
    async fn cancel_active_enrollments(&self, email: &str, now: DateTime<Utc>) -> Result<usize>;
}

/// Campaigns and their per-recipient send records
#[async_trait]
pub trait CampaignStore: Send + Sync + Debug {
    async fn insert_campaign(&self, campaign: Campaign) -> Result<()>;

    async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>>;

    /// All campaigns, oldest first
    async fn campaigns(&self) -> Result<Vec<Campaign>>;

    async fn update_campaign(&self, campaign: &Campaign) -> Result<()>;

    /// Atomically move a `Draft`/`Scheduled` campaign into `Sending`.
    ///
    /// # Errors
    /// [`StoreError::NotSendable`](crate::StoreError::NotSendable) if another
    /// writer got there first
    async fn begin_sending(&self, id: CampaignId, now: DateTime<Utc>) -> Result<Campaign>;

    async fn insert_send_records(&self, records: &[EmailSendRecord]) -> Result<()>;

    async fn update_send_record(&self, record: &EmailSendRecord) -> Result<()>;

    /// Send records for a campaign, oldest first
    async fn send_records(&self, campaign_id: CampaignId) -> Result<Vec<EmailSendRecord>>;
}

/// Newsletter subscribers, keyed by email
#[async_trait]
pub trait SubscriberStore: Send + Sync + Debug {
    /// Insert or replace the subscriber with the same email
    async fn upsert_subscriber(&self, subscriber: Subscriber) -> Result<()>;

    async fn subscriber_by_email(&self, email: &str) -> Result<Option<Subscriber>>;

    async fn subscriber_by_token(&self, token: &str) -> Result<Option<Subscriber>>;

    /// Subscribers that have not unsubscribed, in subscription order
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>>;
}

//! One-shot campaigns and their per-recipient send records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    id::{CampaignId, SendRecordId},
    validation::{self, ValidationError},
};

/// Campaign lifecycle. Transitions only move forward:
/// `Draft`/`Scheduled` → `Sending` → `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Completed,
}

impl CampaignStatus {
    /// Whether a send may start from this status
    #[must_use]
    pub const fn is_sendable(self) -> bool {
        matches!(self, Self::Draft | Self::Scheduled)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Draft => "DRAFT",
            Self::Scheduled => "SCHEDULED",
            Self::Sending => "SENDING",
            Self::Completed => "COMPLETED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub subject: String,
    pub html_content: String,
    pub status: CampaignStatus,
    pub total_recipients: usize,
    pub sent_count: usize,
    pub failed_count: usize,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Validate operator input and build a draft
    pub fn draft(
        subject: impl Into<String>,
        html_content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let subject = subject.into();
        let html_content = html_content.into();
        validation::title("Subject", &subject)?;
        validation::body("HTML content", &html_content)?;

        Ok(Self {
            id: CampaignId::generate(),
            subject,
            html_content,
            status: CampaignStatus::Draft,
            total_recipients: 0,
            sent_count: 0,
            failed_count: 0,
            created_at: now,
            scheduled_at: None,
            sent_at: None,
            completed_at: None,
        })
    }

    /// Move into `Sending`. Returns `false` if the status does not allow it.
    pub fn begin_sending(&mut self, now: DateTime<Utc>) -> bool {
        if !self.status.is_sendable() {
            return false;
        }

        self.status = CampaignStatus::Sending;
        self.sent_at = Some(now);
        true
    }

    /// Fold one batch's results into the running counters
    pub fn record_batch(&mut self, sent: usize, failed: usize) {
        self.sent_count += sent;
        self.failed_count += failed;
    }

    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.status = CampaignStatus::Completed;
        self.completed_at = Some(now);
    }

    /// Whether a scheduled campaign has reached its send time
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == CampaignStatus::Scheduled && self.scheduled_at.is_some_and(|at| at <= now)
    }

    /// Attempts recorded so far
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.sent_count + self.failed_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    Queued,
    Sent,
    Failed,
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Queued => "QUEUED",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        })
    }
}

/// Audit row for one recipient of one campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSendRecord {
    pub id: SendRecordId,
    pub campaign_id: CampaignId,
    pub recipient_email: String,
    pub status: SendStatus,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl EmailSendRecord {
    #[must_use]
    pub fn queued(
        campaign_id: CampaignId,
        recipient_email: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SendRecordId::generate(),
            campaign_id,
            recipient_email: recipient_email.into(),
            status: SendStatus::Queued,
            provider_message_id: None,
            error_message: None,
            created_at: now,
            sent_at: None,
        }
    }

    pub fn mark_sent(&mut self, provider_message_id: Option<String>, now: DateTime<Utc>) {
        self.status = SendStatus::Sent;
        self.provider_message_id = provider_message_id;
        self.error_message = None;
        self.sent_at = Some(now);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = SendStatus::Failed;
        self.error_message = Some(error.into());
        self.sent_at = None;
    }
}

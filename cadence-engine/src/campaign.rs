//! Bulk campaign sends.
//!
//! A send walks the active subscriber list in fixed-size batches. Each batch
//! is recorded as `QUEUED` before anything is dispatched, sent concurrently,
//! then settled record by record. Batches run one after another with a fixed
//! pause between them to stay under provider rate limits.

use std::{sync::Arc, time::Duration};

use cadence_common::{
    Campaign, CampaignId, CampaignStatus, Clock, EmailSendRecord, Subscriber, internal, validation,
};
use cadence_store::{CampaignStore, StoreError, SubscriberStore};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::{EngineError, Rejection},
    layout::{self, Links},
    transport::{EmailTransport, OutboundEmail, SendOutcome},
};

/// Send records returned with [`CampaignSender::campaign_detail`]
pub const RECENT_SENDS: usize = 100;

/// ```ron
/// campaign: (batch_size: 50, batch_delay_ms: 200),
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between consecutive batches
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

const fn default_batch_size() -> usize {
    50
}

const fn default_batch_delay_ms() -> u64 {
    200
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignSendResult {
    Completed(CampaignReport),
    Rejected(Rejection),
}

impl CampaignSendResult {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Flat view with the reason text of a rejection
    #[must_use]
    pub fn summary(&self) -> SendSummary {
        match self {
            Self::Completed(report) => SendSummary {
                success: true,
                sent: report.sent,
                failed: report.failed,
                error: None,
            },
            Self::Rejected(rejection) => SendSummary {
                success: false,
                sent: 0,
                failed: 0,
                error: Some(rejection.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendSummary {
    pub success: bool,
    pub sent: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Partial edit applied by [`CampaignSender::update_draft`]
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignUpdate {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub html_content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignDetail {
    pub campaign: Campaign,
    /// Most recent first
    pub recent_sends: Vec<EmailSendRecord>,
}

#[derive(Debug)]
pub struct CampaignSender {
    campaigns: Arc<dyn CampaignStore>,
    subscribers: Arc<dyn SubscriberStore>,
    transport: Arc<dyn EmailTransport>,
    clock: Arc<dyn Clock>,
    links: Links,
    config: CampaignConfig,
}

impl CampaignSender {
    pub fn new(
        campaigns: Arc<dyn CampaignStore>,
        subscribers: Arc<dyn SubscriberStore>,
        transport: Arc<dyn EmailTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            campaigns,
            subscribers,
            transport,
            clock,
            links: Links::default(),
            config: CampaignConfig::default(),
        }
    }

    #[must_use]
    pub fn with_links(mut self, links: Links) -> Self {
        self.links = links;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: CampaignConfig) -> Self {
        self.config = config;
        self
    }

    /// Send a draft or scheduled campaign to every active subscriber.
    ///
    /// A missing campaign or one that already started sending is rejected
    /// before anything is written. Once the campaign is `SENDING` it runs to
    /// completion; individual delivery failures are recorded per recipient.
    pub async fn send(&self, id: CampaignId) -> Result<CampaignSendResult, EngineError> {
        let Some(campaign) = self.campaigns.campaign(id).await? else {
            return Ok(CampaignSendResult::Rejected(Rejection::CampaignNotFound));
        };
        if !campaign.status.is_sendable() {
            return Ok(CampaignSendResult::Rejected(Rejection::NotSendable(
                campaign.status,
            )));
        }

        let mut campaign = match self.campaigns.begin_sending(id, self.clock.now()).await {
            Ok(campaign) => campaign,
            Err(StoreError::NotSendable { status, .. }) => {
                return Ok(CampaignSendResult::Rejected(Rejection::NotSendable(status)));
            }
            Err(err) => return Err(err.into()),
        };

        let recipients = self.subscribers.active_subscribers().await?;
        campaign.total_recipients = recipients.len();
        self.campaigns.update_campaign(&campaign).await?;

        let batch_size = self.config.batch_size.max(1);
        let batches = recipients.len().div_ceil(batch_size);
        info!(
            campaign = %id,
            recipients = recipients.len(),
            batches,
            "Campaign send started"
        );

        let mut report = CampaignReport::default();
        for (index, batch) in recipients.chunks(batch_size).enumerate() {
            let (sent, failed) = self.send_batch(&campaign, batch).await?;
            campaign.record_batch(sent, failed);
            self.campaigns.update_campaign(&campaign).await?;

            report.sent += sent;
            report.failed += failed;
            internal!(
                "Campaign {id} batch {}/{batches}: {sent} sent, {failed} failed",
                index + 1
            );

            if index + 1 < batches {
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }
        }

        campaign.finish(self.clock.now());
        self.campaigns.update_campaign(&campaign).await?;

        info!(
            campaign = %id,
            sent = report.sent,
            failed = report.failed,
            "Campaign send completed"
        );
        Ok(CampaignSendResult::Completed(report))
    }

    async fn send_batch(
        &self,
        campaign: &Campaign,
        batch: &[Subscriber],
    ) -> Result<(usize, usize), EngineError> {
        let now = self.clock.now();
        let records: Vec<EmailSendRecord> = batch
            .iter()
            .map(|subscriber| EmailSendRecord::queued(campaign.id, &subscriber.email, now))
            .collect();
        self.campaigns.insert_send_records(&records).await?;

        let results = join_all(
            batch
                .iter()
                .zip(records)
                .map(|(subscriber, record)| self.deliver(campaign, subscriber, record)),
        )
        .await;

        let (mut sent, mut failed) = (0, 0);
        for result in results {
            if result? {
                sent += 1;
            } else {
                failed += 1;
            }
        }

        Ok((sent, failed))
    }

    /// Send to one recipient and settle its record. Returns whether it was
    /// delivered.
    async fn deliver(
        &self,
        campaign: &Campaign,
        subscriber: &Subscriber,
        mut record: EmailSendRecord,
    ) -> Result<bool, EngineError> {
        let unsubscribe = self.links.unsubscribe_with_token(&subscriber.unsubscribe_token);
        let email = OutboundEmail::new(
            &subscriber.email,
            &campaign.subject,
            layout::with_footer(&campaign.html_content, &unsubscribe),
        );

        let delivered = match self.transport.send(&email).await {
            SendOutcome::Sent { message_id } => {
                record.mark_sent(message_id, self.clock.now());
                true
            }
            SendOutcome::Failed { error } => {
                warn!(campaign = %campaign.id, to = %subscriber.email, %error, "Campaign send failed");
                record.mark_failed(error);
                false
            }
        };

        self.campaigns.update_send_record(&record).await?;
        Ok(delivered)
    }

    /// Send every scheduled campaign whose time has come
    pub async fn send_due_scheduled(
        &self,
    ) -> Result<Vec<(CampaignId, CampaignSendResult)>, EngineError> {
        let now = self.clock.now();
        let due: Vec<CampaignId> = self
            .campaigns
            .campaigns()
            .await?
            .into_iter()
            .filter(|campaign| campaign.is_due(now))
            .map(|campaign| campaign.id)
            .collect();

        let mut results = Vec::with_capacity(due.len());
        for id in due {
            results.push((id, self.send(id).await?));
        }

        Ok(results)
    }

    pub async fn create_campaign(
        &self,
        subject: impl Into<String> + Send,
        html_content: impl Into<String> + Send,
    ) -> Result<Campaign, EngineError> {
        let campaign = Campaign::draft(subject, html_content, self.clock.now())?;
        self.campaigns.insert_campaign(campaign.clone()).await?;

        info!(id = %campaign.id, subject = %campaign.subject, "Campaign created");
        Ok(campaign)
    }

    pub async fn update_draft(
        &self,
        id: CampaignId,
        update: CampaignUpdate,
    ) -> Result<Campaign, EngineError> {
        let mut campaign = self.existing(id).await?;
        if campaign.status != CampaignStatus::Draft {
            return Err(Rejection::NotDraft(campaign.status).into());
        }

        if let Some(subject) = update.subject {
            validation::title("Subject", &subject)?;
            campaign.subject = subject;
        }
        if let Some(html_content) = update.html_content {
            validation::body("HTML content", &html_content)?;
            campaign.html_content = html_content;
        }

        self.campaigns.update_campaign(&campaign).await?;
        Ok(campaign)
    }

    /// Schedule (or reschedule) a campaign that has not started sending
    pub async fn schedule(
        &self,
        id: CampaignId,
        at: DateTime<Utc>,
    ) -> Result<Campaign, EngineError> {
        let mut campaign = self.existing(id).await?;
        if !campaign.status.is_sendable() {
            return Err(Rejection::NotSendable(campaign.status).into());
        }

        campaign.status = CampaignStatus::Scheduled;
        campaign.scheduled_at = Some(at);
        self.campaigns.update_campaign(&campaign).await?;

        info!(id = %campaign.id, %at, "Campaign scheduled");
        Ok(campaign)
    }

    pub async fn campaign_detail(&self, id: CampaignId) -> Result<CampaignDetail, EngineError> {
        let campaign = self.existing(id).await?;

        let mut recent_sends = self.campaigns.send_records(id).await?;
        recent_sends.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        recent_sends.truncate(RECENT_SENDS);

        Ok(CampaignDetail {
            campaign,
            recent_sends,
        })
    }

    /// All campaigns, newest first
    pub async fn campaigns(&self) -> Result<Vec<Campaign>, EngineError> {
        let mut campaigns = self.campaigns.campaigns().await?;
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(campaigns)
    }

    async fn existing(&self, id: CampaignId) -> Result<Campaign, EngineError> {
        self.campaigns
            .campaign(id)
            .await?
            .ok_or_else(|| Rejection::CampaignNotFound.into())
    }
}

//! Campaign store wrapper that remembers how send records were batched

use std::sync::Arc;

use async_trait::async_trait;
use cadence_common::{Campaign, CampaignId, EmailSendRecord};
use cadence_store::{CampaignStore, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Debug)]
pub struct RecordingCampaignStore {
    inner: Arc<dyn CampaignStore>,
    inserts: Mutex<Vec<usize>>,
}

impl RecordingCampaignStore {
    pub fn new(inner: Arc<dyn CampaignStore>) -> Self {
        Self {
            inner,
            inserts: Mutex::new(Vec::new()),
        }
    }

    /// Size of every `insert_send_records` call, in order
    pub fn insert_sizes(&self) -> Vec<usize> {
        self.inserts.lock().clone()
    }
}

#[async_trait]
impl CampaignStore for RecordingCampaignStore {
    async fn insert_campaign(&self, campaign: Campaign) -> Result<()> {
        self.inner.insert_campaign(campaign).await
    }

    async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        self.inner.campaign(id).await
    }

    async fn campaigns(&self) -> Result<Vec<Campaign>> {
        self.inner.campaigns().await
    }

    async fn update_campaign(&self, campaign: &Campaign) -> Result<()> {
        self.inner.update_campaign(campaign).await
    }

    async fn begin_sending(&self, id: CampaignId, now: DateTime<Utc>) -> Result<Campaign> {
        self.inner.begin_sending(id, now).await
    }

    async fn insert_send_records(&self, records: &[EmailSendRecord]) -> Result<()> {
        self.inserts.lock().push(records.len());
        self.inner.insert_send_records(records).await
    }

    async fn update_send_record(&self, record: &EmailSendRecord) -> Result<()> {
        self.inner.update_send_record(record).await
    }

    async fn send_records(&self, campaign_id: CampaignId) -> Result<Vec<EmailSendRecord>> {
        self.inner.send_records(campaign_id).await
    }
}

//! The data both backends operate on.

use std::collections::BTreeMap;

use cadence_common::{
    Campaign, CampaignId, EmailSendRecord, Enrollment, SendRecordId, Sequence, SequenceId,
    Subscriber, Trigger,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StoreState {
    sequences: BTreeMap<SequenceId, Sequence>,
    /// Unique key (sequence, email)
    enrollments: BTreeMap<(SequenceId, String), Enrollment>,
    campaigns: BTreeMap<CampaignId, Campaign>,
    send_records: BTreeMap<SendRecordId, EmailSendRecord>,
    /// Keyed by email
    subscribers: BTreeMap<String, Subscriber>,
}

impl StoreState {
    pub fn insert_sequence(&mut self, sequence: Sequence) -> Result<()> {
        if self.sequences.contains_key(&sequence.id) {
            return Err(StoreError::AlreadyExists {
                kind: "Sequence",
                key: sequence.id.to_string(),
            });
        }

        self.sequences.insert(sequence.id, sequence);
        Ok(())
    }

    pub fn update_sequence(&mut self, sequence: &Sequence) -> Result<()> {
        let slot = self
            .sequences
            .get_mut(&sequence.id)
            .ok_or_else(|| StoreError::not_found("Sequence", sequence.id))?;
        *slot = sequence.clone();
        Ok(())
    }

    pub fn sequence(&self, id: SequenceId) -> Option<Sequence> {
        self.sequences.get(&id).cloned()
    }

    pub fn sequences(&self) -> Vec<Sequence> {
        self.sequences.values().cloned().collect()
    }

    pub fn active_sequences(&self, trigger: Trigger) -> Vec<Sequence> {
        self.sequences
            .values()
            .filter(|sequence| sequence.active && sequence.trigger == trigger)
            .cloned()
            .collect()
    }

    pub fn insert_enrollment(&mut self, enrollment: Enrollment) -> Result<()> {
        let key = (enrollment.sequence_id, enrollment.email.clone());
        if self.enrollments.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: "Enrollment",
                key: format!("{}/{}", key.0, key.1),
            });
        }

        self.enrollments.insert(key, enrollment);
        Ok(())
    }

    pub fn enrollment(&self, sequence_id: SequenceId, email: &str) -> Option<Enrollment> {
        self.enrollments
            .get(&(sequence_id, email.to_string()))
            .cloned()
    }

    pub fn update_enrollment(&mut self, enrollment: &Enrollment) -> Result<()> {
        let key = (enrollment.sequence_id, enrollment.email.clone());
        let slot = self
            .enrollments
            .get_mut(&key)
            .ok_or_else(|| StoreError::not_found("Enrollment", enrollment.id))?;
        *slot = enrollment.clone();
        Ok(())
    }

    pub fn due_enrollments(&self, now: DateTime<Utc>) -> Vec<Enrollment> {
        self.enrollments
            .values()
            .filter(|enrollment| enrollment.is_due(now))
            .cloned()
            .collect()
    }

    pub fn enrollments_for_sequence(&self, sequence_id: SequenceId) -> Vec<Enrollment> {
        self.enrollments
            .values()
            .filter(|enrollment| enrollment.sequence_id == sequence_id)
            .cloned()
            .collect()
    }

    pub fn cancel_active_enrollments(&mut self, email: &str, now: DateTime<Utc>) -> usize {
        self.enrollments
            .values_mut()
            .filter(|enrollment| enrollment.email == email)
            .map(|enrollment| enrollment.cancel(now))
            .filter(|cancelled| *cancelled)
            .count()
    }

    pub fn insert_campaign(&mut self, campaign: Campaign) -> Result<()> {
        if self.campaigns.contains_key(&campaign.id) {
            return Err(StoreError::AlreadyExists {
                kind: "Campaign",
                key: campaign.id.to_string(),
            });
        }

        self.campaigns.insert(campaign.id, campaign);
        Ok(())
    }

    pub fn campaign(&self, id: CampaignId) -> Option<Campaign> {
        self.campaigns.get(&id).cloned()
    }

    pub fn campaigns(&self) -> Vec<Campaign> {
        self.campaigns.values().cloned().collect()
    }

    pub fn update_campaign(&mut self, campaign: &Campaign) -> Result<()> {
        let slot = self
            .campaigns
            .get_mut(&campaign.id)
            .ok_or_else(|| StoreError::not_found("Campaign", campaign.id))?;
        *slot = campaign.clone();
        Ok(())
    }

    pub fn begin_sending(&mut self, id: CampaignId, now: DateTime<Utc>) -> Result<Campaign> {
        let campaign = self
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Campaign", id))?;

        if campaign.begin_sending(now) {
            Ok(campaign.clone())
        } else {
            Err(StoreError::NotSendable {
                id,
                status: campaign.status,
            })
        }
    }

    pub fn insert_send_records(&mut self, records: &[EmailSendRecord]) -> Result<()> {
        if let Some(existing) = records
            .iter()
            .find(|record| self.send_records.contains_key(&record.id))
        {
            return Err(StoreError::AlreadyExists {
                kind: "Send record",
                key: existing.id.to_string(),
            });
        }

        self.send_records
            .extend(records.iter().map(|record| (record.id, record.clone())));
        Ok(())
    }

    pub fn update_send_record(&mut self, record: &EmailSendRecord) -> Result<()> {
        let slot = self
            .send_records
            .get_mut(&record.id)
            .ok_or_else(|| StoreError::not_found("Send record", record.id))?;
        *slot = record.clone();
        Ok(())
    }

    pub fn send_records(&self, campaign_id: CampaignId) -> Vec<EmailSendRecord> {
        self.send_records
            .values()
            .filter(|record| record.campaign_id == campaign_id)
            .cloned()
            .collect()
    }

    pub fn upsert_subscriber(&mut self, subscriber: Subscriber) {
        self.subscribers.insert(subscriber.email.clone(), subscriber);
    }

    pub fn subscriber_by_email(&self, email: &str) -> Option<Subscriber> {
        self.subscribers.get(email).cloned()
    }

    pub fn subscriber_by_token(&self, token: &str) -> Option<Subscriber> {
        self.subscribers
            .values()
            .find(|subscriber| subscriber.unsubscribe_token == token)
            .cloned()
    }

    pub fn active_subscribers(&self) -> Vec<Subscriber> {
        let mut active: Vec<_> = self
            .subscribers
            .values()
            .filter(|subscriber| !subscriber.unsubscribed)
            .cloned()
            .collect();
        active.sort_by_key(|subscriber| (subscriber.subscribed_at, subscriber.id));
        active
    }
}

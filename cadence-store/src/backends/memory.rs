use std::sync::Arc;

use parking_lot::RwLock;

use super::impl_stores;
use crate::{Result, state::StoreState};

/// In-memory store.
///
/// Everything lives in a single `RwLock`-guarded state, so every write is
/// atomic with respect to every other operation, including the
/// enrollment-uniqueness check and the campaign `Sending` transition.
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        let state = self.state.read();
        f(&*state)
    }

    #[allow(clippy::unused_async, reason = "Mirrors the file-backed write path")]
    async fn write<R>(&self, f: impl FnOnce(&mut StoreState) -> Result<R>) -> Result<R> {
        let mut state = self.state.write();
        f(&mut *state)
    }
}

impl_stores!(MemoryStore);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cadence_common::{
        Campaign, CampaignStatus, EmailSendRecord, Enrollment, NewSequence, NewStep, Subscriber,
        Trigger,
    };
    use chrono::{Duration, Utc};

    use super::*;
    use crate::{CampaignStore, SequenceStore, StoreError, SubscriberStore};

    fn sequence(trigger: Trigger, active: bool) -> cadence_common::Sequence {
        NewSequence {
            name: "Welcome".to_string(),
            trigger,
            active: Some(active),
            steps: vec![NewStep {
                delay_days: 1,
                subject: "Hello".to_string(),
                html_content: "<p>Hello</p>".to_string(),
            }],
        }
        .into_sequence(cadence_common::SequenceId::generate(), Utc::now())
    }

    #[tokio::test]
    async fn test_enrollment_key_is_unique() {
        let store = MemoryStore::new();
        let seq = sequence(Trigger::NewSubscriber, true);
        store.insert_sequence(seq.clone()).await.unwrap();

        let now = Utc::now();
        let first = Enrollment::new(seq.id, "a@x.com", &seq.steps[0], now);
        let second = Enrollment::new(seq.id, "a@x.com", &seq.steps[0], now);

        store.insert_enrollment(first.clone()).await.unwrap();
        let err = store.insert_enrollment(second).await.unwrap_err();
        assert!(err.is_already_exists());

        let stored = store.enrollment(seq.id, "a@x.com").await.unwrap();
        assert_eq!(stored, Some(first));
    }

    #[tokio::test]
    async fn test_active_sequences_filter() {
        let store = MemoryStore::new();
        let active = sequence(Trigger::NewSubscriber, true);
        store.insert_sequence(active.clone()).await.unwrap();
        store
            .insert_sequence(sequence(Trigger::NewSubscriber, false))
            .await
            .unwrap();
        store
            .insert_sequence(sequence(Trigger::NewDonor, true))
            .await
            .unwrap();

        let found = store.active_sequences(Trigger::NewSubscriber).await.unwrap();
        assert_eq!(found, vec![active]);
    }

    #[tokio::test]
    async fn test_due_enrollments() {
        let store = MemoryStore::new();
        let seq = sequence(Trigger::NewSubscriber, true);
        let now = Utc::now();

        store
            .insert_enrollment(Enrollment::new(seq.id, "due@x.com", &seq.steps[0], now))
            .await
            .unwrap();
        let mut cancelled = Enrollment::new(seq.id, "gone@x.com", &seq.steps[0], now);
        cancelled.cancel(now);
        store.insert_enrollment(cancelled).await.unwrap();

        assert!(store.due_enrollments(now).await.unwrap().is_empty());

        let due = store.due_enrollments(now + Duration::days(1)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].email, "due@x.com");
    }

    #[tokio::test]
    async fn test_cancel_active_enrollments_counts_only_active() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = sequence(Trigger::NewSubscriber, true);
        let second = sequence(Trigger::NewDonor, true);

        store
            .insert_enrollment(Enrollment::new(first.id, "a@x.com", &first.steps[0], now))
            .await
            .unwrap();
        store
            .insert_enrollment(Enrollment::new(second.id, "a@x.com", &second.steps[0], now))
            .await
            .unwrap();
        store
            .insert_enrollment(Enrollment::new(first.id, "b@x.com", &first.steps[0], now))
            .await
            .unwrap();

        assert_eq!(store.cancel_active_enrollments("a@x.com", now).await.unwrap(), 2);
        assert_eq!(store.cancel_active_enrollments("a@x.com", now).await.unwrap(), 0);

        let untouched = store.enrollment(first.id, "b@x.com").await.unwrap().unwrap();
        assert!(untouched.is_active());
    }

    #[tokio::test]
    async fn test_begin_sending_is_compare_and_set() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let campaign = Campaign::draft("News", "<p>News</p>", now).unwrap();
        store.insert_campaign(campaign.clone()).await.unwrap();

        let sending = store.begin_sending(campaign.id, now).await.unwrap();
        assert_eq!(sending.status, CampaignStatus::Sending);

        let err = store.begin_sending(campaign.id, now).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::NotSendable {
                status: CampaignStatus::Sending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_send_records_roundtrip() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let campaign = Campaign::draft("News", "<p>News</p>", now).unwrap();
        let mut record = EmailSendRecord::queued(campaign.id, "a@x.com", now);

        store
            .insert_send_records(std::slice::from_ref(&record))
            .await
            .unwrap();
        assert!(
            store
                .insert_send_records(std::slice::from_ref(&record))
                .await
                .unwrap_err()
                .is_already_exists()
        );

        record.mark_sent(Some("msg-1".to_string()), now);
        store.update_send_record(&record).await.unwrap();

        assert_eq!(store.send_records(campaign.id).await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_active_subscribers_skip_unsubscribed() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let keep = Subscriber::new("keep@x.com", now);
        let mut leave = Subscriber::new("leave@x.com", now + Duration::seconds(1));
        leave.unsubscribed = true;

        store.upsert_subscriber(keep.clone()).await.unwrap();
        store.upsert_subscriber(leave.clone()).await.unwrap();

        assert_eq!(store.active_subscribers().await.unwrap(), vec![keep]);
        assert_eq!(
            store
                .subscriber_by_token(&leave.unsubscribe_token)
                .await
                .unwrap()
                .map(|s| s.email),
            Some("leave@x.com".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = MemoryStore::new();
        let seq = sequence(Trigger::NewDonor, true);
        assert!(store.update_sequence(&seq).await.unwrap_err().is_not_found());
    }
}

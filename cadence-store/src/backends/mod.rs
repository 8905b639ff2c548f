/// Implement the three store traits for a backend exposing
/// `read(|&StoreState| ..)` and `async write(|&mut StoreState| ..)`.
macro_rules! impl_stores {
    ($backend:ty) => {
        #[async_trait::async_trait]
        impl $crate::SequenceStore for $backend {
            async fn insert_sequence(&self, sequence: cadence_common::Sequence) -> $crate::Result<()> {
                self.write(move |state| state.insert_sequence(sequence)).await
            }

            async fn update_sequence(&self, sequence: &cadence_common::Sequence) -> $crate::Result<()> {
                self.write(|state| state.update_sequence(sequence)).await
            }

            async fn sequence(
                &self,
                id: cadence_common::SequenceId,
            ) -> $crate::Result<Option<cadence_common::Sequence>> {
                Ok(self.read(|state| state.sequence(id)))
            }

            async fn sequences(&self) -> $crate::Result<Vec<cadence_common::Sequence>> {
                Ok(self.read(|state| state.sequences()))
            }

            async fn active_sequences(
                &self,
                trigger: cadence_common::Trigger,
            ) -> $crate::Result<Vec<cadence_common::Sequence>> {
                Ok(self.read(|state| state.active_sequences(trigger)))
            }

            async fn insert_enrollment(
                &self,
                enrollment: cadence_common::Enrollment,
            ) -> $crate::Result<()> {
                self.write(move |state| state.insert_enrollment(enrollment)).await
            }

            async fn enrollment(
                &self,
                sequence_id: cadence_common::SequenceId,
                email: &str,
            ) -> $crate::Result<Option<cadence_common::Enrollment>> {
                Ok(self.read(|state| state.enrollment(sequence_id, email)))
            }

            async fn update_enrollment(
                &self,
                enrollment: &cadence_common::Enrollment,
            ) -> $crate::Result<()> {
                self.write(|state| state.update_enrollment(enrollment)).await
            }

            async fn due_enrollments(
                &self,
                now: chrono::DateTime<chrono::Utc>,
            ) -> $crate::Result<Vec<cadence_common::Enrollment>> {
                Ok(self.read(|state| state.due_enrollments(now)))
            }

            async fn enrollments_for_sequence(
                &self,
                sequence_id: cadence_common::SequenceId,
            ) -> $crate::Result<Vec<cadence_common::Enrollment>> {
                Ok(self.read(|state| state.enrollments_for_sequence(sequence_id)))
            }

            async fn cancel_active_enrollments(
                &self,
                email: &str,
                now: chrono::DateTime<chrono::Utc>,
            ) -> $crate::Result<usize> {
                self.write(|state| Ok(state.cancel_active_enrollments(email, now)))
                    .await
            }
        }

        #[async_trait::async_trait]
        impl $crate::CampaignStore for $backend {
            async fn insert_campaign(&self, campaign: cadence_common::Campaign) -> $crate::Result<()> {
                self.write(move |state| state.insert_campaign(campaign)).await
            }

            async fn campaign(
                &self,
                id: cadence_common::CampaignId,
            ) -> $crate::Result<Option<cadence_common::Campaign>> {
                Ok(self.read(|state| state.campaign(id)))
            }

            async fn campaigns(&self) -> $crate::Result<Vec<cadence_common::Campaign>> {
                Ok(self.read(|state| state.campaigns()))
            }

            async fn update_campaign(&self, campaign: &cadence_common::Campaign) -> $crate::Result<()> {
                self.write(|state| state.update_campaign(campaign)).await
            }

            async fn begin_sending(
                &self,
                id: cadence_common::CampaignId,
                now: chrono::DateTime<chrono::Utc>,
            ) -> $crate::Result<cadence_common::Campaign> {
                self.write(|state| state.begin_sending(id, now)).await
            }

            async fn insert_send_records(
                &self,
                records: &[cadence_common::EmailSendRecord],
            ) -> $crate::Result<()> {
                self.write(|state| state.insert_send_records(records)).await
            }

            async fn update_send_record(
                &self,
                record: &cadence_common::EmailSendRecord,
            ) -> $crate::Result<()> {
                self.write(|state| state.update_send_record(record)).await
            }

            async fn send_records(
                &self,
                campaign_id: cadence_common::CampaignId,
            ) -> $crate::Result<Vec<cadence_common::EmailSendRecord>> {
                Ok(self.read(|state| state.send_records(campaign_id)))
            }
        }

        #[async_trait::async_trait]
        impl $crate::SubscriberStore for $backend {
            async fn upsert_subscriber(
                &self,
                subscriber: cadence_common::Subscriber,
            ) -> $crate::Result<()> {
                self.write(move |state| {
                    state.upsert_subscriber(subscriber);
                    Ok(())
                })
                .await
            }

            async fn subscriber_by_email(
                &self,
                email: &str,
            ) -> $crate::Result<Option<cadence_common::Subscriber>> {
                Ok(self.read(|state| state.subscriber_by_email(email)))
            }

            async fn subscriber_by_token(
                &self,
                token: &str,
            ) -> $crate::Result<Option<cadence_common::Subscriber>> {
                Ok(self.read(|state| state.subscriber_by_token(token)))
            }

            async fn active_subscribers(&self) -> $crate::Result<Vec<cadence_common::Subscriber>> {
                Ok(self.read(|state| state.active_subscribers()))
            }
        }
    };
}

pub(crate) use impl_stores;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

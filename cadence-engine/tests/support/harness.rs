//! Engine wired to an in-memory store, a manual clock and a mock transport

use std::sync::Arc;

use cadence_common::{
    Clock, ManualClock, NewSequence, NewStep, Sequence, Subscriber, Trigger,
};
use cadence_engine::{CampaignConfig, CampaignSender, DripEngine, Links};
use cadence_store::Stores;
use chrono::{DateTime, Duration, TimeZone, Utc};

use super::MockTransport;

pub const APP_URL: &str = "https://example.org";

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().unwrap()
}

pub struct Harness {
    pub stores: Stores,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<MockTransport>,
    pub drip: Arc<DripEngine>,
    pub campaigns: CampaignSender,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_campaign_config(CampaignConfig {
            batch_size: 50,
            batch_delay_ms: 1,
        })
    }

    pub fn with_campaign_config(config: CampaignConfig) -> Self {
        let stores = Stores::memory();
        let clock = Arc::new(ManualClock::new(start()));
        let transport = Arc::new(MockTransport::new());
        let links = Links::new(APP_URL);

        let drip = DripEngine::new(stores.sequences.clone(), transport.clone(), clock.clone())
            .with_links(links.clone());
        let campaigns = CampaignSender::new(
            stores.campaigns.clone(),
            stores.subscribers.clone(),
            transport.clone(),
            clock.clone(),
        )
        .with_links(links)
        .with_config(config);

        Self {
            stores,
            clock,
            transport,
            drip: Arc::new(drip),
            campaigns,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance_days(&self, days: i64) {
        self.clock.advance(Duration::days(days));
    }

    /// Create an active sequence from `(delay_days, subject)` pairs
    pub async fn sequence(&self, name: &str, trigger: Trigger, steps: &[(u32, &str)]) -> Sequence {
        self.drip
            .create_sequence(NewSequence {
                name: name.to_owned(),
                trigger,
                active: None,
                steps: steps
                    .iter()
                    .map(|(delay_days, subject)| NewStep {
                        delay_days: *delay_days,
                        subject: (*subject).to_owned(),
                        html_content: format!("<p>{subject}</p>"),
                    })
                    .collect(),
            })
            .await
            .unwrap()
    }

    /// `count` active subscribers named `reader{n}@example.com`
    pub async fn subscribers(&self, count: usize) -> Vec<Subscriber> {
        let mut subscribers = Vec::with_capacity(count);
        for n in 0..count {
            let subscriber = Subscriber::new(format!("reader{n}@example.com"), self.now());
            self.stores
                .subscribers
                .upsert_subscriber(subscriber.clone())
                .await
                .unwrap();
            subscribers.push(subscriber);
        }
        subscribers
    }
}

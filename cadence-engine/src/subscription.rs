//! Newsletter sign-up and token unsubscribe.
//!
//! Sign-ups are the public entry point into the drip engine, so they pass
//! through a [`RateLimiter`] keyed by the caller before anything else.

use std::sync::Arc;

use cadence_common::{Clock, Subscriber, Trigger, subscriber::new_token, validation};
use cadence_store::SubscriberStore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    drip::DripEngine,
    error::EngineError,
    layout,
    outbound::OutboundQueue,
    rate_limiter::RateLimiter,
    transport::OutboundEmail,
};

/// ```ron
/// subscriptions: (notify: Some("team@example.org")),
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Address told about every new sign-up
    #[serde(default)]
    pub notify: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    RateLimited,
    Subscribed {
        subscriber: Subscriber,
        /// Sequences the address was enrolled in
        enrolled: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    InvalidToken,
    AlreadyUnsubscribed,
    Unsubscribed { cancelled: usize },
}

#[derive(Debug)]
pub struct SubscriptionManager {
    subscribers: Arc<dyn SubscriberStore>,
    drip: Arc<DripEngine>,
    limiter: Arc<dyn RateLimiter>,
    clock: Arc<dyn Clock>,
    notifications: Option<(Arc<OutboundQueue>, String)>,
}

impl SubscriptionManager {
    pub fn new(
        subscribers: Arc<dyn SubscriberStore>,
        drip: Arc<DripEngine>,
        limiter: Arc<dyn RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscribers,
            drip,
            limiter,
            clock,
            notifications: None,
        }
    }

    /// Queue a notice to `address` for every sign-up
    #[must_use]
    pub fn with_notifications(mut self, queue: Arc<OutboundQueue>, address: String) -> Self {
        self.notifications = Some((queue, address));
        self
    }

    /// Subscribe `email` on behalf of `client_key`.
    ///
    /// Active subscribers keep their unsubscribe token, so links already
    /// delivered stay valid. An address that had unsubscribed is re-activated
    /// with a fresh token. Every successful call enrolls the address for
    /// [`Trigger::NewSubscriber`]; sequences it is already enrolled in are
    /// left alone.
    pub async fn subscribe(
        &self,
        client_key: &str,
        email: &str,
    ) -> Result<SubscribeOutcome, EngineError> {
        if !self.limiter.check(client_key) {
            warn!(%client_key, "Subscription rate limited");
            return Ok(SubscribeOutcome::RateLimited);
        }

        let email = email.trim();
        validation::email(email)?;

        let subscriber = match self.subscribers.subscriber_by_email(email).await? {
            Some(existing) if !existing.unsubscribed => existing,
            Some(mut existing) => {
                existing.unsubscribe_token = new_token();
                existing.unsubscribed = false;
                existing
            }
            None => Subscriber::new(email, self.clock.now()),
        };
        self.subscribers.upsert_subscriber(subscriber.clone()).await?;

        let enrolled = self.drip.enroll(email, Trigger::NewSubscriber).await?.enrolled;

        if let Some((queue, address)) = &self.notifications {
            queue.enqueue(OutboundEmail::new(
                address,
                format!("Newsletter signup: {email}"),
                format!("<p>{} subscribed to the newsletter.</p>", layout::escape(email)),
            ));
        }

        info!(%email, enrolled, "Subscribed");
        Ok(SubscribeOutcome::Subscribed {
            subscriber,
            enrolled,
        })
    }

    /// Unsubscribe whoever owns `token` and stop all of their sequences
    pub async fn unsubscribe(&self, token: &str) -> Result<UnsubscribeOutcome, EngineError> {
        let Some(mut subscriber) = self.subscribers.subscriber_by_token(token).await? else {
            return Ok(UnsubscribeOutcome::InvalidToken);
        };
        if subscriber.unsubscribed {
            return Ok(UnsubscribeOutcome::AlreadyUnsubscribed);
        }

        subscriber.unsubscribed = true;
        self.subscribers.upsert_subscriber(subscriber.clone()).await?;
        let cancelled = self.drip.cancel_all(&subscriber.email).await?;

        info!(email = %subscriber.email, cancelled, "Unsubscribed");
        Ok(UnsubscribeOutcome::Unsubscribed { cancelled })
    }
}

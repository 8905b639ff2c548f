//! Sign-up, rate limiting and token unsubscribe
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::sync::Arc;

use cadence_common::{ManualClock, Trigger};
use cadence_engine::{
    EngineError, OutboundConfig, OutboundQueue, RateLimitConfig, SubscribeOutcome,
    SubscriptionManager, TaskStatus, TokenBucketLimiter, UnsubscribeOutcome,
};
use pretty_assertions::assert_eq;
use support::Harness;

fn manager(h: &Harness, burst_size: u32) -> SubscriptionManager {
    let limiter = TokenBucketLimiter::new(RateLimitConfig {
        requests_per_second: 0.0,
        burst_size,
        max_keys: 100,
    });

    SubscriptionManager::new(
        h.stores.subscribers.clone(),
        h.drip.clone(),
        Arc::new(limiter),
        h.clock.clone(),
    )
}

fn subscribed(outcome: SubscribeOutcome) -> (cadence_common::Subscriber, usize) {
    match outcome {
        SubscribeOutcome::Subscribed {
            subscriber,
            enrolled,
        } => (subscriber, enrolled),
        SubscribeOutcome::RateLimited => panic!("unexpectedly rate limited"),
    }
}

#[tokio::test]
async fn test_subscribe_enrolls_new_subscriber_sequences() {
    let h = Harness::new();
    h.sequence("Welcome", Trigger::NewSubscriber, &[(0, "Welcome")]).await;
    h.sequence("Donors", Trigger::NewDonor, &[(0, "Thanks")]).await;
    let subscriptions = manager(&h, 10);

    let (subscriber, enrolled) =
        subscribed(subscriptions.subscribe("10.0.0.1", " new@x.com ").await.unwrap());

    assert_eq!(subscriber.email, "new@x.com");
    assert!(!subscriber.unsubscribed);
    assert_eq!(enrolled, 1);

    let stored = h
        .stores
        .subscribers
        .subscriber_by_email("new@x.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, subscriber);
}

#[tokio::test]
async fn test_subscribe_rejects_bad_address() {
    let h = Harness::new();
    let subscriptions = manager(&h, 10);

    let err = subscriptions.subscribe("10.0.0.1", "not-an-address").await.unwrap_err();

    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(err.to_string(), "Invalid input: Valid email required");
}

#[tokio::test]
async fn test_subscribe_is_rate_limited_per_client() {
    let h = Harness::new();
    let subscriptions = manager(&h, 2);

    for n in 0..2 {
        let outcome = subscriptions
            .subscribe("10.0.0.1", &format!("r{n}@x.com"))
            .await
            .unwrap();
        assert!(matches!(outcome, SubscribeOutcome::Subscribed { .. }));
    }

    let limited = subscriptions.subscribe("10.0.0.1", "r3@x.com").await.unwrap();
    assert_eq!(limited, SubscribeOutcome::RateLimited);
    assert!(
        h.stores
            .subscribers
            .subscriber_by_email("r3@x.com")
            .await
            .unwrap()
            .is_none()
    );

    let other = subscriptions.subscribe("10.0.0.2", "r3@x.com").await.unwrap();
    assert!(matches!(other, SubscribeOutcome::Subscribed { .. }));
}

#[tokio::test]
async fn test_unsubscribe_cancels_everything() {
    let h = Harness::new();
    h.sequence("One", Trigger::NewSubscriber, &[(1, "A")]).await;
    h.sequence("Two", Trigger::NewSubscriber, &[(2, "B")]).await;
    let subscriptions = manager(&h, 10);
    let (subscriber, _) = subscribed(subscriptions.subscribe("ip", "a@x.com").await.unwrap());

    assert_eq!(
        subscriptions.unsubscribe(&subscriber.unsubscribe_token).await.unwrap(),
        UnsubscribeOutcome::Unsubscribed { cancelled: 2 }
    );
    assert_eq!(
        subscriptions.unsubscribe(&subscriber.unsubscribe_token).await.unwrap(),
        UnsubscribeOutcome::AlreadyUnsubscribed
    );
    assert_eq!(
        subscriptions.unsubscribe("no-such-token").await.unwrap(),
        UnsubscribeOutcome::InvalidToken
    );

    h.advance_days(5);
    assert_eq!(h.drip.process_due_steps().await.unwrap().processed, 0);
    assert!(h.stores.subscribers.active_subscribers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resubscribing_while_active_keeps_token() {
    let h = Harness::new();
    let subscriptions = manager(&h, 10);
    let (first, _) = subscribed(subscriptions.subscribe("10.0.0.1", "a@x.com").await.unwrap());

    let (second, _) = subscribed(subscriptions.subscribe("10.0.0.2", "a@x.com").await.unwrap());

    assert_eq!(second, first);
}

#[tokio::test]
async fn test_delivered_campaign_link_survives_resubscribe() {
    let h = Harness::new();
    let subscriptions = manager(&h, 10);
    subscriptions.subscribe("10.0.0.1", "a@x.com").await.unwrap();

    let campaign = h.campaigns.create_campaign("News", "<p>News</p>").await.unwrap();
    h.campaigns.send(campaign.id).await.unwrap();
    let html = h.transport.sent().pop().unwrap().html;
    let token = html
        .split("unsubscribe?token=")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap()
        .to_owned();

    subscriptions.subscribe("10.0.0.2", "a@x.com").await.unwrap();

    assert_eq!(
        subscriptions.unsubscribe(&token).await.unwrap(),
        UnsubscribeOutcome::Unsubscribed { cancelled: 0 }
    );
}

#[tokio::test]
async fn test_resubscribe_after_unsubscribe_issues_fresh_token() {
    let h = Harness::new();
    let subscriptions = manager(&h, 10);
    let (first, _) = subscribed(subscriptions.subscribe("ip", "a@x.com").await.unwrap());
    subscriptions.unsubscribe(&first.unsubscribe_token).await.unwrap();

    let (second, _) = subscribed(subscriptions.subscribe("ip", "a@x.com").await.unwrap());

    assert_eq!(second.id, first.id);
    assert!(!second.unsubscribed);
    assert_ne!(second.unsubscribe_token, first.unsubscribe_token);
    assert_eq!(
        subscriptions.unsubscribe(&first.unsubscribe_token).await.unwrap(),
        UnsubscribeOutcome::InvalidToken
    );
}

#[tokio::test]
async fn test_signup_notification_is_queued() {
    let h = Harness::new();
    let queue = Arc::new(OutboundQueue::new(
        h.transport.clone(),
        Arc::new(ManualClock::new(h.now())),
        OutboundConfig::default(),
    ));
    let subscriptions =
        manager(&h, 10).with_notifications(queue.clone(), String::from("team@example.org"));

    subscriptions.subscribe("ip", "a@x.com").await.unwrap();

    let tasks = queue.all();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].email.to, "team@example.org");
    assert_eq!(tasks[0].email.subject, "Newsletter signup: a@x.com");
    assert_eq!(tasks[0].status, TaskStatus::Pending);

    queue.process_ready().await;
    assert!(matches!(
        queue.get(tasks[0].id).unwrap().status,
        TaskStatus::Sent { .. }
    ));
}

#[tokio::test]
async fn test_signup_notification_escapes_address() {
    let h = Harness::new();
    let queue = Arc::new(OutboundQueue::new(
        h.transport.clone(),
        h.clock.clone(),
        OutboundConfig::default(),
    ));
    let subscriptions =
        manager(&h, 10).with_notifications(queue.clone(), String::from("team@example.org"));

    subscriptions
        .subscribe("ip", "<script>\"x\"@x.com")
        .await
        .unwrap();

    let html = &queue.all()[0].email.html;
    assert!(!html.contains("<script>"));
    assert!(html.contains("&lt;script&gt;&quot;x&quot;@x.com"));
}

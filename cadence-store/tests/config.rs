#![allow(clippy::unwrap_used, clippy::expect_used)]

use cadence_common::{Campaign, Subscriber};
use cadence_store::StoreConfig;
use chrono::Utc;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_memory_handles_share_one_backend() {
    let stores = StoreConfig::Memory.open().await.unwrap();
    let now = Utc::now();

    let subscriber = Subscriber::new("reader@example.com", now);
    stores
        .subscribers
        .upsert_subscriber(subscriber.clone())
        .await
        .unwrap();

    let copy = stores.clone();
    assert_eq!(
        copy.subscribers
            .subscriber_by_token(&subscriber.unsubscribe_token)
            .await
            .unwrap(),
        Some(subscriber)
    );
    assert!(copy.campaigns.campaigns().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_config_persists_between_opens() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::File {
        path: dir.path().join("state.bin"),
    };
    let campaign = Campaign::draft("Hello", "<p>Hello</p>", Utc::now()).unwrap();

    {
        let stores = config.open().await.unwrap();
        stores.campaigns.insert_campaign(campaign.clone()).await.unwrap();
    }

    let stores = config.open().await.unwrap();
    assert_eq!(stores.campaigns.campaigns().await.unwrap(), vec![campaign]);
}

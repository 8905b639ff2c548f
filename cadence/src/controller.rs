use std::sync::{Arc, LazyLock};

use cadence_common::{Clock, Signal, SystemClock, internal, logging, tracing};
use cadence_engine::{
    CampaignConfig, CampaignSender, DripConfig, DripEngine, Links, OutboundConfig, OutboundQueue,
    RateLimitConfig, Scheduler, SubscriptionConfig, SubscriptionManager, TokenBucketLimiter,
    TransportConfig,
};
use cadence_store::StoreConfig;
use serde::Deserialize;
use tokio::sync::broadcast;

/// Top-level configuration, read from `cadence.config.ron`.
///
/// Every section is optional and falls back to its defaults.
#[derive(Debug, Default, Deserialize)]
pub struct Cadence {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub links: Links,
    #[serde(default)]
    pub drip: DripConfig,
    #[serde(default)]
    pub campaign: CampaignConfig,
    #[serde(default)]
    pub scheduler: Scheduler,
    #[serde(default, alias = "rate_limiter")]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub outbound: OutboundConfig,
    #[serde(default)]
    pub subscriptions: SubscriptionConfig,
}

/// Everything wired together over one store
#[derive(Debug)]
pub struct Runtime {
    pub drip: Arc<DripEngine>,
    pub campaigns: Arc<CampaignSender>,
    pub subscriptions: SubscriptionManager,
    pub outbound: Arc<OutboundQueue>,
    pub scheduler: Scheduler,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered, finishing in-flight work");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

impl Cadence {
    /// Open the store and build every component on top of it
    ///
    /// # Errors
    ///
    /// If the configured store cannot be opened
    pub async fn build(&self) -> anyhow::Result<Runtime> {
        let stores = self.store.open().await?;
        let transport = self.transport.build();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let drip = Arc::new(
            DripEngine::new(stores.sequences.clone(), transport.clone(), clock.clone())
                .with_links(self.links.clone())
                .with_config(self.drip.clone()),
        );

        let campaigns = Arc::new(
            CampaignSender::new(
                stores.campaigns.clone(),
                stores.subscribers.clone(),
                transport.clone(),
                clock.clone(),
            )
            .with_links(self.links.clone())
            .with_config(self.campaign.clone()),
        );

        let outbound = Arc::new(OutboundQueue::new(
            transport,
            clock.clone(),
            self.outbound.clone(),
        ));

        let mut subscriptions = SubscriptionManager::new(
            stores.subscribers,
            drip.clone(),
            Arc::new(TokenBucketLimiter::new(self.rate_limit.clone())),
            clock,
        );
        if let Some(address) = &self.subscriptions.notify {
            subscriptions = subscriptions.with_notifications(outbound.clone(), address.clone());
        }

        Ok(Runtime {
            drip,
            campaigns,
            subscriptions,
            outbound,
            scheduler: self.scheduler.clone(),
        })
    }

    /// Run the scheduler and outbound queue until CTRL+C or SIGTERM.
    ///
    /// Work that is in flight when the signal arrives is allowed to finish.
    ///
    /// # Errors
    ///
    /// If the store cannot be opened or signal handlers cannot be installed
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let runtime = self.build().await?;
        internal!(level = INFO, "Controller running");

        let scheduler = runtime.scheduler.serve(
            &runtime.drip,
            &runtime.campaigns,
            SHUTDOWN_BROADCAST.subscribe(),
        );
        let outbound = runtime.outbound.serve(SHUTDOWN_BROADCAST.subscribe());

        let workers = async {
            tokio::join!(scheduler, outbound);
        };
        tokio::pin!(workers);

        let ret = tokio::select! {
            () = &mut workers => {
                tracing::warn!("Workers exited before shutdown was requested");
                Ok(())
            }
            r = shutdown() => {
                workers.await;
                r
            }
        };

        internal!(level = INFO, "Shutting down...");

        ret
    }
}

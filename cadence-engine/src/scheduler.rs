//! Periodic driver for drip runs and scheduled campaigns

use std::time::Duration;

use cadence_common::{Signal, internal};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::{
    campaign::{CampaignSendResult, CampaignSender},
    drip::{DripEngine, DripRunReport},
    error::EngineError,
};

/// ```ron
/// scheduler: (tick_interval_secs: 600, dispatch_scheduled: true),
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scheduler {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Also send scheduled campaigns that have come due
    #[serde(default = "default_dispatch_scheduled")]
    pub dispatch_scheduled: bool,
}

const fn default_tick_interval_secs() -> u64 {
    600
}

const fn default_dispatch_scheduled() -> bool {
    true
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            dispatch_scheduled: default_dispatch_scheduled(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub drip: DripRunReport,
    pub campaigns: Vec<(cadence_common::CampaignId, CampaignSendResult)>,
}

impl Scheduler {
    /// One pass: due drip steps first, then due campaigns if enabled.
    ///
    /// A drip failure does not prevent the campaign pass; the first error
    /// is returned after both have run.
    pub async fn tick(
        &self,
        drip: &DripEngine,
        campaigns: &CampaignSender,
    ) -> Result<TickReport, EngineError> {
        let mut report = TickReport::default();
        let mut first_error = None;

        match drip.process_due_steps().await {
            Ok(run) => report.drip = run,
            Err(err) => {
                error!("Drip run failed: {err}");
                first_error = Some(err);
            }
        }

        if self.dispatch_scheduled {
            match campaigns.send_due_scheduled().await {
                Ok(sent) => report.campaigns = sent,
                Err(err) => {
                    error!("Scheduled campaign dispatch failed: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }

        first_error.map_or(Ok(report), Err)
    }

    /// Tick every `tick_interval_secs`, starting immediately, until shutdown
    pub async fn serve(
        &self,
        drip: &DripEngine,
        campaigns: &CampaignSender,
        mut shutdown: broadcast::Receiver<Signal>,
    ) {
        info!(
            interval_secs = self.tick_interval_secs,
            dispatch_scheduled = self.dispatch_scheduled,
            "Scheduler starting"
        );

        let mut timer = tokio::time::interval(Duration::from_secs(self.tick_interval_secs.max(1)));
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Ok(report) = self.tick(drip, campaigns).await {
                        internal!(
                            "Tick complete: {} drip steps processed, {} campaigns sent",
                            report.drip.processed,
                            report.campaigns.len()
                        );
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!("Scheduler received shutdown signal");
                            break;
                        }
                        Err(e) => {
                            error!("Scheduler shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        internal!("Scheduler shutdown complete");
    }
}

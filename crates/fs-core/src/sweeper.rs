//! # Expiry Sweeper
//!
//! Background task that force-expires listings which outlived their expiry
//! without an explicit status update. Keeps no checkpoint: every tick asks
//! the store for `bulk_expire(now)`, which is idempotent.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::traits::ListingRepo;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct ExpirySweeper {
    listings: Arc<dyn ListingRepo>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(listings: Arc<dyn ListingRepo>) -> Self {
        Self {
            listings,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one sweep against the current wall clock.
    pub async fn sweep_once(&self) -> Result<u64> {
        let expired = self.listings.bulk_expire(Utc::now()).await?;
        if expired > 0 {
            info!(expired, "expired overdue listings");
        } else {
            debug!("expiry sweep found nothing to expire");
        }
        Ok(expired)
    }

    /// Spawns the sweep loop. The first sweep runs one full interval after
    /// spawning. The loop exits once `shutdown` flips to `true` or its
    /// sender is dropped.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately
        ticker.tick().await;

        info!(interval_secs = self.interval.as_secs(), "expiry sweeper started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "expiry sweep failed (will retry next tick)");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("expiry sweeper stopped");
    }
}

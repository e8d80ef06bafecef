//! Background Jobs
//!
//! Periodic refresh of agent stats from the source tables.

use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use crate::services::StatsService;

/// Configuration for the stats refresh job
#[derive(Debug, Clone)]
pub struct StatsJobConfig {
    /// Interval between refresh runs (default: 5 minutes)
    pub interval: Duration,
    /// Whether the job is enabled
    pub enabled: bool,
}

impl Default for StatsJobConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60), // 5 minutes
            enabled: true,
        }
    }
}

/// Background job runner for agent stats refresh
///
/// Counters are kept current by the delivery transitions themselves; this
/// sweep corrects drift, for example after manual database surgery.
pub struct StatsJob {
    pool: PgPool,
    config: StatsJobConfig,
}

impl StatsJob {
    pub fn new(pool: PgPool, config: StatsJobConfig) -> Self {
        Self { pool, config }
    }

    /// Start the stats refresh job
    ///
    /// Returns a shutdown sender that can be used to stop the job.
    pub fn start(self) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        if !self.config.enabled {
            info!("Stats refresh job is disabled");
            return shutdown_tx;
        }

        let pool = self.pool.clone();
        let interval = self.config.interval;

        tokio::spawn(async move {
            info!("Starting stats refresh job with interval {:?}", interval);

            // Run immediately on startup
            let service = StatsService::new(pool.clone());
            match service.recompute_all().await {
                Ok(count) => info!(agents = count, "Initial stats refresh completed"),
                Err(e) => error!("Initial stats refresh failed: {}", e),
            }

            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let service = StatsService::new(pool.clone());
                        match service.recompute_all().await {
                            Ok(count) => info!(agents = count, "Stats refresh completed"),
                            Err(e) => error!("Stats refresh failed: {}", e),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Stats refresh job shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

/// Run a single stats refresh (for manual triggering or testing)
pub async fn run_stats_refresh(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let service = StatsService::new(pool.clone());
    service.recompute_all().await
}

//! Periodic resync of the paged API source

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};
use voterspheres_common::retry::RetryDecision;
use voterspheres_ingest::PagedSource;

use super::config::ResyncConfig;
use super::coordinator::IngestCoordinator;
use super::stats::{ImportOutcome, ImportStats};

/// Re-runs the paged import on a fixed interval until shutdown
pub struct ResyncScheduler {
    coordinator: Arc<IngestCoordinator>,
    source: Arc<dyn PagedSource>,
    config: ResyncConfig,
}

impl ResyncScheduler {
    pub fn new(
        coordinator: Arc<IngestCoordinator>,
        source: Arc<dyn PagedSource>,
        config: ResyncConfig,
    ) -> Self {
        Self {
            coordinator,
            source,
            config,
        }
    }

    /// Start the scheduler in background
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let cancel = self.coordinator.cancellation().clone();
            info!(
                interval_secs = self.config.interval.as_secs(),
                "Resync scheduler started"
            );

            // Initial delay to let server start
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Resync scheduler stopped");
                    return;
                }
                _ = sleep(self.config.initial_delay) => {}
            }

            loop {
                self.run_once().await;

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(self.config.interval) => {}
                }
            }

            info!("Resync scheduler stopped");
        })
    }

    /// One resync, retried while it ends fatally and the policy allows
    pub async fn run_once(&self) -> ImportStats {
        let cancel = self.coordinator.cancellation();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let stats = self
                .coordinator
                .import_from_paged_source(self.source.as_ref())
                .await;

            if stats.outcome != ImportOutcome::Fatal {
                return stats;
            }

            match self.config.retry.decide(attempts) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        attempt = attempts,
                        delay_secs = delay.as_secs(),
                        error = stats.error.as_deref().unwrap_or_default(),
                        "Resync failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return stats,
                        _ = sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp => {
                    error!(
                        attempts,
                        error = stats.error.as_deref().unwrap_or_default(),
                        "Resync failed, waiting for the next interval"
                    );
                    return stats;
                }
            }
        }
    }
}

//! Ingestion configuration

use std::time::Duration;
use voterspheres_common::retry::RetryPolicy;
use voterspheres_ingest::ApiSourceConfig;

use crate::store::CollisionPolicy;

/// Records per `upsert_batch` call
pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const MAX_BATCH_SIZE: usize = 5_000;

pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 86_400; // daily
pub const DEFAULT_RESYNC_DELAY_SECS: u64 = 60;

/// Main ingestion configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub collision_policy: CollisionPolicy,
    /// Append the election year to derived slugs
    pub include_cycle_in_slug: bool,
    /// Retries for a single source page
    pub page_retry: RetryPolicy,
    /// Paged API source; `None` disables API imports and resync
    pub api: Option<ApiSourceConfig>,
    pub file_delimiter: u8,
    pub resync: ResyncConfig,
}

/// Periodic re-import of the API source
#[derive(Debug, Clone)]
pub struct ResyncConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Wait before the first run so the server can come up
    pub initial_delay: Duration,
    /// Retries for a resync that ended fatally
    pub retry: RetryPolicy,
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            initial_delay: Duration::from_secs(DEFAULT_RESYNC_DELAY_SECS),
            retry: RetryPolicy::new(3, Duration::from_secs(60), Duration::from_secs(3_600)),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            collision_policy: CollisionPolicy::default(),
            include_cycle_in_slug: false,
            page_retry: RetryPolicy::default(),
            api: None,
            file_delimiter: b',',
            resync: ResyncConfig::default(),
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            anyhow::bail!(
                "INGEST_BATCH_SIZE must be between 1 and {} (got {})",
                MAX_BATCH_SIZE,
                self.batch_size
            );
        }
        if let Some(api) = &self.api {
            api.validate()?;
        }
        if self.resync.enabled {
            if self.api.is_none() {
                anyhow::bail!("INGEST_RESYNC_ENABLED requires INGEST_API_BASE");
            }
            if self.resync.interval.is_zero() {
                anyhow::bail!("INGEST_RESYNC_INTERVAL_SECS must be greater than 0");
            }
        }
        Ok(())
    }
}

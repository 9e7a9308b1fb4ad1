//! Configuration management
//!
//! Everything is read from the environment (after loading `.env` when
//! present). A variable that is set but does not parse fails startup rather
//! than silently falling back to its default.

use std::str::FromStr;
use std::time::Duration;
use voterspheres_common::retry::RetryPolicy;
use voterspheres_ingest::ApiSourceConfig;

use crate::cache::{
    CacheConfig, DEFAULT_KEY_PREFIX, DEFAULT_LOCAL_CAPACITY, DEFAULT_OP_TIMEOUT_MS,
    DEFAULT_PROFILE_TTL_SECS, DEFAULT_SEARCH_TTL_SECS, DEFAULT_SITEMAP_TTL_SECS,
};
use crate::db::DbConfig;
use crate::ingest::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_RESYNC_DELAY_SECS, DEFAULT_RESYNC_INTERVAL_SECS,
};
use crate::ingest::{IngestConfig, ResyncConfig};
use crate::jobs::engine::{
    DEFAULT_BACKOFF_BASE_SECS, DEFAULT_BACKOFF_MAX_SECS, DEFAULT_CONCURRENCY,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RETENTION_SECS,
    DEFAULT_STALE_AFTER_SECS,
};
use crate::jobs::JobEngineConfig;
use crate::sitemap::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use crate::store::CollisionPolicy;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 20;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Default public base URL used in canonical links and sitemaps.
pub const DEFAULT_SITE_BASE_URL: &str = "http://localhost:8000";

/// Default delay before the startup warm-all, in seconds.
pub const DEFAULT_PREGEN_DELAY_SECS: u64 = 30;

/// Default delay before retrying a failed page fetch, in milliseconds.
pub const DEFAULT_PAGE_BACKOFF_MS: u64 = 1_000;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DbConfig,
    pub cors: CorsConfig,
    pub cache: CacheConfig,
    pub jobs: JobsConfig,
    pub ingest: IngestConfig,
    pub site: SiteConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Background job configuration
#[derive(Debug, Clone)]
pub struct JobsConfig {
    pub engine: JobEngineConfig,
    /// Enqueue a warm-all once after startup
    pub pregen_enabled: bool,
    pub pregen_delay: Duration,
}

/// Public site settings
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub base_url: String,
    pub sitemap_chunk_size: i64,
}

/// Raw value of `name`, treating blank as unset
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parsed value of `name`, or `default` when unset
fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value '{}' for {}: {}", raw, name, e)),
        None => Ok(default),
    }
}

fn env_secs(name: &str, default: u64) -> anyhow::Result<Duration> {
    env_or(name, default).map(Duration::from_secs)
}

fn env_millis(name: &str, default: u64) -> anyhow::Result<Duration> {
    env_or(name, default).map(Duration::from_millis)
}

/// `,`, `;`, `|`, or `tab` / `\t`
pub fn parse_delimiter(raw: &str) -> anyhow::Result<u8> {
    match raw {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        other if other.len() == 1 && other.is_ascii() => Ok(other.as_bytes()[0]),
        other => anyhow::bail!("Delimiter must be a single ASCII character, got '{}'", other),
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env_opt("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let api = match env_opt("INGEST_API_BASE") {
            Some(base) => {
                let mut api = ApiSourceConfig::new(base)
                    .with_per_page(env_or("INGEST_PER_PAGE", voterspheres_ingest::api::DEFAULT_PER_PAGE)?)
                    .with_request_delay(env_millis(
                        "INGEST_REQUEST_DELAY_MS",
                        voterspheres_ingest::api::DEFAULT_REQUEST_DELAY_MS,
                    )?);
                if let Some(key) = env_opt("INGEST_API_KEY") {
                    api = api.with_api_key(key);
                }
                Some(api)
            }
            None => None,
        };

        let config = Config {
            server: ServerConfig {
                host: env_opt("VS_HOST").unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string()),
                port: env_or("VS_PORT", DEFAULT_SERVER_PORT)?,
                shutdown_timeout_secs: env_or("VS_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT_SECS)?,
            },
            database: DbConfig {
                url: database_url,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS)?,
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS)?,
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                )?,
                idle_timeout_secs: Some(env_or(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                )?),
                max_lifetime_secs: Some(1800),
            },
            cors: CorsConfig {
                allowed_origins: env_opt("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_or("CORS_ALLOW_CREDENTIALS", false)?,
            },
            cache: CacheConfig {
                redis_url: env_opt("REDIS_URL"),
                pool_size: env_or("REDIS_POOL_SIZE", crate::cache::redis::DEFAULT_POOL_SIZE)?,
                op_timeout: env_millis("CACHE_OP_TIMEOUT_MS", DEFAULT_OP_TIMEOUT_MS)?,
                connect_timeout: env_secs("REDIS_CONNECT_TIMEOUT_SECS", 5)?,
                search_ttl: env_secs("CACHE_SEARCH_TTL_SECS", DEFAULT_SEARCH_TTL_SECS)?,
                profile_ttl: env_secs("CACHE_PROFILE_TTL_SECS", DEFAULT_PROFILE_TTL_SECS)?,
                sitemap_ttl: env_secs("CACHE_SITEMAP_TTL_SECS", DEFAULT_SITEMAP_TTL_SECS)?,
                local_capacity: env_or("CACHE_LOCAL_CAPACITY", DEFAULT_LOCAL_CAPACITY)?,
                key_prefix: env_opt("CACHE_KEY_PREFIX")
                    .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            },
            jobs: JobsConfig {
                engine: JobEngineConfig {
                    concurrency: env_or("WORKER_CONCURRENCY", DEFAULT_CONCURRENCY)?,
                    retry: RetryPolicy::new(
                        env_or("JOB_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
                        env_secs("JOB_BACKOFF_BASE_SECS", DEFAULT_BACKOFF_BASE_SECS)?,
                        env_secs("JOB_BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS)?,
                    ),
                    poll_interval: env_millis("JOB_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?,
                    stale_after: env_secs("JOB_STALE_AFTER_SECS", DEFAULT_STALE_AFTER_SECS)?,
                    maintenance_interval: Duration::from_secs(
                        crate::jobs::engine::DEFAULT_MAINTENANCE_INTERVAL_SECS,
                    ),
                    retention: env_secs("JOB_RETENTION_SECS", DEFAULT_RETENTION_SECS)?,
                },
                pregen_enabled: env_or("PREGEN_ENABLED", false)?,
                pregen_delay: env_secs("PREGEN_DELAY_SECS", DEFAULT_PREGEN_DELAY_SECS)?,
            },
            ingest: IngestConfig {
                batch_size: env_or("INGEST_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
                collision_policy: env_or("INGEST_COLLISION_POLICY", CollisionPolicy::default())?,
                include_cycle_in_slug: env_or("INGEST_INCLUDE_CYCLE", false)?,
                page_retry: RetryPolicy::new(
                    env_or("INGEST_PAGE_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
                    env_millis("INGEST_PAGE_BACKOFF_MS", DEFAULT_PAGE_BACKOFF_MS)?,
                    Duration::from_secs(60),
                ),
                api,
                file_delimiter: match env_opt("INGEST_FILE_DELIMITER") {
                    Some(raw) => parse_delimiter(&raw)?,
                    None => b',',
                },
                resync: ResyncConfig {
                    enabled: env_or("INGEST_RESYNC_ENABLED", false)?,
                    interval: env_secs("INGEST_RESYNC_INTERVAL_SECS", DEFAULT_RESYNC_INTERVAL_SECS)?,
                    initial_delay: env_secs("INGEST_RESYNC_DELAY_SECS", DEFAULT_RESYNC_DELAY_SECS)?,
                    ..ResyncConfig::default()
                },
            },
            site: SiteConfig {
                base_url: env_opt("SITE_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_SITE_BASE_URL.to_string()),
                sitemap_chunk_size: env_or("SITEMAP_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        self.database.validate()?;
        self.cache.validate()?;
        self.jobs.engine.validate()?;
        self.ingest.validate()?;

        if !(self.site.base_url.starts_with("http://") || self.site.base_url.starts_with("https://")) {
            anyhow::bail!("SITE_BASE_URL must be an http(s) URL");
        }
        if !(1..=MAX_CHUNK_SIZE).contains(&self.site.sitemap_chunk_size) {
            anyhow::bail!(
                "SITEMAP_CHUNK_SIZE must be between 1 and {} (got {})",
                MAX_CHUNK_SIZE,
                self.site.sitemap_chunk_size
            );
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DbConfig::default(),
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: false,
            },
            cache: CacheConfig::default(),
            jobs: JobsConfig {
                engine: JobEngineConfig::default(),
                pregen_enabled: false,
                pregen_delay: Duration::from_secs(DEFAULT_PREGEN_DELAY_SECS),
            },
            ingest: IngestConfig::default(),
            site: SiteConfig {
                base_url: DEFAULT_SITE_BASE_URL.to_string(),
                sitemap_chunk_size: DEFAULT_CHUNK_SIZE,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "DATABASE_URL",
        "VS_PORT",
        "WORKER_CONCURRENCY",
        "INGEST_COLLISION_POLICY",
        "INGEST_API_BASE",
        "SITEMAP_CHUNK_SIZE",
        "CACHE_PROFILE_TTL_SECS",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_reads_environment() {
        clear();
        std::env::set_var("DATABASE_URL", "postgresql://localhost/voterspheres_test");
        std::env::set_var("WORKER_CONCURRENCY", "8");
        std::env::set_var("INGEST_COLLISION_POLICY", "disambiguate");
        std::env::set_var("INGEST_API_BASE", "https://api.example.org/v1");
        std::env::set_var("CACHE_PROFILE_TTL_SECS", "60");

        let config = Config::load().unwrap();
        assert_eq!(config.jobs.engine.concurrency, 8);
        assert_eq!(config.ingest.collision_policy, CollisionPolicy::Disambiguate);
        assert_eq!(config.cache.profile_ttl, Duration::from_secs(60));
        assert_eq!(
            config.ingest.api.as_ref().map(|a| a.base_url.as_str()),
            Some("https://api.example.org/v1")
        );
        clear();
    }

    #[test]
    #[serial]
    fn test_unparseable_value_fails() {
        clear();
        std::env::set_var("DATABASE_URL", "postgresql://localhost/voterspheres_test");
        std::env::set_var("VS_PORT", "eighty");

        let err = Config::load().unwrap_err().to_string();
        assert!(err.contains("VS_PORT"));
        clear();
    }

    #[test]
    #[serial]
    fn test_out_of_range_values_fail() {
        clear();
        std::env::set_var("DATABASE_URL", "postgresql://localhost/voterspheres_test");
        std::env::set_var("WORKER_CONCURRENCY", "501");
        assert!(Config::load().is_err());

        std::env::set_var("WORKER_CONCURRENCY", "25");
        std::env::set_var("SITEMAP_CHUNK_SIZE", "50001");
        assert!(Config::load().is_err());
        clear();
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter("tab").unwrap(), b'\t');
        assert_eq!(parse_delimiter(";").unwrap(), b';');
        assert!(parse_delimiter("::").is_err());
    }
}

//! Process wiring
//!
//! Builds the pool, cache, store, queue and service once and hands out the
//! components that share them. Both binaries start here.

use sqlx::PgPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::CacheFacade;
use crate::config::Config;
use crate::db::{self, PgCandidateStore, PgJobQueue};
use crate::features::FeatureState;
use crate::ingest::IngestCoordinator;
use crate::jobs::{JobEngine, JobQueue, Pregenerator, WarmExecutor};
use crate::render::Renderer;
use crate::service::DirectoryService;
use crate::store::CandidateStore;

pub struct App {
    pub config: Config,
    pub pool: Option<PgPool>,
    pub store: Arc<dyn CandidateStore>,
    pub queue: Arc<dyn JobQueue>,
    pub service: Arc<DirectoryService>,
    /// Cancelled on shutdown; shared by every background task
    pub cancel: CancellationToken,
}

impl App {
    /// Connect to Postgres, run migrations and connect the cache
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let pool = db::create_pool(&config.database).await?;
        info!("Database connection pool established");

        db::run_migrations(&pool).await?;
        info!("Database migrations completed");

        let cache = CacheFacade::connect(config.cache.clone()).await?;
        info!(redis = cache.has_primary(), "Cache initialized");

        let store: Arc<dyn CandidateStore> = Arc::new(PgCandidateStore::new(pool.clone()));
        let queue: Arc<dyn JobQueue> = Arc::new(PgJobQueue::new(pool.clone()));

        Ok(Self::from_parts(config, Some(pool), store, queue, cache))
    }

    /// Assemble from already-built parts
    pub fn from_parts(
        config: Config,
        pool: Option<PgPool>,
        store: Arc<dyn CandidateStore>,
        queue: Arc<dyn JobQueue>,
        cache: CacheFacade,
    ) -> Self {
        let service = Arc::new(DirectoryService::new(
            store.clone(),
            Arc::new(cache),
            Renderer::new(config.site.base_url.clone()),
            config.site.sitemap_chunk_size,
        ));

        Self {
            config,
            pool,
            store,
            queue,
            service,
            cancel: CancellationToken::new(),
        }
    }

    pub fn coordinator(&self) -> IngestCoordinator {
        IngestCoordinator::new(self.store.clone(), self.config.ingest.clone())
            .with_cache(self.service.shared_cache())
            .with_cancellation(self.cancel.clone())
    }

    pub fn pregenerator(&self) -> Pregenerator {
        Pregenerator::new(
            self.store.clone(),
            self.queue.clone(),
            self.config.site.sitemap_chunk_size,
            self.config.jobs.engine.max_attempts(),
        )
        .with_cancellation(self.cancel.clone())
    }

    pub fn engine(&self) -> JobEngine {
        JobEngine::new(
            self.queue.clone(),
            Arc::new(WarmExecutor::new(self.service.clone())),
            self.config.jobs.engine.clone(),
        )
        .with_cancellation(self.cancel.clone())
    }

    pub fn feature_state(&self) -> FeatureState {
        FeatureState {
            service: self.service.clone(),
            queue: self.queue.clone(),
            pregen: Arc::new(self.pregenerator()),
            db: self.pool.clone(),
        }
    }
}

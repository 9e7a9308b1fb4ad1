//! Ingestion coordinator
//!
//! Pulls records from a source, validates them, derives slugs, and writes
//! them to the store in fixed-size batches. Sources are read strictly in
//! order. File parsing runs on a blocking thread and hands rows over a
//! bounded channel, so it stays at most one batch ahead of the writer.
//!
//! Cancellation is checked before every page fetch and every batch write. A
//! cancelled import leaves already-written batches in place and drops the
//! partially filled buffer.
//!
//! With a cache attached, every written batch drops the cached profiles of
//! refreshed records and bumps the search generation.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use voterspheres_common::retry::RetryDecision;
use voterspheres_common::CandidateInput;
use voterspheres_ingest::{DelimitedFileSource, PagedSource, SourceError, SourcePage};

use super::config::IngestConfig;
use super::stats::{ImportOutcome, ImportStats};
use crate::cache::{keys, CacheFacade};
use crate::models::NewCandidate;
use crate::store::{BatchOutcome, CandidateStore, RowSkip, StoreResult};

/// Where an import reads from
pub enum ImportSource<'a> {
    Paged(&'a dyn PagedSource),
    File(&'a DelimitedFileSource),
}

/// Why an import stopped early
enum Stop {
    Cancelled,
    Fatal(String),
}

pub struct IngestCoordinator {
    store: Arc<dyn CandidateStore>,
    config: IngestConfig,
    cache: Option<Arc<CacheFacade>>,
    cancel: CancellationToken,
}

impl IngestCoordinator {
    pub fn new(store: Arc<dyn CandidateStore>, config: IngestConfig) -> Self {
        Self {
            store,
            config,
            cache: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Invalidate cached documents as batches land
    pub fn with_cache(mut self, cache: Arc<CacheFacade>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share a shutdown token with the rest of the process
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn run_import(&self, source: ImportSource<'_>) -> ImportStats {
        match source {
            ImportSource::Paged(source) => self.import_from_paged_source(source).await,
            ImportSource::File(source) => self.import_from_file(source).await,
        }
    }

    /// Import every page of `source`, starting at page 1
    #[tracing::instrument(skip(self, source), fields(source = source.name()))]
    pub async fn import_from_paged_source(&self, source: &dyn PagedSource) -> ImportStats {
        let mut stats = ImportStats::new(source.name());
        info!(batch_size = self.config.batch_size, "Starting paged import");

        let result = self.run_paged(source, &mut stats).await;
        self.conclude(stats, result)
    }

    /// Import every row of a delimited file
    #[tracing::instrument(skip(self, source), fields(path = %source.path().display()))]
    pub async fn import_from_file(&self, source: &DelimitedFileSource) -> ImportStats {
        let mut stats = ImportStats::new(source.source_name());
        info!(batch_size = self.config.batch_size, "Starting file import");

        let result = self.run_file(source, &mut stats).await;
        self.conclude(stats, result)
    }

    /// Validate, slug and write one batch.
    ///
    /// Records that fail validation and rows the store refuses both end up in
    /// the returned skips; only a store-level failure is an error.
    pub async fn upsert_batch(&self, records: Vec<CandidateInput>) -> StoreResult<BatchOutcome> {
        let mut skipped = Vec::new();
        let mut batch = Vec::with_capacity(records.len());

        for record in records {
            let record = record.normalized();
            if let Err(e) = record.validate() {
                skipped.push(RowSkip {
                    reference: record.reference(),
                    reason: e.to_string(),
                });
                continue;
            }

            let slug = record.slug(self.config.include_cycle_in_slug);
            if slug.is_empty() {
                skipped.push(RowSkip {
                    reference: record.reference(),
                    reason: "slug is empty after normalization".to_string(),
                });
                continue;
            }
            batch.push(NewCandidate { slug, input: record });
        }

        let mut outcome = if batch.is_empty() {
            BatchOutcome::default()
        } else {
            self.store
                .upsert_batch(&batch, self.config.collision_policy)
                .await?
        };
        skipped.append(&mut outcome.skipped);

        for skip in &skipped {
            warn!(reference = %skip.reference, reason = %skip.reason, "Skipping record");
        }
        outcome.skipped = skipped;
        Ok(outcome)
    }

    async fn run_paged(&self, source: &dyn PagedSource, stats: &mut ImportStats) -> Result<(), Stop> {
        let mut buffer = Vec::with_capacity(self.config.batch_size);
        let mut page = 1u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Stop::Cancelled);
            }

            let fetched = self.fetch_with_retry(source, page).await?;
            stats.pages_fetched += 1;
            stats.rows_read += (fetched.records.len() + fetched.malformed.len()) as u64;

            for reason in &fetched.malformed {
                warn!(page, reason = %reason, "Skipping malformed record");
                stats.record_skip(format!("{} page {}", source.name(), page), reason.clone());
            }

            if fetched.records.is_empty() && fetched.malformed.is_empty() {
                break;
            }

            for record in fetched.records {
                buffer.push(record);
                if buffer.len() >= self.config.batch_size {
                    self.flush(&mut buffer, stats).await?;
                }
            }

            if fetched.total_pages.is_some_and(|total| page >= total) {
                break;
            }
            page += 1;
        }

        self.flush(&mut buffer, stats).await
    }

    async fn run_file(&self, source: &DelimitedFileSource, stats: &mut ImportStats) -> Result<(), Stop> {
        let (tx, mut rx) = mpsc::channel(self.config.batch_size.max(1));
        let file = source.clone();
        let reader = tokio::task::spawn_blocking(move || -> voterspheres_ingest::Result<()> {
            for row in file.rows()? {
                // A closed channel means the import stopped
                if tx.blocking_send(row).is_err() {
                    break;
                }
            }
            Ok(())
        });

        let mut buffer = Vec::with_capacity(self.config.batch_size);
        let mut result = Ok(());

        while let Some(row) = rx.recv().await {
            stats.rows_read += 1;
            match row {
                Ok(record) => {
                    buffer.push(record);
                    if buffer.len() >= self.config.batch_size {
                        if let Err(stop) = self.flush(&mut buffer, stats).await {
                            result = Err(stop);
                            break;
                        }
                    }
                }
                Err(SourceError::MalformedRow { line, reason }) => {
                    warn!(line, reason = %reason, "Skipping malformed row");
                    stats.record_skip(format!("{}:{}", source.path().display(), line), reason);
                }
                Err(e) => {
                    result = Err(Stop::Fatal(e.to_string()));
                    break;
                }
            }
        }

        drop(rx);
        let read = reader
            .await
            .map_err(|e| Stop::Fatal(format!("file reader task failed: {}", e)))?;
        result?;
        read.map_err(|e| Stop::Fatal(format!("cannot read {}: {}", source.path().display(), e)))?;

        self.flush(&mut buffer, stats).await
    }

    async fn flush(&self, buffer: &mut Vec<CandidateInput>, stats: &mut ImportStats) -> Result<(), Stop> {
        if buffer.is_empty() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }

        let records = std::mem::take(buffer);
        let size = records.len();
        let outcome = self
            .upsert_batch(records)
            .await
            .map_err(|e| Stop::Fatal(e.to_string()))?;

        info!(
            size,
            inserted = outcome.inserted,
            updated = outcome.updated,
            skipped = outcome.skipped.len(),
            "Batch written"
        );
        self.invalidate_cached(&outcome).await;
        stats.absorb(outcome);
        Ok(())
    }

    async fn invalidate_cached(&self, outcome: &BatchOutcome) {
        let Some(cache) = &self.cache else {
            return;
        };
        for slug in &outcome.updated_slugs {
            cache.invalidate(&keys::profile(slug)).await;
        }
        if outcome.written() > 0 {
            cache.bump_search_generation().await;
        }
    }

    async fn fetch_with_retry(&self, source: &dyn PagedSource, page: u32) -> Result<SourcePage, Stop> {
        let policy = &self.config.page_retry;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let err = match source.fetch_page(page).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) => e,
            };

            if !err.is_transient() {
                return Err(Stop::Fatal(format!("page {}: {}", page, err)));
            }

            match policy.decide(attempts) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        page,
                        attempt = attempts,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Page fetch failed, retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(Stop::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp => {
                    return Err(Stop::Fatal(format!(
                        "page {} failed after {} attempts: {}",
                        page, attempts, err
                    )));
                }
            }
        }
    }

    fn conclude(&self, stats: ImportStats, result: Result<(), Stop>) -> ImportStats {
        let stats = match result {
            Ok(()) => stats.finish(ImportOutcome::Success),
            Err(Stop::Cancelled) => stats.finish(ImportOutcome::Cancelled),
            Err(Stop::Fatal(message)) => stats.fail(message),
        };

        match stats.outcome {
            ImportOutcome::Fatal => error!(
                source = %stats.source,
                imported = stats.imported(),
                error = stats.error.as_deref().unwrap_or_default(),
                "Import failed"
            ),
            outcome => info!(
                source = %stats.source,
                %outcome,
                pages = stats.pages_fetched,
                rows = stats.rows_read,
                inserted = stats.inserted,
                updated = stats.updated,
                skipped = stats.skipped,
                duration_secs = stats.duration_secs,
                "Import finished"
            ),
        }
        stats
    }
}

//! Pre-generation trigger
//!
//! Walks every record by keyset pagination and enqueues one `warm-profile`
//! job per record plus one `warm-sitemap-chunk` job per sitemap chunk. Jobs
//! already queued or running are not duplicated.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::queue::JobQueue;
use super::types::{JobError, JobResult, NewJob};
use crate::sitemap::chunk_count;
use crate::store::CandidateStore;

/// Records read per keyset page
pub const WARM_ALL_PAGE_SIZE: i64 = 1_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarmAllStats {
    pub records: u64,
    pub chunks: u64,
    /// Jobs actually added; the rest were already pending
    pub enqueued: u64,
    pub duration_secs: f64,
}

pub struct Pregenerator {
    store: Arc<dyn CandidateStore>,
    queue: Arc<dyn JobQueue>,
    chunk_size: i64,
    max_attempts: i32,
    cancel: CancellationToken,
}

impl Pregenerator {
    pub fn new(
        store: Arc<dyn CandidateStore>,
        queue: Arc<dyn JobQueue>,
        chunk_size: i64,
        max_attempts: i32,
    ) -> Self {
        Self {
            store,
            queue,
            chunk_size: chunk_size.max(1),
            max_attempts,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn enqueue_warm_all(&self) -> JobResult<WarmAllStats> {
        let started = Instant::now();
        let mut stats = WarmAllStats::default();
        let mut after_id = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(JobError::Queue("warm-all cancelled".to_string()));
            }

            let page = self.store.slugs_after(after_id, WARM_ALL_PAGE_SIZE).await?;
            let Some(last) = page.last() else {
                break;
            };
            after_id = last.id;
            stats.records += page.len() as u64;

            let jobs = page
                .into_iter()
                .map(|row| NewJob::warm_profile(row.slug))
                .collect();
            stats.enqueued += self.queue.enqueue_many(jobs, self.max_attempts).await?;
        }

        let records = i64::try_from(stats.records).unwrap_or(i64::MAX);
        let chunks = chunk_count(records, self.chunk_size);
        let chunk_jobs = (0..chunks).map(NewJob::warm_sitemap_chunk).collect();
        stats.chunks = chunks as u64;
        stats.enqueued += self.queue.enqueue_many(chunk_jobs, self.max_attempts).await?;
        stats.duration_secs = started.elapsed().as_secs_f64();

        info!(
            records = stats.records,
            chunks = stats.chunks,
            enqueued = stats.enqueued,
            duration_secs = stats.duration_secs,
            "Enqueued warm-all jobs"
        );
        Ok(stats)
    }

    /// Run once after `delay`, unless shut down first
    pub fn start(self, delay: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(delay_secs = delay.as_secs(), "Pre-generation scheduled");

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = sleep(delay) => {}
            }

            if let Err(e) = self.enqueue_warm_all().await {
                error!("Pre-generation failed: {}", e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::queue::MemoryJobQueue;
    use crate::jobs::types::JobKind;
    use crate::models::NewCandidate;
    use crate::store::memory::MemoryCandidateStore;
    use crate::store::CollisionPolicy;
    use voterspheres_common::CandidateInput;

    async fn store_with(n: usize) -> Arc<MemoryCandidateStore> {
        let store = Arc::new(MemoryCandidateStore::new());
        let batch: Vec<NewCandidate> = (0..n)
            .map(|i| {
                let input = CandidateInput {
                    name: format!("Person {}", i),
                    office: "Council".into(),
                    state: "OH".into(),
                    source: "test".into(),
                    ..Default::default()
                };
                NewCandidate {
                    slug: input.slug(false),
                    input,
                }
            })
            .collect();
        store.upsert_batch(&batch, CollisionPolicy::Merge).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_warm_all_enqueues_profiles_and_chunks() {
        let store = store_with(2_500).await;
        let queue = Arc::new(MemoryJobQueue::new());
        let pregen = Pregenerator::new(store, queue.clone(), 1_000, 3);

        let stats = pregen.enqueue_warm_all().await.unwrap();
        assert_eq!(stats.records, 2_500);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.enqueued, 2_503);

        let jobs = queue.jobs().await;
        let chunk_jobs = jobs.iter().filter(|j| j.kind == JobKind::WarmSitemapChunk).count();
        assert_eq!(chunk_jobs, 3);
    }

    #[tokio::test]
    async fn test_repeated_trigger_does_not_duplicate() {
        let store = store_with(10).await;
        let queue = Arc::new(MemoryJobQueue::new());
        let pregen = Pregenerator::new(store, queue.clone(), 50_000, 3);

        pregen.enqueue_warm_all().await.unwrap();
        let second = pregen.enqueue_warm_all().await.unwrap();

        assert_eq!(second.enqueued, 0);
        assert_eq!(queue.counts().await.unwrap().queued, 11);
    }
}

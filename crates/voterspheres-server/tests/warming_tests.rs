//! Warm jobs, cache reads and sitemap coverage over the in-memory store

mod common;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use voterspheres_common::retry::RetryPolicy;
use voterspheres_common::CandidateInput;
use voterspheres_server::config::Config;
use voterspheres_server::jobs::{
    Job, JobEngine, JobEngineConfig, JobExecutor, JobQueue, JobResult, MemoryJobQueue, NewJob,
};
use voterspheres_server::render::DocumentKind;
use voterspheres_server::store::memory::MemoryCandidateStore;

use common::{candidate, insert, locs, memory_app, seeded_store};

fn fast_engine(concurrency: usize) -> JobEngineConfig {
    JobEngineConfig {
        concurrency,
        retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        poll_interval: Duration::from_millis(5),
        ..JobEngineConfig::default()
    }
}

fn config_with_chunk(chunk: i64, concurrency: usize) -> Config {
    let mut config = Config::default();
    config.site.sitemap_chunk_size = chunk;
    config.jobs.engine = fast_engine(concurrency);
    config
}

#[tokio::test]
async fn test_warmed_profile_is_served_without_store_reads() {
    let store = seeded_store(25).await;
    let app = memory_app(store.clone(), config_with_chunk(10, 4));

    let stats = app.pregenerator().enqueue_warm_all().await.unwrap();
    assert_eq!(stats.records, 25);
    assert_eq!(stats.chunks, 3);
    assert_eq!(stats.enqueued, 28);

    let counts = app.engine().run_until_idle().await.unwrap();
    assert_eq!(counts.succeeded, 28);
    assert_eq!(counts.failed, 0);

    let slug = candidate(7).slug(false);
    store.reset_read_count();

    let doc = app
        .service
        .get_cached_or_render(DocumentKind::Profile, &slug)
        .await
        .unwrap()
        .unwrap();
    assert!(doc.body.contains("Candidate Number 7"));

    let chunk = app.service.sitemap_chunk(2).await.unwrap().unwrap();
    assert_eq!(locs(&chunk.body).len(), 5);

    assert_eq!(store.read_count(), 0);
}

#[tokio::test]
async fn test_cold_profile_reads_store_once_then_caches() {
    let store = seeded_store(3).await;
    let app = memory_app(store.clone(), Config::default());
    let slug = candidate(1).slug(false);

    store.reset_read_count();
    app.service.profile_page(&slug).await.unwrap().unwrap();
    app.service.profile_page(&slug).await.unwrap().unwrap();
    assert_eq!(store.read_count(), 1);

    assert!(app.service.profile_page("no-such-person").await.unwrap().is_none());
}

#[tokio::test]
async fn test_sitemap_covers_every_record_exactly_once() {
    let n = 2_345;
    let chunk_size = 500;
    let store = seeded_store(n).await;
    let app = memory_app(store, config_with_chunk(chunk_size, 4));

    let index = app.service.sitemap_index().await.unwrap();
    let refs = locs(&index.body);
    let chunk_refs: Vec<_> = refs.iter().filter(|l| !l.ends_with("static.xml")).collect();
    assert_eq!(chunk_refs.len(), 5);
    assert!(refs.iter().any(|l| l.ends_with("/sitemaps/static.xml")));

    let mut seen = HashSet::new();
    let mut total = 0;
    for chunk in 0..5 {
        let doc = app.service.sitemap_chunk(chunk).await.unwrap().unwrap();
        let urls = locs(&doc.body);
        assert!(urls.len() as i64 <= chunk_size);
        total += urls.len();
        seen.extend(urls);
    }

    assert_eq!(total, n);
    assert_eq!(seen.len(), n);
    assert!(app.service.sitemap_chunk(5).await.unwrap().is_none());
}

#[tokio::test]
async fn test_markup_escapes_record_text() {
    let store = Arc::new(MemoryCandidateStore::new());
    let input = CandidateInput {
        name: "O'Brien & <Co>".into(),
        office: "Mayor \"At Large\"".into(),
        state: "MA".into(),
        website: Some("javascript:alert(1)".into()),
        source: "fixture".into(),
        ..Default::default()
    };
    let slug = input.slug(false);
    insert(&store, vec![input]).await;

    let app = memory_app(store, Config::default());
    let profile = app.service.profile_page(&slug).await.unwrap().unwrap();

    assert!(!profile.body.contains("O'Brien"));
    assert!(!profile.body.contains("& <Co>"));
    assert!(!profile.body.contains("<Co>"));
    assert!(!profile.body.contains("href=\"javascript:"));
    assert!(profile.body.contains("O&apos;Brien &amp; &lt;Co&gt;"));

    let chunk = app.service.sitemap_chunk(0).await.unwrap().unwrap();
    for loc in locs(&chunk.body) {
        assert!(!loc.contains('<') && !loc.contains('\''));
    }
}

/// Tracks how many jobs run at once
struct GaugeExecutor {
    active: AtomicUsize,
    peak: AtomicUsize,
    done: AtomicUsize,
}

#[async_trait]
impl JobExecutor for GaugeExecutor {
    async fn execute(&self, _job: &Job) -> JobResult<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_micros(50)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.done.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_never_exceeds_concurrency() {
    let concurrency = 8;
    let queue = Arc::new(MemoryJobQueue::new());
    let jobs = (0..10_000)
        .map(|i| NewJob::warm_profile(format!("candidate-{}", i)))
        .collect();
    assert_eq!(queue.enqueue_many(jobs, 3).await.unwrap(), 10_000);

    let executor = Arc::new(GaugeExecutor {
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
        done: AtomicUsize::new(0),
    });
    let engine = JobEngine::new(queue.clone(), executor.clone(), fast_engine(concurrency));

    let counts = engine.run_until_idle().await.unwrap();

    assert_eq!(counts.succeeded, 10_000);
    assert_eq!(executor.done.load(Ordering::SeqCst), 10_000);
    let peak = executor.peak.load(Ordering::SeqCst);
    assert!(peak <= concurrency, "peak {} exceeded {}", peak, concurrency);
    assert!(peak >= 1);
}

#[tokio::test]
async fn test_missing_profile_job_fails_without_retry() {
    let store = seeded_store(1).await;
    let app = memory_app(store, config_with_chunk(10, 2));

    app.queue
        .enqueue(NewJob::warm_profile("nobody-xx-nothing"), 3)
        .await
        .unwrap();
    let counts = app.engine().run_until_idle().await.unwrap();

    assert_eq!(counts.failed, 1);
    assert_eq!(counts.succeeded, 0);
}

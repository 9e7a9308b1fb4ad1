//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::Arc;
use voterspheres_common::CandidateInput;
use voterspheres_server::app::App;
use voterspheres_server::cache::{CacheConfig, CacheFacade};
use voterspheres_server::config::Config;
use voterspheres_server::jobs::MemoryJobQueue;
use voterspheres_server::models::NewCandidate;
use voterspheres_server::store::memory::MemoryCandidateStore;
use voterspheres_server::store::{CandidateStore, CollisionPolicy};

pub fn candidate(i: usize) -> CandidateInput {
    CandidateInput {
        name: format!("Candidate Number {}", i),
        office: if i % 2 == 0 { "State Senate" } else { "City Council" }.into(),
        state: "OH".into(),
        district: Some(format!("{}", i % 33 + 1)),
        party: Some("Independent".into()),
        source: "fixture".into(),
        source_id: Some(format!("F{:06}", i)),
        ..Default::default()
    }
    .normalized()
}

pub async fn seeded_store(n: usize) -> Arc<MemoryCandidateStore> {
    let store = Arc::new(MemoryCandidateStore::new());
    insert(&store, (0..n).map(candidate).collect()).await;
    store
}

pub async fn insert(store: &MemoryCandidateStore, inputs: Vec<CandidateInput>) {
    let batch: Vec<NewCandidate> = inputs
        .into_iter()
        .map(|input| NewCandidate {
            slug: input.slug(false),
            input,
        })
        .collect();
    let outcome = store.upsert_batch(&batch, CollisionPolicy::Merge).await.unwrap();
    assert!(outcome.skipped.is_empty(), "fixture rows rejected: {:?}", outcome.skipped);
}

/// App over the in-memory store and queue with a local-only cache
pub fn memory_app(store: Arc<MemoryCandidateStore>, config: Config) -> App {
    App::from_parts(
        config,
        None,
        store,
        Arc::new(MemoryJobQueue::new()),
        CacheFacade::local_only(CacheConfig::default()),
    )
}

/// Every `<loc>` value in a sitemap document
pub fn locs(xml: &str) -> Vec<String> {
    xml.split("<loc>")
        .skip(1)
        .filter_map(|rest| rest.split_once("</loc>").map(|(loc, _)| loc.to_string()))
        .collect()
}

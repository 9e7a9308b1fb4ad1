use axum::{extract::State, routing::get, routing::post, Router};
use serde::Serialize;

use super::FeatureState;
use crate::api::response::ApiResponse;
use crate::cache::CacheStatsSnapshot;
use crate::error::AppResult;
use crate::jobs::{JobCounts, WarmAllStats};

pub fn jobs_routes() -> Router<FeatureState> {
    Router::new()
        .route("/warm-all", post(warm_all))
        .route("/stats", get(job_stats))
}

#[derive(Debug, Serialize)]
pub struct JobStatsResponse {
    pub jobs: JobCounts,
    pub pending: i64,
    pub cache: CacheStatsSnapshot,
    /// `redis` or `local`
    pub cache_backend: &'static str,
}

#[tracing::instrument(skip(state))]
async fn warm_all(State(state): State<FeatureState>) -> AppResult<ApiResponse<WarmAllStats>> {
    let stats = state.pregen.enqueue_warm_all().await?;
    Ok(ApiResponse::success(stats))
}

#[tracing::instrument(skip(state))]
async fn job_stats(State(state): State<FeatureState>) -> AppResult<ApiResponse<JobStatsResponse>> {
    let jobs = state.queue.counts().await?;
    let cache = state.service.cache();

    Ok(ApiResponse::success(JobStatsResponse {
        jobs,
        pending: jobs.pending(),
        cache: cache.stats(),
        cache_backend: if cache.has_primary() { "redis" } else { "local" },
    }))
}

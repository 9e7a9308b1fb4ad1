//! HTTP feature slices
//!
//! Thin axum wrappers over [`DirectoryService`] and the job queue. Each
//! slice owns its routes and handlers:
//!
//! - **candidates**: JSON search and lookup, HTML profile pages
//! - **sitemaps**: sitemap index, chunks and static pages
//! - **jobs**: warm-all trigger and queue statistics
//! - **health**: liveness with a database check

pub mod candidates;
pub mod health;
pub mod jobs;
pub mod sitemaps;

use axum::{
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::jobs::{JobQueue, Pregenerator};
use crate::render::Document;
use crate::service::DirectoryService;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub service: Arc<DirectoryService>,
    pub queue: Arc<dyn JobQueue>,
    pub pregen: Arc<Pregenerator>,
    /// Probed by `/health`; `None` when running on the in-memory store
    pub db: Option<PgPool>,
}

/// JSON API, mounted under `/api/v1`
///
/// - `GET /candidates` - filtered search
/// - `GET /candidates/filters` - state, office and party menu values
/// - `GET /candidates/:slug` - one record
/// - `POST /jobs/warm-all` - enqueue warm jobs for everything
/// - `GET /jobs/stats` - queue and cache counters
pub fn api_router(state: FeatureState) -> Router<()> {
    Router::new()
        .nest("/candidates", candidates::candidates_routes())
        .nest("/jobs", jobs::jobs_routes())
        .with_state(state)
}

/// Public documents and health, mounted at the root
pub fn page_router(state: FeatureState) -> Router<()> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/candidates/:slug", get(candidates::profile_page))
        .route("/sitemap.xml", get(sitemaps::sitemap_index))
        .route("/sitemaps/:file", get(sitemaps::sitemap_file))
        .with_state(state)
}

/// Rendered document with its content type
pub(crate) fn document_response(doc: Document) -> Response {
    ([(header::CONTENT_TYPE, doc.content_type())], doc.body).into_response()
}

//! VoterSpheres Server Library
//!
//! Candidate directory service: ingestion into Postgres, cached HTML
//! profiles and XML sitemaps, and a background worker pool that keeps the
//! cache warm.
//!
//! # Overview
//!
//! - **Ingestion**: paged API and delimited-file imports with idempotent upserts
//! - **Store**: [`store::CandidateStore`] over Postgres ([`db`]) or memory
//! - **Cache**: Redis primary with an in-process fallback ([`cache::CacheFacade`])
//! - **Rendering**: profile pages and sitemap 0.9 documents ([`render`], [`sitemap`])
//! - **Jobs**: durable warm jobs worked by a bounded pool ([`jobs`])
//! - **HTTP**: thin axum routes over [`service::DirectoryService`]
//!
//! # Example
//!
//! ```no_run
//! use voterspheres_server::{api, app::App, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let app = App::connect(config).await?;
//!     let router = api::create_router(app.feature_state(), &app.config.cors);
//!     api::serve(&app.config, router, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod render;
pub mod service;
pub mod sitemap;
pub mod store;

// Re-export commonly used types
pub use error::{AppError, AppResult};
pub use service::{DirectoryService, ServiceError};

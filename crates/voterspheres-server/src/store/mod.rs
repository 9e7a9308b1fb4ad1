//! Candidate storage
//!
//! [`CandidateStore`] is the seam between the directory logic and the
//! relational store. [`crate::db::candidates::PgCandidateStore`] is the
//! production implementation; [`memory::MemoryCandidateStore`] backs tests and
//! database-less tooling.
//!
//! # Upsert contract
//!
//! `upsert_batch` writes every row of a batch keyed by slug. A row that already
//! exists has only its mutable fields (website, email, phone, image) refreshed;
//! identifying fields, the slug and `created_at` are left alone. A row that the
//! store rejects is reported in [`BatchOutcome::skipped`] and the rest of the
//! batch still lands.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Candidate, FilterField, NewCandidate, SearchFilters, SitemapEntry, SlugRef};

/// Storage errors that abort the whole operation
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// What happens when an incoming record computes a slug that already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Treat it as the same record and refresh its mutable fields
    #[default]
    Merge,
    /// When provenance differs, give the newcomer the first free `-N` suffix
    Disambiguate,
}

impl std::str::FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "merge" => Ok(CollisionPolicy::Merge),
            "disambiguate" | "suffix" => Ok(CollisionPolicy::Disambiguate),
            other => Err(format!("unknown collision policy '{}'", other)),
        }
    }
}

impl std::fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollisionPolicy::Merge => write!(f, "merge"),
            CollisionPolicy::Disambiguate => write!(f, "disambiguate"),
        }
    }
}

/// A row the store refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSkip {
    /// Provenance of the record, enough to find it in the source again
    pub reference: String,
    pub reason: String,
}

/// Result of one `upsert_batch` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: Vec<RowSkip>,
    /// Slugs of existing rows that were refreshed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated_slugs: Vec<String>,
}

impl BatchOutcome {
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }
}

#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Insert or refresh every record of the batch
    async fn upsert_batch(
        &self,
        batch: &[NewCandidate],
        policy: CollisionPolicy,
    ) -> StoreResult<BatchOutcome>;

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Candidate>>;

    /// Filtered page ordered by name, plus the total match count
    async fn search(
        &self,
        filters: &SearchFilters,
        offset: i64,
        limit: i64,
    ) -> StoreResult<(Vec<Candidate>, i64)>;

    async fn count(&self) -> StoreResult<i64>;

    /// Records ordered by `id`, `LIMIT limit OFFSET offset`
    async fn sitemap_page(&self, offset: i64, limit: i64) -> StoreResult<Vec<SitemapEntry>>;

    /// Keyset walk: up to `limit` records with `id > after_id`, ordered by `id`
    async fn slugs_after(&self, after_id: i64, limit: i64) -> StoreResult<Vec<SlugRef>>;

    /// Distinct non-blank values of `field`, sorted ascending
    async fn distinct_values(&self, field: FilterField) -> StoreResult<Vec<String>>;

    /// Latest `updated_at` of each `chunk_size` slice of the `id` order, one
    /// entry per sitemap chunk
    async fn chunk_lastmods(&self, chunk_size: i64) -> StoreResult<Vec<DateTime<Utc>>>;
}

/// Whether an existing row belongs to a different upstream record.
///
/// Only rows where both sides carry a `source_id` can be told apart; anything
/// else is assumed to be the same record.
pub fn provenance_conflicts(
    existing_source: &str,
    existing_source_id: Option<&str>,
    incoming: &NewCandidate,
) -> bool {
    match (existing_source_id, incoming.input.source_id.as_deref()) {
        (Some(existing_id), Some(incoming_id)) => {
            existing_source != incoming.input.source || existing_id != incoming_id
        }
        _ => false,
    }
}

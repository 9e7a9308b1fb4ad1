//! Chunked sitemap builder
//!
//! Records are split by `id` order into chunks of `chunk_size` URLs. Each
//! chunk is built from one `LIMIT/OFFSET` page, so no document ever needs
//! more than one chunk of records in memory. The index lists every chunk,
//! stamped with the latest update among its records, plus the static-pages
//! sitemap.

use std::sync::Arc;
use thiserror::Error;

use crate::render::{Document, DocumentKind, Renderer, SitemapRef, UrlEntry};
use crate::store::{CandidateStore, StoreError, StoreResult};

/// URLs per chunk; also the protocol's per-file ceiling
pub const DEFAULT_CHUNK_SIZE: i64 = 50_000;
pub const MAX_CHUNK_SIZE: i64 = 50_000;

/// Site paths listed in the static sitemap
pub const STATIC_PATHS: &[&str] = &["/", "/search"];

#[derive(Error, Debug)]
pub enum SitemapError {
    #[error("Sitemap chunk {0} does not exist")]
    NotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn chunk_count(total: i64, chunk_size: i64) -> i64 {
    if total <= 0 {
        0
    } else {
        (total + chunk_size - 1) / chunk_size
    }
}

pub struct SitemapBuilder {
    store: Arc<dyn CandidateStore>,
    renderer: Renderer,
    chunk_size: i64,
}

impl SitemapBuilder {
    /// `chunk_size` is clamped to `1..=MAX_CHUNK_SIZE`
    pub fn new(store: Arc<dyn CandidateStore>, renderer: Renderer, chunk_size: i64) -> Self {
        Self {
            store,
            renderer,
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
        }
    }

    pub fn chunk_size(&self) -> i64 {
        self.chunk_size
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub async fn build_index(&self) -> StoreResult<Document> {
        let lastmods = self.store.chunk_lastmods(self.chunk_size).await?;
        let chunks = lastmods.len();

        let mut refs: Vec<SitemapRef> = lastmods
            .into_iter()
            .zip(0i64..)
            .map(|(lastmod, n)| SitemapRef {
                loc: self.renderer.sitemap_chunk_url(n),
                lastmod: Some(lastmod),
            })
            .collect();
        refs.push(SitemapRef {
            loc: self.renderer.sitemap_static_url(),
            lastmod: None,
        });

        tracing::debug!(chunks, "Built sitemap index");
        Ok(self.renderer.render_sitemap_index(&refs))
    }

    /// Chunk `n` (0-based). A chunk past the last record is `NotFound`.
    pub async fn build_chunk(&self, n: i64) -> Result<Document, SitemapError> {
        if n < 0 {
            return Err(SitemapError::NotFound(n));
        }
        let offset = n.checked_mul(self.chunk_size).ok_or(SitemapError::NotFound(n))?;

        let rows = self.store.sitemap_page(offset, self.chunk_size).await?;
        if rows.is_empty() {
            return Err(SitemapError::NotFound(n));
        }

        let entries: Vec<UrlEntry> = rows
            .into_iter()
            .map(|row| UrlEntry {
                loc: self.renderer.profile_url(&row.slug),
                lastmod: Some(row.updated_at),
            })
            .collect();

        tracing::debug!(chunk = n, urls = entries.len(), "Built sitemap chunk");
        Ok(self.renderer.render_urlset(&entries))
    }

    pub fn build_static(&self) -> Document {
        let entries: Vec<UrlEntry> = STATIC_PATHS
            .iter()
            .map(|path| UrlEntry {
                loc: self.renderer.absolute(path),
                lastmod: None,
            })
            .collect();

        let mut doc = self.renderer.render_urlset(&entries);
        doc.kind = DocumentKind::SitemapStatic;
        doc
    }
}

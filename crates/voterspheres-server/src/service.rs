//! Directory service
//!
//! The read side of the directory: slug lookups, cached search, and the
//! read-through document path shared by HTTP handlers and warm jobs. Store
//! errors on a cache miss propagate; cache trouble never does.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::cache::{keys, CacheFacade, CacheTier};
use crate::models::{clamp_paging, Candidate, FilterField, FilterOptions, SearchFilters, SearchPage};
use crate::render::{Document, DocumentKind, Renderer};
use crate::sitemap::{SitemapBuilder, SitemapError};
use crate::store::{CandidateStore, StoreError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid {kind} key '{key}'")]
    InvalidKey { kind: &'static str, key: String },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

fn tier_for(kind: DocumentKind) -> CacheTier {
    match kind {
        DocumentKind::Profile => CacheTier::Profile,
        _ => CacheTier::Sitemap,
    }
}

fn parse_chunk(key: &str) -> ServiceResult<i64> {
    key.trim()
        .parse::<i64>()
        .ok()
        .filter(|n| *n >= 0)
        .ok_or_else(|| ServiceError::InvalidKey {
            kind: DocumentKind::SitemapChunk.as_str(),
            key: key.to_string(),
        })
}

fn document_cache_key(kind: DocumentKind, key: &str) -> ServiceResult<String> {
    Ok(match kind {
        DocumentKind::Profile => keys::profile(key),
        DocumentKind::SitemapIndex => keys::sitemap_index(),
        DocumentKind::SitemapChunk => keys::sitemap_chunk(parse_chunk(key)?),
        DocumentKind::SitemapStatic => keys::sitemap_static(),
    })
}

pub struct DirectoryService {
    store: Arc<dyn CandidateStore>,
    cache: Arc<CacheFacade>,
    renderer: Renderer,
    sitemap: SitemapBuilder,
}

impl DirectoryService {
    pub fn new(
        store: Arc<dyn CandidateStore>,
        cache: Arc<CacheFacade>,
        renderer: Renderer,
        sitemap_chunk_size: i64,
    ) -> Self {
        let sitemap = SitemapBuilder::new(store.clone(), renderer.clone(), sitemap_chunk_size);
        Self {
            store,
            cache,
            renderer,
            sitemap,
        }
    }

    pub fn store(&self) -> &Arc<dyn CandidateStore> {
        &self.store
    }

    pub fn cache(&self) -> &CacheFacade {
        &self.cache
    }

    pub fn shared_cache(&self) -> Arc<CacheFacade> {
        self.cache.clone()
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn sitemap(&self) -> &SitemapBuilder {
        &self.sitemap
    }

    pub async fn lookup_by_slug(&self, slug: &str) -> ServiceResult<Option<Candidate>> {
        Ok(self.store.find_by_slug(slug).await?)
    }

    /// One page of matches ordered by name, cached under the search tier
    pub async fn search(
        &self,
        filters: SearchFilters,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> ServiceResult<SearchPage> {
        let filters = filters.normalized();
        let (page, limit) = clamp_paging(page, limit);
        let generation = self.cache.search_generation().await;
        let key = keys::search(&filters, page, limit, &generation);

        if let Some(cached) = self.cache.get_json::<SearchPage>(&key).await {
            debug!(page, limit, "Search served from cache");
            return Ok(cached);
        }

        let offset = i64::from(page - 1) * i64::from(limit);
        let (results, total) = self
            .store
            .search(&filters, offset, i64::from(limit))
            .await?;

        let result = SearchPage {
            results,
            total,
            page,
            limit,
        };
        self.cache.set_json(&key, &result, CacheTier::Search).await;
        Ok(result)
    }

    /// Values for the state, office and party filter menus, cached under
    /// the search tier
    pub async fn filter_options(&self) -> ServiceResult<FilterOptions> {
        let generation = self.cache.search_generation().await;
        let key = keys::filter_options(&generation);

        if let Some(cached) = self.cache.get_json::<FilterOptions>(&key).await {
            return Ok(cached);
        }

        let options = FilterOptions {
            states: self.store.distinct_values(FilterField::State).await?,
            offices: self.store.distinct_values(FilterField::Office).await?,
            parties: self.store.distinct_values(FilterField::Party).await?,
        };
        self.cache.set_json(&key, &options, CacheTier::Search).await;
        Ok(options)
    }

    /// Render a document without looking at the cache. `None` when the
    /// record or chunk does not exist.
    pub async fn render(&self, kind: DocumentKind, key: &str) -> ServiceResult<Option<Document>> {
        match kind {
            DocumentKind::Profile => Ok(self
                .store
                .find_by_slug(key)
                .await?
                .map(|candidate| self.renderer.render_profile(&candidate))),
            DocumentKind::SitemapIndex => Ok(Some(self.sitemap.build_index().await?)),
            DocumentKind::SitemapChunk => match self.sitemap.build_chunk(parse_chunk(key)?).await {
                Ok(doc) => Ok(Some(doc)),
                Err(SitemapError::NotFound(_)) => Ok(None),
                Err(SitemapError::Store(e)) => Err(e.into()),
            },
            DocumentKind::SitemapStatic => Ok(Some(self.sitemap.build_static())),
        }
    }

    /// Cached document, rendered and cached on a miss
    pub async fn get_cached_or_render(
        &self,
        kind: DocumentKind,
        key: &str,
    ) -> ServiceResult<Option<Document>> {
        let cache_key = document_cache_key(kind, key)?;

        if let Some(body) = self.cache.get(&cache_key).await {
            return Ok(Some(Document::new(kind, body)));
        }

        let rendered = self.render(kind, key).await?;
        if let Some(doc) = &rendered {
            self.cache.set(&cache_key, doc.body.clone(), tier_for(kind)).await;
        }
        Ok(rendered)
    }

    /// Render and cache unconditionally. Returns `false` when there is
    /// nothing to render.
    pub async fn warm(&self, kind: DocumentKind, key: &str) -> ServiceResult<bool> {
        let cache_key = document_cache_key(kind, key)?;
        match self.render(kind, key).await? {
            Some(doc) => {
                self.cache.set(&cache_key, doc.body, tier_for(kind)).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn profile_page(&self, slug: &str) -> ServiceResult<Option<Document>> {
        self.get_cached_or_render(DocumentKind::Profile, slug).await
    }

    pub async fn sitemap_index(&self) -> ServiceResult<Document> {
        let doc = self
            .get_cached_or_render(DocumentKind::SitemapIndex, "")
            .await?;
        // The index always renders, if only with the static entry
        Ok(doc.unwrap_or_else(|| self.renderer.render_sitemap_index(&[])))
    }

    pub async fn sitemap_chunk(&self, n: i64) -> ServiceResult<Option<Document>> {
        self.get_cached_or_render(DocumentKind::SitemapChunk, &n.to_string())
            .await
    }

    pub async fn sitemap_static(&self) -> ServiceResult<Document> {
        let doc = self
            .get_cached_or_render(DocumentKind::SitemapStatic, "")
            .await?;
        Ok(doc.unwrap_or_else(|| self.sitemap.build_static()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::models::NewCandidate;
    use crate::store::memory::MemoryCandidateStore;
    use crate::store::CollisionPolicy;
    use voterspheres_common::CandidateInput;

    async fn service() -> (Arc<MemoryCandidateStore>, DirectoryService) {
        let store = Arc::new(MemoryCandidateStore::new());
        let batch: Vec<NewCandidate> = ["Ann Lee", "Bob Roe", "Ann Smith"]
            .iter()
            .map(|name| {
                let input = CandidateInput {
                    name: name.to_string(),
                    office: "Mayor".into(),
                    state: "TX".into(),
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
        store.reset_read_count();

        let cache = Arc::new(CacheFacade::local_only(CacheConfig::default()));
        let service = DirectoryService::new(
            store.clone(),
            cache,
            Renderer::new("https://voterspheres.org"),
            2,
        );
        (store, service)
    }

    #[tokio::test]
    async fn test_search_is_cached() {
        let (store, service) = service().await;
        let filters = SearchFilters {
            q: Some("ann".into()),
            ..Default::default()
        };

        let first = service.search(filters.clone(), None, None).await.unwrap();
        let second = service.search(filters, None, None).await.unwrap();

        assert_eq!(first.total, 2);
        assert_eq!(first.results[0].name, "Ann Lee");
        assert_eq!(first, second);
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_filter_options_are_cached_until_generation_bump() {
        let (store, service) = service().await;

        let options = service.filter_options().await.unwrap();
        assert_eq!(options.states, vec!["TX"]);
        assert_eq!(options.offices, vec!["Mayor"]);
        assert!(options.parties.is_empty());
        service.filter_options().await.unwrap();
        assert_eq!(store.read_count(), 3);

        service.cache().bump_search_generation().await;
        service.filter_options().await.unwrap();
        assert_eq!(store.read_count(), 6);
    }

    #[tokio::test]
    async fn test_search_generation_bump_forces_fresh_read() {
        let (store, service) = service().await;
        let filters = SearchFilters::default();

        service.search(filters.clone(), None, None).await.unwrap();
        service.search(filters.clone(), None, None).await.unwrap();
        assert_eq!(store.read_count(), 1);

        service.cache().bump_search_generation().await;
        service.search(filters, None, None).await.unwrap();
        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_profile_read_through() {
        let (store, service) = service().await;

        let doc = service.profile_page("ann-lee-tx-mayor").await.unwrap().unwrap();
        assert!(doc.body.contains("Ann Lee"));
        let again = service.profile_page("ann-lee-tx-mayor").await.unwrap().unwrap();
        assert_eq!(doc, again);
        assert_eq!(store.read_count(), 1);

        assert!(service.profile_page("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_warm_then_read_touches_no_store() {
        let (store, service) = service().await;
        assert!(service.warm(DocumentKind::Profile, "bob-roe-tx-mayor").await.unwrap());
        store.reset_read_count();

        let doc = service
            .get_cached_or_render(DocumentKind::Profile, "bob-roe-tx-mayor")
            .await
            .unwrap();
        assert!(doc.is_some());
        assert_eq!(store.read_count(), 0);
    }

    #[tokio::test]
    async fn test_bad_chunk_key_is_rejected() {
        let (_, service) = service().await;
        let err = service
            .get_cached_or_render(DocumentKind::SitemapChunk, "abc")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidKey { .. }));
        assert!(service.sitemap_chunk(9).await.unwrap().is_none());
    }
}

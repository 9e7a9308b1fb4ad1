use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::{document_response, FeatureState};
use crate::api::response::{ApiResponse, PaginationMeta};
use crate::error::{AppError, AppResult};
use crate::models::{Candidate, FilterOptions, SearchFilters};

pub fn candidates_routes() -> Router<FeatureState> {
    Router::new()
        .route("/", get(search_candidates))
        .route("/filters", get(filter_options))
        .route("/:slug", get(get_candidate))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub office: Option<String>,
    pub party: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl SearchQuery {
    fn filters(&self) -> SearchFilters {
        SearchFilters {
            q: self.q.clone(),
            state: self.state.clone(),
            county: self.county.clone(),
            office: self.office.clone(),
            party: self.party.clone(),
        }
    }
}

#[tracing::instrument(
    skip(state, query),
    fields(q = ?query.q, page = ?query.page, limit = ?query.limit)
)]
async fn search_candidates(
    State(state): State<FeatureState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<ApiResponse<Vec<Candidate>>> {
    let page = state
        .service
        .search(query.filters(), query.page, query.limit)
        .await?;

    tracing::debug!(count = page.results.len(), total = page.total, "Search completed");

    let meta = json!({
        "pagination": PaginationMeta::new(i64::from(page.page), i64::from(page.limit), page.total)
    });
    Ok(ApiResponse::success_with_meta(page.results, meta))
}

async fn filter_options(State(state): State<FeatureState>) -> AppResult<ApiResponse<FilterOptions>> {
    let options = state.service.filter_options().await?;
    Ok(ApiResponse::success(options))
}

#[tracing::instrument(skip(state))]
async fn get_candidate(
    State(state): State<FeatureState>,
    Path(slug): Path<String>,
) -> AppResult<ApiResponse<Candidate>> {
    state
        .service
        .lookup_by_slug(&slug)
        .await?
        .map(ApiResponse::success)
        .ok_or_else(|| AppError::NotFound(format!("Candidate '{}' not found", slug)))
}

/// HTML profile, served from the cache when warm
#[tracing::instrument(skip(state))]
pub async fn profile_page(
    State(state): State<FeatureState>,
    Path(slug): Path<String>,
) -> AppResult<Response> {
    state
        .service
        .profile_page(&slug)
        .await?
        .map(document_response)
        .ok_or_else(|| AppError::NotFound(format!("Candidate '{}' not found", slug)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_to_filters() {
        let query = SearchQuery {
            q: Some("smith".into()),
            state: Some("oh".into()),
            ..Default::default()
        };
        let filters = query.filters();
        assert_eq!(filters.q.as_deref(), Some("smith"));
        assert_eq!(filters.state.as_deref(), Some("oh"));
        assert!(filters.party.is_none());
    }
}

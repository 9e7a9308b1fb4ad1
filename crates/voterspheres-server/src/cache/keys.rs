//! Cache key layout

use sha2::{Digest, Sha256};

use crate::models::SearchFilters;

pub fn profile(slug: &str) -> String {
    format!("profile:{}", slug)
}

pub fn sitemap_index() -> String {
    "sitemap:index".to_string()
}

pub fn sitemap_chunk(n: i64) -> String {
    format!("sitemap:chunk:{}", n)
}

pub fn sitemap_static() -> String {
    "sitemap:static".to_string()
}

/// Token mixed into every search and filter-menu key; replacing it orphans
/// all of them at once
pub fn search_generation() -> String {
    "search:generation".to_string()
}

pub fn filter_options(generation: &str) -> String {
    format!("filters:{}", generation)
}

/// Key for one search page: a SHA-256 over the normalized filters, paging
/// and the current search generation
pub fn search(filters: &SearchFilters, page: u32, limit: u32, generation: &str) -> String {
    let mut hasher = Sha256::new();
    // Field order is fixed by the struct, so equal filters hash equally
    let filters_json = serde_json::to_string(filters).unwrap_or_default();
    hasher.update(filters_json.as_bytes());
    hasher.update(format!("|{}|{}|{}", page, limit, generation).as_bytes());
    format!("search:{}", hex::encode(hasher.finalize()))
}

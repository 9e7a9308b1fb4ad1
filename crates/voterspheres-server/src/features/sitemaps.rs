use axum::{
    extract::{Path, State},
    response::Response,
};

use super::{document_response, FeatureState};
use crate::error::{AppError, AppResult};

/// Static-pages file name under `/sitemaps/`
pub const STATIC_FILE: &str = "static.xml";

/// What a `/sitemaps/:file` name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapFile {
    Static,
    Chunk(i64),
}

impl SitemapFile {
    /// `static.xml` or `<n>.xml` with a non-negative decimal `n`
    pub fn parse(file: &str) -> Option<Self> {
        if file == STATIC_FILE {
            return Some(SitemapFile::Static);
        }
        let stem = file.strip_suffix(".xml")?;
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok().map(SitemapFile::Chunk)
    }
}

#[tracing::instrument(skip(state))]
pub async fn sitemap_index(State(state): State<FeatureState>) -> AppResult<Response> {
    Ok(document_response(state.service.sitemap_index().await?))
}

#[tracing::instrument(skip(state))]
pub async fn sitemap_file(
    State(state): State<FeatureState>,
    Path(file): Path<String>,
) -> AppResult<Response> {
    let not_found = || AppError::NotFound(format!("Sitemap '{}' not found", file));

    match SitemapFile::parse(&file).ok_or_else(not_found)? {
        SitemapFile::Static => Ok(document_response(state.service.sitemap_static().await?)),
        SitemapFile::Chunk(n) => state
            .service
            .sitemap_chunk(n)
            .await?
            .map(document_response)
            .ok_or_else(not_found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sitemap_file() {
        assert_eq!(SitemapFile::parse("static.xml"), Some(SitemapFile::Static));
        assert_eq!(SitemapFile::parse("0.xml"), Some(SitemapFile::Chunk(0)));
        assert_eq!(SitemapFile::parse("12.xml"), Some(SitemapFile::Chunk(12)));
        assert_eq!(SitemapFile::parse("-1.xml"), None);
        assert_eq!(SitemapFile::parse("+1.xml"), None);
        assert_eq!(SitemapFile::parse(".xml"), None);
        assert_eq!(SitemapFile::parse("1.txt"), None);
        assert_eq!(SitemapFile::parse("99999999999999999999.xml"), None);
    }
}

//! Document rendering
//!
//! Turns stored records into the documents the directory serves: HTML
//! profile pages and sitemap XML. Every piece of record-derived text passes
//! through [`escape`] before it reaches markup.

mod profile;
mod sitemap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

pub use sitemap::{SitemapRef, UrlEntry};

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    Profile,
    SitemapIndex,
    SitemapChunk,
    SitemapStatic,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Profile => "profile",
            DocumentKind::SitemapIndex => "sitemap-index",
            DocumentKind::SitemapChunk => "sitemap-chunk",
            DocumentKind::SitemapStatic => "sitemap-static",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DocumentKind::Profile => HTML_CONTENT_TYPE,
            _ => XML_CONTENT_TYPE,
        }
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profile" => Ok(DocumentKind::Profile),
            "sitemap-index" => Ok(DocumentKind::SitemapIndex),
            "sitemap-chunk" => Ok(DocumentKind::SitemapChunk),
            "sitemap-static" => Ok(DocumentKind::SitemapStatic),
            other => Err(format!("unknown document kind '{}'", other)),
        }
    }
}

/// A rendered page or sitemap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub kind: DocumentKind,
    pub body: String,
}

impl Document {
    pub fn new(kind: DocumentKind, body: String) -> Self {
        Self { kind, body }
    }

    pub fn content_type(&self) -> &'static str {
        self.kind.content_type()
    }
}

/// Escape `<`, `>`, `&`, `'` and `"` for HTML and XML alike
pub fn escape(text: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(text)
}

fn lastmod(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone)]
pub struct Renderer {
    base_url: String,
}

impl Renderer {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of a site path such as `/search`
    pub fn absolute(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn profile_url(&self, slug: &str) -> String {
        format!("{}/candidates/{}", self.base_url, urlencoding::encode(slug))
    }

    pub fn sitemap_chunk_url(&self, n: i64) -> String {
        format!("{}/sitemaps/{}.xml", self.base_url, n)
    }

    pub fn sitemap_static_url(&self) -> String {
        format!("{}/sitemaps/static.xml", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_covers_markup_characters() {
        assert_eq!(
            escape(r#"O'Brien & <Co> "x""#),
            "O&apos;Brien &amp; &lt;Co&gt; &quot;x&quot;"
        );
    }

    #[test]
    fn test_urls() {
        let renderer = Renderer::new("https://voterspheres.org/");
        assert_eq!(
            renderer.profile_url("ann-lee-tx-mayor"),
            "https://voterspheres.org/candidates/ann-lee-tx-mayor"
        );
        assert_eq!(
            renderer.sitemap_chunk_url(2),
            "https://voterspheres.org/sitemaps/2.xml"
        );
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("sitemap-chunk".parse::<DocumentKind>(), Ok(DocumentKind::SitemapChunk));
        assert!("pdf".parse::<DocumentKind>().is_err());
        assert_eq!(DocumentKind::Profile.content_type(), HTML_CONTENT_TYPE);
    }
}

use chrono::{DateTime, Utc};
use std::fmt::Write;

use super::{escape, lastmod, Document, DocumentKind, Renderer};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// One `<url>` of a urlset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEntry {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
}

/// One `<sitemap>` of a sitemap index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapRef {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
}

fn push_entry(xml: &mut String, tag: &str, loc: &str, modified: Option<&DateTime<Utc>>) {
    let _ = write!(xml, "  <{}>\n    <loc>{}</loc>\n", tag, escape(loc));
    if let Some(at) = modified {
        let _ = writeln!(xml, "    <lastmod>{}</lastmod>", lastmod(at));
    }
    let _ = writeln!(xml, "  </{}>", tag);
}

impl Renderer {
    /// `<urlset>` document
    pub fn render_urlset(&self, entries: &[UrlEntry]) -> Document {
        let mut xml = String::with_capacity(128 + entries.len() * 128);
        xml.push_str(XML_DECLARATION);
        let _ = writeln!(xml, "<urlset xmlns=\"{}\">", SITEMAP_NS);
        for entry in entries {
            push_entry(&mut xml, "url", &entry.loc, entry.lastmod.as_ref());
        }
        xml.push_str("</urlset>\n");
        Document::new(DocumentKind::SitemapChunk, xml)
    }

    /// `<sitemapindex>` document
    pub fn render_sitemap_index(&self, refs: &[SitemapRef]) -> Document {
        let mut xml = String::with_capacity(128 + refs.len() * 128);
        xml.push_str(XML_DECLARATION);
        let _ = writeln!(xml, "<sitemapindex xmlns=\"{}\">", SITEMAP_NS);
        for sitemap in refs {
            push_entry(&mut xml, "sitemap", &sitemap.loc, sitemap.lastmod.as_ref());
        }
        xml.push_str("</sitemapindex>\n");
        Document::new(DocumentKind::SitemapIndex, xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_urlset_shape() {
        let renderer = Renderer::new("https://voterspheres.org");
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let doc = renderer.render_urlset(&[
            UrlEntry {
                loc: renderer.profile_url("ann-lee-tx-mayor"),
                lastmod: Some(at),
            },
            UrlEntry {
                loc: "https://voterspheres.org/search?q=a&b".into(),
                lastmod: None,
            },
        ]);

        assert!(doc.body.starts_with(XML_DECLARATION));
        assert!(doc.body.contains("<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">"));
        assert!(doc.body.contains("<loc>https://voterspheres.org/candidates/ann-lee-tx-mayor</loc>"));
        assert!(doc.body.contains("<lastmod>2026-03-01T12:00:00Z</lastmod>"));
        assert!(doc.body.contains("q=a&amp;b"));
        assert_eq!(doc.body.matches("<url>").count(), 2);
    }

    #[test]
    fn test_index_shape() {
        let renderer = Renderer::new("https://voterspheres.org");
        let doc = renderer.render_sitemap_index(&[
            SitemapRef {
                loc: renderer.sitemap_chunk_url(0),
                lastmod: None,
            },
            SitemapRef {
                loc: renderer.sitemap_static_url(),
                lastmod: None,
            },
        ]);

        assert_eq!(doc.kind, DocumentKind::SitemapIndex);
        assert_eq!(doc.body.matches("<sitemap>").count(), 2);
        assert!(doc.body.trim_end().ends_with("</sitemapindex>"));
    }
}

use std::fmt::Write;

use super::{escape, Document, DocumentKind, Renderer};
use crate::models::Candidate;

fn is_web_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn jurisdiction(candidate: &Candidate) -> String {
    match &candidate.county {
        Some(county) => format!("{}, {}", county, candidate.state),
        None => candidate.state.clone(),
    }
}

impl Renderer {
    /// HTML5 profile page for one candidate
    pub fn render_profile(&self, candidate: &Candidate) -> Document {
        let name = escape(&candidate.name);
        let office = escape(&candidate.office);
        let place = jurisdiction(candidate);
        let place = escape(&place);
        let canonical = self.profile_url(&candidate.slug);

        let mut html = String::with_capacity(2048);
        // Writing into a String cannot fail
        let _ = write!(
            html,
            "<!DOCTYPE html>\n\
             <html lang=\"en\">\n\
             <head>\n\
             <meta charset=\"utf-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
             <title>{name} for {office} | VoterSpheres</title>\n\
             <meta name=\"description\" content=\"{name}, candidate for {office} in {place}.\">\n\
             <link rel=\"canonical\" href=\"{canonical}\">\n\
             </head>\n\
             <body>\n\
             <main>\n\
             <h1>{name}</h1>\n\
             <dl>\n\
             <dt>Office</dt><dd>{office}</dd>\n\
             <dt>Jurisdiction</dt><dd>{place}</dd>\n",
            canonical = escape(&canonical),
        );

        if let Some(district) = &candidate.district {
            let _ = writeln!(html, "<dt>District</dt><dd>{}</dd>", escape(district));
        }
        if let Some(party) = &candidate.party {
            let _ = writeln!(html, "<dt>Party</dt><dd>{}</dd>", escape(party));
        }
        if let Some(year) = candidate.election_year {
            let _ = writeln!(html, "<dt>Election</dt><dd>{}</dd>", year);
        }
        if let Some(raw) = &candidate.website {
            let website = escape(raw);
            if is_web_url(raw) {
                let _ = writeln!(
                    html,
                    "<dt>Website</dt><dd><a href=\"{0}\" rel=\"nofollow noopener\">{0}</a></dd>",
                    website
                );
            } else {
                let _ = writeln!(html, "<dt>Website</dt><dd>{}</dd>", website);
            }
        }

        html.push_str("</dl>\n</main>\n</body>\n</html>\n");
        Document::new(DocumentKind::Profile, html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candidate() -> Candidate {
        Candidate {
            id: 1,
            slug: "pat-obrien-co-mayor".into(),
            name: "Pat O'Brien & <Co>".into(),
            office: "Mayor".into(),
            state: "CO".into(),
            county: Some("Denver".into()),
            district: None,
            party: Some("Independent".into()),
            election_year: Some(2026),
            website: Some("https://obrien.example/?a=1&b=2".into()),
            email: None,
            phone: None,
            image_url: None,
            source: "api".into(),
            source_id: Some("X1".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_profile_escapes_record_text() {
        let doc = Renderer::new("https://voterspheres.org").render_profile(&candidate());

        assert!(doc.body.contains("Pat O&apos;Brien &amp; &lt;Co&gt;"));
        assert!(!doc.body.contains("O'Brien"));
        assert!(!doc.body.contains("<Co>"));
        assert!(doc.body.contains("href=\"https://obrien.example/?a=1&amp;b=2\""));
        assert!(doc
            .body
            .contains("<link rel=\"canonical\" href=\"https://voterspheres.org/candidates/pat-obrien-co-mayor\">"));
        assert!(doc.body.contains("<dd>Denver, CO</dd>"));
    }

    #[test]
    fn test_non_http_website_is_not_a_link() {
        let mut record = candidate();
        record.website = Some("javascript:alert(1)".into());
        let doc = Renderer::new("https://voterspheres.org").render_profile(&record);

        assert!(!doc.body.contains("<a href"));
        assert!(doc.body.contains("<dd>javascript:alert(1)</dd>"));
    }
}

//! Row types shared by the stores, the renderer and the HTTP layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use voterspheres_common::CandidateInput;

/// Default page size for search
pub const DEFAULT_SEARCH_LIMIT: u32 = 10;

/// Largest page size a caller may ask for
pub const MAX_SEARCH_LIMIT: u32 = 100;

/// Column widths of the `candidates` table, checked up front by the memory store
pub const MAX_NAME_LEN: usize = 200;
pub const MAX_OFFICE_LEN: usize = 200;
pub const MAX_STATE_LEN: usize = 64;
pub const MAX_SLUG_LEN: usize = 512;
pub const MAX_URL_LEN: usize = 512;

/// A stored directory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Candidate {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub office: String,
    pub state: String,
    pub county: Option<String>,
    pub district: Option<String>,
    pub party: Option<String>,
    pub election_year: Option<i32>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub image_url: Option<String>,
    pub source: String,
    pub source_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated input with its derived slug, ready for upsert
#[derive(Debug, Clone, PartialEq)]
pub struct NewCandidate {
    pub slug: String,
    pub input: CandidateInput,
}

impl NewCandidate {
    /// Reject values that would not fit the table's columns
    pub fn check_column_limits(&self) -> Result<(), String> {
        let checks = [
            ("slug", self.slug.chars().count(), MAX_SLUG_LEN),
            ("name", self.input.name.chars().count(), MAX_NAME_LEN),
            ("office", self.input.office.chars().count(), MAX_OFFICE_LEN),
            ("state", self.input.state.chars().count(), MAX_STATE_LEN),
            (
                "website",
                self.input.website.as_deref().map_or(0, |w| w.chars().count()),
                MAX_URL_LEN,
            ),
            (
                "image_url",
                self.input.image_url.as_deref().map_or(0, |w| w.chars().count()),
                MAX_URL_LEN,
            ),
        ];

        for (column, len, max) in checks {
            if len > max {
                return Err(format!(
                    "value too long for column {} ({} > {})",
                    column, len, max
                ));
            }
        }
        Ok(())
    }
}

/// `(id, slug)` pair used by keyset walks
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SlugRef {
    pub id: i64,
    pub slug: String,
}

/// One `<url>` of a sitemap chunk
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SitemapEntry {
    pub slug: String,
    pub updated_at: DateTime<Utc>,
}

/// Search filters; blank values mean "no filter"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Free text matched against the name
    pub q: Option<String>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub office: Option<String>,
    pub party: Option<String>,
}

impl SearchFilters {
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|v| !v.is_empty())
        }

        Self {
            q: clean(self.q),
            state: clean(self.state).map(|s| s.to_uppercase()),
            county: clean(self.county),
            office: clean(self.office),
            party: clean(self.party),
        }
    }
}

/// Columns whose distinct values populate the search filter menus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterField {
    State,
    Office,
    Party,
}

impl FilterField {
    pub fn column(&self) -> &'static str {
        match self {
            FilterField::State => "state",
            FilterField::Office => "office",
            FilterField::Party => "party",
        }
    }

    /// The field's value on a stored record
    pub fn value_of<'a>(&self, candidate: &'a Candidate) -> Option<&'a str> {
        match self {
            FilterField::State => Some(candidate.state.as_str()),
            FilterField::Office => Some(candidate.office.as_str()),
            FilterField::Party => candidate.party.as_deref(),
        }
    }
}

/// Sorted distinct values for each filter menu
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub states: Vec<String>,
    pub offices: Vec<String>,
    pub parties: Vec<String>,
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub results: Vec<Candidate>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

/// Clamp paging input to `page >= 1` and `1 <= limit <= MAX_SEARCH_LIMIT`
pub fn clamp_paging(page: Option<u32>, limit: Option<u32>) -> (u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    (page, limit)
}

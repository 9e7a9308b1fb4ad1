//! Record identifier (slug) derivation
//!
//! A slug is the canonical unique key of a directory record. It is a pure
//! function of the record's name, jurisdiction, office and (optionally)
//! election cycle:
//!
//! - "Jane Q. Doe", CA, "Governor" → `jane-q-doe-ca-governor`
//! - "O'Brien", NY / Kings, "State Senate" → `obrien-ny-kings-state-senate`
//!
//! Punctuation is dropped without leaving a separator, whitespace and the
//! separator-like characters `- _ / \ | +` become a single `-`.

use serde::{Deserialize, Serialize};

/// Separator placed between words and between slug components
pub const SLUG_SEPARATOR: char = '-';

/// Upper bound for collision suffixes (`-2` .. `-MAX_COLLISION_SUFFIX`)
pub const MAX_COLLISION_SUFFIX: u32 = 50;

/// Geographic scope a candidate runs in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub state: String,
    pub county: Option<String>,
}

impl Jurisdiction {
    /// Statewide jurisdiction
    pub fn state(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            county: None,
        }
    }

    /// County-level jurisdiction
    pub fn county(state: impl Into<String>, county: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            county: Some(county.into()),
        }
    }
}

/// Derive the slug for a record.
///
/// Each component is normalized on its own and the non-empty results are
/// joined with [`SLUG_SEPARATOR`]. The cycle is appended only when given.
pub fn slug(name: &str, jurisdiction: &Jurisdiction, office: &str, cycle: Option<i32>) -> String {
    let cycle = cycle.map(|year| year.to_string());

    let components = [
        Some(name),
        Some(jurisdiction.state.as_str()),
        jurisdiction.county.as_deref(),
        Some(office),
        cycle.as_deref(),
    ];

    components
        .into_iter()
        .flatten()
        .map(normalize_component)
        .filter(|component| !component.is_empty())
        .collect::<Vec<_>>()
        .join(&SLUG_SEPARATOR.to_string())
}

/// Append a collision suffix to a base slug (`n` starts at 2)
pub fn with_suffix(base: &str, n: u32) -> String {
    format!("{}{}{}", base, SLUG_SEPARATOR, n)
}

/// Lowercase, strip punctuation, and collapse separators in one component
fn normalize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push(SLUG_SEPARATOR);
            }
            pending_separator = false;
            out.extend(ch.to_lowercase());
        } else if ch.is_whitespace() || matches!(ch, '-' | '_' | '/' | '\\' | '|' | '+') {
            pending_separator = true;
        }
    }

    out
}

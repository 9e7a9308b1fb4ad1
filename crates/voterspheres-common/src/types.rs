//! Shared domain types

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, Result};
use crate::slug::{self, Jurisdiction};

/// A candidate record as delivered by a source adapter.
///
/// Every adapter converts its raw payload into this shape at the edge, so the
/// ingestion coordinator only ever sees one record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CandidateInput {
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
    /// Source system name, e.g. "fec" or "csv"
    pub source: String,
    /// Identifier of the record inside its source, when the source has one
    pub source_id: Option<String>,
}

impl CandidateInput {
    /// Trim every field and turn blank optionals into `None`
    pub fn normalized(mut self) -> Self {
        self.name = collapse_whitespace(&self.name);
        self.office = collapse_whitespace(&self.office);
        self.state = self.state.trim().to_uppercase();
        self.source = self.source.trim().to_string();
        for field in [
            &mut self.county,
            &mut self.district,
            &mut self.party,
            &mut self.website,
            &mut self.email,
            &mut self.phone,
            &mut self.image_url,
            &mut self.source_id,
        ] {
            *field = field.take().map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        }
        self
    }

    /// Check that the identifying fields needed for a slug are present
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DirectoryError::missing_field("name"));
        }
        if self.office.trim().is_empty() {
            return Err(DirectoryError::missing_field("office"));
        }
        if self.state.trim().is_empty() {
            return Err(DirectoryError::missing_field("state"));
        }
        if let Some(year) = self.election_year {
            if !(1789..=2200).contains(&year) {
                return Err(DirectoryError::InvalidRecord(format!(
                    "election year {} out of range",
                    year
                )));
            }
        }
        Ok(())
    }

    pub fn jurisdiction(&self) -> Jurisdiction {
        Jurisdiction {
            state: self.state.clone(),
            county: self.county.clone(),
        }
    }

    /// Slug of this record; the cycle takes part only when `include_cycle` is set
    pub fn slug(&self, include_cycle: bool) -> String {
        let cycle = if include_cycle { self.election_year } else { None };
        slug::slug(&self.name, &self.jurisdiction(), &self.office, cycle)
    }

    /// Short human-readable reference used in skip logs
    pub fn reference(&self) -> String {
        match &self.source_id {
            Some(id) => format!("{}:{} ({})", self.source, id, self.name),
            None => format!("{} ({}, {}, {})", self.source, self.name, self.office, self.state),
        }
    }
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

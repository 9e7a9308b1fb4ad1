//! Delimited flat-file source
//!
//! Columns are located by header name (case-insensitive). `name`, `office`
//! and `state` headers are required; `district`, `party`, `year`, `website`,
//! `county`, `email`, `phone` and `id` are picked up when present.

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, Trim};
use std::fs::File;
use std::path::{Path, PathBuf};
use voterspheres_common::CandidateInput;

use crate::error::{Result, SourceError};

/// Source label stamped on records read from a file
pub const FILE_SOURCE_NAME: &str = "file";

const REQUIRED_COLUMNS: [&str; 3] = ["name", "office", "state"];

/// A delimited file on disk
///
/// [`rows`](Self::rows) opens the file anew on every call, so the sequence can
/// be restarted from the top at any time.
#[derive(Debug, Clone)]
pub struct DelimitedFileSource {
    path: PathBuf,
    delimiter: u8,
    source_name: String,
}

impl DelimitedFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
            source_name: FILE_SOURCE_NAME.to_string(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Lazily iterate the data rows. Header problems fail here; row problems
    /// surface as `Err(SourceError::MalformedRow)` items and iteration goes on.
    pub fn rows(&self) -> Result<FileRows> {
        let file = File::open(&self.path)?;
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(file);

        let columns = ColumnMap::from_headers(reader.headers()?)?;

        Ok(FileRows {
            inner: reader.into_records(),
            columns,
            source: self.source_name.clone(),
        })
    }
}

/// Iterator over the converted rows of a [`DelimitedFileSource`]
pub struct FileRows {
    inner: StringRecordsIntoIter<File>,
    columns: ColumnMap,
    source: String,
}

impl Iterator for FileRows {
    type Item = Result<CandidateInput>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.inner.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e.into())),
        };
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        Some(self.columns.convert(&record, line, &self.source))
    }
}

#[derive(Debug, Clone, Default)]
struct ColumnMap {
    name: usize,
    office: usize,
    state: usize,
    county: Option<usize>,
    district: Option<usize>,
    party: Option<usize>,
    year: Option<usize>,
    website: Option<usize>,
    email: Option<usize>,
    phone: Option<usize>,
    id: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |wanted: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(wanted))
        };

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|column| find(column).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(SourceError::MalformedRow {
                line: 1,
                reason: format!("header is missing column(s): {}", missing.join(", ")),
            });
        }

        Ok(Self {
            name: find("name").unwrap_or_default(),
            office: find("office").unwrap_or_default(),
            state: find("state").unwrap_or_default(),
            county: find("county"),
            district: find("district"),
            party: find("party"),
            year: find("year").or_else(|| find("election_year")),
            website: find("website"),
            email: find("email"),
            phone: find("phone"),
            id: find("id"),
        })
    }

    fn convert(&self, record: &StringRecord, line: u64, source: &str) -> Result<CandidateInput> {
        let get = |index: usize| record.get(index).unwrap_or_default().to_string();
        let opt = |index: Option<usize>| {
            index
                .and_then(|i| record.get(i))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let election_year = match opt(self.year) {
            Some(raw) => Some(raw.parse::<i32>().map_err(|_| SourceError::MalformedRow {
                line,
                reason: format!("year '{}' is not a number", raw),
            })?),
            None => None,
        };

        Ok(CandidateInput {
            name: get(self.name),
            office: get(self.office),
            state: get(self.state),
            county: opt(self.county),
            district: opt(self.district),
            party: opt(self.party),
            election_year,
            website: opt(self.website),
            email: opt(self.email),
            phone: opt(self.phone),
            image_url: None,
            source: source.to_string(),
            source_id: opt(self.id),
        }
        .normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_are_case_insensitive() {
        let headers = StringRecord::from(vec!["Name", "OFFICE", "State", "Year", "Website"]);
        let map = ColumnMap::from_headers(&headers).unwrap();
        assert_eq!((map.name, map.office, map.state), (0, 1, 2));
        assert_eq!(map.year, Some(3));
        assert_eq!(map.website, Some(4));
        assert_eq!(map.county, None);
    }

    #[test]
    fn test_missing_required_header_is_rejected() {
        let headers = StringRecord::from(vec!["name", "party"]);
        let err = ColumnMap::from_headers(&headers).unwrap_err();
        assert!(err.to_string().contains("office, state"));
    }

    #[test]
    fn test_bad_year_names_the_line() {
        let headers = StringRecord::from(vec!["name", "office", "state", "year"]);
        let map = ColumnMap::from_headers(&headers).unwrap();
        let row = StringRecord::from(vec!["Ann Lee", "Mayor", "TX", "soon"]);
        match map.convert(&row, 7, "file") {
            Err(SourceError::MalformedRow { line, reason }) => {
                assert_eq!(line, 7);
                assert!(reason.contains("soon"));
            }
            other => panic!("expected malformed row, got {:?}", other),
        }
    }
}

//! Paginated JSON HTTP source
//!
//! Speaks `GET {base}/candidates?page=N&per_page=M` and expects
//! `{"results": [...], "pagination": {"pages": T}}` back. Result objects are
//! converted one by one, so a single odd record never poisons its page.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use voterspheres_common::CandidateInput;

use crate::error::{Result, SourceError};

/// Default records requested per page
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Largest page size accepted by [`ApiSourceConfig::validate`]
pub const MAX_PER_PAGE: u32 = 1000;

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default pause between two page requests in milliseconds
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 250;

/// Source label stamped on records from the paged API
pub const API_SOURCE_NAME: &str = "api";

/// One page of converted records
#[derive(Debug, Clone, Default)]
pub struct SourcePage {
    pub records: Vec<CandidateInput>,
    /// Records that could not be converted, with the reason
    pub malformed: Vec<String>,
    /// Total page count reported by the source, if any
    pub total_pages: Option<u32>,
}

/// Anything that can be read page by page, starting at page 1
#[async_trait]
pub trait PagedSource: Send + Sync {
    /// Label used in logs and stored as record provenance
    fn name(&self) -> &str;

    async fn fetch_page(&self, page: u32) -> Result<SourcePage>;
}

/// Paged API connection settings
#[derive(Debug, Clone)]
pub struct ApiSourceConfig {
    pub base_url: String,
    pub per_page: u32,
    pub api_key: Option<String>,
    pub timeout: Duration,
    /// Minimum spacing between requests
    pub request_delay: Duration,
    pub source_name: String,
}

impl ApiSourceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            per_page: DEFAULT_PER_PAGE,
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            source_name: API_SOURCE_NAME.to_string(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(SourceError::Config(format!(
                "base URL must be http(s), got '{}'",
                self.base_url
            )));
        }
        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            return Err(SourceError::Config(format!(
                "per_page must be between 1 and {}, got {}",
                MAX_PER_PAGE, self.per_page
            )));
        }
        Ok(())
    }

    fn page_url(&self) -> String {
        format!("{}/candidates", self.base_url.trim_end_matches('/'))
    }
}

/// HTTP client for the paged candidate API
pub struct PagedApiSource {
    client: Client,
    config: ApiSourceConfig,
    last_request: Mutex<Option<Instant>>,
}

impl PagedApiSource {
    pub fn new(config: ApiSourceConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("voterspheres-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            config,
            last_request: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ApiSourceConfig {
        &self.config
    }

    /// Sleep until `request_delay` has passed since the previous request
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.config.request_delay {
                tokio::time::sleep(self.config.request_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl PagedSource for PagedApiSource {
    fn name(&self) -> &str {
        &self.config.source_name
    }

    async fn fetch_page(&self, page: u32) -> Result<SourcePage> {
        self.throttle().await;

        let mut query = vec![
            ("page", page.to_string()),
            ("per_page", self.config.per_page.to_string()),
        ];
        if let Some(key) = &self.config.api_key {
            query.push(("api_key", key.clone()));
        }

        debug!(page, url = %self.config.page_url(), "Fetching source page");

        let response = self
            .client
            .get(self.config.page_url())
            .query(&query)
            .send()
            .await?
            .error_for_status()?;

        let body: ApiPage = response.json().await?;
        Ok(convert_page(body, &self.config.source_name))
    }
}

#[derive(Debug, Deserialize)]
struct ApiPage {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    pagination: Option<ApiPagination>,
}

#[derive(Debug, Deserialize)]
struct ApiPagination {
    pages: Option<u32>,
}

/// Raw result object; full names take precedence over codes
#[derive(Debug, Deserialize)]
struct ApiCandidate {
    name: Option<String>,
    office: Option<String>,
    office_full: Option<String>,
    state: Option<String>,
    county: Option<String>,
    district: Option<String>,
    party: Option<String>,
    party_full: Option<String>,
    election_year: Option<Value>,
    cycle: Option<Value>,
    website: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    image_url: Option<String>,
    candidate_id: Option<Value>,
    id: Option<Value>,
}

fn convert_page(page: ApiPage, source: &str) -> SourcePage {
    let mut out = SourcePage {
        total_pages: page.pagination.and_then(|p| p.pages),
        ..Default::default()
    };

    for (index, raw) in page.results.into_iter().enumerate() {
        match serde_json::from_value::<ApiCandidate>(raw) {
            Ok(candidate) => out.records.push(candidate.into_input(source)),
            Err(e) => out.malformed.push(format!("result #{}: {}", index, e)),
        }
    }

    out
}

impl ApiCandidate {
    fn into_input(self, source: &str) -> CandidateInput {
        let election_year = self
            .election_year
            .as_ref()
            .and_then(lenient_year)
            .or_else(|| self.cycle.as_ref().and_then(lenient_year));
        let source_id = self
            .candidate_id
            .as_ref()
            .and_then(lenient_string)
            .or_else(|| self.id.as_ref().and_then(lenient_string));

        CandidateInput {
            name: self.name.unwrap_or_default(),
            office: self.office_full.or(self.office).unwrap_or_default(),
            state: self.state.unwrap_or_default(),
            county: self.county,
            district: self.district,
            party: self.party_full.or(self.party),
            election_year,
            website: self.website,
            email: self.email,
            phone: self.phone,
            image_url: self.image_url,
            source: source.to_string(),
            source_id,
        }
        .normalized()
    }
}

fn lenient_year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_names_win_over_codes() {
        let page: ApiPage = serde_json::from_value(json!({
            "results": [{
                "name": "DOE, JANE",
                "office": "H",
                "office_full": "House",
                "state": "ca",
                "party": "DEM",
                "party_full": "Democratic Party",
                "cycle": "2026",
                "candidate_id": "H6CA01234"
            }],
            "pagination": {"pages": 4}
        }))
        .unwrap();

        let converted = convert_page(page, "fec");
        assert_eq!(converted.total_pages, Some(4));
        let record = &converted.records[0];
        assert_eq!(record.office, "House");
        assert_eq!(record.party.as_deref(), Some("Democratic Party"));
        assert_eq!(record.state, "CA");
        assert_eq!(record.election_year, Some(2026));
        assert_eq!(record.source_id.as_deref(), Some("H6CA01234"));
        assert_eq!(record.source, "fec");
    }

    #[test]
    fn test_wrongly_typed_record_is_reported_not_fatal() {
        let page: ApiPage = serde_json::from_value(json!({
            "results": [
                {"name": 42, "office": "Mayor", "state": "TX"},
                {"name": "Ann Lee", "office": "Mayor", "state": "TX", "id": 7}
            ]
        }))
        .unwrap();

        let converted = convert_page(page, "api");
        assert_eq!(converted.records.len(), 1);
        assert_eq!(converted.malformed.len(), 1);
        assert!(converted.malformed[0].starts_with("result #0"));
        assert_eq!(converted.records[0].source_id.as_deref(), Some("7"));
        assert_eq!(converted.total_pages, None);
    }

    #[test]
    fn test_config_validation() {
        assert!(ApiSourceConfig::new("https://api.example.org").validate().is_ok());
        assert!(ApiSourceConfig::new("ftp://api.example.org").validate().is_err());
        assert!(ApiSourceConfig::new("https://api.example.org")
            .with_per_page(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_page_url_trims_trailing_slash() {
        let config = ApiSourceConfig::new("https://api.example.org/v1/");
        assert_eq!(config.page_url(), "https://api.example.org/v1/candidates");
    }
}

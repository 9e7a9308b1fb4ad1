//! VoterSpheres Ingest Library
//!
//! Source adapters that pull raw candidate records from outside the system and
//! convert them into [`CandidateInput`] at the edge.
//!
//! # Supported Sources
//!
//! - **Paged API**: JSON HTTP endpoint returning `{results, pagination: {pages}}`
//! - **Delimited file**: CSV/TSV export with a header row
//!
//! Adapters only read. Batching, slug derivation and writing belong to the
//! ingestion coordinator in `voterspheres-server`.
//!
//! # Example
//!
//! ```no_run
//! use voterspheres_ingest::{ApiSourceConfig, PagedApiSource, PagedSource};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = PagedApiSource::new(ApiSourceConfig::new("https://api.example.org/v1"))?;
//!     let page = source.fetch_page(1).await?;
//!     println!("{} records, {:?} pages", page.records.len(), page.total_pages);
//!     Ok(())
//! }
//! ```
//!
//! [`CandidateInput`]: voterspheres_common::CandidateInput

pub mod api;
pub mod error;
pub mod file;

pub use api::{ApiSourceConfig, PagedApiSource, PagedSource, SourcePage};
pub use error::{Result, SourceError};
pub use file::{DelimitedFileSource, FileRows};

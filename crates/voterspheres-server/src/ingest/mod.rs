//! Candidate ingestion
//!
//! The [`IngestCoordinator`] reads a [`voterspheres_ingest`] source, turns
//! its records into slugged rows and writes them through a
//! [`crate::store::CandidateStore`]. The [`ResyncScheduler`] repeats the API
//! import on an interval.

pub mod config;
pub mod coordinator;
pub mod resync;
pub mod stats;

pub use config::{IngestConfig, ResyncConfig};
pub use coordinator::{ImportSource, IngestCoordinator};
pub use resync::ResyncScheduler;
pub use stats::{ImportOutcome, ImportStats};

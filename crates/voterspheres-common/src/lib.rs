//! VoterSpheres Common Library
//!
//! Shared types, utilities, and error handling for the VoterSpheres workspace.
//!
//! # Overview
//!
//! - **Slugs**: deterministic record identifiers derived from identifying attributes
//! - **Types**: the normalized candidate input shared by every source adapter
//! - **Retry**: the backoff state machine used by imports, resyncs and background jobs
//! - **Logging**: tracing subscriber setup shared by all binaries
//!
//! # Example
//!
//! ```
//! use voterspheres_common::slug::{slug, Jurisdiction};
//!
//! let key = slug("Jane Q. Doe", &Jurisdiction::state("CA"), "Governor", None);
//! assert_eq!(key, "jane-q-doe-ca-governor");
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod retry;
pub mod slug;
pub mod types;

// Re-export commonly used types
pub use error::{DirectoryError, Result};
pub use types::CandidateInput;

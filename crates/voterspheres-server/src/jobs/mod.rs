//! Background cache warming
//!
//! Warm jobs live in a [`JobQueue`] (Postgres in production, memory in tests)
//! and are worked by the [`JobEngine`]'s fixed worker pool. The
//! [`Pregenerator`] fills the queue with one job per profile and sitemap
//! chunk.

pub mod engine;
pub mod executor;
pub mod pregen;
pub mod queue;
pub mod types;

pub use engine::{JobEngine, JobEngineConfig, JobExecutor};
pub use executor::WarmExecutor;
pub use pregen::{Pregenerator, WarmAllStats};
pub use queue::{JobQueue, MemoryJobQueue};
pub use types::{FailOutcome, Job, JobCounts, JobError, JobKind, JobResult, JobState, NewJob};

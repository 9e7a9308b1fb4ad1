//! Warm job definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// What a job warms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Target is a slug
    WarmProfile,
    /// Target is a chunk number
    WarmSitemapChunk,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::WarmProfile => "warm-profile",
            JobKind::WarmSitemapChunk => "warm-sitemap-chunk",
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warm-profile" => Ok(JobKind::WarmProfile),
            "warm-sitemap-chunk" => Ok(JobKind::WarmSitemapChunk),
            other => Err(JobError::Queue(format!("unknown job kind '{}'", other))),
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle: queued -> active -> succeeded | (queued again | failed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Active,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Active => "active",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "active" => Ok(JobState::Active),
            "succeeded" => Ok(JobState::Succeeded),
            "failed" => Ok(JobState::Failed),
            other => Err(JobError::Queue(format!("unknown job state '{}'", other))),
        }
    }
}

/// A claimed or stored job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub target: String,
    pub state: JobState,
    /// Attempts started so far, the current one included
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Job to be enqueued
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewJob {
    pub kind: JobKind,
    pub target: String,
}

impl NewJob {
    pub fn warm_profile(slug: impl Into<String>) -> Self {
        Self {
            kind: JobKind::WarmProfile,
            target: slug.into(),
        }
    }

    pub fn warm_sitemap_chunk(chunk: i64) -> Self {
        Self {
            kind: JobKind::WarmSitemapChunk,
            target: chunk.to_string(),
        }
    }
}

/// Where a failed job went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Requeued { attempts: i32, run_at: DateTime<Utc> },
    Dead { attempts: i32 },
}

/// Jobs per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub queued: i64,
    pub active: i64,
    pub succeeded: i64,
    pub failed: i64,
}

impl JobCounts {
    pub fn pending(&self) -> i64 {
        self.queued + self.active
    }
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job queue error: {0}")]
    Queue(String),

    #[error("Job queue database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Retrying cannot help: the target does not exist or is malformed
    #[error("Invalid job target: {0}")]
    InvalidTarget(String),

    #[error("Job execution failed: {0}")]
    Execution(String),

    /// The job was reclaimed and handed out again after this attempt started
    #[error("Job {id} is no longer held by attempt {attempt}")]
    ClaimLost { id: Uuid, attempt: i32 },
}

impl JobError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, JobError::InvalidTarget(_))
    }
}

pub type JobResult<T> = Result<T, JobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [JobKind::WarmProfile, JobKind::WarmSitemapChunk] {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
        }
        assert!("warm-everything".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_only_invalid_target_is_permanent() {
        assert!(JobError::InvalidTarget("no such slug".into()).is_permanent());
        assert!(!JobError::Execution("cache down".into()).is_permanent());
    }
}

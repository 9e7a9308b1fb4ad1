//! Job queue abstraction
//!
//! Claiming is atomic: a job handed to one worker is never handed to another
//! until it is failed back or reclaimed as stale. At most one queued-or-active
//! job exists per `(kind, target)`; enqueueing a duplicate is a no-op.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::types::{FailOutcome, Job, JobCounts, JobError, JobKind, JobResult, JobState, NewJob};

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Returns `false` when an equivalent job is already queued or active
    async fn enqueue(&self, job: NewJob, max_attempts: i32) -> JobResult<bool>;

    /// Enqueue several jobs, returning how many were new
    async fn enqueue_many(&self, jobs: Vec<NewJob>, max_attempts: i32) -> JobResult<u64> {
        let mut added = 0;
        for job in jobs {
            if self.enqueue(job, max_attempts).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Claim the next job whose `run_at` has passed, counting it as an attempt
    async fn claim(&self) -> JobResult<Option<Job>>;

    /// Mark a claimed job succeeded. Fails with [`JobError::ClaimLost`] when
    /// the claim has since been reclaimed or re-claimed.
    async fn complete(&self, job: &Job) -> JobResult<()>;

    /// Put a claimed job back for `retry_at`, or mark it failed when
    /// `retry_at` is `None`. Same claim check as `complete`.
    async fn fail(
        &self,
        job: &Job,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> JobResult<FailOutcome>;

    /// Return jobs claimed longer than `older_than` ago to the queue
    async fn reclaim_stale(&self, older_than: Duration) -> JobResult<u64>;

    /// Delete finished jobs last touched longer than `older_than` ago
    async fn prune_finished(&self, older_than: Duration) -> JobResult<u64>;

    async fn counts(&self) -> JobResult<JobCounts>;
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    /// Queued jobs in claim order
    ready: BTreeSet<(DateTime<Utc>, u64, Uuid)>,
    /// `(kind, target)` of every queued or active job
    pending: HashSet<(JobKind, String)>,
    seq: u64,
}

impl Inner {
    fn push_ready(&mut self, run_at: DateTime<Utc>, id: Uuid) {
        self.seq += 1;
        self.ready.insert((run_at, self.seq, id));
    }

    fn job_mut(&mut self, id: Uuid) -> JobResult<&mut Job> {
        self.jobs
            .get_mut(&id)
            .ok_or_else(|| JobError::Queue(format!("job {} not found", id)))
    }

    /// The stored job, provided `claimed` still holds it
    fn held_mut(&mut self, claimed: &Job) -> JobResult<&mut Job> {
        let job = self.job_mut(claimed.id)?;
        if job.state != JobState::Active || job.attempts != claimed.attempts {
            return Err(JobError::ClaimLost {
                id: claimed.id,
                attempt: claimed.attempts,
            });
        }
        Ok(job)
    }
}

/// Process-local queue for tests and single-process tooling
#[derive(Default)]
pub struct MemoryJobQueue {
    inner: Mutex<Inner>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one job
    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.inner.lock().await.jobs.get(&id).cloned()
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.inner.lock().await.jobs.values().cloned().collect()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: NewJob, max_attempts: i32) -> JobResult<bool> {
        let mut inner = self.inner.lock().await;
        let key = (job.kind, job.target.clone());
        if inner.pending.contains(&key) {
            return Ok(false);
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        inner.pending.insert(key);
        inner.jobs.insert(
            id,
            Job {
                id,
                kind: job.kind,
                target: job.target,
                state: JobState::Queued,
                attempts: 0,
                max_attempts: max_attempts.max(1),
                run_at: now,
                claimed_at: None,
                last_error: None,
                created_at: now,
                updated_at: now,
            },
        );
        inner.push_ready(now, id);
        Ok(true)
    }

    async fn claim(&self) -> JobResult<Option<Job>> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        let next = match inner.ready.first() {
            Some(entry) if entry.0 <= now => *entry,
            _ => return Ok(None),
        };
        inner.ready.remove(&next);

        let job = inner.job_mut(next.2)?;
        job.state = JobState::Active;
        job.attempts += 1;
        job.claimed_at = Some(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn complete(&self, claimed: &Job) -> JobResult<()> {
        let mut inner = self.inner.lock().await;
        let job = inner.held_mut(claimed)?;
        job.state = JobState::Succeeded;
        job.last_error = None;
        job.claimed_at = None;
        job.updated_at = Utc::now();
        let key = (job.kind, job.target.clone());
        inner.pending.remove(&key);
        Ok(())
    }

    async fn fail(
        &self,
        claimed: &Job,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> JobResult<FailOutcome> {
        let mut inner = self.inner.lock().await;
        let id = claimed.id;
        let job = inner.held_mut(claimed)?;
        job.last_error = Some(error.to_string());
        job.claimed_at = None;
        job.updated_at = Utc::now();
        let attempts = job.attempts;
        let key = (job.kind, job.target.clone());

        match retry_at {
            Some(run_at) => {
                job.state = JobState::Queued;
                job.run_at = run_at;
                inner.push_ready(run_at, id);
                Ok(FailOutcome::Requeued { attempts, run_at })
            }
            None => {
                job.state = JobState::Failed;
                inner.pending.remove(&key);
                Ok(FailOutcome::Dead { attempts })
            }
        }
    }

    async fn reclaim_stale(&self, older_than: Duration) -> JobResult<u64> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let cutoff = now - to_chrono(older_than);

        let stale: Vec<Uuid> = inner
            .jobs
            .values()
            .filter(|job| job.state == JobState::Active)
            .filter(|job| job.claimed_at.is_some_and(|at| at < cutoff))
            .map(|job| job.id)
            .collect();

        for id in &stale {
            let job = inner.job_mut(*id)?;
            job.claimed_at = None;
            job.updated_at = now;
            job.last_error.get_or_insert_with(|| "claim expired".to_string());
            if job.attempts >= job.max_attempts {
                job.state = JobState::Failed;
                let key = (job.kind, job.target.clone());
                inner.pending.remove(&key);
            } else {
                job.state = JobState::Queued;
                job.run_at = now;
                inner.push_ready(now, *id);
            }
        }

        Ok(stale.len() as u64)
    }

    async fn prune_finished(&self, older_than: Duration) -> JobResult<u64> {
        let mut inner = self.inner.lock().await;
        let cutoff = Utc::now() - to_chrono(older_than);
        let before = inner.jobs.len();
        inner.jobs.retain(|_, job| {
            !(matches!(job.state, JobState::Succeeded | JobState::Failed) && job.updated_at < cutoff)
        });
        Ok((before - inner.jobs.len()) as u64)
    }

    async fn counts(&self) -> JobResult<JobCounts> {
        let inner = self.inner.lock().await;
        let mut counts = JobCounts::default();
        for job in inner.jobs.values() {
            match job.state {
                JobState::Queued => counts.queued += 1,
                JobState::Active => counts.active += 1,
                JobState::Succeeded => counts.succeeded += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}

//! Worker pool
//!
//! A fixed number of workers poll the [`JobQueue`]; the number of jobs running
//! at once never exceeds the worker count. A failed job is re-queued with
//! exponential backoff until its attempt ceiling, then marked failed. A
//! failing or panicking job never takes its worker down.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use voterspheres_common::retry::{RetryDecision, RetryPolicy};

use super::queue::{to_chrono, JobQueue};
use super::types::{FailOutcome, Job, JobCounts, JobError, JobResult};

pub const DEFAULT_CONCURRENCY: usize = 25;
pub const MAX_CONCURRENCY: usize = 500;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 5;
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_STALE_AFTER_SECS: u64 = 600;
pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_RETENTION_SECS: u64 = 7 * 86_400;

/// Runs one claimed job
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &Job) -> JobResult<()>;
}

#[derive(Debug, Clone)]
pub struct JobEngineConfig {
    pub concurrency: usize,
    /// Attempt ceiling and backoff between attempts
    pub retry: RetryPolicy,
    /// Sleep between polls of an empty queue
    pub poll_interval: Duration,
    /// Active jobs claimed longer ago than this are handed out again
    pub stale_after: Duration,
    pub maintenance_interval: Duration,
    /// Finished jobs older than this are deleted
    pub retention: Duration,
}

impl Default for JobEngineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::new(
                DEFAULT_MAX_ATTEMPTS,
                Duration::from_secs(DEFAULT_BACKOFF_BASE_SECS),
                Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
            ),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
            maintenance_interval: Duration::from_secs(DEFAULT_MAINTENANCE_INTERVAL_SECS),
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
        }
    }
}

impl JobEngineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            anyhow::bail!(
                "WORKER_CONCURRENCY must be between 1 and {} (got {})",
                MAX_CONCURRENCY,
                self.concurrency
            );
        }
        if self.poll_interval.is_zero() {
            anyhow::bail!("JOB_POLL_INTERVAL_MS must be greater than 0");
        }
        if self.stale_after.is_zero() {
            anyhow::bail!("JOB_STALE_AFTER_SECS must be greater than 0");
        }
        Ok(())
    }

    /// Attempt ceiling stamped on enqueued jobs
    pub fn max_attempts(&self) -> i32 {
        i32::try_from(self.retry.max_attempts).unwrap_or(i32::MAX)
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked".to_string()
    }
}

#[derive(Clone)]
pub struct JobEngine {
    queue: Arc<dyn JobQueue>,
    executor: Arc<dyn JobExecutor>,
    config: JobEngineConfig,
    cancel: CancellationToken,
}

impl JobEngine {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        executor: Arc<dyn JobExecutor>,
        config: JobEngineConfig,
    ) -> Self {
        Self {
            queue,
            executor,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &JobEngineConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Spawn the workers and the maintenance loop; they run until cancelled
    pub fn start(&self) -> JoinHandle<()> {
        let concurrency = self.config.concurrency.clamp(1, MAX_CONCURRENCY);
        let mut handles = Vec::with_capacity(concurrency + 1);

        for worker in 0..concurrency {
            let engine = self.clone();
            handles.push(tokio::spawn(async move { engine.worker_loop(worker, false).await }));
        }
        let engine = self.clone();
        handles.push(tokio::spawn(async move { engine.maintenance_loop().await }));

        info!(concurrency, "Job engine started");
        tokio::spawn(async move {
            for result in join_all(handles).await {
                if let Err(e) = result {
                    error!(error = %e, "Job engine task ended abnormally");
                }
            }
            info!("Job engine stopped");
        })
    }

    /// Work the queue until nothing is queued or active, then return the
    /// final counts. Jobs waiting out a retry backoff are waited for.
    pub async fn run_until_idle(&self) -> JobResult<JobCounts> {
        let concurrency = self.config.concurrency.clamp(1, MAX_CONCURRENCY);
        let handles: Vec<_> = (0..concurrency)
            .map(|worker| {
                let engine = self.clone();
                tokio::spawn(async move { engine.worker_loop(worker, true).await })
            })
            .collect();

        for result in join_all(handles).await {
            if let Err(e) = result {
                return Err(JobError::Queue(format!("worker task failed: {}", e)));
            }
        }
        self.queue.counts().await
    }

    async fn worker_loop(&self, worker: usize, drain: bool) {
        debug!(worker, "Worker started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.queue.claim().await {
                Ok(Some(job)) => {
                    self.process(worker, job).await;
                    continue;
                }
                Ok(None) => {
                    if drain {
                        match self.queue.counts().await {
                            Ok(counts) if counts.pending() == 0 => break,
                            Ok(_) => {}
                            Err(e) => warn!(worker, error = %e, "Failed to read job counts"),
                        }
                    }
                }
                Err(e) => warn!(worker, error = %e, "Failed to claim job"),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(self.config.poll_interval) => {}
            }
        }

        debug!(worker, "Worker stopped");
    }

    async fn process(&self, worker: usize, job: Job) {
        let outcome = match AssertUnwindSafe(self.executor.execute(&job))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => Err(JobError::Execution(panic_message(payload))),
        };

        let err = match outcome {
            Ok(()) => {
                match self.queue.complete(&job).await {
                    Ok(()) => {}
                    Err(JobError::ClaimLost { .. }) => warn!(
                        worker,
                        job_id = %job.id,
                        attempt = job.attempts,
                        "Job was reclaimed while running, result dropped"
                    ),
                    Err(e) => error!(job_id = %job.id, error = %e, "Failed to mark job succeeded"),
                }
                return;
            }
            Err(err) => err,
        };

        let attempts_made = u32::try_from(job.attempts).unwrap_or(u32::MAX);
        let retry_at = if err.is_permanent() || job.attempts >= job.max_attempts {
            None
        } else {
            match self.config.retry.decide(attempts_made) {
                RetryDecision::RetryAfter(delay) => Some(Utc::now() + to_chrono(delay)),
                RetryDecision::GiveUp => None,
            }
        };

        let message = err.to_string();
        match self.queue.fail(&job, &message, retry_at).await {
            Ok(FailOutcome::Requeued { attempts, run_at }) => warn!(
                worker,
                job_id = %job.id,
                kind = %job.kind,
                target = %job.target,
                attempts,
                max_attempts = job.max_attempts,
                retry_at = %run_at,
                error = %message,
                "Job failed, will retry"
            ),
            Ok(FailOutcome::Dead { attempts }) => error!(
                worker,
                job_id = %job.id,
                kind = %job.kind,
                target = %job.target,
                attempts,
                error = %message,
                "Job failed after max retries"
            ),
            Err(JobError::ClaimLost { .. }) => warn!(
                worker,
                job_id = %job.id,
                attempt = job.attempts,
                error = %message,
                "Job was reclaimed while running, failure dropped"
            ),
            Err(e) => error!(
                job_id = %job.id,
                error = %e,
                "Failed to record job failure"
            ),
        }
    }

    async fn maintenance_loop(&self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(self.config.maintenance_interval) => {}
            }

            match self.queue.reclaim_stale(self.config.stale_after).await {
                Ok(0) => {}
                Ok(n) => warn!(reclaimed = n, "Reclaimed stale jobs"),
                Err(e) => warn!(error = %e, "Failed to reclaim stale jobs"),
            }
            match self.queue.prune_finished(self.config.retention).await {
                Ok(0) => {}
                Ok(n) => info!(pruned = n, "Pruned finished jobs"),
                Err(e) => warn!(error = %e, "Failed to prune finished jobs"),
            }
        }
    }
}

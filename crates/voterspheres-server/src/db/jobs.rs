//! Postgres job queue
//!
//! Claims use `FOR UPDATE SKIP LOCKED`, so any number of workers (in any
//! number of processes) can poll the same table without handing one job out
//! twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::jobs::queue::JobQueue;
use crate::jobs::types::{
    FailOutcome, Job, JobCounts, JobError, JobResult, JobState, NewJob,
};

const JOB_COLUMNS: &str = "id, kind, target, state, attempts, max_attempts, run_at, \
     claimed_at, last_error, created_at, updated_at";

/// Rows per multi-row insert
const ENQUEUE_CHUNK: usize = 1_000;

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    kind: String,
    target: String,
    state: String,
    attempts: i32,
    max_attempts: i32,
    run_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = JobError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            kind: row.kind.parse()?,
            target: row.target,
            state: row.state.parse()?,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            run_at: row.run_at,
            claimed_at: row.claimed_at,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: NewJob, max_attempts: i32) -> JobResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO warm_jobs (id, kind, target, max_attempts)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (kind, target) WHERE state IN ('queued', 'active') DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(job.kind.as_str())
        .bind(&job.target)
        .bind(max_attempts.max(1))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn enqueue_many(&self, jobs: Vec<NewJob>, max_attempts: i32) -> JobResult<u64> {
        let mut added = 0;

        for chunk in jobs.chunks(ENQUEUE_CHUNK) {
            let ids: Vec<Uuid> = chunk.iter().map(|_| Uuid::new_v4()).collect();
            let kinds: Vec<&str> = chunk.iter().map(|job| job.kind.as_str()).collect();
            let targets: Vec<&str> = chunk.iter().map(|job| job.target.as_str()).collect();

            let result = sqlx::query(
                r#"
                INSERT INTO warm_jobs (id, kind, target, max_attempts)
                SELECT t.id, t.kind, t.target, $4
                FROM UNNEST($1::uuid[], $2::varchar[], $3::varchar[]) AS t(id, kind, target)
                ON CONFLICT (kind, target) WHERE state IN ('queued', 'active') DO NOTHING
                "#,
            )
            .bind(&ids)
            .bind(&kinds)
            .bind(&targets)
            .bind(max_attempts.max(1))
            .execute(&self.pool)
            .await?;

            added += result.rows_affected();
        }

        Ok(added)
    }

    async fn claim(&self) -> JobResult<Option<Job>> {
        let sql = format!(
            r#"
            UPDATE warm_jobs
            SET state = 'active',
                attempts = attempts + 1,
                claimed_at = NOW(),
                updated_at = NOW()
            WHERE id = (
                SELECT id FROM warm_jobs
                WHERE state = 'queued' AND run_at <= NOW()
                ORDER BY run_at, created_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let row = sqlx::query_as::<_, JobRow>(&sql)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Job::try_from).transpose()
    }

    async fn complete(&self, job: &Job) -> JobResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE warm_jobs
            SET state = 'succeeded', claimed_at = NULL, last_error = NULL, updated_at = NOW()
            WHERE id = $1 AND state = 'active' AND attempts = $2
            "#,
        )
        .bind(job.id)
        .bind(job.attempts)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JobError::ClaimLost {
                id: job.id,
                attempt: job.attempts,
            });
        }
        Ok(())
    }

    async fn fail(
        &self,
        job: &Job,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> JobResult<FailOutcome> {
        let next_state = match retry_at {
            Some(_) => JobState::Queued,
            None => JobState::Failed,
        };

        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE warm_jobs
            SET state = $2,
                run_at = COALESCE($3, run_at),
                last_error = $4,
                claimed_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND state = 'active' AND attempts = $5
            RETURNING attempts
            "#,
        )
        .bind(job.id)
        .bind(next_state.as_str())
        .bind(retry_at)
        .bind(error)
        .bind(job.attempts)
        .fetch_optional(&self.pool)
        .await?;

        let attempts = attempts.ok_or(JobError::ClaimLost {
            id: job.id,
            attempt: job.attempts,
        })?;

        Ok(match retry_at {
            Some(run_at) => FailOutcome::Requeued { attempts, run_at },
            None => FailOutcome::Dead { attempts },
        })
    }

    async fn reclaim_stale(&self, older_than: Duration) -> JobResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE warm_jobs
            SET state = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'queued' END,
                run_at = NOW(),
                claimed_at = NULL,
                last_error = COALESCE(last_error, 'claim expired'),
                updated_at = NOW()
            WHERE state = 'active'
              AND claimed_at < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(older_than.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn prune_finished(&self, older_than: Duration) -> JobResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM warm_jobs
            WHERE state IN ('succeeded', 'failed')
              AND updated_at < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(older_than.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn counts(&self) -> JobResult<JobCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM warm_jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = JobCounts::default();
        for (state, count) in rows {
            match state.parse::<JobState>()? {
                JobState::Queued => counts.queued = count,
                JobState::Active => counts.active = count,
                JobState::Succeeded => counts.succeeded = count,
                JobState::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }
}

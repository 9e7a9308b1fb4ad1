//! Postgres candidate store
//!
//! Each `upsert_batch` call runs in one transaction with a savepoint per row,
//! so a row the database refuses (constraint, width, encoding) rolls back to
//! its savepoint and the rest of the batch still commits. Any error that is not
//! a database-side rejection (connection loss, pool timeout) aborts the batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::{Connection, PgPool};
use voterspheres_common::slug::{with_suffix, MAX_COLLISION_SUFFIX};

use crate::models::{Candidate, FilterField, NewCandidate, SearchFilters, SitemapEntry, SlugRef};
use crate::store::{
    provenance_conflicts, BatchOutcome, CandidateStore, CollisionPolicy, RowSkip, StoreResult,
};

const CANDIDATE_COLUMNS: &str = "id, slug, name, office, state, county, district, party, \
     election_year, website, email, phone, image_url, source, source_id, created_at, updated_at";

const UPSERT_SQL: &str = r#"
    INSERT INTO candidates (
        slug, name, office, state, county, district, party, election_year,
        website, email, phone, image_url, source, source_id
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
    ON CONFLICT (slug) DO UPDATE SET
        website = COALESCE(EXCLUDED.website, candidates.website),
        email = COALESCE(EXCLUDED.email, candidates.email),
        phone = COALESCE(EXCLUDED.phone, candidates.phone),
        image_url = COALESCE(EXCLUDED.image_url, candidates.image_url),
        source_id = COALESCE(candidates.source_id, EXCLUDED.source_id),
        updated_at = NOW()
    RETURNING (xmax = 0) AS inserted
"#;

/// Why a single row did not land
enum RowError {
    /// The row is skipped; the batch continues
    Rejected(String),
    /// The batch is aborted
    Fatal(sqlx::Error),
}

impl From<sqlx::Error> for RowError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => RowError::Rejected(db_err.message().to_string()),
            other => RowError::Fatal(other),
        }
    }
}

#[derive(Clone)]
pub struct PgCandidateStore {
    pool: PgPool,
}

impl PgCandidateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn resolve_slug(
    conn: &mut PgConnection,
    record: &NewCandidate,
    policy: CollisionPolicy,
) -> Result<String, RowError> {
    if policy == CollisionPolicy::Merge {
        return Ok(record.slug.clone());
    }

    if let Some(source_id) = record.input.source_id.as_deref() {
        let owned: Option<String> = sqlx::query_scalar(
            "SELECT slug FROM candidates WHERE source = $1 AND source_id = $2 ORDER BY id LIMIT 1",
        )
        .bind(&record.input.source)
        .bind(source_id)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(slug) = owned {
            return Ok(slug);
        }
    }

    for n in 1..=MAX_COLLISION_SUFFIX {
        let candidate = if n == 1 {
            record.slug.clone()
        } else {
            with_suffix(&record.slug, n)
        };

        let existing: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT source, source_id FROM candidates WHERE slug = $1")
                .bind(&candidate)
                .fetch_optional(&mut *conn)
                .await?;

        match existing {
            None => return Ok(candidate),
            Some((source, source_id))
                if !provenance_conflicts(&source, source_id.as_deref(), record) =>
            {
                return Ok(candidate)
            }
            Some(_) => continue,
        }
    }

    Err(RowError::Rejected(format!(
        "no free slug for '{}' up to suffix -{}",
        record.slug, MAX_COLLISION_SUFFIX
    )))
}

/// The slug written, and `true` when a new row was inserted
async fn write_row(
    conn: &mut PgConnection,
    record: &NewCandidate,
    policy: CollisionPolicy,
) -> Result<(String, bool), RowError> {
    record.check_column_limits().map_err(RowError::Rejected)?;
    let slug = resolve_slug(conn, record, policy).await?;
    let input = &record.input;

    let inserted: bool = sqlx::query_scalar(UPSERT_SQL)
        .bind(&slug)
        .bind(&input.name)
        .bind(&input.office)
        .bind(&input.state)
        .bind(&input.county)
        .bind(&input.district)
        .bind(&input.party)
        .bind(input.election_year)
        .bind(&input.website)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.image_url)
        .bind(&input.source)
        .bind(&input.source_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok((slug, inserted))
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// `WHERE` clause for the filters plus the values to bind, in placeholder order
fn filter_clause(filters: &SearchFilters) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    if let Some(q) = &filters.q {
        binds.push(format!("%{}%", escape_like(q)));
        conditions.push(format!("name ILIKE ${}", binds.len()));
    }

    // Exact match, ignoring case
    let exact = [
        ("state", &filters.state),
        ("county", &filters.county),
        ("office", &filters.office),
        ("party", &filters.party),
    ];
    for (column, value) in exact {
        if let Some(value) = value {
            binds.push(value.clone());
            conditions.push(format!("LOWER({}) = LOWER(${})", column, binds.len()));
        }
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    (clause, binds)
}

#[async_trait]
impl CandidateStore for PgCandidateStore {
    async fn upsert_batch(
        &self,
        batch: &[NewCandidate],
        policy: CollisionPolicy,
    ) -> StoreResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let mut tx = self.pool.begin().await?;

        for record in batch {
            let mut savepoint = tx.begin().await?;
            match write_row(&mut savepoint, record, policy).await {
                Ok((slug, inserted)) => {
                    savepoint.commit().await?;
                    if inserted {
                        outcome.inserted += 1;
                    } else {
                        outcome.updated += 1;
                        outcome.updated_slugs.push(slug);
                    }
                }
                Err(RowError::Rejected(reason)) => {
                    savepoint.rollback().await?;
                    outcome.skipped.push(RowSkip {
                        reference: record.input.reference(),
                        reason,
                    });
                }
                Err(RowError::Fatal(err)) => return Err(err.into()),
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Candidate>> {
        let sql = format!("SELECT {} FROM candidates WHERE slug = $1", CANDIDATE_COLUMNS);
        let row = sqlx::query_as::<_, Candidate>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn search(
        &self,
        filters: &SearchFilters,
        offset: i64,
        limit: i64,
    ) -> StoreResult<(Vec<Candidate>, i64)> {
        let (clause, binds) = filter_clause(filters);

        let count_sql = format!("SELECT COUNT(*) FROM candidates{}", clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for value in &binds {
            count_query = count_query.bind(value);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let page_sql = format!(
            "SELECT {} FROM candidates{} ORDER BY name ASC, id ASC LIMIT ${} OFFSET ${}",
            CANDIDATE_COLUMNS,
            clause,
            binds.len() + 1,
            binds.len() + 2
        );
        let mut page_query = sqlx::query_as::<_, Candidate>(&page_sql);
        for value in &binds {
            page_query = page_query.bind(value);
        }
        let results = page_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok((results, total))
    }

    async fn count(&self) -> StoreResult<i64> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM candidates")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn sitemap_page(&self, offset: i64, limit: i64) -> StoreResult<Vec<SitemapEntry>> {
        let rows = sqlx::query_as::<_, SitemapEntry>(
            "SELECT slug, updated_at FROM candidates ORDER BY id ASC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn slugs_after(&self, after_id: i64, limit: i64) -> StoreResult<Vec<SlugRef>> {
        let rows = sqlx::query_as::<_, SlugRef>(
            "SELECT id, slug FROM candidates WHERE id > $1 ORDER BY id ASC LIMIT $2",
        )
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn distinct_values(&self, field: FilterField) -> StoreResult<Vec<String>> {
        let column = field.column();
        let sql = format!(
            "SELECT DISTINCT {col} FROM candidates \
             WHERE {col} IS NOT NULL AND TRIM({col}) <> '' ORDER BY {col} ASC",
            col = column
        );
        let values = sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(values)
    }

    async fn chunk_lastmods(&self, chunk_size: i64) -> StoreResult<Vec<DateTime<Utc>>> {
        let rows = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            r#"
            SELECT chunk, MAX(updated_at)
            FROM (
                SELECT updated_at, (ROW_NUMBER() OVER (ORDER BY id) - 1) / $1 AS chunk
                FROM candidates
            ) numbered
            GROUP BY chunk
            ORDER BY chunk ASC
            "#,
        )
        .bind(chunk_size.max(1))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(_, lastmod)| lastmod).collect())
    }
}

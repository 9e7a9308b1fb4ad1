//! In-memory candidate store
//!
//! Mirrors the Postgres store's semantics (slug uniqueness, mutable-only
//! updates, column limits, per-row rejection) without a database. Every read
//! operation bumps a counter so tests can assert that a cached path never
//! touched the store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use voterspheres_common::slug::{with_suffix, MAX_COLLISION_SUFFIX};
use voterspheres_common::CandidateInput;

use super::{
    provenance_conflicts, BatchOutcome, CandidateStore, CollisionPolicy, RowSkip, StoreResult,
};
use crate::models::{Candidate, FilterField, NewCandidate, SearchFilters, SitemapEntry, SlugRef};

#[derive(Default)]
struct Inner {
    rows: BTreeMap<i64, Candidate>,
    by_slug: HashMap<String, i64>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryCandidateStore {
    inner: RwLock<Inner>,
    reads: AtomicUsize,
}

impl MemoryCandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of read operations served so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset_read_count(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }

    fn note_read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

impl Inner {
    fn resolve_slug(&self, record: &NewCandidate, policy: CollisionPolicy) -> Result<String, String> {
        if policy == CollisionPolicy::Merge {
            return Ok(record.slug.clone());
        }

        if let Some(source_id) = record.input.source_id.as_deref() {
            let owned = self.rows.values().find(|row| {
                row.source == record.input.source && row.source_id.as_deref() == Some(source_id)
            });
            if let Some(row) = owned {
                return Ok(row.slug.clone());
            }
        }

        for n in 1..=MAX_COLLISION_SUFFIX {
            let candidate = if n == 1 {
                record.slug.clone()
            } else {
                with_suffix(&record.slug, n)
            };
            let existing = self
                .by_slug
                .get(&candidate)
                .and_then(|id| self.rows.get(id));
            match existing {
                None => return Ok(candidate),
                Some(row)
                    if !provenance_conflicts(&row.source, row.source_id.as_deref(), record) =>
                {
                    return Ok(candidate)
                }
                Some(_) => continue,
            }
        }

        Err(format!(
            "no free slug for '{}' up to suffix -{}",
            record.slug, MAX_COLLISION_SUFFIX
        ))
    }

    /// Returns `true` when a new row was inserted
    fn apply(&mut self, slug: String, input: &CandidateInput, now: DateTime<Utc>) -> bool {
        if let Some(id) = self.by_slug.get(&slug).copied() {
            if let Some(row) = self.rows.get_mut(&id) {
                row.website = input.website.clone().or(row.website.take());
                row.email = input.email.clone().or(row.email.take());
                row.phone = input.phone.clone().or(row.phone.take());
                row.image_url = input.image_url.clone().or(row.image_url.take());
                if row.source_id.is_none() {
                    row.source_id = input.source_id.clone();
                }
                row.updated_at = now;
                return false;
            }
        }

        self.next_id += 1;
        let id = self.next_id;
        self.by_slug.insert(slug.clone(), id);
        self.rows.insert(
            id,
            Candidate {
                id,
                slug,
                name: input.name.clone(),
                office: input.office.clone(),
                state: input.state.clone(),
                county: input.county.clone(),
                district: input.district.clone(),
                party: input.party.clone(),
                election_year: input.election_year,
                website: input.website.clone(),
                email: input.email.clone(),
                phone: input.phone.clone(),
                image_url: input.image_url.clone(),
                source: input.source.clone(),
                source_id: input.source_id.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        true
    }
}

fn matches(row: &Candidate, filters: &SearchFilters) -> bool {
    let eq = |wanted: &Option<String>, actual: Option<&str>| match wanted {
        Some(w) => actual.is_some_and(|a| a.to_lowercase() == w.to_lowercase()),
        None => true,
    };

    let name_matches = match &filters.q {
        Some(q) => row.name.to_lowercase().contains(&q.to_lowercase()),
        None => true,
    };

    name_matches
        && eq(&filters.state, Some(row.state.as_str()))
        && eq(&filters.county, row.county.as_deref())
        && eq(&filters.office, Some(row.office.as_str()))
        && eq(&filters.party, row.party.as_deref())
}

fn to_usize(value: i64) -> usize {
    usize::try_from(value.max(0)).unwrap_or(usize::MAX)
}

#[async_trait]
impl CandidateStore for MemoryCandidateStore {
    async fn upsert_batch(
        &self,
        batch: &[NewCandidate],
        policy: CollisionPolicy,
    ) -> StoreResult<BatchOutcome> {
        let mut inner = self.inner.write().await;
        let mut outcome = BatchOutcome::default();
        let now = Utc::now();

        for record in batch {
            let resolved = record
                .check_column_limits()
                .and_then(|_| inner.resolve_slug(record, policy));

            match resolved {
                Ok(slug) => {
                    if inner.apply(slug.clone(), &record.input, now) {
                        outcome.inserted += 1;
                    } else {
                        outcome.updated += 1;
                        outcome.updated_slugs.push(slug);
                    }
                }
                Err(reason) => outcome.skipped.push(RowSkip {
                    reference: record.input.reference(),
                    reason,
                }),
            }
        }

        Ok(outcome)
    }

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Candidate>> {
        self.note_read();
        let inner = self.inner.read().await;
        Ok(inner
            .by_slug
            .get(slug)
            .and_then(|id| inner.rows.get(id))
            .cloned())
    }

    async fn search(
        &self,
        filters: &SearchFilters,
        offset: i64,
        limit: i64,
    ) -> StoreResult<(Vec<Candidate>, i64)> {
        self.note_read();
        let inner = self.inner.read().await;

        let mut hits: Vec<&Candidate> = inner
            .rows
            .values()
            .filter(|row| matches(row, filters))
            .collect();
        hits.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        let total = hits.len() as i64;
        let page = hits
            .into_iter()
            .skip(to_usize(offset))
            .take(to_usize(limit))
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn count(&self) -> StoreResult<i64> {
        self.note_read();
        Ok(self.inner.read().await.rows.len() as i64)
    }

    async fn sitemap_page(&self, offset: i64, limit: i64) -> StoreResult<Vec<SitemapEntry>> {
        self.note_read();
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .values()
            .skip(to_usize(offset))
            .take(to_usize(limit))
            .map(|row| SitemapEntry {
                slug: row.slug.clone(),
                updated_at: row.updated_at,
            })
            .collect())
    }

    async fn slugs_after(&self, after_id: i64, limit: i64) -> StoreResult<Vec<SlugRef>> {
        self.note_read();
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .range(after_id.saturating_add(1)..)
            .take(to_usize(limit))
            .map(|(id, row)| SlugRef {
                id: *id,
                slug: row.slug.clone(),
            })
            .collect())
    }

    async fn distinct_values(&self, field: FilterField) -> StoreResult<Vec<String>> {
        self.note_read();
        let inner = self.inner.read().await;
        let values: BTreeSet<String> = inner
            .rows
            .values()
            .filter_map(|row| field.value_of(row))
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string)
            .collect();
        Ok(values.into_iter().collect())
    }

    async fn chunk_lastmods(&self, chunk_size: i64) -> StoreResult<Vec<DateTime<Utc>>> {
        self.note_read();
        let inner = self.inner.read().await;
        let stamps: Vec<DateTime<Utc>> = inner.rows.values().map(|row| row.updated_at).collect();
        Ok(stamps
            .chunks(to_usize(chunk_size).max(1))
            .filter_map(|chunk| chunk.iter().max().copied())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, source_id: Option<&str>) -> NewCandidate {
        let input = CandidateInput {
            name: name.into(),
            office: "Mayor".into(),
            state: "TX".into(),
            source: "api".into(),
            source_id: source_id.map(str::to_string),
            ..Default::default()
        };
        NewCandidate {
            slug: input.slug(false),
            input,
        }
    }

    #[tokio::test]
    async fn test_merge_updates_mutable_fields_only() {
        let store = MemoryCandidateStore::new();
        let first = record("Ann Lee", Some("A1"));
        store.upsert_batch(&[first.clone()], CollisionPolicy::Merge).await.unwrap();
        let before = store.find_by_slug(&first.slug).await.unwrap().unwrap();

        let mut second = first.clone();
        second.input.website = Some("https://annlee.example".into());
        second.input.party = Some("Independent".into());
        let outcome = store
            .upsert_batch(&[second], CollisionPolicy::Merge)
            .await
            .unwrap();
        assert_eq!((outcome.inserted, outcome.updated), (0, 1));
        assert_eq!(outcome.updated_slugs, vec![first.slug.clone()]);

        let after = store.find_by_slug(&first.slug).await.unwrap().unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.website.as_deref(), Some("https://annlee.example"));
        assert_eq!(after.party, None);
    }

    #[tokio::test]
    async fn test_disambiguate_assigns_suffix_and_stays_idempotent() {
        let store = MemoryCandidateStore::new();
        let policy = CollisionPolicy::Disambiguate;

        store.upsert_batch(&[record("Ann Lee", Some("A1"))], policy).await.unwrap();
        store.upsert_batch(&[record("Ann Lee", Some("B2"))], policy).await.unwrap();
        store.upsert_batch(&[record("Ann Lee", Some("B2"))], policy).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let suffixed = store.find_by_slug("ann-lee-tx-mayor-2").await.unwrap().unwrap();
        assert_eq!(suffixed.source_id.as_deref(), Some("B2"));
    }

    #[tokio::test]
    async fn test_rejected_row_does_not_block_batch() {
        let store = MemoryCandidateStore::new();
        let mut too_long = record("Bob Roe", None);
        too_long.input.office = "x".repeat(crate::models::MAX_OFFICE_LEN + 1);

        let outcome = store
            .upsert_batch(
                &[record("Ann Lee", None), too_long, record("Cy Young", None)],
                CollisionPolicy::Merge,
            )
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.skipped.len(), 1);
        assert!(outcome.skipped[0].reason.contains("office"));
    }

    #[tokio::test]
    async fn test_filters_ignore_case() {
        let store = MemoryCandidateStore::new();
        let mut ann = record("Ann Lee", None);
        ann.input.office = "Governor".into();
        ann.input.county = Some("Travis".into());
        ann.input.party = Some("Independent".into());
        ann.slug = ann.input.slug(false);
        store
            .upsert_batch(&[ann, record("Bob Roe", None)], CollisionPolicy::Merge)
            .await
            .unwrap();

        let filters = SearchFilters {
            office: Some("governor".into()),
            county: Some("TRAVIS".into()),
            party: Some("independent".into()),
            ..Default::default()
        };
        let (hits, total) = store.search(&filters, 0, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(hits[0].name, "Ann Lee");

        let filters = SearchFilters {
            party: Some("democratic".into()),
            ..Default::default()
        };
        assert_eq!(store.search(&filters, 0, 10).await.unwrap().1, 0);
    }

    #[tokio::test]
    async fn test_distinct_values_are_sorted_and_skip_missing() {
        let store = MemoryCandidateStore::new();
        let mut batch = vec![record("Ann Lee", None), record("Bob Roe", None)];
        batch[0].input.party = Some("Republican".into());
        let mut cy = record("Cy Young", None);
        cy.input.state = "AK".into();
        cy.input.office = "Governor".into();
        cy.input.party = Some("Democratic".into());
        cy.slug = cy.input.slug(false);
        batch.push(cy);
        store.upsert_batch(&batch, CollisionPolicy::Merge).await.unwrap();

        assert_eq!(store.distinct_values(FilterField::State).await.unwrap(), vec!["AK", "TX"]);
        assert_eq!(
            store.distinct_values(FilterField::Office).await.unwrap(),
            vec!["Governor", "Mayor"]
        );
        assert_eq!(
            store.distinct_values(FilterField::Party).await.unwrap(),
            vec!["Democratic", "Republican"]
        );
    }

    #[tokio::test]
    async fn test_chunk_lastmods_track_latest_update() {
        let store = MemoryCandidateStore::new();
        let batch: Vec<_> = (0..5).map(|i| record(&format!("Person {}", i), None)).collect();
        store.upsert_batch(&batch, CollisionPolicy::Merge).await.unwrap();

        let mut refreshed = batch[3].clone();
        refreshed.input.phone = Some("555-0100".into());
        store.upsert_batch(&[refreshed], CollisionPolicy::Merge).await.unwrap();
        let touched = store.find_by_slug(&batch[3].slug).await.unwrap().unwrap();

        let lastmods = store.chunk_lastmods(2).await.unwrap();
        assert_eq!(lastmods.len(), 3);
        assert_eq!(lastmods[1], touched.updated_at);
        assert!(lastmods[0] <= lastmods[1]);
    }

    #[tokio::test]
    async fn test_keyset_walk_and_counter() {
        let store = MemoryCandidateStore::new();
        let batch: Vec<_> = (0..5).map(|i| record(&format!("Person {}", i), None)).collect();
        store.upsert_batch(&batch, CollisionPolicy::Merge).await.unwrap();
        store.reset_read_count();

        let first = store.slugs_after(0, 3).await.unwrap();
        let rest = store.slugs_after(first[2].id, 3).await.unwrap();

        assert_eq!(first.len() + rest.len(), 5);
        assert_eq!(store.read_count(), 2);
    }
}

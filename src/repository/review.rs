//! Review repository: ingestion upserts, the claim scheduler, and the
//! analysis status state machine.
//!
//! Claiming is a single UPDATE statement keyed by a per-call token, so two
//! concurrent callers can never be handed the same review. The
//! completed-status transition and the analysis insert commit in one
//! transaction; a completed review without an analysis row cannot be
//! produced.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::models::{Analysis, AnalysisStatus, Platform, Review};
use crate::schema::{review_analyses, reviews};

use super::models::{NewReview, NewReviewAnalysis, ReviewRecord};
use super::pool::{AsyncSqlitePool, DieselError};
use super::StoreError;

/// Hard safety ceiling on one claim, bounding worst-case extraction fan-out
/// regardless of what the caller asks for.
pub const MAX_CLAIM_BATCH: usize = 50;

/// Repository for reviews and their analysis lifecycle.
#[derive(Clone)]
pub struct ReviewRepository {
    pool: AsyncSqlitePool,
}

impl ReviewRepository {
    /// Create a new review repository.
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Look up a review by its dedup key.
    pub async fn find_by_key(
        &self,
        restaurant_id: &str,
        platform: Platform,
        external_id: &str,
    ) -> Result<Option<Review>, DieselError> {
        let mut conn = self.pool.get().await?;
        let record: Option<ReviewRecord> = reviews::table
            .filter(reviews::restaurant_id.eq(restaurant_id))
            .filter(reviews::platform.eq(platform.as_str()))
            .filter(reviews::external_id.eq(external_id))
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(Review::from))
    }

    /// Get a review by id.
    pub async fn get(&self, id: &str) -> Result<Option<Review>, DieselError> {
        let mut conn = self.pool.get().await?;
        let record: Option<ReviewRecord> = reviews::table
            .find(id)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(Review::from))
    }

    /// Insert a brand-new review (status `pending`).
    ///
    /// Fails with a unique violation if the dedup key already exists; the
    /// ingestion service maps that to a duplicate count.
    pub async fn insert(&self, review: NewReview) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(reviews::table)
            .values(&review)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Refresh the mutable fields of an existing review.
    ///
    /// Platforms occasionally correct text or ratings on re-scrape; the
    /// analysis lifecycle columns are deliberately untouched.
    pub async fn update_mutable_fields(
        &self,
        id: &str,
        rating: i32,
        body: &str,
        author: Option<&str>,
        posted_at: DateTime<Utc>,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        diesel::update(reviews::table.find(id))
            .set((
                reviews::rating.eq(rating),
                reviews::body.eq(body),
                reviews::author.eq(author),
                reviews::posted_at.eq(posted_at.to_rfc3339()),
                reviews::updated_at.eq(Utc::now().to_rfc3339()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Atomically claim up to `limit` pending reviews for processing.
    ///
    /// The claim is one conditional UPDATE stamping a fresh per-call token;
    /// the returned set is exactly the rows this call transitioned to
    /// `processing`. Concurrent callers therefore always receive disjoint
    /// sets. Returns whatever is available (possibly empty) when fewer than
    /// `limit` rows are pending.
    pub async fn claim_pending(&self, limit: usize) -> Result<Vec<String>, DieselError> {
        let limit = limit.min(MAX_CLAIM_BATCH);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let token = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let mut conn = self.pool.get().await?;

        // Single statement: SQLite executes it atomically, so the inner
        // SELECT and the status flip cannot interleave with another claim.
        diesel::sql_query(
            "UPDATE reviews SET analysis_status = 'processing', claim_token = ?, claimed_at = ? \
             WHERE analysis_status = 'pending' AND id IN ( \
                 SELECT id FROM reviews WHERE analysis_status = 'pending' \
                 ORDER BY ingested_at ASC, id ASC LIMIT ? \
             )",
        )
        .bind::<Text, _>(&token)
        .bind::<Text, _>(&now)
        .bind::<BigInt, _>(limit as i64)
        .execute(&mut conn)
        .await?;

        let ids: Vec<String> = reviews::table
            .filter(reviews::claim_token.eq(&token))
            .filter(reviews::analysis_status.eq(AnalysisStatus::Processing.as_str()))
            .order(reviews::ingested_at.asc())
            .select(reviews::id)
            .load(&mut conn)
            .await?;

        Ok(ids)
    }

    /// Finalize a successfully-analyzed review: insert the analysis row and
    /// transition `processing -> completed` in one transaction.
    ///
    /// If the review is not currently `processing` (e.g. the recovery sweep
    /// reclaimed it), the whole transaction rolls back and
    /// `InvalidStateTransition` is returned.
    pub async fn complete_with_analysis(&self, analysis: &Analysis) -> Result<(), StoreError> {
        let record = NewReviewAnalysis::from_analysis(analysis);
        let review_id = analysis.review_id.clone();
        let mut conn = self.pool.get().await?;

        let result = conn
            .transaction::<_, DieselError, _>(|conn| {
                let record = record;
                let review_id = review_id.clone();
                Box::pin(async move {
                    // Flip the status first: if the review is no longer
                    // processing nothing has been written yet, and the
                    // rollback is a no-op.
                    let updated = diesel::update(
                        reviews::table
                            .filter(reviews::id.eq(&review_id))
                            .filter(
                                reviews::analysis_status
                                    .eq(AnalysisStatus::Processing.as_str()),
                            ),
                    )
                    .set((
                        reviews::analysis_status.eq(AnalysisStatus::Completed.as_str()),
                        reviews::claim_token.eq(None::<String>),
                        reviews::claimed_at.eq(None::<String>),
                        reviews::failure_reason.eq(None::<String>),
                    ))
                    .execute(conn)
                    .await?;

                    if updated == 0 {
                        return Err(DieselError::RollbackTransaction);
                    }

                    diesel::insert_into(review_analyses::table)
                        .values(&record)
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(DieselError::RollbackTransaction) => {
                Err(self
                    .transition_error(&analysis.review_id, AnalysisStatus::Completed)
                    .await)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Transition a review `processing -> failed`, recording the cause for
    /// operator visibility.
    pub async fn mark_failed(&self, review_id: &str, reason: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let updated = diesel::update(
            reviews::table
                .filter(reviews::id.eq(review_id))
                .filter(reviews::analysis_status.eq(AnalysisStatus::Processing.as_str())),
        )
        .set((
            reviews::analysis_status.eq(AnalysisStatus::Failed.as_str()),
            reviews::failure_reason.eq(Some(reason)),
            reviews::claim_token.eq(None::<String>),
            reviews::claimed_at.eq(None::<String>),
        ))
        .execute(&mut conn)
        .await?;

        if updated == 0 {
            return Err(self.transition_error(review_id, AnalysisStatus::Failed).await);
        }
        Ok(())
    }

    /// Operator retry: reset failed reviews back to `pending`, optionally
    /// scoped to one restaurant. Returns the number of reviews reset.
    pub async fn reset_to_pending(
        &self,
        restaurant_id: Option<&str>,
    ) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().await?;

        let reset_columns = (
            reviews::analysis_status.eq(AnalysisStatus::Pending.as_str()),
            reviews::failure_reason.eq(None::<String>),
            reviews::claim_token.eq(None::<String>),
            reviews::claimed_at.eq(None::<String>),
        );

        let reset = match restaurant_id {
            Some(rid) => {
                diesel::update(
                    reviews::table
                        .filter(reviews::analysis_status.eq(AnalysisStatus::Failed.as_str()))
                        .filter(reviews::restaurant_id.eq(rid)),
                )
                .set(reset_columns)
                .execute(&mut conn)
                .await?
            }
            None => {
                diesel::update(
                    reviews::table
                        .filter(reviews::analysis_status.eq(AnalysisStatus::Failed.as_str())),
                )
                .set(reset_columns)
                .execute(&mut conn)
                .await?
            }
        };
        Ok(reset)
    }

    /// Recovery sweep: revert reviews stuck in `processing` longer than
    /// `stuck_after` back to `pending` so they become claimable again.
    ///
    /// Guards against a worker crashing after claiming but before
    /// finalizing. Returns the number of reviews released.
    pub async fn release_stuck(&self, stuck_after: Duration) -> Result<usize, DieselError> {
        let cutoff = (Utc::now()
            - chrono::Duration::from_std(stuck_after).unwrap_or(chrono::Duration::zero()))
        .to_rfc3339();
        let mut conn = self.pool.get().await?;

        let released = diesel::update(
            reviews::table
                .filter(reviews::analysis_status.eq(AnalysisStatus::Processing.as_str()))
                .filter(reviews::claimed_at.lt(cutoff)),
        )
        .set((
            reviews::analysis_status.eq(AnalysisStatus::Pending.as_str()),
            reviews::claim_token.eq(None::<String>),
            reviews::claimed_at.eq(None::<String>),
        ))
        .execute(&mut conn)
        .await?;
        Ok(released)
    }

    /// Count reviews currently `pending`.
    pub async fn pending_count(&self) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;
        let count: i64 = reviews::table
            .filter(reviews::analysis_status.eq(AnalysisStatus::Pending.as_str()))
            .count()
            .first(&mut conn)
            .await?;
        Ok(count as u64)
    }

    /// Per-status review counts for pipeline health reporting.
    pub async fn status_counts(&self) -> Result<HashMap<AnalysisStatus, u64>, DieselError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<(String, i64)> = reviews::table
            .group_by(reviews::analysis_status)
            .select((reviews::analysis_status, diesel::dsl::count_star()))
            .load(&mut conn)
            .await?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            if let Some(status) = AnalysisStatus::from_str(&status) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }

    /// Load several reviews by id (claimed batches).
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<Review>, DieselError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get().await?;
        let records: Vec<ReviewRecord> = reviews::table
            .filter(reviews::id.eq_any(ids))
            .load(&mut conn)
            .await?;
        Ok(records.into_iter().map(Review::from).collect())
    }

    /// Load all reviews for a restaurant posted within `[start, end)`.
    ///
    /// Read-only; used by the aggregation engine.
    pub async fn load_window(
        &self,
        restaurant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Review>, DieselError> {
        let mut conn = self.pool.get().await?;
        let records: Vec<ReviewRecord> = reviews::table
            .filter(reviews::restaurant_id.eq(restaurant_id))
            .filter(reviews::posted_at.ge(start.to_rfc3339()))
            .filter(reviews::posted_at.lt(end.to_rfc3339()))
            .order(reviews::posted_at.asc())
            .load(&mut conn)
            .await?;
        Ok(records.into_iter().map(Review::from).collect())
    }

    /// Build the `InvalidStateTransition` error for a refused transition by
    /// reading the review's current status.
    async fn transition_error(&self, review_id: &str, to: AnalysisStatus) -> StoreError {
        match self.get(review_id).await {
            Ok(Some(review)) => StoreError::InvalidStateTransition {
                review_id: review_id.to_string(),
                from: review.analysis_status,
                to,
            },
            Ok(None) => StoreError::ReviewNotFound {
                review_id: review_id.to_string(),
            },
            Err(e) => StoreError::Db(e),
        }
    }
}

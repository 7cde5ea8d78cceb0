//! Analysis repository: read access to extracted review intelligence.
//!
//! Writes happen only through `ReviewRepository::complete_with_analysis`,
//! which ties the insert to the status transition.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::models::Analysis;
use crate::schema::{review_analyses, reviews};

use super::models::ReviewAnalysisRecord;
use super::pool::{AsyncSqlitePool, DieselError};

/// Repository for review analyses.
#[derive(Clone)]
pub struct AnalysisRepository {
    pool: AsyncSqlitePool,
}

impl AnalysisRepository {
    /// Create a new analysis repository.
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Get the analysis for one review, if it exists.
    pub async fn get_for_review(&self, review_id: &str) -> Result<Option<Analysis>, DieselError> {
        let mut conn = self.pool.get().await?;
        let record: Option<ReviewAnalysisRecord> = review_analyses::table
            .find(review_id)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(Analysis::from))
    }

    /// Count all analyses.
    pub async fn count(&self) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;
        let count: i64 = review_analyses::table.count().first(&mut conn).await?;
        Ok(count as u64)
    }

    /// Load analyses for a restaurant whose reviews were posted within
    /// `[start, end)`.
    ///
    /// Read-only; feeds the aggregation engine's category, staff, and item
    /// rollups.
    pub async fn load_window(
        &self,
        restaurant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Analysis>, DieselError> {
        let mut conn = self.pool.get().await?;
        let records: Vec<ReviewAnalysisRecord> = review_analyses::table
            .inner_join(reviews::table)
            .filter(reviews::restaurant_id.eq(restaurant_id))
            .filter(reviews::posted_at.ge(start.to_rfc3339()))
            .filter(reviews::posted_at.lt(end.to_rfc3339()))
            .select(ReviewAnalysisRecord::as_select())
            .load(&mut conn)
            .await?;
        Ok(records.into_iter().map(Analysis::from).collect())
    }
}

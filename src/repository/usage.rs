//! AI usage counters for billing and quota tracking.
//!
//! Callers treat increments as fire-and-forget: the extraction worker wraps
//! them in a best-effort boundary so a counter failure can never fail an
//! analysis.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::schema::ai_usage;

use super::models::{AiUsageRecord, NewAiUsage};
use super::pool::{AsyncSqlitePool, DieselError};

/// Repository for monthly AI usage counters.
#[derive(Clone)]
pub struct UsageRepository {
    pool: AsyncSqlitePool,
}

impl UsageRepository {
    /// Create a new usage repository.
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Current counter month key (UTC).
    pub fn current_month() -> String {
        Utc::now().format("%Y-%m").to_string()
    }

    /// Increment the call counter for a month by one.
    pub async fn increment(&self, month: &str) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(ai_usage::table)
            .values(NewAiUsage::first_call(month))
            .on_conflict(ai_usage::month)
            .do_update()
            .set((
                ai_usage::calls.eq(ai_usage::calls + 1),
                ai_usage::updated_at.eq(Utc::now().to_rfc3339()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Read the call count for a month (0 if absent).
    pub async fn calls_for_month(&self, month: &str) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;
        let record: Option<AiUsageRecord> = ai_usage::table
            .find(month)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(|r| r.calls as u64).unwrap_or(0))
    }
}

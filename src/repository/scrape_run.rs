//! Scrape run repository: audit trail of ingestion batches.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::models::ScrapeRun;
use crate::schema::scrape_runs;

use super::models::{NewScrapeRun, ScrapeRunRecord};
use super::pool::{AsyncSqlitePool, DieselError};

/// Repository for scrape run provenance rows.
#[derive(Clone)]
pub struct ScrapeRunRepository {
    pool: AsyncSqlitePool,
}

impl ScrapeRunRepository {
    /// Create a new scrape run repository.
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Record one run. Write-once per notification.
    pub async fn record(&self, run: &ScrapeRun) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(scrape_runs::table)
            .values(NewScrapeRun::from_run(run))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Most recent runs for a restaurant, newest first.
    pub async fn recent_for_restaurant(
        &self,
        restaurant_id: &str,
        limit: u32,
    ) -> Result<Vec<ScrapeRun>, DieselError> {
        let mut conn = self.pool.get().await?;
        let records: Vec<ScrapeRunRecord> = scrape_runs::table
            .filter(scrape_runs::restaurant_id.eq(restaurant_id))
            .order(scrape_runs::created_at.desc())
            .limit(limit as i64)
            .load(&mut conn)
            .await?;
        Ok(records.into_iter().map(ScrapeRun::from).collect())
    }
}

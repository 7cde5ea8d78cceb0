//! Database context for managing the connection pool and repository access.
//!
//! Provides a unified entry point for database operations. Create one
//! context per command or service, then use it to access all repositories.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;

use super::analysis::AnalysisRepository;
use super::pool::{AsyncSqlitePool, DieselError};
use super::review::ReviewRepository;
use super::scrape_run::ScrapeRunRepository;
use super::usage::UsageRepository;

/// Database context owning the connection pool.
#[derive(Clone)]
pub struct DbContext {
    pool: AsyncSqlitePool,
}

impl DbContext {
    /// Create a new database context from a file path.
    pub fn new(db_path: &Path) -> Self {
        Self {
            pool: AsyncSqlitePool::from_path(db_path),
        }
    }

    /// Create a new database context from a database URL
    /// (`sqlite:path/to/db.sqlite` or a bare file path).
    pub fn from_url(database_url: &str) -> Self {
        Self {
            pool: AsyncSqlitePool::new(database_url),
        }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &AsyncSqlitePool {
        &self.pool
    }

    /// Get a review repository.
    pub fn reviews(&self) -> ReviewRepository {
        ReviewRepository::new(self.pool.clone())
    }

    /// Get an analysis repository.
    pub fn analyses(&self) -> AnalysisRepository {
        AnalysisRepository::new(self.pool.clone())
    }

    /// Get a scrape run repository.
    pub fn scrape_runs(&self) -> ScrapeRunRepository {
        ScrapeRunRepository::new(self.pool.clone())
    }

    /// Get an AI usage repository.
    pub fn usage(&self) -> UsageRepository {
        UsageRepository::new(self.pool.clone())
    }

    /// Initialize the database schema.
    ///
    /// Creates the necessary tables and indexes if they don't exist.
    pub async fn init_schema(&self) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute(
            r#"
            -- Reviews table
            CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                restaurant_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                external_id TEXT NOT NULL,
                rating INTEGER NOT NULL,
                body TEXT NOT NULL,
                author TEXT,
                posted_at TEXT NOT NULL,
                ingested_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                analysis_status TEXT NOT NULL DEFAULT 'pending',
                claim_token TEXT,
                claimed_at TEXT,
                failure_reason TEXT,
                UNIQUE(restaurant_id, platform, external_id)
            );

            CREATE INDEX IF NOT EXISTS idx_reviews_status
                ON reviews(analysis_status, ingested_at);
            CREATE INDEX IF NOT EXISTS idx_reviews_restaurant_posted
                ON reviews(restaurant_id, posted_at);
            CREATE INDEX IF NOT EXISTS idx_reviews_claim_token
                ON reviews(claim_token) WHERE claim_token IS NOT NULL;

            -- Review analyses table (1:1 with completed reviews)
            CREATE TABLE IF NOT EXISTS review_analyses (
                review_id TEXT PRIMARY KEY NOT NULL,
                overall_sentiment TEXT NOT NULL,
                emotion TEXT,
                food_sentiment REAL,
                service_sentiment REAL,
                ambience_sentiment REAL,
                value_sentiment REAL,
                strengths TEXT NOT NULL DEFAULT '[]',
                opportunities TEXT NOT NULL DEFAULT '[]',
                staff_mentions TEXT NOT NULL DEFAULT '[]',
                item_mentions TEXT NOT NULL DEFAULT '[]',
                severity_flags TEXT NOT NULL DEFAULT '[]',
                return_intent TEXT NOT NULL DEFAULT 'unknown',
                model TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (review_id) REFERENCES reviews(id)
            );

            -- Scrape runs table (audit only)
            CREATE TABLE IF NOT EXISTS scrape_runs (
                id TEXT PRIMARY KEY,
                restaurant_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                provider_run_id TEXT NOT NULL,
                dataset_handle TEXT NOT NULL,
                status TEXT NOT NULL,
                reviews_found INTEGER NOT NULL DEFAULT 0,
                reviews_new INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_scrape_runs_restaurant
                ON scrape_runs(restaurant_id, created_at);

            -- Monthly AI usage counters
            CREATE TABLE IF NOT EXISTS ai_usage (
                month TEXT PRIMARY KEY,
                calls INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .await?;
        Ok(())
    }
}

//! Persistence layer for the review pipeline.
//!
//! Repositories wrap an async SQLite pool (diesel + SyncConnectionWrapper)
//! and expose typed operations. All status mutation goes through
//! `ReviewRepository`; the scoring side only reads.

mod analysis;
mod context;
mod models;
pub mod pool;
mod review;
mod scrape_run;
mod usage;
pub mod util;

pub use analysis::AnalysisRepository;
pub use context::DbContext;
pub use models::{NewReview, ReviewRecord};
pub use pool::{AsyncSqlitePool, DieselError};
pub use review::{ReviewRepository, MAX_CLAIM_BATCH};
pub use scrape_run::ScrapeRunRepository;
pub use usage::UsageRepository;

use crate::models::AnalysisStatus;

/// Errors surfaced by status-mutating repository operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] DieselError),
    #[error("review {review_id} not found")]
    ReviewNotFound { review_id: String },
    #[error("invalid status transition for review {review_id}: {from} -> {to}")]
    InvalidStateTransition {
        review_id: String,
        from: AnalysisStatus,
        to: AnalysisStatus,
    },
}

/// Whether a diesel error is a unique-constraint violation.
///
/// Used by ingestion to treat a concurrent duplicate insert as a duplicate
/// rather than a batch failure.
pub fn is_unique_violation(err: &DieselError) -> bool {
    matches!(
        err,
        DieselError::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _)
    )
}

//! Provenance record for one ingestion batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Platform;

/// Audit row written once per scrape-completion notification.
///
/// Not consulted by pipeline logic; exists so operators can trace where a
/// batch of reviews came from and how it fared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRun {
    pub id: String,
    pub restaurant_id: String,
    pub platform: Platform,
    /// The scrape provider's run id from the notification.
    pub provider_run_id: String,
    /// Dataset handle the item list was fetched under.
    pub dataset_handle: String,
    /// Upstream terminal status as reported by the provider.
    pub status: String,
    pub reviews_found: i32,
    pub reviews_new: i32,
    pub created_at: DateTime<Utc>,
}

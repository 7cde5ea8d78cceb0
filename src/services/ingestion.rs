//! Review ingestion service.
//!
//! Handles one scrape-completion notification end to end: fetches the
//! dataset items from the provider, normalizes them per platform, and
//! idempotently upserts them into the review store. Replays of the same
//! notification are side-effect free on the analysis pipeline.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{review_id, Platform, ScrapeRun};
use crate::platforms::{normalize_item, NormalizedReview, ScrapeProviderClient};
use crate::repository::{
    is_unique_violation, NewReview, ReviewRepository, ScrapeRunRepository,
};

/// Inbound scrape-completion notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeNotification {
    /// Event name from the provider (informational).
    pub event: String,
    /// The provider's run id.
    pub run_id: String,
    /// Handle of the dataset holding the scraped items.
    pub dataset_handle: String,
    /// Terminal status of the scrape run.
    pub status: String,
    pub meta: NotificationMeta,
}

/// Idempotency-relevant notification metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMeta {
    pub restaurant_id: String,
    pub platform: Platform,
    pub tenant_id: String,
}

/// Per-item outcome counts for one ingested batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestCounts {
    pub inserted: usize,
    pub duplicate: usize,
    pub updated: usize,
    pub errors: usize,
}

/// Result of handling one notification.
#[derive(Debug)]
pub enum IngestOutcome {
    /// Upstream scrape did not succeed; nothing was ingested.
    Skipped { reason: String },
    /// Batch was processed.
    Completed(IngestCounts),
}

/// Service for ingesting scraped review batches.
pub struct IngestionService {
    reviews: ReviewRepository,
    runs: ScrapeRunRepository,
    provider: Arc<ScrapeProviderClient>,
}

impl IngestionService {
    /// Create a new ingestion service.
    pub fn new(
        reviews: ReviewRepository,
        runs: ScrapeRunRepository,
        provider: Arc<ScrapeProviderClient>,
    ) -> Self {
        Self {
            reviews,
            runs,
            provider,
        }
    }

    /// Ingest the batch a notification points at.
    pub async fn ingest(&self, notification: &ScrapeNotification) -> anyhow::Result<IngestOutcome> {
        let meta = &notification.meta;

        if !notification.status.eq_ignore_ascii_case("succeeded") {
            let reason = format!("upstream run status {}", notification.status);
            info!(
                "Skipping run {} for {}: {}",
                notification.run_id, meta.restaurant_id, reason
            );
            self.record_run(notification, 0, 0).await;
            return Ok(IngestOutcome::Skipped { reason });
        }

        let items = self.provider.fetch_items(&notification.dataset_handle).await?;
        let counts = self.ingest_items(meta, &items).await?;

        self.record_run(notification, items.len(), counts.inserted)
            .await;

        Ok(IngestOutcome::Completed(counts))
    }

    /// Normalize and upsert a fetched item list.
    pub async fn ingest_items(
        &self,
        meta: &NotificationMeta,
        items: &[serde_json::Value],
    ) -> anyhow::Result<IngestCounts> {
        info!(
            "Ingesting {} items for restaurant {} from {}",
            items.len(),
            meta.restaurant_id,
            meta.platform
        );

        let mut counts = IngestCounts::default();
        for item in items {
            match normalize_item(&meta.restaurant_id, meta.platform, item) {
                Ok(normalized) => self.upsert(normalized, &mut counts).await?,
                Err(e) => {
                    warn!(
                        "Skipping malformed {} item for {}: {}",
                        meta.platform, meta.restaurant_id, e
                    );
                    counts.errors += 1;
                }
            }
        }
        Ok(counts)
    }

    /// Upsert one normalized review.
    ///
    /// Insert when the dedup key is new; refresh mutable fields when the
    /// platform corrected them; otherwise count a duplicate. The analysis
    /// lifecycle columns are never written here.
    async fn upsert(
        &self,
        normalized: NormalizedReview,
        counts: &mut IngestCounts,
    ) -> anyhow::Result<()> {
        let existing = self
            .reviews
            .find_by_key(
                &normalized.restaurant_id,
                normalized.platform,
                &normalized.external_id,
            )
            .await?;

        match existing {
            None => {
                let now = Utc::now().to_rfc3339();
                let new = NewReview {
                    id: review_id(
                        &normalized.restaurant_id,
                        normalized.platform,
                        &normalized.external_id,
                    ),
                    restaurant_id: normalized.restaurant_id,
                    platform: normalized.platform.as_str().to_string(),
                    external_id: normalized.external_id,
                    rating: normalized.rating,
                    body: normalized.body,
                    author: normalized.author,
                    posted_at: normalized.posted_at.to_rfc3339(),
                    ingested_at: now.clone(),
                    updated_at: now,
                    analysis_status: "pending".to_string(),
                };
                match self.reviews.insert(new).await {
                    Ok(()) => counts.inserted += 1,
                    // A concurrent replay of the same webhook raced us to
                    // the insert; the row exists, so this item is a dup.
                    Err(e) if is_unique_violation(&e) => counts.duplicate += 1,
                    Err(e) => return Err(e.into()),
                }
            }
            Some(existing) => {
                let changed = existing.rating != normalized.rating
                    || existing.body != normalized.body
                    || existing.author != normalized.author
                    || existing.posted_at != normalized.posted_at;
                if changed {
                    self.reviews
                        .update_mutable_fields(
                            &existing.id,
                            normalized.rating,
                            &normalized.body,
                            normalized.author.as_deref(),
                            normalized.posted_at,
                        )
                        .await?;
                    counts.updated += 1;
                } else {
                    counts.duplicate += 1;
                }
            }
        }
        Ok(())
    }

    /// Write the audit row for a notification. Best-effort: an audit
    /// failure must not fail the ingest that already happened.
    async fn record_run(&self, notification: &ScrapeNotification, found: usize, new: usize) {
        let run = ScrapeRun {
            id: Uuid::new_v4().to_string(),
            restaurant_id: notification.meta.restaurant_id.clone(),
            platform: notification.meta.platform,
            provider_run_id: notification.run_id.clone(),
            dataset_handle: notification.dataset_handle.clone(),
            status: notification.status.clone(),
            reviews_found: found as i32,
            reviews_new: new as i32,
            created_at: Utc::now(),
        };
        if let Err(e) = self.runs.record(&run).await {
            warn!("Failed to record scrape run {}: {}", run.id, e);
        }
    }
}

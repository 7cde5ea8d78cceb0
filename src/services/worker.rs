//! Extraction worker.
//!
//! Processes a claimed batch of reviews against the extraction service and
//! finalizes each review independently: a successful extraction commits the
//! analysis row together with the `completed` transition; any failure marks
//! that review `failed` with its cause and moves on to the next. One
//! review's failure never aborts its siblings.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::extraction::Extractor;
use crate::models::AnalysisStatus;
use crate::repository::{ReviewRepository, StoreError, UsageRepository};

/// Events emitted while processing a batch.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum WorkerEvent {
    /// Batch processing started
    Started { total: usize },
    /// One review completed with an analysis
    ReviewCompleted { review_id: String },
    /// One review failed extraction
    ReviewFailed { review_id: String, error: String },
    /// Batch finished
    Finished { succeeded: usize, failed: usize },
}

/// Final state of one review in a processed batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub review_id: String,
    pub status: AnalysisStatus,
    pub error: Option<String>,
}

/// Result of processing one claimed batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessOutcome {
    pub total: usize,
    #[serde(rename = "success")]
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ReviewOutcome>,
}

/// Worker that runs claimed reviews through the extraction service.
pub struct ExtractionWorker {
    reviews: ReviewRepository,
    usage: UsageRepository,
    extractor: Arc<dyn Extractor>,
}

impl ExtractionWorker {
    /// Create a new extraction worker.
    pub fn new(
        reviews: ReviewRepository,
        usage: UsageRepository,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            reviews,
            usage,
            extractor,
        }
    }

    /// Claim up to `limit` pending reviews and process them.
    pub async fn claim_and_process(
        &self,
        limit: usize,
        event_tx: Option<&mpsc::Sender<WorkerEvent>>,
    ) -> anyhow::Result<ProcessOutcome> {
        let ids = self.reviews.claim_pending(limit).await?;
        self.process(&ids, event_tx).await
    }

    /// Process an already-claimed batch of review ids.
    pub async fn process(
        &self,
        review_ids: &[String],
        event_tx: Option<&mpsc::Sender<WorkerEvent>>,
    ) -> anyhow::Result<ProcessOutcome> {
        let mut outcome = ProcessOutcome {
            total: review_ids.len(),
            ..Default::default()
        };

        if let Some(tx) = event_tx {
            let _ = tx
                .send(WorkerEvent::Started {
                    total: review_ids.len(),
                })
                .await;
        }

        let batch = self.reviews.get_many(review_ids).await?;

        for review in &batch {
            match self.extractor.extract(review).await {
                Ok(payload) => {
                    let analysis = payload.into_analysis(
                        review.id.clone(),
                        Some(self.extractor.model().to_string()),
                    );
                    match self.reviews.complete_with_analysis(&analysis).await {
                        Ok(()) => {
                            debug!("Review {} completed", review.id);
                            outcome.succeeded += 1;
                            outcome.results.push(ReviewOutcome {
                                review_id: review.id.clone(),
                                status: AnalysisStatus::Completed,
                                error: None,
                            });
                            self.count_usage().await;
                            if let Some(tx) = event_tx {
                                let _ = tx
                                    .send(WorkerEvent::ReviewCompleted {
                                        review_id: review.id.clone(),
                                    })
                                    .await;
                            }
                        }
                        // The sweep (or an operator) took the review away
                        // between claim and completion; its analysis rolled
                        // back with the transaction.
                        Err(StoreError::InvalidStateTransition { from, .. }) => {
                            warn!(
                                "Review {} no longer processing (now {}); dropping result",
                                review.id, from
                            );
                            self.record_failure(
                                &mut outcome,
                                event_tx,
                                &review.id,
                                &format!("lost claim while finalizing (status {})", from),
                            )
                            .await;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => {
                    let cause = format!("{}: {}", e.cause_tag(), e);
                    match self.reviews.mark_failed(&review.id, &cause).await {
                        Ok(()) => {}
                        Err(StoreError::InvalidStateTransition { from, .. }) => {
                            warn!(
                                "Review {} no longer processing (now {}); failure not recorded",
                                review.id, from
                            );
                        }
                        Err(err) => return Err(err.into()),
                    }
                    self.record_failure(&mut outcome, event_tx, &review.id, &cause)
                        .await;
                }
            }
        }

        if let Some(tx) = event_tx {
            let _ = tx
                .send(WorkerEvent::Finished {
                    succeeded: outcome.succeeded,
                    failed: outcome.failed,
                })
                .await;
        }

        Ok(outcome)
    }

    async fn record_failure(
        &self,
        outcome: &mut ProcessOutcome,
        event_tx: Option<&mpsc::Sender<WorkerEvent>>,
        review_id: &str,
        cause: &str,
    ) {
        outcome.failed += 1;
        outcome.results.push(ReviewOutcome {
            review_id: review_id.to_string(),
            status: AnalysisStatus::Failed,
            error: Some(cause.to_string()),
        });
        if let Some(tx) = event_tx {
            let _ = tx
                .send(WorkerEvent::ReviewFailed {
                    review_id: review_id.to_string(),
                    error: cause.to_string(),
                })
                .await;
        }
    }

    /// Best-effort usage accounting. A counter failure is logged and
    /// swallowed; it must never fail the analysis outcome.
    async fn count_usage(&self) {
        let month = UsageRepository::current_month();
        if let Err(e) = self.usage.increment(&month).await {
            warn!("Failed to update AI usage counter for {}: {}", month, e);
        }
    }
}

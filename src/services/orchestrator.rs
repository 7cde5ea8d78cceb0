//! Batch orchestrator.
//!
//! Drives the extraction worker in rounds of concurrent calls until the
//! review store reports no pending reviews, or the circuit breaker trips
//! after too many consecutive all-error rounds. The orchestrator holds no
//! durable state of its own; correctness lives in the claim scheduler.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::PipelineSettings;
use crate::repository::ReviewRepository;

use super::worker::ExtractionWorker;

/// Events emitted while an orchestration run progresses.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum OrchestratorEvent {
    /// A round of concurrent worker calls started
    RoundStarted { round: u32, pending: u64 },
    /// A round finished
    RoundFinished {
        round: u32,
        succeeded: usize,
        failed: usize,
        calls_errored: usize,
    },
    /// The recovery sweep released stuck reviews
    SweepReleased { count: usize },
    /// The circuit breaker halted the run
    BreakerTripped { consecutive: u32 },
    /// The run finished
    Finished { succeeded: usize, failed: usize },
}

/// Summary of one orchestration run.
#[derive(Debug, Clone)]
pub struct OrchestratorSummary {
    pub rounds: u32,
    pub succeeded: usize,
    pub failed: usize,
    /// True when the run halted on the circuit breaker instead of draining
    /// the pending pool.
    pub halted_by_breaker: bool,
}

/// Orchestrates rounds of concurrent extraction worker calls.
pub struct BatchOrchestrator {
    worker: Arc<ExtractionWorker>,
    reviews: ReviewRepository,
    settings: PipelineSettings,
}

impl BatchOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        worker: Arc<ExtractionWorker>,
        reviews: ReviewRepository,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            worker,
            reviews,
            settings,
        }
    }

    /// Run rounds until the pending pool drains or the breaker trips.
    pub async fn run(
        &self,
        event_tx: Option<mpsc::Sender<OrchestratorEvent>>,
    ) -> anyhow::Result<OrchestratorSummary> {
        let concurrency = self.settings.concurrency.max(1);
        let refresh_every = self.settings.refresh_every.max(1);

        let mut summary = OrchestratorSummary {
            rounds: 0,
            succeeded: 0,
            failed: 0,
            halted_by_breaker: false,
        };
        let mut consecutive_failures = 0u32;
        let mut pending = self.reviews.pending_count().await?;

        info!("Starting orchestration with {} pending reviews", pending);

        while pending > 0 {
            summary.rounds += 1;
            let round = summary.rounds;

            if let Some(ref tx) = event_tx {
                let _ = tx
                    .send(OrchestratorEvent::RoundStarted { round, pending })
                    .await;
            }

            // Fan out C concurrent worker calls and join them; the round is
            // scored only once every call has completed or timed out.
            let calls = (0..concurrency).map(|_| {
                let worker = Arc::clone(&self.worker);
                let batch_size = self.settings.batch_size;
                async move { worker.claim_and_process(batch_size, None).await }
            });
            let results = join_all(calls).await;

            let mut round_succeeded = 0;
            let mut round_failed = 0;
            let mut calls_errored = 0;
            let mut claimed_any = false;
            for result in results {
                match result {
                    Ok(outcome) => {
                        claimed_any |= outcome.total > 0;
                        round_succeeded += outcome.succeeded;
                        round_failed += outcome.failed;
                    }
                    Err(e) => {
                        warn!("Worker call errored in round {}: {}", round, e);
                        calls_errored += 1;
                    }
                }
            }
            summary.succeeded += round_succeeded;
            summary.failed += round_failed;

            if let Some(ref tx) = event_tx {
                let _ = tx
                    .send(OrchestratorEvent::RoundFinished {
                        round,
                        succeeded: round_succeeded,
                        failed: round_failed,
                        calls_errored,
                    })
                    .await;
            }

            // Only total call failure counts toward the breaker; individual
            // review failures are normal operation.
            if calls_errored == concurrency {
                consecutive_failures += 1;
                if consecutive_failures >= self.settings.max_consecutive_failures {
                    error!(
                        "Circuit breaker tripped: {} consecutive all-error rounds; halting",
                        consecutive_failures
                    );
                    if let Some(ref tx) = event_tx {
                        let _ = tx
                            .send(OrchestratorEvent::BreakerTripped {
                                consecutive: consecutive_failures,
                            })
                            .await;
                    }
                    summary.halted_by_breaker = true;
                    break;
                }
            } else {
                consecutive_failures = 0;
            }

            // Refresh the pending count periodically rather than every
            // round: a call that timed out client-side may still have
            // finalized its reviews server-side. The stuck sweep runs at
            // the same cadence.
            if round % refresh_every == 0 || !claimed_any {
                let released = self
                    .reviews
                    .release_stuck(self.settings.stuck_after())
                    .await?;
                if released > 0 {
                    info!("Recovery sweep released {} stuck reviews", released);
                    if let Some(ref tx) = event_tx {
                        let _ = tx
                            .send(OrchestratorEvent::SweepReleased { count: released })
                            .await;
                    }
                }
                pending = self.reviews.pending_count().await?;
            } else {
                pending = pending.saturating_sub((round_succeeded + round_failed) as u64);
            }

            if pending > 0 {
                tokio::time::sleep(self.settings.cooldown()).await;
            }
        }

        if let Some(ref tx) = event_tx {
            let _ = tx
                .send(OrchestratorEvent::Finished {
                    succeeded: summary.succeeded,
                    failed: summary.failed,
                })
                .await;
        }

        info!(
            "Orchestration finished: {} rounds, {} succeeded, {} failed{}",
            summary.rounds,
            summary.succeeded,
            summary.failed,
            if summary.halted_by_breaker {
                " (halted by circuit breaker)"
            } else {
                ""
            }
        );

        Ok(summary)
    }
}

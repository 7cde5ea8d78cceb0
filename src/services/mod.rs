//! Pipeline services.
//!
//! Separated from transport and UI concerns - services emit events over
//! channels for progress tracking and return plain result structs.

mod ingestion;
mod orchestrator;
mod worker;

pub use ingestion::{
    IngestCounts, IngestOutcome, IngestionService, NotificationMeta, ScrapeNotification,
};
pub use orchestrator::{BatchOrchestrator, OrchestratorEvent, OrchestratorSummary};
pub use worker::{ExtractionWorker, ProcessOutcome, ReviewOutcome, WorkerEvent};

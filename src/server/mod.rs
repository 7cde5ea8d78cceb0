//! Web server for the review pipeline.
//!
//! Hosts the ingestion webhook (shared-secret authenticated), the internal
//! pipeline endpoints the batch orchestrator calls, and the aggregation
//! read API consumed by the presentation layer.

mod auth;
mod handlers;
mod routes;

pub use routes::create_router;

use std::sync::Arc;

use tracing::info;

use crate::config::Settings;
use crate::extraction::ExtractionClient;
use crate::platforms::ScrapeProviderClient;
use crate::repository::ReviewRepository;
use crate::scoring::ScoringService;
use crate::services::{ExtractionWorker, IngestionService};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub reviews: ReviewRepository,
    pub ingestion: Arc<IngestionService>,
    pub worker: Arc<ExtractionWorker>,
    pub scoring: Arc<ScoringService>,
    /// Shared secret required on ingestion webhooks.
    pub webhook_secret: Option<String>,
}

impl AppState {
    /// Build server state from settings.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let ctx = settings.db_context();

        let provider = Arc::new(ScrapeProviderClient::new(settings.provider.clone())?);
        let ingestion = Arc::new(IngestionService::new(
            ctx.reviews(),
            ctx.scrape_runs(),
            provider,
        ));

        let extractor = Arc::new(ExtractionClient::new(settings.extractor.clone())?);
        let worker = Arc::new(ExtractionWorker::new(
            ctx.reviews(),
            ctx.usage(),
            extractor,
        ));

        let scoring = Arc::new(ScoringService::new(ctx.reviews(), ctx.analyses()));

        Ok(Self {
            reviews: ctx.reviews(),
            ingestion,
            worker,
            scoring,
            webhook_secret: settings.webhook_secret.clone(),
        })
    }
}

/// Run the web server until shutdown.
pub async fn run_server(settings: &Settings) -> anyhow::Result<()> {
    let state = AppState::from_settings(settings)?;
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Listening on {}", settings.bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}

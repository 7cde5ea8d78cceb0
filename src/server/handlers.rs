//! HTTP endpoint handlers.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::services::{IngestOutcome, ScrapeNotification};

use super::auth::{verify_secret, SECRET_HEADER};
use super::AppState;

/// Health check endpoint for container orchestration.
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Ingestion webhook: one scrape-completion notification per batch.
///
/// The shared secret is verified before any state mutation.
pub async fn scrape_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(notification): Json<ScrapeNotification>,
) -> impl IntoResponse {
    let provided = headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    if !verify_secret(state.webhook_secret.as_deref(), provided) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "ok": false, "error": "unauthorized" })),
        );
    }

    match state.ingestion.ingest(&notification).await {
        Ok(IngestOutcome::Completed(counts)) => {
            (StatusCode::OK, Json(json!({ "ok": true, "counts": counts })))
        }
        Ok(IngestOutcome::Skipped { reason }) => (
            StatusCode::OK,
            Json(json!({ "ok": true, "skipped": true, "reason": reason })),
        ),
        Err(e) => {
            error!("Ingestion failed for run {}: {}", notification.run_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
        }
    }
}

/// Parameters for one claim-and-process call.
#[derive(Debug, Deserialize)]
pub struct ProcessParams {
    pub limit: Option<usize>,
}

/// Claim and process one batch of pending reviews.
pub async fn process_batch(
    State(state): State<AppState>,
    Json(params): Json<ProcessParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(5);
    match state.worker.claim_and_process(limit, None).await {
        Ok(outcome) => (StatusCode::OK, Json(json!(outcome))),
        Err(e) => {
            error!("Batch processing failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
        }
    }
}

/// Parameters for an operator retry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryParams {
    pub restaurant_id: Option<String>,
}

/// Reset failed reviews back to pending.
pub async fn retry_failed(
    State(state): State<AppState>,
    Json(params): Json<RetryParams>,
) -> impl IntoResponse {
    match state
        .reviews
        .reset_to_pending(params.restaurant_id.as_deref())
        .await
    {
        Ok(reset) => (StatusCode::OK, Json(json!({ "ok": true, "reset": reset }))),
        Err(e) => {
            error!("Retry reset failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
        }
    }
}

/// Per-status review counts: the pipeline health indicator.
pub async fn pipeline_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.reviews.status_counts().await {
        Ok(counts) => {
            let body: serde_json::Map<String, serde_json::Value> = counts
                .into_iter()
                .map(|(status, count)| (status.as_str().to_string(), json!(count)))
                .collect();
            (StatusCode::OK, Json(json!({ "ok": true, "counts": body })))
        }
        Err(e) => {
            error!("Status query failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
        }
    }
}

/// Period query parameters (inclusive dates).
#[derive(Debug, Deserialize)]
pub struct PeriodParams {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Flavor Index snapshot for one restaurant.
pub async fn flavor_index(
    State(state): State<AppState>,
    Path(restaurant_id): Path<String>,
    Query(params): Query<PeriodParams>,
) -> impl IntoResponse {
    if params.end < params.start {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "period end before start" })),
        );
    }
    match state
        .scoring
        .compute_snapshot(&restaurant_id, params.start, params.end)
        .await
    {
        Ok(snapshot) => (StatusCode::OK, Json(json!(snapshot))),
        Err(e) => {
            error!("Snapshot computation failed for {}: {}", restaurant_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
        }
    }
}

/// Competitor comparison query parameters.
#[derive(Debug, Deserialize)]
pub struct CompareParams {
    /// Comma-separated restaurant ids.
    pub ids: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Ranked snapshots for a competitor set.
pub async fn compare(
    State(state): State<AppState>,
    Query(params): Query<CompareParams>,
) -> impl IntoResponse {
    let ids: Vec<String> = params
        .ids
        .split(',')
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "no restaurant ids" })),
        );
    }

    match state
        .scoring
        .competitor_snapshots(&ids, params.start, params.end)
        .await
    {
        Ok(ranked) => (StatusCode::OK, Json(json!({ "ok": true, "snapshots": ranked }))),
        Err(e) => {
            error!("Comparison failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
        }
    }
}

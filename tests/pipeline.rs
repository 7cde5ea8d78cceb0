//! End-to-end pipeline tests against a real SQLite database.
//!
//! Covers the correctness-critical properties: idempotent ingestion,
//! disjoint concurrent claims, completion atomicity, partial-batch
//! isolation, stuck-processing recovery, and snapshot aggregation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;

use palate::config::ProviderSettings;
use palate::extraction::{ExtractionError, ExtractionPayload, Extractor};
use palate::models::{review_id, AnalysisStatus, Platform, Review};
use palate::platforms::ScrapeProviderClient;
use palate::repository::{DbContext, NewReview, StoreError};
use palate::scoring::ScoringService;
use palate::services::{BatchOrchestrator, ExtractionWorker, IngestionService, NotificationMeta};

/// Fresh database in a temp directory.
async fn setup() -> (DbContext, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let ctx = DbContext::new(&dir.path().join("pipeline-test.sqlite"));
    ctx.init_schema().await.expect("init schema");
    (ctx, dir)
}

fn ingestion_service(ctx: &DbContext) -> IngestionService {
    let provider =
        Arc::new(ScrapeProviderClient::new(ProviderSettings::default()).expect("provider client"));
    IngestionService::new(ctx.reviews(), ctx.scrape_runs(), provider)
}

fn google_meta(restaurant_id: &str) -> NotificationMeta {
    NotificationMeta {
        restaurant_id: restaurant_id.to_string(),
        platform: Platform::Google,
        tenant_id: "tenant-1".to_string(),
    }
}

fn google_item(external_id: &str, stars: i64, text: &str, posted: &str) -> serde_json::Value {
    json!({
        "reviewId": external_id,
        "stars": stars,
        "text": text,
        "name": "A. Diner",
        "publishedAtDate": posted,
    })
}

async fn seed_review(
    ctx: &DbContext,
    restaurant_id: &str,
    external_id: &str,
    rating: i32,
    posted_at: &str,
) -> String {
    let id = review_id(restaurant_id, Platform::Google, external_id);
    let now = chrono::Utc::now().to_rfc3339();
    ctx.reviews()
        .insert(NewReview {
            id: id.clone(),
            restaurant_id: restaurant_id.to_string(),
            platform: Platform::Google.as_str().to_string(),
            external_id: external_id.to_string(),
            rating,
            body: format!("review {}", external_id),
            author: Some("A. Diner".to_string()),
            posted_at: posted_at.to_string(),
            ingested_at: now.clone(),
            updated_at: now,
            analysis_status: "pending".to_string(),
        })
        .await
        .expect("seed review");
    id
}

/// Scripted extraction backend: fails the configured review ids, returns a
/// fixed conforming payload for the rest.
struct MockExtractor {
    fail: HashSet<String>,
}

impl MockExtractor {
    fn succeeding() -> Self {
        Self {
            fail: HashSet::new(),
        }
    }

    fn failing(ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            fail: ids.into_iter().collect(),
        }
    }

    fn payload() -> ExtractionPayload {
        ExtractionPayload::from_response(
            &json!({
                "overall_sentiment": "positive",
                "emotion": "happy",
                "categories": { "food": 0.8, "service": 0.5, "ambience": null, "value": null },
                "strengths": ["flavors"],
                "opportunities": [],
                "staff_mentioned": [
                    { "name": "Marco", "role": "server", "sentiment": "positive" }
                ],
                "items_mentioned": [
                    { "name": "tasting menu", "polarity": "positive", "intensity": 4 }
                ],
                "severity_flags": [],
                "return_intent": "likely"
            })
            .to_string(),
        )
        .expect("mock payload conforms")
    }
}

#[async_trait::async_trait]
impl Extractor for MockExtractor {
    async fn extract(&self, review: &Review) -> Result<ExtractionPayload, ExtractionError> {
        if self.fail.contains(&review.id) {
            return Err(ExtractionError::Timeout);
        }
        Ok(Self::payload())
    }

    fn model(&self) -> &str {
        "mock-extractor"
    }
}

fn worker_with(ctx: &DbContext, extractor: MockExtractor) -> ExtractionWorker {
    ExtractionWorker::new(ctx.reviews(), ctx.usage(), Arc::new(extractor))
}

#[tokio::test]
async fn ingestion_is_idempotent() {
    let (ctx, _dir) = setup().await;
    let service = ingestion_service(&ctx);
    let meta = google_meta("bistro-a");

    let items = vec![
        google_item("g-1", 5, "Loved it", "2026-06-03T19:00:00+00:00"),
        google_item("g-2", 4, "Solid", "2026-06-04T19:00:00+00:00"),
        google_item("g-3", 2, "Meh", "2026-06-05T19:00:00+00:00"),
    ];

    let first = service.ingest_items(&meta, &items).await.unwrap();
    assert_eq!(first.inserted, 3);
    assert_eq!(first.duplicate, 0);
    assert_eq!(first.errors, 0);

    // Webhooks are at-least-once; the replay must not insert anything.
    let second = service.ingest_items(&meta, &items).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicate, 3);
    assert_eq!(second.updated, 0);

    let counts = ctx.reviews().status_counts().await.unwrap();
    assert_eq!(counts.get(&AnalysisStatus::Pending), Some(&3));
}

#[tokio::test]
async fn malformed_items_are_skipped_not_fatal() {
    let (ctx, _dir) = setup().await;
    let service = ingestion_service(&ctx);
    let meta = google_meta("bistro-a");

    let items = vec![
        google_item("g-1", 5, "Loved it", "2026-06-03T19:00:00+00:00"),
        json!({ "stars": "five" }),
        google_item("g-2", 9, "impossible rating", "2026-06-03T19:00:00+00:00"),
    ];

    let counts = service.ingest_items(&meta, &items).await.unwrap();
    assert_eq!(counts.inserted, 1);
    assert_eq!(counts.errors, 2);
}

#[tokio::test]
async fn reingestion_updates_corrected_text_but_not_status() {
    let (ctx, _dir) = setup().await;
    let service = ingestion_service(&ctx);
    let meta = google_meta("bistro-a");
    let reviews = ctx.reviews();

    let original = vec![google_item("g-1", 4, "Good", "2026-06-03T19:00:00+00:00")];
    service.ingest_items(&meta, &original).await.unwrap();

    // Analyze the review so its status is terminal.
    let claimed = reviews.claim_pending(5).await.unwrap();
    assert_eq!(claimed.len(), 1);
    let worker = worker_with(&ctx, MockExtractor::succeeding());
    worker.process(&claimed, None).await.unwrap();

    // Platform corrected the text; the replayed webhook must refresh the
    // body without touching the terminal status.
    let corrected = vec![google_item("g-1", 4, "Good!", "2026-06-03T19:00:00+00:00")];
    let counts = service.ingest_items(&meta, &corrected).await.unwrap();
    assert_eq!(counts.updated, 1);
    assert_eq!(counts.inserted, 0);

    let review = reviews
        .find_by_key("bistro-a", Platform::Google, "g-1")
        .await
        .unwrap()
        .expect("review exists");
    assert_eq!(review.body, "Good!");
    assert_eq!(review.analysis_status, AnalysisStatus::Completed);
}

#[tokio::test]
async fn concurrent_claims_are_disjoint() {
    let (ctx, _dir) = setup().await;
    for i in 0..30 {
        seed_review(
            &ctx,
            "bistro-a",
            &format!("g-{}", i),
            4,
            "2026-06-03T19:00:00+00:00",
        )
        .await;
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let reviews = ctx.reviews();
        handles.push(tokio::spawn(
            async move { reviews.claim_pending(10).await },
        ));
    }

    let mut all_ids = Vec::new();
    for handle in handles {
        let ids = handle.await.unwrap().unwrap();
        assert!(ids.len() <= 10);
        all_ids.extend(ids);
    }

    // Pairwise disjoint, and the union covers the whole pool.
    let unique: HashSet<&String> = all_ids.iter().collect();
    assert_eq!(unique.len(), all_ids.len(), "a review was claimed twice");
    assert_eq!(unique.len(), 30);

    let counts = ctx.reviews().status_counts().await.unwrap();
    assert_eq!(counts.get(&AnalysisStatus::Processing), Some(&30));
    assert_eq!(counts.get(&AnalysisStatus::Pending), None);
}

#[tokio::test]
async fn claim_returns_what_is_available() {
    let (ctx, _dir) = setup().await;
    let reviews = ctx.reviews();

    assert!(reviews.claim_pending(5).await.unwrap().is_empty());

    for i in 0..3 {
        seed_review(
            &ctx,
            "bistro-a",
            &format!("g-{}", i),
            4,
            "2026-06-03T19:00:00+00:00",
        )
        .await;
    }
    assert_eq!(reviews.claim_pending(5).await.unwrap().len(), 3);
    // Nothing left for a second caller.
    assert!(reviews.claim_pending(5).await.unwrap().is_empty());
}

#[tokio::test]
async fn completion_is_atomic_with_the_analysis_row() {
    let (ctx, _dir) = setup().await;
    let reviews = ctx.reviews();
    let analyses = ctx.analyses();

    let id = seed_review(&ctx, "bistro-a", "g-1", 5, "2026-06-03T19:00:00+00:00").await;

    // Completing a review that was never claimed is an illegal transition
    // and must not leave an analysis row behind.
    let analysis = MockExtractor::payload().into_analysis(id.clone(), None);
    let err = reviews.complete_with_analysis(&analysis).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InvalidStateTransition {
            from: AnalysisStatus::Pending,
            ..
        }
    ));
    assert!(analyses.get_for_review(&id).await.unwrap().is_none());

    // Claimed, the same transition commits status and analysis together.
    let claimed = reviews.claim_pending(1).await.unwrap();
    assert_eq!(claimed, vec![id.clone()]);
    reviews.complete_with_analysis(&analysis).await.unwrap();

    let review = reviews.get(&id).await.unwrap().unwrap();
    assert_eq!(review.analysis_status, AnalysisStatus::Completed);
    assert!(review.claim_token.is_none());
    assert!(analyses.get_for_review(&id).await.unwrap().is_some());

    // Completing twice is refused and the analysis stays singular.
    let err = reviews.complete_with_analysis(&analysis).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InvalidStateTransition {
            from: AnalysisStatus::Completed,
            ..
        }
    ));
    assert_eq!(analyses.count().await.unwrap(), 1);
}

#[tokio::test]
async fn partial_batch_failure_is_isolated() {
    let (ctx, _dir) = setup().await;
    let reviews = ctx.reviews();
    let analyses = ctx.analyses();

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            seed_review(
                &ctx,
                "bistro-b",
                &format!("g-{}", i),
                3,
                "2026-06-03T19:00:00+00:00",
            )
            .await,
        );
    }

    let claimed = reviews.claim_pending(5).await.unwrap();
    assert_eq!(claimed.len(), 5);

    let failing: Vec<String> = ids[..2].to_vec();
    let worker = worker_with(&ctx, MockExtractor::failing(failing.clone()));
    let outcome = worker.process(&claimed, None).await.unwrap();

    assert_eq!(outcome.total, 5);
    assert_eq!(outcome.succeeded, 3);
    assert_eq!(outcome.failed, 2);

    for id in &ids {
        let review = reviews.get(id).await.unwrap().unwrap();
        let analysis = analyses.get_for_review(id).await.unwrap();
        if failing.contains(id) {
            assert_eq!(review.analysis_status, AnalysisStatus::Failed);
            assert!(analysis.is_none());
            let reason = review.failure_reason.expect("failure cause recorded");
            assert!(reason.contains("timeout"), "reason was {:?}", reason);
        } else {
            assert_eq!(review.analysis_status, AnalysisStatus::Completed);
            assert!(analysis.is_some());
        }
    }

    // Usage counted only the successful calls.
    let month = palate::repository::UsageRepository::current_month();
    assert_eq!(ctx.usage().calls_for_month(&month).await.unwrap(), 3);
}

#[tokio::test]
async fn stuck_processing_reviews_are_reclaimed() {
    let (ctx, _dir) = setup().await;
    let reviews = ctx.reviews();

    let id = seed_review(&ctx, "bistro-a", "g-1", 4, "2026-06-03T19:00:00+00:00").await;
    let claimed = reviews.claim_pending(1).await.unwrap();
    assert_eq!(claimed, vec![id.clone()]);

    // Not stuck yet with a generous threshold.
    assert_eq!(
        reviews.release_stuck(Duration::from_secs(3600)).await.unwrap(),
        0
    );

    // With a zero threshold the claim has aged out; the sweep reclaims it.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(reviews.release_stuck(Duration::ZERO).await.unwrap(), 1);

    let review = reviews.get(&id).await.unwrap().unwrap();
    assert_eq!(review.analysis_status, AnalysisStatus::Pending);
    assert!(review.claim_token.is_none());

    // And it is claimable again.
    assert_eq!(reviews.claim_pending(1).await.unwrap(), vec![id]);
}

#[tokio::test]
async fn retry_resets_only_failed_reviews() {
    let (ctx, _dir) = setup().await;
    let reviews = ctx.reviews();

    let failed_id = seed_review(&ctx, "bistro-a", "g-1", 2, "2026-06-03T19:00:00+00:00").await;
    let completed_id = seed_review(&ctx, "bistro-a", "g-2", 5, "2026-06-03T19:00:00+00:00").await;

    let claimed = reviews.claim_pending(2).await.unwrap();
    assert_eq!(claimed.len(), 2);

    reviews.mark_failed(&failed_id, "api: HTTP 503").await.unwrap();
    let analysis = MockExtractor::payload().into_analysis(completed_id.clone(), None);
    reviews.complete_with_analysis(&analysis).await.unwrap();

    assert_eq!(reviews.reset_to_pending(None).await.unwrap(), 1);

    let failed = reviews.get(&failed_id).await.unwrap().unwrap();
    assert_eq!(failed.analysis_status, AnalysisStatus::Pending);
    assert!(failed.failure_reason.is_none());

    let completed = reviews.get(&completed_id).await.unwrap().unwrap();
    assert_eq!(completed.analysis_status, AnalysisStatus::Completed);
}

#[tokio::test]
async fn snapshot_aggregates_scores_and_leaderboards() {
    let (ctx, _dir) = setup().await;
    let reviews = ctx.reviews();

    // In-window: three 5-star, one 4-star, one 3-star.
    let ratings = [5, 5, 5, 4, 3];
    for (i, rating) in ratings.iter().enumerate() {
        seed_review(
            &ctx,
            "bistro-a",
            &format!("g-{}", i),
            *rating,
            &format!("2026-06-{:02}T19:00:00+00:00", i + 3),
        )
        .await;
    }
    // Prior period: a single 5-star review.
    seed_review(&ctx, "bistro-a", "g-prior", 5, "2026-05-15T19:00:00+00:00").await;
    // A competitor, in-window, all 5-star.
    seed_review(&ctx, "bistro-b", "g-1", 5, "2026-06-10T19:00:00+00:00").await;

    // Analyze everything so leaderboards have mentions.
    let claimed = reviews.claim_pending(10).await.unwrap();
    assert_eq!(claimed.len(), 7);
    let worker = worker_with(&ctx, MockExtractor::succeeding());
    let outcome = worker.process(&claimed, None).await.unwrap();
    assert_eq!(outcome.succeeded, 7);

    let scoring = ScoringService::new(ctx.reviews(), ctx.analyses());
    let start = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2026, 6, 30).unwrap();
    let snap = scoring
        .compute_snapshot("bistro-a", start, end)
        .await
        .unwrap();

    // (3/5)*100 - (1/5)*100 = 40.00
    assert_eq!(snap.score, 40.0);
    assert_eq!(snap.zone.as_str(), "great");
    assert_eq!(snap.total_reviews, 5);
    assert_eq!(snap.star_distribution, [0, 0, 1, 1, 3]);
    assert_eq!(snap.avg_rating, 4.4);
    // Prior period scored 100.00 on its single 5-star review.
    assert_eq!(snap.delta, Some(-60.0));

    let staff = &snap.staff_leaderboard;
    assert_eq!(staff.len(), 1);
    assert_eq!(staff[0].name, "Marco");
    assert_eq!(staff[0].mentions, 5);
    assert_eq!(staff[0].positive_percent, 100.0);

    let items = &snap.item_mentions;
    assert_eq!(items[0].name, "tasting menu");
    assert_eq!(items[0].avg_intensity, 4.0);

    let food = snap
        .category_stats
        .iter()
        .find(|s| s.category == "food")
        .unwrap();
    assert_eq!(food.mentions, 5);

    // Competitor set ranking: bistro-b scores 100 and ranks first.
    let ranked = scoring
        .competitor_snapshots(
            &["bistro-a".to_string(), "bistro-b".to_string()],
            start,
            end,
        )
        .await
        .unwrap();
    let rank_a = ranked
        .iter()
        .find(|r| r.snapshot.restaurant_id == "bistro-a")
        .unwrap();
    let rank_b = ranked
        .iter()
        .find(|r| r.snapshot.restaurant_id == "bistro-b")
        .unwrap();
    assert_eq!(rank_b.rank, 1);
    assert_eq!(rank_a.rank, 2);
}

#[tokio::test]
async fn claims_are_capped_at_the_safety_ceiling() {
    let (ctx, _dir) = setup().await;
    for i in 0..60 {
        seed_review(
            &ctx,
            "bistro-a",
            &format!("g-{}", i),
            4,
            "2026-06-03T19:00:00+00:00",
        )
        .await;
    }
    let claimed = ctx.reviews().claim_pending(500).await.unwrap();
    assert_eq!(claimed.len(), palate::repository::MAX_CLAIM_BATCH);
}

#[tokio::test]
async fn orchestrator_drains_the_pending_pool() {
    let (ctx, _dir) = setup().await;
    for i in 0..12 {
        seed_review(
            &ctx,
            "bistro-a",
            &format!("g-{}", i),
            5,
            "2026-06-03T19:00:00+00:00",
        )
        .await;
    }

    let worker = Arc::new(worker_with(&ctx, MockExtractor::succeeding()));
    let settings = palate::config::PipelineSettings {
        batch_size: 2,
        concurrency: 3,
        cooldown_secs: 0,
        max_consecutive_failures: 3,
        refresh_every: 1,
        stuck_after_secs: 600,
    };
    let orchestrator = BatchOrchestrator::new(worker, ctx.reviews(), settings);

    let summary = orchestrator.run(None).await.unwrap();
    assert_eq!(summary.succeeded, 12);
    assert_eq!(summary.failed, 0);
    assert!(!summary.halted_by_breaker);
    assert!(summary.rounds >= 2);

    assert_eq!(ctx.reviews().pending_count().await.unwrap(), 0);
    let counts = ctx.reviews().status_counts().await.unwrap();
    assert_eq!(counts.get(&AnalysisStatus::Completed), Some(&12));
}

#[tokio::test]
async fn empty_window_scores_zero_in_the_good_zone() {
    let (ctx, _dir) = setup().await;
    let scoring = ScoringService::new(ctx.reviews(), ctx.analyses());
    let snap = scoring
        .compute_snapshot(
            "nobody",
            NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(snap.score, 0.0);
    assert_eq!(snap.zone.as_str(), "good");
    assert_eq!(snap.delta, None);
    assert_eq!(snap.total_reviews, 0);
}

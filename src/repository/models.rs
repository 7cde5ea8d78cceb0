//! Diesel ORM models for database tables.
//!
//! These records mirror the `src/schema.rs` tables column-for-column and
//! convert to/from the domain models. JSON-valued columns (mention lists,
//! flags) are stored as serialized TEXT.

use chrono::Utc;
use diesel::prelude::*;

use crate::models::{
    Analysis, AnalysisStatus, CategoryScores, Platform, ReturnIntent, Review, ScrapeRun,
    Sentiment,
};
use crate::schema;

use super::util::{parse_datetime, parse_datetime_opt};

/// Review record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::reviews)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReviewRecord {
    pub id: String,
    pub restaurant_id: String,
    pub platform: String,
    pub external_id: String,
    pub rating: i32,
    pub body: String,
    pub author: Option<String>,
    pub posted_at: String,
    pub ingested_at: String,
    pub updated_at: String,
    pub analysis_status: String,
    pub claim_token: Option<String>,
    pub claimed_at: Option<String>,
    pub failure_reason: Option<String>,
}

impl From<ReviewRecord> for Review {
    fn from(r: ReviewRecord) -> Self {
        Review {
            id: r.id,
            restaurant_id: r.restaurant_id,
            platform: Platform::from_str(&r.platform).unwrap_or(Platform::Google),
            external_id: r.external_id,
            rating: r.rating,
            body: r.body,
            author: r.author,
            posted_at: parse_datetime(&r.posted_at),
            ingested_at: parse_datetime(&r.ingested_at),
            updated_at: parse_datetime(&r.updated_at),
            analysis_status: AnalysisStatus::from_str(&r.analysis_status)
                .unwrap_or(AnalysisStatus::Pending),
            claim_token: r.claim_token,
            claimed_at: parse_datetime_opt(r.claimed_at),
            failure_reason: r.failure_reason,
        }
    }
}

/// New review for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::reviews)]
pub struct NewReview {
    pub id: String,
    pub restaurant_id: String,
    pub platform: String,
    pub external_id: String,
    pub rating: i32,
    pub body: String,
    pub author: Option<String>,
    pub posted_at: String,
    pub ingested_at: String,
    pub updated_at: String,
    pub analysis_status: String,
}

/// Review analysis record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::review_analyses)]
#[diesel(primary_key(review_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReviewAnalysisRecord {
    pub review_id: String,
    pub overall_sentiment: String,
    pub emotion: Option<String>,
    pub food_sentiment: Option<f32>,
    pub service_sentiment: Option<f32>,
    pub ambience_sentiment: Option<f32>,
    pub value_sentiment: Option<f32>,
    pub strengths: String,
    pub opportunities: String,
    pub staff_mentions: String,
    pub item_mentions: String,
    pub severity_flags: String,
    pub return_intent: String,
    pub model: Option<String>,
    pub created_at: String,
}

impl From<ReviewAnalysisRecord> for Analysis {
    fn from(r: ReviewAnalysisRecord) -> Self {
        Analysis {
            review_id: r.review_id,
            overall_sentiment: Sentiment::from_str(&r.overall_sentiment)
                .unwrap_or(Sentiment::Neutral),
            emotion: r.emotion,
            categories: CategoryScores {
                food: r.food_sentiment,
                service: r.service_sentiment,
                ambience: r.ambience_sentiment,
                value: r.value_sentiment,
            },
            strengths: serde_json::from_str(&r.strengths).unwrap_or_default(),
            opportunities: serde_json::from_str(&r.opportunities).unwrap_or_default(),
            staff_mentions: serde_json::from_str(&r.staff_mentions).unwrap_or_default(),
            item_mentions: serde_json::from_str(&r.item_mentions).unwrap_or_default(),
            severity_flags: serde_json::from_str(&r.severity_flags).unwrap_or_default(),
            return_intent: ReturnIntent::from_str(&r.return_intent)
                .unwrap_or(ReturnIntent::Unknown),
            model: r.model,
            created_at: parse_datetime(&r.created_at),
        }
    }
}

/// New review analysis for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::review_analyses)]
pub struct NewReviewAnalysis {
    pub review_id: String,
    pub overall_sentiment: String,
    pub emotion: Option<String>,
    pub food_sentiment: Option<f32>,
    pub service_sentiment: Option<f32>,
    pub ambience_sentiment: Option<f32>,
    pub value_sentiment: Option<f32>,
    pub strengths: String,
    pub opportunities: String,
    pub staff_mentions: String,
    pub item_mentions: String,
    pub severity_flags: String,
    pub return_intent: String,
    pub model: Option<String>,
    pub created_at: String,
}

impl NewReviewAnalysis {
    /// Serialize a domain analysis into an insertable record.
    pub fn from_analysis(analysis: &Analysis) -> Self {
        Self {
            review_id: analysis.review_id.clone(),
            overall_sentiment: analysis.overall_sentiment.as_str().to_string(),
            emotion: analysis.emotion.clone(),
            food_sentiment: analysis.categories.food,
            service_sentiment: analysis.categories.service,
            ambience_sentiment: analysis.categories.ambience,
            value_sentiment: analysis.categories.value,
            strengths: serde_json::to_string(&analysis.strengths).unwrap_or_else(|_| "[]".into()),
            opportunities: serde_json::to_string(&analysis.opportunities)
                .unwrap_or_else(|_| "[]".into()),
            staff_mentions: serde_json::to_string(&analysis.staff_mentions)
                .unwrap_or_else(|_| "[]".into()),
            item_mentions: serde_json::to_string(&analysis.item_mentions)
                .unwrap_or_else(|_| "[]".into()),
            severity_flags: serde_json::to_string(&analysis.severity_flags)
                .unwrap_or_else(|_| "[]".into()),
            return_intent: analysis.return_intent.as_str().to_string(),
            model: analysis.model.clone(),
            created_at: analysis.created_at.to_rfc3339(),
        }
    }
}

/// Scrape run record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::scrape_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ScrapeRunRecord {
    pub id: String,
    pub restaurant_id: String,
    pub platform: String,
    pub provider_run_id: String,
    pub dataset_handle: String,
    pub status: String,
    pub reviews_found: i32,
    pub reviews_new: i32,
    pub created_at: String,
}

impl From<ScrapeRunRecord> for ScrapeRun {
    fn from(r: ScrapeRunRecord) -> Self {
        ScrapeRun {
            id: r.id,
            restaurant_id: r.restaurant_id,
            platform: Platform::from_str(&r.platform).unwrap_or(Platform::Google),
            provider_run_id: r.provider_run_id,
            dataset_handle: r.dataset_handle,
            status: r.status,
            reviews_found: r.reviews_found,
            reviews_new: r.reviews_new,
            created_at: parse_datetime(&r.created_at),
        }
    }
}

/// New scrape run for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::scrape_runs)]
pub struct NewScrapeRun {
    pub id: String,
    pub restaurant_id: String,
    pub platform: String,
    pub provider_run_id: String,
    pub dataset_handle: String,
    pub status: String,
    pub reviews_found: i32,
    pub reviews_new: i32,
    pub created_at: String,
}

impl NewScrapeRun {
    pub fn from_run(run: &ScrapeRun) -> Self {
        Self {
            id: run.id.clone(),
            restaurant_id: run.restaurant_id.clone(),
            platform: run.platform.as_str().to_string(),
            provider_run_id: run.provider_run_id.clone(),
            dataset_handle: run.dataset_handle.clone(),
            status: run.status.clone(),
            reviews_found: run.reviews_found,
            reviews_new: run.reviews_new,
            created_at: run.created_at.to_rfc3339(),
        }
    }
}

/// AI usage counter record.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::ai_usage)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AiUsageRecord {
    pub month: String,
    pub calls: i32,
    pub updated_at: String,
}

/// New AI usage row for the first call in a month.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::ai_usage)]
pub struct NewAiUsage {
    pub month: String,
    pub calls: i32,
    pub updated_at: String,
}

impl NewAiUsage {
    pub fn first_call(month: &str) -> Self {
        Self {
            month: month.to_string(),
            calls: 1,
            updated_at: Utc::now().to_rfc3339(),
        }
    }
}

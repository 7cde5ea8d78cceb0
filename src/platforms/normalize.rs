//! Per-platform review normalization.
//!
//! Each platform's scraper emits its own field shapes; one tagged case per
//! platform maps a raw dataset item into the single canonical review form.
//! A malformed item is an error for that item only - ingestion skips it and
//! continues the batch.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::Platform;

/// Errors from normalizing one raw dataset item.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("item does not match the {platform} shape: {reason}")]
    Shape { platform: Platform, reason: String },
    #[error("missing external review id")]
    MissingExternalId,
    #[error("rating {0} outside 1-5")]
    InvalidRating(i64),
    #[error("unparseable timestamp: {0}")]
    InvalidTimestamp(String),
}

/// A review in canonical shape, ready for upsert.
#[derive(Debug, Clone)]
pub struct NormalizedReview {
    pub restaurant_id: String,
    pub platform: Platform,
    pub external_id: String,
    pub rating: i32,
    pub body: String,
    pub author: Option<String>,
    pub posted_at: DateTime<Utc>,
}

/// Raw shape emitted by the Google Maps reviews scraper.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleRawReview {
    review_id: Option<String>,
    stars: i64,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    name: Option<String>,
    published_at_date: String,
}

/// Raw shape emitted by the OpenTable reviews scraper.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpentableRawReview {
    review_id: Option<String>,
    rating: i64,
    #[serde(default)]
    review: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
    submitted_date: String,
}

/// Raw shape emitted by the TripAdvisor reviews scraper.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TripadvisorRawReview {
    id: Option<serde_json::Value>,
    rating: i64,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    user: Option<TripadvisorUser>,
    published_date: String,
}

#[derive(Debug, Deserialize)]
struct TripadvisorUser {
    #[serde(default)]
    username: Option<String>,
}

/// Normalize one raw dataset item for a platform into the canonical shape.
pub fn normalize_item(
    restaurant_id: &str,
    platform: Platform,
    item: &serde_json::Value,
) -> Result<NormalizedReview, NormalizeError> {
    match platform {
        Platform::Google => {
            let raw: GoogleRawReview = parse_shape(platform, item)?;
            build(
                restaurant_id,
                platform,
                raw.review_id,
                raw.stars,
                raw.text,
                raw.name,
                &raw.published_at_date,
            )
        }
        Platform::Opentable => {
            let raw: OpentableRawReview = parse_shape(platform, item)?;
            build(
                restaurant_id,
                platform,
                raw.review_id,
                raw.rating,
                raw.review,
                raw.nickname,
                &raw.submitted_date,
            )
        }
        Platform::Tripadvisor => {
            let raw: TripadvisorRawReview = parse_shape(platform, item)?;
            // TripAdvisor ids arrive as either numbers or strings.
            let external_id = raw.id.map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });
            let author = raw.user.and_then(|u| u.username);
            build(
                restaurant_id,
                platform,
                external_id,
                raw.rating,
                raw.text,
                author,
                &raw.published_date,
            )
        }
    }
}

fn parse_shape<'de, T: Deserialize<'de>>(
    platform: Platform,
    item: &serde_json::Value,
) -> Result<T, NormalizeError> {
    T::deserialize(item.clone()).map_err(|e| NormalizeError::Shape {
        platform,
        reason: e.to_string(),
    })
}

fn build(
    restaurant_id: &str,
    platform: Platform,
    external_id: Option<String>,
    rating: i64,
    body: Option<String>,
    author: Option<String>,
    posted_at: &str,
) -> Result<NormalizedReview, NormalizeError> {
    let external_id = external_id
        .filter(|id| !id.is_empty())
        .ok_or(NormalizeError::MissingExternalId)?;

    if !(1..=5).contains(&rating) {
        return Err(NormalizeError::InvalidRating(rating));
    }

    let posted_at = parse_timestamp(posted_at)?;

    Ok(NormalizedReview {
        restaurant_id: restaurant_id.to_string(),
        platform,
        external_id,
        rating: rating as i32,
        body: body.unwrap_or_default(),
        author: author.filter(|a| !a.is_empty()),
        posted_at,
    })
}

/// Parse the timestamp shapes the scrapers emit: RFC3339, or a bare
/// `YYYY-MM-DD` date.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, NormalizeError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc());
        }
    }
    Err(NormalizeError::InvalidTimestamp(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_a_google_item() {
        let item = json!({
            "reviewId": "g-123",
            "stars": 5,
            "text": "Incredible tasting menu.",
            "name": "Dana R.",
            "publishedAtDate": "2026-05-04T18:30:00+00:00"
        });
        let review = normalize_item("rest-1", Platform::Google, &item).unwrap();
        assert_eq!(review.external_id, "g-123");
        assert_eq!(review.rating, 5);
        assert_eq!(review.author.as_deref(), Some("Dana R."));
    }

    #[test]
    fn normalizes_an_opentable_item() {
        let item = json!({
            "reviewId": "ot-9",
            "rating": 4,
            "review": "Great pasta, slow service.",
            "nickname": "OpenTable Diner",
            "submittedDate": "2026-04-11"
        });
        let review = normalize_item("rest-1", Platform::Opentable, &item).unwrap();
        assert_eq!(review.platform, Platform::Opentable);
        assert_eq!(review.rating, 4);
        assert_eq!(review.posted_at.format("%Y-%m-%d").to_string(), "2026-04-11");
    }

    #[test]
    fn normalizes_a_tripadvisor_item_with_numeric_id() {
        let item = json!({
            "id": 881234,
            "rating": 2,
            "text": "Waited an hour for cold soup.",
            "user": { "username": "traveler99" },
            "publishedDate": "2026-03-02T09:00:00Z"
        });
        let review = normalize_item("rest-1", Platform::Tripadvisor, &item).unwrap();
        assert_eq!(review.external_id, "881234");
        assert_eq!(review.author.as_deref(), Some("traveler99"));
    }

    #[test]
    fn rejects_out_of_range_rating() {
        let item = json!({
            "reviewId": "g-1",
            "stars": 7,
            "publishedAtDate": "2026-05-04T18:30:00Z"
        });
        let err = normalize_item("rest-1", Platform::Google, &item).unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidRating(7)));
    }

    #[test]
    fn rejects_missing_external_id() {
        let item = json!({
            "stars": 3,
            "publishedAtDate": "2026-05-04T18:30:00Z"
        });
        let err = normalize_item("rest-1", Platform::Google, &item).unwrap_err();
        assert!(matches!(err, NormalizeError::MissingExternalId));
    }

    #[test]
    fn rejects_garbage_shapes_without_panicking() {
        let item = json!({ "stars": "five" });
        assert!(normalize_item("rest-1", Platform::Google, &item).is_err());
    }
}

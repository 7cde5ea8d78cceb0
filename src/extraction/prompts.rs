//! Prompt construction for the extraction service.

use crate::models::Review;

/// Maximum review characters sent per call. Reviews longer than this are
/// truncated on a character boundary; platform review caps make this rare.
const MAX_BODY_CHARS: usize = 6000;

/// Build the extraction prompt for one review.
pub fn extraction_prompt(review: &Review) -> String {
    let body = truncate(&review.body, MAX_BODY_CHARS);
    format!(
        r#"You are analyzing a customer review of a restaurant.

Review platform: {platform}
Star rating given: {rating} out of 5
Review text:
---
{body}
---

Extract the structured intelligence described by the response schema:
- overall_sentiment and the dominant emotion of the reviewer
- per-category sentiment scores between -1 and 1 for food, service,
  ambience, and value; use null for categories the review does not touch
- concrete strengths and improvement opportunities, phrased briefly
- staff members mentioned by name, with their role if it can be inferred
- menu items mentioned, each with polarity and an intensity from 1 (passing
  mention) to 5 (the reviewer was emphatic)
- severity flags only for serious quality, wait_time, or hygiene complaints
- whether the reviewer is likely to return

Respond with JSON only."#,
        platform = review.platform,
        rating = review.rating,
        body = body,
    )
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{review_id, AnalysisStatus, Platform};
    use chrono::Utc;

    fn sample_review(body: &str) -> Review {
        Review {
            id: review_id("rest-1", Platform::Google, "ext-1"),
            restaurant_id: "rest-1".to_string(),
            platform: Platform::Google,
            external_id: "ext-1".to_string(),
            rating: 4,
            body: body.to_string(),
            author: None,
            posted_at: Utc::now(),
            ingested_at: Utc::now(),
            updated_at: Utc::now(),
            analysis_status: AnalysisStatus::Processing,
            claim_token: None,
            claimed_at: None,
            failure_reason: None,
        }
    }

    #[test]
    fn prompt_embeds_rating_and_body() {
        let prompt = extraction_prompt(&sample_review("The duck was perfect."));
        assert!(prompt.contains("4 out of 5"));
        assert!(prompt.contains("The duck was perfect."));
    }

    #[test]
    fn prompt_truncates_very_long_reviews() {
        let long_body = "x".repeat(MAX_BODY_CHARS * 2);
        let prompt = extraction_prompt(&sample_review(&long_body));
        assert!(prompt.len() < long_body.len());
    }
}

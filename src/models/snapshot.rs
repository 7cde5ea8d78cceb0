//! Flavor Index snapshot - the derived aggregation output.
//!
//! Snapshots are recomputed on demand and never mutated in place; they carry
//! no invariants that require durability.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Named bucket a Flavor Index score falls into.
///
/// Classified on the clamped score with inclusive integer bounds:
/// world-class 71..100, excellent 51..70, great 31..50, good 0..30,
/// needs-improvement below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Zone {
    WorldClass,
    Excellent,
    Great,
    Good,
    NeedsImprovement,
}

impl Zone {
    /// Classify a score into its zone. Scores are clamped to [-100, 100]
    /// before bucketing.
    pub fn classify(score: f64) -> Self {
        let score = score.clamp(-100.0, 100.0);
        if score >= 71.0 {
            Self::WorldClass
        } else if score >= 51.0 {
            Self::Excellent
        } else if score >= 31.0 {
            Self::Great
        } else if score >= 0.0 {
            Self::Good
        } else {
            Self::NeedsImprovement
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorldClass => "world-class",
            Self::Excellent => "excellent",
            Self::Great => "great",
            Self::Good => "good",
            Self::NeedsImprovement => "needs-improvement",
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-category aggregate over the analyses in a window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    /// Category key: food, service, ambience, or value.
    pub category: String,
    /// Mean sentiment score across analyses that mention the category.
    pub mean_sentiment: Option<f64>,
    /// Number of analyses mentioning the category.
    pub mentions: u64,
    /// This category's share of total mention volume, 0-100.
    pub share_percent: f64,
}

/// One row of the staff leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffLeaderboardEntry {
    /// Display name (first spelling seen).
    pub name: String,
    /// Most frequently inferred role, if any.
    pub role: Option<String>,
    pub mentions: u64,
    /// Positive mentions / total mentions, 0-100.
    pub positive_percent: f64,
}

/// Aggregated mentions of one menu item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMentionStat {
    pub name: String,
    pub mentions: u64,
    /// Positive mentions / total mentions, 0-100.
    pub positive_percent: f64,
    /// Mean mention intensity, 1-5.
    pub avg_intensity: f64,
}

/// Point-in-time aggregation result for one restaurant and period.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlavorIndexSnapshot {
    pub restaurant_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Flavor Index score, bounded to [-100, 100].
    pub score: f64,
    pub zone: Zone,
    /// Score change vs. the equal-length prior period; `None` when the prior
    /// period has no reviews.
    pub delta: Option<f64>,
    pub avg_rating: f64,
    pub total_reviews: u64,
    /// Review counts for 1 through 5 stars, in that order.
    pub star_distribution: [u64; 5],
    pub category_stats: Vec<CategoryStats>,
    pub staff_leaderboard: Vec<StaffLeaderboardEntry>,
    pub item_mentions: Vec<ItemMentionStat>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_boundaries_are_inclusive() {
        assert_eq!(Zone::classify(71.0), Zone::WorldClass);
        assert_eq!(Zone::classify(70.99), Zone::Excellent);
        assert_eq!(Zone::classify(51.0), Zone::Excellent);
        assert_eq!(Zone::classify(50.99), Zone::Great);
        assert_eq!(Zone::classify(31.0), Zone::Great);
        assert_eq!(Zone::classify(30.99), Zone::Good);
        assert_eq!(Zone::classify(0.0), Zone::Good);
        assert_eq!(Zone::classify(-1.0), Zone::NeedsImprovement);
        assert_eq!(Zone::classify(-100.0), Zone::NeedsImprovement);
    }

    #[test]
    fn zone_clamps_out_of_range_scores() {
        assert_eq!(Zone::classify(250.0), Zone::WorldClass);
        assert_eq!(Zone::classify(-250.0), Zone::NeedsImprovement);
    }

    #[test]
    fn zone_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&Zone::WorldClass).unwrap(),
            "\"world-class\""
        );
        assert_eq!(
            serde_json::to_string(&Zone::NeedsImprovement).unwrap(),
            "\"needs-improvement\""
        );
    }
}

//! Aggregation engine: the Flavor Index.
//!
//! Pure computation over reviews and analyses in a period window. This
//! component never mutates pipeline state; recomputing a snapshot is always
//! safe to repeat.

mod leaderboard;

use std::collections::HashMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use tracing::debug;

use crate::models::{
    Analysis, CategoryStats, FlavorIndexSnapshot, Review, Zone,
};
use crate::repository::{AnalysisRepository, DieselError, ReviewRepository};

pub use leaderboard::{item_leaderboard, staff_leaderboard};

/// Star-rating counts over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StarCounts {
    pub five: u64,
    pub four: u64,
    pub three: u64,
    pub two: u64,
    pub one: u64,
}

impl StarCounts {
    /// Tally counts from a set of reviews.
    pub fn from_reviews(reviews: &[Review]) -> Self {
        let mut counts = Self::default();
        for review in reviews {
            match review.rating {
                5 => counts.five += 1,
                4 => counts.four += 1,
                3 => counts.three += 1,
                2 => counts.two += 1,
                _ => counts.one += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> u64 {
        self.five + self.four + self.three + self.two + self.one
    }

    /// Counts for 1 through 5 stars, in that order.
    pub fn distribution(&self) -> [u64; 5] {
        [self.one, self.two, self.three, self.four, self.five]
    }
}

/// Round to two decimal places.
pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Compute the Flavor Index score from star counts.
///
/// `(five/total)*100 - ((three+two+one)/total)*100`, rounded to two
/// decimals. Four-star reviews are on the fence: neither reward nor
/// penalty. Zero when the window has no reviews. The result is bounded to
/// [-100, 100] by construction.
pub fn compute_flavor_index(counts: &StarCounts) -> f64 {
    let total = counts.total();
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    let reward = counts.five as f64 / total * 100.0;
    let penalty = (counts.three + counts.two + counts.one) as f64 / total * 100.0;
    round2(reward - penalty)
}

/// Count-based competitive rank: 1 plus the number of competitors with a
/// strictly higher score. Equal scores share the lower rank number.
pub fn rank_among(own_score: f64, competitor_scores: &[f64]) -> usize {
    1 + competitor_scores
        .iter()
        .filter(|score| **score > own_score)
        .count()
}

/// Per-category aggregate stats across the analyses in a window.
///
/// Shares are each category's slice of total mention volume and sum to 100
/// when any category is mentioned at all.
pub fn category_stats(analyses: &[Analysis]) -> Vec<CategoryStats> {
    let mut sums: HashMap<&str, (f64, u64)> = HashMap::new();
    for analysis in analyses {
        for (name, score) in [
            ("food", analysis.categories.food),
            ("service", analysis.categories.service),
            ("ambience", analysis.categories.ambience),
            ("value", analysis.categories.value),
        ] {
            if let Some(score) = score {
                let entry = sums.entry(name).or_insert((0.0, 0));
                entry.0 += score as f64;
                entry.1 += 1;
            }
        }
    }

    let total_mentions: u64 = sums.values().map(|(_, count)| count).sum();

    ["food", "service", "ambience", "value"]
        .into_iter()
        .map(|name| {
            let (sum, mentions) = sums.get(name).copied().unwrap_or((0.0, 0));
            CategoryStats {
                category: name.to_string(),
                mean_sentiment: (mentions > 0).then(|| round2(sum / mentions as f64)),
                mentions,
                share_percent: if total_mentions > 0 {
                    round2(mentions as f64 / total_mentions as f64 * 100.0)
                } else {
                    0.0
                },
            }
        })
        .collect()
}

/// A snapshot with its rank among a competitor set.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RankedSnapshot {
    pub rank: usize,
    #[serde(flatten)]
    pub snapshot: FlavorIndexSnapshot,
}

/// Computes Flavor Index snapshots from the review store. Read-only.
pub struct ScoringService {
    reviews: ReviewRepository,
    analyses: AnalysisRepository,
}

impl ScoringService {
    /// Create a new scoring service.
    pub fn new(reviews: ReviewRepository, analyses: AnalysisRepository) -> Self {
        Self { reviews, analyses }
    }

    /// Compute the snapshot for one restaurant over `[period_start,
    /// period_end]` (inclusive dates).
    pub async fn compute_snapshot(
        &self,
        restaurant_id: &str,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<FlavorIndexSnapshot, DieselError> {
        let (start_dt, end_dt) = window_bounds(period_start, period_end);
        let reviews = self
            .reviews
            .load_window(restaurant_id, start_dt, end_dt)
            .await?;
        let analyses = self
            .analyses
            .load_window(restaurant_id, start_dt, end_dt)
            .await?;

        let counts = StarCounts::from_reviews(&reviews);
        let score = compute_flavor_index(&counts);

        // Immediately preceding period of identical duration.
        let duration_days = (period_end - period_start).num_days() as u64;
        let prior_end = period_start.checked_sub_days(Days::new(1));
        let prior_start = prior_end.and_then(|end| end.checked_sub_days(Days::new(duration_days)));
        let delta = match (prior_start, prior_end) {
            (Some(prior_start), Some(prior_end)) => {
                let (prior_start_dt, prior_end_dt) = window_bounds(prior_start, prior_end);
                let prior_reviews = self
                    .reviews
                    .load_window(restaurant_id, prior_start_dt, prior_end_dt)
                    .await?;
                if prior_reviews.is_empty() {
                    None
                } else {
                    let prior_score =
                        compute_flavor_index(&StarCounts::from_reviews(&prior_reviews));
                    Some(round2(score - prior_score))
                }
            }
            _ => None,
        };

        let total_reviews = counts.total();
        let avg_rating = if reviews.is_empty() {
            0.0
        } else {
            round2(
                reviews.iter().map(|r| r.rating as f64).sum::<f64>() / reviews.len() as f64,
            )
        };

        debug!(
            "Snapshot for {} [{} - {}]: score {:.2} over {} reviews",
            restaurant_id, period_start, period_end, score, total_reviews
        );

        Ok(FlavorIndexSnapshot {
            restaurant_id: restaurant_id.to_string(),
            period_start,
            period_end,
            score,
            zone: Zone::classify(score),
            delta,
            avg_rating,
            total_reviews,
            star_distribution: counts.distribution(),
            category_stats: category_stats(&analyses),
            staff_leaderboard: staff_leaderboard(&analyses),
            item_mentions: item_leaderboard(&analyses),
        })
    }

    /// Compute snapshots for a competitor set and rank them.
    pub async fn competitor_snapshots(
        &self,
        restaurant_ids: &[String],
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<RankedSnapshot>, DieselError> {
        let mut snapshots = Vec::with_capacity(restaurant_ids.len());
        for restaurant_id in restaurant_ids {
            snapshots.push(
                self.compute_snapshot(restaurant_id, period_start, period_end)
                    .await?,
            );
        }

        let scores: Vec<f64> = snapshots.iter().map(|s| s.score).collect();
        Ok(snapshots
            .into_iter()
            .map(|snapshot| {
                let others: Vec<f64> = scores
                    .iter()
                    .copied()
                    .filter(|score| *score != snapshot.score)
                    .collect();
                RankedSnapshot {
                    rank: rank_among(snapshot.score, &others),
                    snapshot,
                }
            })
            .collect())
    }
}

/// Convert an inclusive date period into `[start, end)` datetime bounds.
fn window_bounds(period_start: NaiveDate, period_end: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = period_start
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc();
    let end = period_end
        .checked_add_days(Days::new(1))
        .unwrap_or(period_end)
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc();
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryScores, ReturnIntent, Sentiment};
    use chrono::Utc;

    fn analysis_with_categories(categories: CategoryScores) -> Analysis {
        Analysis {
            review_id: "r".to_string(),
            overall_sentiment: Sentiment::Positive,
            emotion: None,
            categories,
            strengths: vec![],
            opportunities: vec![],
            staff_mentions: vec![],
            item_mentions: vec![],
            severity_flags: vec![],
            return_intent: ReturnIntent::Unknown,
            model: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn score_matches_the_reference_example() {
        let counts = StarCounts {
            five: 92,
            four: 17,
            three: 5,
            two: 3,
            one: 2,
        };
        assert_eq!(counts.total(), 119);
        let score = compute_flavor_index(&counts);
        assert_eq!(score, 68.91);
        assert_eq!(Zone::classify(score), Zone::Excellent);
    }

    #[test]
    fn score_is_zero_for_an_empty_window() {
        assert_eq!(compute_flavor_index(&StarCounts::default()), 0.0);
    }

    #[test]
    fn score_stays_within_bounds() {
        let all_five = StarCounts {
            five: 1000,
            ..Default::default()
        };
        assert_eq!(compute_flavor_index(&all_five), 100.0);

        let all_one = StarCounts {
            one: 1000,
            ..Default::default()
        };
        assert_eq!(compute_flavor_index(&all_one), -100.0);

        // Fours are neither reward nor penalty.
        let all_four = StarCounts {
            four: 1000,
            ..Default::default()
        };
        assert_eq!(compute_flavor_index(&all_four), 0.0);
    }

    #[test]
    fn score_bounds_hold_over_a_sweep_of_distributions() {
        for five in (0..=50).step_by(10) {
            for three in (0..=50).step_by(10) {
                for one in (0..=50).step_by(10) {
                    let counts = StarCounts {
                        five,
                        four: 7,
                        three,
                        two: 3,
                        one,
                    };
                    let score = compute_flavor_index(&counts);
                    assert!((-100.0..=100.0).contains(&score), "score {}", score);
                }
            }
        }
    }

    #[test]
    fn rank_is_count_based_and_ties_share_the_lower_rank() {
        // own 80 vs competitors 90, 80, 70: one strictly higher.
        assert_eq!(rank_among(80.0, &[90.0, 80.0, 70.0]), 2);
        // equal top scores rank 1 together
        assert_eq!(rank_among(90.0, &[90.0, 70.0]), 1);
        assert_eq!(rank_among(50.0, &[]), 1);
    }

    #[test]
    fn category_shares_sum_to_one_hundred() {
        let analyses = vec![
            analysis_with_categories(CategoryScores {
                food: Some(0.8),
                service: Some(0.2),
                ambience: None,
                value: None,
            }),
            analysis_with_categories(CategoryScores {
                food: Some(0.4),
                service: None,
                ambience: Some(-0.5),
                value: Some(0.1),
            }),
        ];
        let stats = category_stats(&analyses);
        assert_eq!(stats.len(), 4);
        let share_sum: f64 = stats.iter().map(|s| s.share_percent).sum();
        assert!((share_sum - 100.0).abs() < 0.05, "shares sum to {}", share_sum);

        let food = stats.iter().find(|s| s.category == "food").unwrap();
        assert_eq!(food.mentions, 2);
        assert_eq!(food.mean_sentiment, Some(0.6));
    }

    #[test]
    fn category_stats_handle_an_empty_window() {
        let stats = category_stats(&[]);
        assert_eq!(stats.len(), 4);
        for stat in stats {
            assert_eq!(stat.mentions, 0);
            assert_eq!(stat.mean_sentiment, None);
            assert_eq!(stat.share_percent, 0.0);
        }
    }

    #[test]
    fn window_bounds_cover_the_end_date() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 11).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
        let (start_dt, end_dt) = window_bounds(start, end);
        assert_eq!(start_dt.to_rfc3339(), "2026-01-11T00:00:00+00:00");
        assert_eq!(end_dt.to_rfc3339(), "2026-01-21T00:00:00+00:00");
    }
}

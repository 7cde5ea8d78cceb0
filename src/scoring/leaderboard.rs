//! Staff and menu-item leaderboards.
//!
//! Mentions are grouped by normalized name (case- and whitespace-folded),
//! counted, and sorted by mention count with positive share breaking ties.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Analysis, ItemMentionStat, Sentiment, StaffLeaderboardEntry};

use super::round2;

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Fold a mention name for grouping: trim, lowercase, collapse whitespace.
fn normalize_name(name: &str) -> String {
    whitespace_re()
        .replace_all(name.trim(), " ")
        .to_lowercase()
}

#[derive(Default)]
struct MentionTally {
    display_name: String,
    mentions: u64,
    positive: u64,
    roles: HashMap<String, u64>,
    intensity_sum: u64,
}

/// Build the staff leaderboard from the analyses in a window.
pub fn staff_leaderboard(analyses: &[Analysis]) -> Vec<StaffLeaderboardEntry> {
    let mut tallies: HashMap<String, MentionTally> = HashMap::new();

    for analysis in analyses {
        for mention in &analysis.staff_mentions {
            let key = normalize_name(&mention.name);
            if key.is_empty() {
                continue;
            }
            let tally = tallies.entry(key).or_default();
            if tally.display_name.is_empty() {
                tally.display_name = mention.name.trim().to_string();
            }
            tally.mentions += 1;
            if mention.sentiment == Sentiment::Positive {
                tally.positive += 1;
            }
            if let Some(ref role) = mention.role {
                *tally.roles.entry(role.to_lowercase()).or_insert(0) += 1;
            }
        }
    }

    let mut leaderboard: Vec<StaffLeaderboardEntry> = tallies
        .into_values()
        .map(|tally| {
            let role = tally
                .roles
                .iter()
                .max_by_key(|(_, count)| **count)
                .map(|(role, _)| role.clone());
            StaffLeaderboardEntry {
                name: tally.display_name,
                role,
                mentions: tally.mentions,
                positive_percent: round2(tally.positive as f64 / tally.mentions as f64 * 100.0),
            }
        })
        .collect();

    sort_leaderboard(&mut leaderboard, |e| {
        (e.mentions, e.positive_percent, e.name.clone())
    });
    leaderboard
}

/// Build the menu-item leaderboard from the analyses in a window.
pub fn item_leaderboard(analyses: &[Analysis]) -> Vec<ItemMentionStat> {
    let mut tallies: HashMap<String, MentionTally> = HashMap::new();

    for analysis in analyses {
        for mention in &analysis.item_mentions {
            let key = normalize_name(&mention.name);
            if key.is_empty() {
                continue;
            }
            let tally = tallies.entry(key).or_default();
            if tally.display_name.is_empty() {
                tally.display_name = mention.name.trim().to_string();
            }
            tally.mentions += 1;
            if mention.polarity == Sentiment::Positive {
                tally.positive += 1;
            }
            tally.intensity_sum += mention.intensity.clamp(1, 5) as u64;
        }
    }

    let mut leaderboard: Vec<ItemMentionStat> = tallies
        .into_values()
        .map(|tally| ItemMentionStat {
            name: tally.display_name,
            mentions: tally.mentions,
            positive_percent: round2(tally.positive as f64 / tally.mentions as f64 * 100.0),
            avg_intensity: round2(tally.intensity_sum as f64 / tally.mentions as f64),
        })
        .collect();

    sort_leaderboard(&mut leaderboard, |e| {
        (e.mentions, e.positive_percent, e.name.clone())
    });
    leaderboard
}

/// Sort descending by mention count, then positive share, with name as a
/// deterministic final tiebreak.
fn sort_leaderboard<T, F>(entries: &mut [T], key: F)
where
    F: Fn(&T) -> (u64, f64, String),
{
    entries.sort_by(|a, b| {
        let (a_mentions, a_positive, a_name) = key(a);
        let (b_mentions, b_positive, b_name) = key(b);
        b_mentions
            .cmp(&a_mentions)
            .then_with(|| {
                b_positive
                    .partial_cmp(&a_positive)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a_name.cmp(&b_name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CategoryScores, ItemMention, ReturnIntent, Sentiment, StaffMention,
    };
    use chrono::Utc;

    fn analysis_with_mentions(
        staff: Vec<StaffMention>,
        items: Vec<ItemMention>,
    ) -> Analysis {
        Analysis {
            review_id: "r".to_string(),
            overall_sentiment: Sentiment::Positive,
            emotion: None,
            categories: CategoryScores::default(),
            strengths: vec![],
            opportunities: vec![],
            staff_mentions: staff,
            item_mentions: items,
            severity_flags: vec![],
            return_intent: ReturnIntent::Unknown,
            model: None,
            created_at: Utc::now(),
        }
    }

    fn staff(name: &str, sentiment: Sentiment) -> StaffMention {
        StaffMention {
            name: name.to_string(),
            role: None,
            sentiment,
        }
    }

    #[test]
    fn name_normalization_groups_spellings() {
        let analyses = vec![
            analysis_with_mentions(vec![staff("Marco", Sentiment::Positive)], vec![]),
            analysis_with_mentions(vec![staff("  marco ", Sentiment::Positive)], vec![]),
            analysis_with_mentions(vec![staff("MARCO", Sentiment::Negative)], vec![]),
        ];
        let board = staff_leaderboard(&analyses);
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].mentions, 3);
        assert_eq!(board[0].positive_percent, 66.67);
    }

    #[test]
    fn equal_mention_counts_break_ties_on_positive_share() {
        let analyses = vec![
            analysis_with_mentions(
                vec![
                    staff("Ana", Sentiment::Positive),
                    staff("Ben", Sentiment::Negative),
                ],
                vec![],
            ),
            analysis_with_mentions(
                vec![
                    staff("Ana", Sentiment::Positive),
                    staff("Ben", Sentiment::Positive),
                ],
                vec![],
            ),
        ];
        let board = staff_leaderboard(&analyses);
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].name, "Ana");
        assert_eq!(board[0].positive_percent, 100.0);
        assert_eq!(board[1].name, "Ben");
        assert_eq!(board[1].positive_percent, 50.0);
    }

    #[test]
    fn mention_count_dominates_positive_share() {
        let analyses = vec![
            analysis_with_mentions(vec![staff("Ana", Sentiment::Positive)], vec![]),
            analysis_with_mentions(
                vec![
                    staff("Ben", Sentiment::Negative),
                    staff("Ana", Sentiment::Negative),
                ],
                vec![],
            ),
        ];
        let board = staff_leaderboard(&analyses);
        assert_eq!(board[0].name, "Ana");
        assert_eq!(board[0].mentions, 2);
    }

    #[test]
    fn item_leaderboard_tracks_intensity() {
        let analyses = vec![analysis_with_mentions(
            vec![],
            vec![
                ItemMention {
                    name: "Cacio e Pepe".to_string(),
                    polarity: Sentiment::Positive,
                    intensity: 5,
                },
                ItemMention {
                    name: "cacio e pepe".to_string(),
                    polarity: Sentiment::Neutral,
                    intensity: 2,
                },
            ],
        )];
        let board = item_leaderboard(&analyses);
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].mentions, 2);
        assert_eq!(board[0].positive_percent, 50.0);
        assert_eq!(board[0].avg_intensity, 3.5);
    }

    #[test]
    fn most_common_role_wins() {
        let analyses = vec![
            analysis_with_mentions(
                vec![StaffMention {
                    name: "Ana".to_string(),
                    role: Some("server".to_string()),
                    sentiment: Sentiment::Positive,
                }],
                vec![],
            ),
            analysis_with_mentions(
                vec![StaffMention {
                    name: "Ana".to_string(),
                    role: Some("server".to_string()),
                    sentiment: Sentiment::Positive,
                }],
                vec![],
            ),
            analysis_with_mentions(
                vec![StaffMention {
                    name: "Ana".to_string(),
                    role: Some("host".to_string()),
                    sentiment: Sentiment::Positive,
                }],
                vec![],
            ),
        ];
        let board = staff_leaderboard(&analyses);
        assert_eq!(board[0].role.as_deref(), Some("server"));
    }
}

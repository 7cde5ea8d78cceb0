//! Structured intelligence extracted from a single review.
//!
//! Exactly one analysis exists per review with `analysis_status = completed`;
//! the repository enforces that the row and the status transition commit
//! together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall or per-mention sentiment polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

/// Whether the reviewer signalled intent to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnIntent {
    Likely,
    Unlikely,
    Unknown,
}

impl ReturnIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Likely => "likely",
            Self::Unlikely => "unlikely",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "likely" => Some(Self::Likely),
            "unlikely" => Some(Self::Unlikely),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Operationally severe complaint classes surfaced for triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityFlag {
    Quality,
    WaitTime,
    Hygiene,
}

/// Per-category sentiment scores in [-1.0, 1.0].
///
/// A category is `None` when the review doesn't touch it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CategoryScores {
    pub food: Option<f32>,
    pub service: Option<f32>,
    pub ambience: Option<f32>,
    pub value: Option<f32>,
}

/// A staff member mentioned by name in a review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffMention {
    pub name: String,
    /// Role inferred from context (server, host, chef, ...).
    pub role: Option<String>,
    pub sentiment: Sentiment,
}

/// A menu item mentioned in a review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemMention {
    pub name: String,
    pub polarity: Sentiment,
    /// How strongly the reviewer felt about it, 1-5.
    pub intensity: i32,
}

/// Extracted intelligence for exactly one review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub review_id: String,
    pub overall_sentiment: Sentiment,
    /// Dominant emotion, free-form (delighted, frustrated, ...).
    pub emotion: Option<String>,
    pub categories: CategoryScores,
    pub strengths: Vec<String>,
    pub opportunities: Vec<String>,
    pub staff_mentions: Vec<StaffMention>,
    pub item_mentions: Vec<ItemMention>,
    pub severity_flags: Vec<SeverityFlag>,
    pub return_intent: ReturnIntent,
    /// Extraction model that produced this analysis.
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

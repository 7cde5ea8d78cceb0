//! Review model and analysis lifecycle state machine.
//!
//! Reviews are deduplicated by `(restaurant_id, platform, external_id)`;
//! the review id is derived from that key so re-ingesting the same external
//! review always addresses the same row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Review platform a review was scraped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Google,
    Opentable,
    Tripadvisor,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Opentable => "opentable",
            Self::Tripadvisor => "tripadvisor",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "google" => Some(Self::Google),
            "opentable" => Some(Self::Opentable),
            "tripadvisor" => Some(Self::Tripadvisor),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Analysis lifecycle state of a review.
///
/// Legal transitions: `pending -> processing -> {completed | failed}`.
/// `failed -> pending` only via explicit operator retry, and
/// `processing -> pending` only via the stuck-processing recovery sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether the status is terminal for the pipeline (no worker will pick
    /// the review up again without an explicit operator action).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a transition to `to` is legal.
    pub fn can_transition(&self, to: AnalysisStatus) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
                // Recovery sweep reclaims stuck workers.
                | (Self::Processing, Self::Pending)
                // Explicit operator retry.
                | (Self::Failed, Self::Pending)
        )
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the deterministic review id from the dedup key.
///
/// First 16 bytes of SHA-256 over the key parts, hex encoded.
pub fn review_id(restaurant_id: &str, platform: Platform, external_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(restaurant_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(platform.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(external_id.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// A customer review, normalized from its source platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    /// Deterministic id derived from the dedup key.
    pub id: String,
    /// Restaurant this review belongs to.
    pub restaurant_id: String,
    /// Source platform.
    pub platform: Platform,
    /// The platform's native review id.
    pub external_id: String,
    /// Star rating, 1-5.
    pub rating: i32,
    /// Review text.
    pub body: String,
    /// Reviewer display name, when the platform exposes one.
    pub author: Option<String>,
    /// When the review was posted on the platform.
    pub posted_at: DateTime<Utc>,
    /// When we first ingested it.
    pub ingested_at: DateTime<Utc>,
    /// When mutable fields were last refreshed by a re-scrape.
    pub updated_at: DateTime<Utc>,
    /// Analysis lifecycle state.
    pub analysis_status: AnalysisStatus,
    /// Claim token of the worker batch currently holding this review.
    pub claim_token: Option<String>,
    /// When the current claim was taken.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Recorded cause of the last extraction failure.
    pub failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_id_is_deterministic() {
        let a = review_id("rest-1", Platform::Google, "abc123");
        let b = review_id("rest-1", Platform::Google, "abc123");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn review_id_differs_across_platforms() {
        let a = review_id("rest-1", Platform::Google, "abc123");
        let b = review_id("rest-1", Platform::Tripadvisor, "abc123");
        assert_ne!(a, b);
    }

    #[test]
    fn forward_transitions_are_legal() {
        use AnalysisStatus::*;
        assert!(Pending.can_transition(Processing));
        assert!(Processing.can_transition(Completed));
        assert!(Processing.can_transition(Failed));
    }

    #[test]
    fn backward_transitions_are_restricted() {
        use AnalysisStatus::*;
        assert!(Failed.can_transition(Pending));
        assert!(Processing.can_transition(Pending));
        assert!(!Completed.can_transition(Pending));
        assert!(!Completed.can_transition(Processing));
        assert!(!Pending.can_transition(Completed));
        assert!(!Pending.can_transition(Failed));
        assert!(!Failed.can_transition(Processing));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            AnalysisStatus::Pending,
            AnalysisStatus::Processing,
            AnalysisStatus::Completed,
            AnalysisStatus::Failed,
        ] {
            assert_eq!(AnalysisStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(AnalysisStatus::from_str("bogus"), None);
    }
}

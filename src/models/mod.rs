//! Data models for Palate.

mod analysis;
mod review;
mod scrape_run;
mod snapshot;

pub use analysis::{
    Analysis, CategoryScores, ItemMention, ReturnIntent, Sentiment, SeverityFlag, StaffMention,
};
pub use review::{review_id, AnalysisStatus, Platform, Review};
pub use scrape_run::ScrapeRun;
pub use snapshot::{
    CategoryStats, FlavorIndexSnapshot, ItemMentionStat, StaffLeaderboardEntry, Zone,
};

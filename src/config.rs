//! Configuration management for Palate.
//!
//! Settings come from `config.toml` in the data directory, with environment
//! variables taking precedence for deploy-sensitive values
//! (`DATABASE_URL`, `PALATE_WEBHOOK_SECRET`, `PALATE_PROVIDER_TOKEN`,
//! `PALATE_EXTRACTOR_ENDPOINT`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::repository::DbContext;

/// Default database filename inside the data directory.
pub const DEFAULT_DATABASE_FILENAME: &str = "palate.sqlite";

/// Scrape provider (dataset store) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Base URL of the scrape provider API.
    pub base_url: String,
    /// API token, if the provider requires one.
    pub token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.apify.com/v2".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Extraction service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorSettings {
    /// Endpoint of the structured-extraction service.
    pub endpoint: String,
    /// Model to request.
    pub model: String,
    /// Sampling temperature (kept low for extraction stability).
    pub temperature: f32,
    /// Maximum tokens to generate per call.
    pub num_predict: u32,
    /// Hard per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            temperature: 0.1,
            num_predict: 1024,
            timeout_secs: 60,
        }
    }
}

impl ExtractorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Batch pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Reviews claimed per worker call.
    pub batch_size: usize,
    /// Concurrent worker calls per orchestration round.
    pub concurrency: usize,
    /// Cooldown between orchestration rounds, in seconds.
    pub cooldown_secs: u64,
    /// Consecutive all-error rounds before the circuit breaker halts.
    pub max_consecutive_failures: u32,
    /// Refresh the pending count (and run the stuck sweep) every N rounds.
    pub refresh_every: u32,
    /// Reviews processing longer than this are reclaimed by the sweep,
    /// in seconds.
    pub stuck_after_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            concurrency: 4,
            cooldown_secs: 2,
            max_consecutive_failures: 3,
            refresh_every: 5,
            stuck_after_secs: 600,
        }
    }
}

impl PipelineSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn stuck_after(&self) -> Duration {
        Duration::from_secs(self.stuck_after_secs)
    }
}

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    /// Set via DATABASE_URL env var or config.
    pub database_url: Option<String>,
    /// Shared secret expected on ingestion webhooks.
    pub webhook_secret: Option<String>,
    /// Address the API server binds to.
    pub bind_addr: String,
    pub provider: ProviderSettings,
    pub extractor: ExtractorSettings,
    pub pipeline: PipelineSettings,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/.local/share-ish data under the home directory.
        // Falls back gracefully: home dir -> current dir.
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("palate");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            webhook_secret: None,
            bind_addr: "127.0.0.1:8420".to_string(),
            provider: ProviderSettings::default(),
            extractor: ExtractorSettings::default(),
            pipeline: PipelineSettings::default(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            let path = self.data_dir.join(&self.database_filename);
            format!("sqlite:{}", path.display())
        }
    }

    /// Create a database context for these settings.
    pub fn db_context(&self) -> DbContext {
        DbContext::from_url(&self.database_url())
    }

    /// Path of the config file inside the data directory.
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

/// Load settings: defaults, then `config.toml` (if present), then
/// environment overrides.
pub fn load_settings(data_dir: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = match data_dir {
        Some(dir) => Settings::with_data_dir(dir.to_path_buf()),
        None => Settings::default(),
    };

    let config_path = settings.config_path();
    if config_path.exists() {
        let raw = std::fs::read_to_string(&config_path)?;
        let mut from_file: Settings = toml::from_str(&raw)?;
        // The CLI-provided data dir always wins over the file's.
        if let Some(dir) = data_dir {
            from_file.data_dir = dir.to_path_buf();
        }
        settings = from_file;
    }

    if let Ok(url) = std::env::var("DATABASE_URL") {
        if !url.is_empty() {
            settings.database_url = Some(url);
        }
    }
    if let Ok(secret) = std::env::var("PALATE_WEBHOOK_SECRET") {
        if !secret.is_empty() {
            settings.webhook_secret = Some(secret);
        }
    }
    if let Ok(token) = std::env::var("PALATE_PROVIDER_TOKEN") {
        if !token.is_empty() {
            settings.provider.token = Some(token);
        }
    }
    if let Ok(endpoint) = std::env::var("PALATE_EXTRACTOR_ENDPOINT") {
        if !endpoint.is_empty() {
            settings.extractor.endpoint = endpoint;
        }
    }

    Ok(settings)
}

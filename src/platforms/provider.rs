//! Client for the external scrape-result store.
//!
//! The same provider that sends scrape-completion notifications hosts the
//! dataset items; this client fetches an item list (and count) by dataset
//! handle. Read-only.

use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::config::ProviderSettings;

/// Errors from the scrape provider API.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid provider URL: {0}")]
    InvalidUrl(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("provider API error: HTTP {0}")]
    Api(reqwest::StatusCode),
    #[error("failed to parse provider response: {0}")]
    Parse(String),
}

/// Client for fetching scraped review items from the provider.
pub struct ScrapeProviderClient {
    settings: ProviderSettings,
    client: Client,
}

impl ScrapeProviderClient {
    /// Create a new provider client.
    pub fn new(settings: ProviderSettings) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self { settings, client })
    }

    fn dataset_url(&self, dataset_handle: &str, suffix: &str) -> Result<Url, ProviderError> {
        let base = self
            .settings
            .base_url
            .strip_suffix('/')
            .unwrap_or(&self.settings.base_url);
        let mut url = Url::parse(&format!("{}/datasets/{}{}", base, dataset_handle, suffix))
            .map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;
        if let Some(ref token) = self.settings.token {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url)
    }

    /// Fetch the full item list for a dataset.
    pub async fn fetch_items(
        &self,
        dataset_handle: &str,
    ) -> Result<Vec<serde_json::Value>, ProviderError> {
        let mut url = self.dataset_url(dataset_handle, "/items")?;
        url.query_pairs_mut().append_pair("format", "json");

        debug!("Fetching dataset items: {}", dataset_handle);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ProviderError::Api(resp.status()));
        }

        resp.json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    /// Fetch the provider-reported item count for a dataset.
    pub async fn item_count(&self, dataset_handle: &str) -> Result<u64, ProviderError> {
        let url = self.dataset_url(dataset_handle, "")?;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ProviderError::Api(resp.status()));
        }

        #[derive(serde::Deserialize)]
        struct DatasetInfo {
            data: DatasetData,
        }

        #[derive(serde::Deserialize)]
        struct DatasetData {
            #[serde(rename = "itemCount")]
            item_count: u64,
        }

        let info: DatasetInfo = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(info.data.item_count)
    }
}

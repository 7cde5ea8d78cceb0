//! AI extraction client for review intelligence.
//!
//! Calls an Ollama-compatible structured-output endpoint, one call per
//! review, with a fixed output schema and a hard per-call timeout. A
//! response that does not conform to the schema is a failure, never
//! partially accepted.

mod prompts;
mod schema;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ExtractorSettings;
use crate::models::Review;

pub use schema::{output_schema, ExtractionPayload};

/// Errors from one extraction call.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// Failed to reach the extraction service.
    #[error("connection error: {0}")]
    Connection(String),
    /// The call exceeded its hard timeout.
    #[error("extraction call timed out")]
    Timeout,
    /// Service returned a non-success status.
    #[error("API error: {0}")]
    Api(String),
    /// Response body was not readable as the service's envelope.
    #[error("parse error: {0}")]
    Parse(String),
    /// Response arrived but does not conform to the output schema.
    /// Carries the raw model output for operator diagnosis.
    #[error("schema validation failed: {reason}")]
    Schema { reason: String, raw: String },
}

impl ExtractionError {
    /// Short machine-readable cause tag recorded on failed reviews.
    pub fn cause_tag(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Timeout => "timeout",
            Self::Api(_) => "api",
            Self::Parse(_) => "parse",
            Self::Schema { .. } => "schema",
        }
    }
}

/// A structured-extraction backend.
///
/// The worker is written against this seam so tests can substitute a
/// scripted backend for the real HTTP client.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract structured intelligence from one review.
    async fn extract(&self, review: &Review) -> Result<ExtractionPayload, ExtractionError>;

    /// Model identifier recorded on produced analyses.
    fn model(&self) -> &str;
}

/// HTTP client for the extraction service.
pub struct ExtractionClient {
    settings: ExtractorSettings,
    client: Client,
}

/// Generate API request format.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    /// Structured-output constraint: the JSON schema the response must
    /// satisfy.
    format: serde_json::Value,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

/// Generate API response format.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[allow(dead_code)]
    done: bool,
}

impl ExtractionClient {
    /// Create a new extraction client.
    pub fn new(settings: ExtractorSettings) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self { settings, client })
    }

    /// Check if the extraction service is reachable.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.settings.endpoint);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn call_service(&self, prompt: String) -> Result<String, ExtractionError> {
        let url = format!("{}/api/generate", self.settings.endpoint);
        let request = GenerateRequest {
            model: &self.settings.model,
            prompt,
            stream: false,
            format: output_schema(),
            options: GenerateOptions {
                temperature: self.settings.temperature,
                num_predict: self.settings.num_predict,
            },
        };

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractionError::Timeout
                } else {
                    ExtractionError::Connection(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(ExtractionError::Api(format!("HTTP {}", resp.status())));
        }

        let body: GenerateResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                ExtractionError::Timeout
            } else {
                ExtractionError::Parse(e.to_string())
            }
        })?;

        Ok(body.response)
    }
}

#[async_trait]
impl Extractor for ExtractionClient {
    async fn extract(&self, review: &Review) -> Result<ExtractionPayload, ExtractionError> {
        let prompt = prompts::extraction_prompt(review);

        debug!("Extracting review {}", review.id);
        let raw = self.call_service(prompt).await?;

        ExtractionPayload::from_response(&raw)
    }

    fn model(&self) -> &str {
        &self.settings.model
    }
}

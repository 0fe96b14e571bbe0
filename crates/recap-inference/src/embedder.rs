//! HTTP embedding client.

use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use reqwest::Client;
use tracing::debug;

use recap_core::defaults::{EMBED_DIMENSION, EMBED_TIMEOUT_SECS};
use recap_core::{Embedder, Error, Result};

use crate::types::{EmbeddingRequest, EmbeddingResponse};

/// Default embedding model name.
pub const DEFAULT_EMBED_MODEL: &str = "all-MiniLM-L6-v2";

/// Configuration for the HTTP embedder.
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    /// Base URL of the OpenAI-compatible endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    /// Embedding model name.
    pub model: String,
    /// Expected vector dimension.
    pub dimension: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            base_url: recap_core::defaults::GATEWAY_URL.to_string(),
            api_key: None,
            model: DEFAULT_EMBED_MODEL.to_string(),
            dimension: EMBED_DIMENSION,
            timeout_secs: EMBED_TIMEOUT_SECS,
        }
    }
}

impl EmbedderConfig {
    /// Create from environment variables.
    ///
    /// Reads `EMBED_URL`, `EMBED_API_KEY`, `EMBED_MODEL`, and `EMBED_DIM`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("EMBED_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("EMBED_API_KEY").ok(),
            model: std::env::var("EMBED_MODEL").unwrap_or(defaults.model),
            dimension: std::env::var("EMBED_DIM")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.dimension),
            timeout_secs: defaults.timeout_secs,
        }
    }
}

/// HTTP implementation of [`Embedder`] against an OpenAI-compatible
/// embeddings endpoint.
pub struct HttpEmbedder {
    client: Client,
    config: EmbedderConfig,
}

impl HttpEmbedder {
    /// Create a new embedder with the given configuration.
    pub fn new(config: EmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Embedding(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(EmbedderConfig::from_env())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vector> {
        let url = format!(
            "{}/embeddings",
            self.config.base_url.trim_end_matches('/')
        );

        let request = EmbeddingRequest {
            model: self.config.model.clone(),
            input: vec![text.to_string()],
            encoding_format: Some("float".to_string()),
        };

        let mut req = self.client.post(&url).json(&request);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Embedding(format!(
                "Embeddings endpoint returned {}",
                response.status()
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {e}")))?;

        let data = result
            .data
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("Embeddings response was empty".to_string()))?;

        if data.embedding.len() != self.config.dimension {
            return Err(Error::Embedding(format!(
                "Expected dimension {}, got {}",
                self.config.dimension,
                data.embedding.len()
            )));
        }

        debug!(
            subsystem = "inference",
            component = "embedder",
            op = "embed",
            model = %self.config.model,
            text_len = text.len(),
            "Embedded text"
        );

        Ok(Vector::from(data.embedding))
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

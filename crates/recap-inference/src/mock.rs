//! Deterministic mock implementations for testing.
//!
//! [`MockLlmGateway`] records every call in order, so tests can assert not
//! only what was asked of the gateway but in which sequence. A configurable
//! failure marker turns calls for specific content into errors, which is how
//! worker tests poison one task in a batch.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use recap_inference::mock::MockLlmGateway;
//!
//! let gateway = MockLlmGateway::new()
//!     .with_summary_response("A short summary")
//!     .with_failure_marker("POISON");
//!
//! let summary = gateway.generate_content("text", "model-a", "Summarize").await?;
//! assert_eq!(gateway.generate_call_count(), 1);
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pgvector::Vector;

use recap_core::{Embedder, Error, ExtractedMetadata, LlmGateway, Result};

/// A single recorded gateway call.
#[derive(Debug, Clone)]
pub struct MockCall {
    /// "generate_content" or "extract_metadata".
    pub operation: String,
    pub model: String,
    pub content: String,
}

#[derive(Debug, Clone)]
struct MockGatewayConfig {
    summary_response: String,
    metadata_response: ExtractedMetadata,
    models: Vec<String>,
    /// Calls whose content contains this marker fail.
    failure_marker: Option<String>,
}

impl Default for MockGatewayConfig {
    fn default() -> Self {
        Self {
            summary_response: "Mock summary".to_string(),
            metadata_response: ExtractedMetadata {
                date: "2024-01-01".to_string(),
                keywords: vec!["mock".to_string()],
                title: None,
            },
            models: vec!["mock-model-a".to_string(), "mock-model-b".to_string()],
            failure_marker: None,
        }
    }
}

/// Mock LLM gateway for deterministic testing.
#[derive(Clone)]
pub struct MockLlmGateway {
    config: Arc<MockGatewayConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl Default for MockLlmGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmGateway {
    /// Create a new mock gateway with default responses.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockGatewayConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the fixed summary response.
    pub fn with_summary_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).summary_response = response.into();
        self
    }

    /// Set the fixed metadata response.
    pub fn with_metadata_response(mut self, metadata: ExtractedMetadata) -> Self {
        Arc::make_mut(&mut self.config).metadata_response = metadata;
        self
    }

    /// Set the advertised model list.
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        Arc::make_mut(&mut self.config).models = models;
        self
    }

    /// Fail any call whose content contains `marker`.
    pub fn with_failure_marker(mut self, marker: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).failure_marker = Some(marker.into());
        self
    }

    /// Get all logged calls, in call order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.call_log.lock().unwrap().clear()
    }

    /// Number of generate_content calls so far.
    pub fn generate_call_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.operation == "generate_content")
            .count()
    }

    /// Number of extract_metadata calls so far.
    pub fn metadata_call_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.operation == "extract_metadata")
            .count()
    }

    fn log_call(&self, operation: &str, model: &str, content: &str) {
        self.call_log.lock().unwrap().push(MockCall {
            operation: operation.to_string(),
            model: model.to_string(),
            content: content.to_string(),
        });
    }

    fn check_failure(&self, content: &str) -> Result<()> {
        if let Some(marker) = &self.config.failure_marker {
            if content.contains(marker.as_str()) {
                return Err(Error::Inference("simulated gateway failure".to_string()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LlmGateway for MockLlmGateway {
    async fn generate_content(&self, content: &str, model: &str, _prompt: &str) -> Result<String> {
        self.log_call("generate_content", model, content);
        self.check_failure(content)?;
        // Model name in the output lets tests tell phases apart.
        Ok(format!("{} [{model}]", self.config.summary_response))
    }

    async fn extract_metadata(
        &self,
        content: &str,
        model: &str,
        _prompt: &str,
    ) -> Result<ExtractedMetadata> {
        self.log_call("extract_metadata", model, content);
        self.check_failure(content)?;
        Ok(self.config.metadata_response.clone())
    }

    async fn list_models(&self) -> Vec<String> {
        self.config.models.clone()
    }
}

/// Mock embedder producing deterministic vectors from text content.
#[derive(Clone)]
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    /// Create a mock embedder with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Generate a normalized deterministic vector for `text`.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let mut values = vec![0.0f32; dimension];
        for (i, byte) in text.bytes().enumerate() {
            values[i % dimension] += byte as f32 / 255.0;
        }

        let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        values
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(recap_core::defaults::EMBED_DIMENSION)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vector> {
        Ok(Vector::from(Self::generate(text, self.dimension)))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

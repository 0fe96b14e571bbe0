//! OpenAI-compatible LLM gateway client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use recap_core::defaults::{
    FALLBACK_MODELS, GATEWAY_URL, GENERATE_TEMPERATURE, GENERATE_TIMEOUT_SECS,
    METADATA_TEMPERATURE, METADATA_TIMEOUT_SECS,
};
use recap_core::{Error, ExtractedMetadata, LlmGateway, Result};

use crate::types::*;

/// Instruction appended to metadata-extraction prompts so the model returns
/// the fixed record shape.
const METADATA_INSTRUCTION: &str = "Return ONLY a JSON object with 'date' \
     (YYYY-MM-DD or similar) and 'keywords' (list of strings).";

/// Configuration for the HTTP gateway client.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the OpenAI-compatible endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    /// Timeout for metadata-extraction requests in seconds.
    pub metadata_timeout_secs: u64,
    /// Timeout for content-generation requests in seconds. Generation runs
    /// much longer than extraction, hence the separate budget.
    pub generate_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: GATEWAY_URL.to_string(),
            api_key: None,
            metadata_timeout_secs: METADATA_TIMEOUT_SECS,
            generate_timeout_secs: GENERATE_TIMEOUT_SECS,
        }
    }
}

impl GatewayConfig {
    /// Create from environment variables.
    ///
    /// Reads `LLM_GATEWAY_URL`, `LLM_GATEWAY_API_KEY`,
    /// `LLM_GATEWAY_METADATA_TIMEOUT`, and `LLM_GATEWAY_GENERATE_TIMEOUT`.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("LLM_GATEWAY_URL")
                .unwrap_or_else(|_| GATEWAY_URL.to_string()),
            api_key: std::env::var("LLM_GATEWAY_API_KEY").ok(),
            metadata_timeout_secs: std::env::var("LLM_GATEWAY_METADATA_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(METADATA_TIMEOUT_SECS),
            generate_timeout_secs: std::env::var("LLM_GATEWAY_GENERATE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(GENERATE_TIMEOUT_SECS),
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// HTTP implementation of [`LlmGateway`] against an OpenAI-compatible API.
pub struct HttpLlmGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpLlmGateway {
    /// Create a new gateway client with the given configuration.
    ///
    /// The client carries no global timeout; each request sets its own
    /// budget from the config.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {e}")))?;

        info!(
            subsystem = "inference",
            component = "gateway",
            base_url = %config.base_url,
            "Initializing LLM gateway client"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(GatewayConfig::from_env())
    }

    /// Get the current configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {api_key}"));
        }

        req.header("Content-Type", "application/json")
    }

    /// Send a chat completion and return the first choice's content.
    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
        timeout: Duration,
    ) -> Result<String> {
        let response = self
            .build_request("/chat/completions")
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = match response.json::<GatewayErrorResponse>().await {
                Ok(body) => body.error.message,
                Err(_) => "Unknown error".to_string(),
            };
            return Err(Error::Inference(format!(
                "Gateway returned {status}: {message}"
            )));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {e}")))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::Inference("Gateway response contained no choices".to_string()))
    }
}

#[async_trait]
impl LlmGateway for HttpLlmGateway {
    async fn generate_content(&self, content: &str, model: &str, prompt: &str) -> Result<String> {
        debug!(
            subsystem = "inference",
            component = "gateway",
            op = "generate_content",
            model = %model,
            content_len = content.len(),
            "Generating content"
        );

        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: format!("{prompt}\n\nContent:\n{content}"),
            }],
            temperature: Some(GENERATE_TEMPERATURE),
            response_format: None,
        };

        self.chat_completion(&request, Duration::from_secs(self.config.generate_timeout_secs))
            .await
    }

    async fn extract_metadata(
        &self,
        content: &str,
        model: &str,
        prompt: &str,
    ) -> Result<ExtractedMetadata> {
        debug!(
            subsystem = "inference",
            component = "gateway",
            op = "extract_metadata",
            model = %model,
            content_len = content.len(),
            "Extracting metadata"
        );

        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: format!("{prompt}\n\nContent:\n{content}\n\n{METADATA_INSTRUCTION}"),
            }],
            temperature: Some(METADATA_TEMPERATURE),
            response_format: Some(ResponseFormat::json_object()),
        };

        let raw = self
            .chat_completion(&request, Duration::from_secs(self.config.metadata_timeout_secs))
            .await?;

        // A reachable gateway that returns non-JSON degrades to a
        // placeholder record instead of failing the task.
        match serde_json::from_str::<ExtractedMetadata>(&raw) {
            Ok(metadata) => Ok(metadata),
            Err(e) => {
                warn!(
                    subsystem = "inference",
                    component = "gateway",
                    op = "extract_metadata",
                    model = %model,
                    error = %e,
                    "Metadata response was not valid JSON, using placeholder"
                );
                Ok(ExtractedMetadata::placeholder())
            }
        }
    }

    async fn list_models(&self) -> Vec<String> {
        let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));
        let mut req = self.client.get(&url).timeout(Duration::from_secs(10));

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {api_key}"));
        }

        let fallback = || FALLBACK_MODELS.iter().map(|m| m.to_string()).collect();

        let response = match req.send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(
                    subsystem = "inference",
                    component = "gateway",
                    op = "list_models",
                    status = %response.status(),
                    "Models endpoint returned an error, using fallback list"
                );
                return fallback();
            }
            Err(e) => {
                warn!(
                    subsystem = "inference",
                    component = "gateway",
                    op = "list_models",
                    error = %e,
                    "Models endpoint unreachable, using fallback list"
                );
                return fallback();
            }
        };

        match response.json::<ModelsResponse>().await {
            Ok(models) => models.data.into_iter().map(|m| m.id).collect(),
            Err(e) => {
                warn!(
                    subsystem = "inference",
                    component = "gateway",
                    op = "list_models",
                    error = %e,
                    "Failed to parse models response, using fallback list"
                );
                fallback()
            }
        }
    }
}

//! # recap-inference
//!
//! LLM gateway and embedding client for recap.
//!
//! This crate provides:
//! - HTTP client for OpenAI-compatible chat completion endpoints
//! - Metadata extraction with placeholder fallback on malformed responses
//! - Model discovery with a static fallback list
//! - HTTP embedding client
//! - Deterministic mock gateway and embedder for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use recap_core::LlmGateway;
//! use recap_inference::HttpLlmGateway;
//!
//! #[tokio::main]
//! async fn main() {
//!     let gateway = HttpLlmGateway::from_env().unwrap();
//!     let models = gateway.list_models().await;
//!     println!("available models: {models:?}");
//! }
//! ```

pub mod embedder;
pub mod gateway;
pub mod mock;
pub mod types;

// Re-export core types
pub use recap_core::*;

pub use embedder::{EmbedderConfig, HttpEmbedder, DEFAULT_EMBED_MODEL};
pub use gateway::{GatewayConfig, HttpLlmGateway};
pub use mock::{MockEmbedder, MockLlmGateway};

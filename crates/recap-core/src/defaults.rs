//! Centralized default constants for the recap pipeline.
//!
//! **This module is the single source of truth** for shared default values.
//! All crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// EMBEDDING
// =============================================================================

/// Embedding vector dimension stored in the document table.
pub const EMBED_DIMENSION: usize = 384;

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// GATEWAY
// =============================================================================

/// Default OpenAI-compatible gateway base URL.
pub const GATEWAY_URL: &str = "http://localhost:8080/v1";

/// Timeout for metadata-extraction requests in seconds.
pub const METADATA_TIMEOUT_SECS: u64 = 60;

/// Timeout for content-generation requests in seconds.
pub const GENERATE_TIMEOUT_SECS: u64 = 180;

/// Sampling temperature for content generation.
pub const GENERATE_TEMPERATURE: f32 = 0.3;

/// Sampling temperature for metadata extraction (near-deterministic).
pub const METADATA_TEMPERATURE: f32 = 0.1;

/// Fallback model list when the gateway's `/models` endpoint is unreachable.
pub const FALLBACK_MODELS: &[&str] = &["Qwen3-80b-Instruct", "llama-3-8b"];

// =============================================================================
// WORKER
// =============================================================================

/// Poll interval in milliseconds when the queue is empty.
pub const WORKER_POLL_INTERVAL_MS: u64 = 2_000;

/// Backoff in milliseconds after an iteration-level store failure.
pub const WORKER_ERROR_BACKOFF_MS: u64 = 5_000;

/// Broadcast channel capacity for worker events.
pub const EVENT_BUS_CAPACITY: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_timeout_exceeds_metadata_timeout() {
        const {
            assert!(GENERATE_TIMEOUT_SECS > METADATA_TIMEOUT_SECS);
        }
    }

    #[test]
    fn metadata_temperature_stricter_than_generation() {
        let diff = GENERATE_TEMPERATURE - METADATA_TEMPERATURE;
        assert!(diff > 0.0);
    }

    #[test]
    fn fallback_models_not_empty() {
        assert!(!FALLBACK_MODELS.is_empty());
    }
}

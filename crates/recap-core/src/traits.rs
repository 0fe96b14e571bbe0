//! Repository and service traits.
//!
//! These traits are the seams between storage, inference, and the worker.
//! Production code wires Postgres-backed repositories and an HTTP gateway;
//! tests substitute in-memory and mock implementations, so every collaborator
//! is injected explicitly rather than reached through globals.

use async_trait::async_trait;
use pgvector::Vector;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    DocLevel, Document, DocumentFilter, ExtractedMetadata, ProcessingTask, ScoredDocument,
    TaskConfig, TaskStatus, TaskUpdate, UpsertDocumentRequest,
};

/// Durable document storage with mutual summary/source links.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a document, or replace its mutable fields if the id exists.
    ///
    /// On replace, an absent embedding keeps the previously stored vector,
    /// and the link sets and `created_at` are untouched.
    async fn upsert(&self, request: UpsertDocumentRequest) -> Result<Document>;

    /// Fetch a document by id.
    async fn get(&self, id: Uuid) -> Result<Option<Document>>;

    /// Remove a document. Returns `false` if the id was absent.
    ///
    /// Dangling references in other documents' link sets are left in place;
    /// readers must tolerate ids that no longer resolve.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// List documents matching all set filters, newest first.
    async fn search(&self, filter: &DocumentFilter) -> Result<Vec<Document>>;

    /// The `limit` documents closest to `query` by cosine distance,
    /// most similar first. Documents without an embedding never match.
    async fn nearest_by_embedding(
        &self,
        query: &Vector,
        limit: i64,
        category: Option<&str>,
        level: Option<DocLevel>,
    ) -> Result<Vec<ScoredDocument>>;

    /// Record mutually that `summary_id` summarizes `source_id`.
    ///
    /// Adds `summary_id` to the source's summary set and `source_id` to the
    /// summary's source set. Idempotent: linking twice stores each id once.
    async fn link(&self, source_id: Uuid, summary_id: Uuid) -> Result<()>;

    /// Remove `summary_id` from `source_id`'s summary set.
    ///
    /// Deliberately one-sided: the summary's own source set is NOT updated,
    /// so it still records what it was derived from.
    async fn unlink_summary(&self, source_id: Uuid, summary_id: Uuid) -> Result<()>;

    /// Empty `source_id`'s summary set. One-sided like `unlink_summary`.
    async fn clear_summaries(&self, source_id: Uuid) -> Result<()>;
}

/// Persistent task queue keyed by document id.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Create a task in `created` status, or reset an existing one.
    ///
    /// On conflict the status returns to `created` and `config` is replaced
    /// wholesale; prior `results` are kept until processing overwrites them.
    async fn enqueue(&self, doc_id: Uuid, config: &TaskConfig) -> Result<ProcessingTask>;

    /// Apply a partial update. `results` merges field by field into the
    /// stored record; `config` replaces it. Bumps `updated_at`.
    async fn update(&self, doc_id: Uuid, update: &TaskUpdate) -> Result<ProcessingTask>;

    /// Fetch a task by document id.
    async fn get(&self, doc_id: Uuid) -> Result<Option<ProcessingTask>>;

    /// List tasks in a given status, oldest first (FIFO).
    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<ProcessingTask>>;

    /// Remove a task. Returns `false` if absent.
    async fn delete(&self, doc_id: Uuid) -> Result<bool>;

    /// Move every `created` task to `queued`, attaching `config` to each.
    /// Returns the number of tasks released to the worker.
    async fn configure_created(&self, config: &TaskConfig) -> Result<u64>;
}

/// LLM gateway for summary generation and metadata extraction.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Generate text from `content` under `prompt` using `model`.
    /// Transport failures and timeouts are errors.
    async fn generate_content(&self, content: &str, model: &str, prompt: &str) -> Result<String>;

    /// Extract structured metadata from `content` using `model`.
    ///
    /// Transport failures and timeouts are errors, but a response that is
    /// not parseable metadata yields [`ExtractedMetadata::placeholder`].
    async fn extract_metadata(
        &self,
        content: &str,
        model: &str,
        prompt: &str,
    ) -> Result<ExtractedMetadata>;

    /// Model names the gateway advertises, or a static fallback list when
    /// the gateway cannot be reached.
    async fn list_models(&self) -> Vec<String>;
}

/// Text embedding service producing fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vector>;

    /// Dimension of produced vectors.
    fn dimension(&self) -> usize;
}

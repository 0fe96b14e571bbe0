//! Core data models for the recap pipeline.
//!
//! Two entities cross crate boundaries: [`Document`] (the durable record of
//! ingested text and its mutual summary/source links) and [`ProcessingTask`]
//! (one queued enrichment job per document). Task `config` and `results` are
//! fixed-field records persisted as JSONB; only the document `metadata` map
//! stays schema-free.

use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{Error, Result};

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Structural document tier.
///
/// `L0` is raw source text, `L1` a first-level summary. `L2`/`L3` are
/// reserved for future higher aggregation. The tier determines the
/// summary/source role of a document, not its user-facing category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocLevel {
    L0,
    L1,
    L2,
    L3,
}

impl DocLevel {
    /// Integer representation stored in the database.
    pub fn as_i16(self) -> i16 {
        match self {
            DocLevel::L0 => 0,
            DocLevel::L1 => 1,
            DocLevel::L2 => 2,
            DocLevel::L3 => 3,
        }
    }

    /// Convert from the stored integer. Unknown values fall back to `L0`.
    pub fn from_i16(v: i16) -> Self {
        match v {
            1 => DocLevel::L1,
            2 => DocLevel::L2,
            3 => DocLevel::L3,
            _ => DocLevel::L0,
        }
    }
}

impl std::fmt::Display for DocLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocLevel::L0 => write!(f, "l0"),
            DocLevel::L1 => write!(f, "l1"),
            DocLevel::L2 => write!(f, "l2"),
            DocLevel::L3 => write!(f, "l3"),
        }
    }
}

/// A stored document with its mutual summary/source link sets.
#[derive(Debug, Clone)]
pub struct Document {
    /// Time-ordered (UUIDv7) primary key, immutable.
    pub id: Uuid,
    /// Short display label.
    pub title: Option<String>,
    /// Free-form user-facing tag; not structural.
    pub category: String,
    /// Structural tier (summary/source role).
    pub level: DocLevel,
    /// Open key-value map. Callers read well-known keys (`date`,
    /// `keywords`, `title`, `parent_id`) by convention only.
    pub metadata: JsonValue,
    /// Full text body.
    pub content: String,
    /// Ids of documents that summarize this one.
    pub summary_uuids: Vec<Uuid>,
    /// Ids of documents this one summarizes.
    pub source_uuids: Vec<Uuid>,
    /// Optional fixed-dimension embedding vector.
    pub embedding: Option<Vector>,
    /// Immutable creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Request for inserting or replacing a document.
///
/// An absent `embedding` must NOT erase a previously stored one; the store
/// keeps the old vector in that case ("replace only if present").
#[derive(Debug, Clone)]
pub struct UpsertDocumentRequest {
    pub id: Uuid,
    pub title: Option<String>,
    pub category: String,
    pub level: DocLevel,
    pub metadata: JsonValue,
    pub content: String,
    pub embedding: Option<Vector>,
}

/// Filter for document search. All set filters are ANDed.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    /// Case-insensitive substring match over content.
    pub text: Option<String>,
    pub category: Option<String>,
    pub level: Option<DocLevel>,
    pub id: Option<Uuid>,
    /// Exact-equality filters on metadata keys (string comparison).
    pub metadata: Vec<(String, String)>,
}

/// A document annotated with cosine similarity to a query vector.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    /// `1 - cosineDistance(query, candidate)`; higher is closer.
    pub similarity: f64,
}

// =============================================================================
// PROCESSING TASKS
// =============================================================================

/// Status of a processing task.
///
/// `Done` and `Failed` are terminal for automatic processing but remain
/// queryable and purgeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "queued")]
    Queued,
    #[serde(rename = "processing_l")]
    ProcessingLeft,
    #[serde(rename = "processing_r")]
    ProcessingRight,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "failed")]
    Failed,
}

impl TaskStatus {
    /// String representation stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::Queued => "queued",
            TaskStatus::ProcessingLeft => "processing_l",
            TaskStatus::ProcessingRight => "processing_r",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    /// Convert from the stored string. Unknown values fall back to `Created`.
    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "created" => TaskStatus::Created,
            "queued" => TaskStatus::Queued,
            "processing_l" => TaskStatus::ProcessingLeft,
            "processing_r" => TaskStatus::ProcessingRight,
            "done" => TaskStatus::Done,
            "failed" => TaskStatus::Failed,
            _ => TaskStatus::Created, // fallback
        }
    }

    /// Whether the worker considers this task mid-phase.
    pub fn is_processing(self) -> bool {
        matches!(self, TaskStatus::ProcessingLeft | TaskStatus::ProcessingRight)
    }

    /// Whether automatic processing has finished with this task.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing phase: one full pass over a batch with a single model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Left,
    Right,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Left => write!(f, "left"),
            Phase::Right => write!(f, "right"),
        }
    }
}

/// Job parameters attached to a task.
///
/// Replaced wholesale on re-enqueue. Fields are optional because ingestion
/// enqueues bare tasks first and an operator attaches models/prompts later;
/// the worker validates presence at the point of use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_l: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_r: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_meta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl TaskConfig {
    /// Model name for the given phase, or a config error naming the gap.
    pub fn model_for(&self, phase: Phase) -> Result<&str> {
        let (field, name) = match phase {
            Phase::Left => (&self.model_l, "model_l"),
            Phase::Right => (&self.model_r, "model_r"),
        };
        field
            .as_deref()
            .ok_or_else(|| Error::Config(format!("{name} not set")))
    }

    /// Metadata-extraction prompt, or a config error.
    pub fn prompt_meta(&self) -> Result<&str> {
        self.prompt_meta
            .as_deref()
            .ok_or_else(|| Error::Config("prompt_meta not set".to_string()))
    }

    /// Summary-generation prompt, or a config error.
    pub fn prompt_summary(&self) -> Result<&str> {
        self.prompt_summary
            .as_deref()
            .ok_or_else(|| Error::Config("prompt_summary not set".to_string()))
    }
}

/// Metadata extracted from a document by an LLM.
///
/// Parsing is lenient: missing fields take low-confidence defaults so a
/// partially well-formed gateway response still yields a usable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    #[serde(default = "unknown_date")]
    pub date: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

fn unknown_date() -> String {
    "unknown".to_string()
}

impl ExtractedMetadata {
    /// Low-confidence placeholder used when a gateway response cannot be
    /// parsed at all.
    pub fn placeholder() -> Self {
        Self {
            date: unknown_date(),
            keywords: Vec::new(),
            title: None,
        }
    }
}

/// Accumulated task output.
///
/// Updates MERGE into the stored record field by field rather than
/// replacing it, so phase-2 results land next to phase-1 results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_l: Option<ExtractedMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum_l: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_r: Option<ExtractedMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum_r: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResults {
    /// Merge a patch into this record. Only fields present in the patch
    /// overwrite; absent fields keep their current value.
    pub fn merge(&mut self, patch: TaskResults) {
        if patch.meta_l.is_some() {
            self.meta_l = patch.meta_l;
        }
        if patch.sum_l.is_some() {
            self.sum_l = patch.sum_l;
        }
        if patch.meta_r.is_some() {
            self.meta_r = patch.meta_r;
        }
        if patch.sum_r.is_some() {
            self.sum_r = patch.sum_r;
        }
        if patch.error.is_some() {
            self.error = patch.error;
        }
    }

    /// Patch carrying only an error message.
    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Whether both phases have produced all four outputs.
    pub fn is_complete(&self) -> bool {
        self.meta_l.is_some()
            && self.sum_l.is_some()
            && self.meta_r.is_some()
            && self.sum_r.is_some()
    }
}

/// One processing task per document id.
#[derive(Debug, Clone)]
pub struct ProcessingTask {
    /// Foreign reference to exactly one document; primary key.
    pub doc_id: Uuid,
    pub status: TaskStatus,
    pub config: TaskConfig,
    pub results: TaskResults,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial patch for a task. Only provided fields are written; `results`
/// merges into the stored map, `config` replaces it wholesale.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub results: Option<TaskResults>,
    pub config: Option<TaskConfig>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_results(mut self, results: TaskResults) -> Self {
        self.results = Some(results);
        self
    }
}

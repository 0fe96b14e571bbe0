//! Structured logging field name constants for recap.
//!
//! All crates use these constants for consistent structured logging fields
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), batch completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "inference", "worker"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "documents", "tasks", "gateway"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "upsert", "enqueue", "extract_metadata", "process_batch"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Document UUID being operated on.
pub const DOC_ID: &str = "doc_id";

/// Task status enum variant.
pub const TASK_STATUS: &str = "status";

/// Processing phase ("left" or "right").
pub const PHASE: &str = "phase";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of tasks in the current batch snapshot.
pub const BATCH_SIZE: &str = "batch_size";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

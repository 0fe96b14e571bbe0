//! # recap-worker
//!
//! Two-phase batch enrichment worker for recap.
//!
//! The worker drains the processing task queue: each batch of queued tasks
//! is run through metadata extraction and summary generation twice, once
//! per configured model, with a phase barrier between the two passes.

pub mod worker;

// Re-export core types
pub use recap_core::*;

pub use worker::{PipelineWorker, WorkerConfig, WorkerEvent, WorkerHandle};

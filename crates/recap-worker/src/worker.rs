//! Two-phase enrichment worker.
//!
//! The worker is the single consumer of the task queue. Each iteration it
//! snapshots every `queued` task and runs the batch through two phases:
//! first every task is enriched with the left model, then every task with
//! the right model. The phase barrier means no task starts phase 2 before
//! the whole batch finishes phase 1, which keeps gateway load grouped per
//! model.
//!
//! Failure handling follows a strict split: a gateway or config problem
//! fails only the task it belongs to, while a repository error aborts the
//! batch and bubbles to the run loop, which backs off and retries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use recap_core::defaults::{EVENT_BUS_CAPACITY, WORKER_ERROR_BACKOFF_MS, WORKER_POLL_INTERVAL_MS};
use recap_core::{
    DocumentRepository, Error, LlmGateway, Phase, ProcessingTask, Result, TaskRepository,
    TaskResults, TaskStatus, TaskUpdate,
};

/// Configuration for the pipeline worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Backoff in milliseconds after a repository error.
    pub error_backoff_ms: u64,
    /// Whether to enable task processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: WORKER_POLL_INTERVAL_MS,
            error_backoff_ms: WORKER_ERROR_BACKOFF_MS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WORKER_ENABLED` | `true` | Enable/disable task processing |
    /// | `WORKER_POLL_INTERVAL_MS` | `2000` | Polling interval when queue is empty |
    /// | `WORKER_ERROR_BACKOFF_MS` | `5000` | Backoff after a repository error |
    pub fn from_env() -> Self {
        let enabled = std::env::var("WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let poll_interval_ms = std::env::var("WORKER_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(WORKER_POLL_INTERVAL_MS);

        let error_backoff_ms = std::env::var("WORKER_ERROR_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(WORKER_ERROR_BACKOFF_MS);

        Self {
            poll_interval_ms,
            error_backoff_ms,
            enabled,
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the error backoff.
    pub fn with_error_backoff(mut self, ms: u64) -> Self {
        self.error_backoff_ms = ms;
        self
    }

    /// Enable or disable task processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the pipeline worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Worker started.
    WorkerStarted,
    /// A batch snapshot was taken and processing begins.
    BatchStarted { count: usize },
    /// A task finished both phases.
    TaskCompleted { doc_id: Uuid },
    /// A task failed in either phase.
    TaskFailed { doc_id: Uuid, error: String },
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Pipeline worker that drains the task queue in two-phase batches.
///
/// All collaborators are injected, so tests drive the worker directly with
/// in-memory repositories and a mock gateway via [`PipelineWorker::process_batch`]
/// and [`PipelineWorker::recover_interrupted`], without the poll loop.
pub struct PipelineWorker {
    documents: Arc<dyn DocumentRepository>,
    tasks: Arc<dyn TaskRepository>,
    gateway: Arc<dyn LlmGateway>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl PipelineWorker {
    /// Create a new pipeline worker.
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        tasks: Arc<dyn TaskRepository>,
        gateway: Arc<dyn LlmGateway>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            documents,
            tasks,
            gateway,
            config,
            event_tx,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Requeue tasks stranded mid-phase by a previous crash.
    ///
    /// Returns the number of tasks moved back to `queued`.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let mut recovered = 0u64;

        for status in [TaskStatus::ProcessingLeft, TaskStatus::ProcessingRight] {
            for task in self.tasks.list_by_status(status).await? {
                self.tasks
                    .update(task.doc_id, &TaskUpdate::status(TaskStatus::Queued))
                    .await?;
                warn!(
                    subsystem = "worker",
                    op = "recover",
                    doc_id = %task.doc_id,
                    status = status.as_str(),
                    "Requeued task interrupted mid-phase"
                );
                recovered += 1;
            }
        }

        if recovered > 0 {
            info!(
                subsystem = "worker",
                op = "recover",
                result_count = recovered,
                "Recovery requeued interrupted tasks"
            );
        }

        Ok(recovered)
    }

    /// Process one batch snapshot of queued tasks.
    ///
    /// Returns the number of tasks in the snapshot (0 when the queue was
    /// empty). Repository errors abort the batch and propagate; per-task
    /// gateway and config failures mark only that task `failed`.
    pub async fn process_batch(&self) -> Result<usize> {
        let batch = self.tasks.list_by_status(TaskStatus::Queued).await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        info!(
            subsystem = "worker",
            op = "process_batch",
            batch_size = batch.len(),
            "Processing batch"
        );
        let _ = self.event_tx.send(WorkerEvent::BatchStarted {
            count: batch.len(),
        });

        // Phase barrier: the whole snapshot passes through the left model
        // before any task touches the right model.
        for task in &batch {
            self.process_task_phase(task, Phase::Left).await?;
        }
        for task in &batch {
            self.process_task_phase(task, Phase::Right).await?;
        }

        info!(
            subsystem = "worker",
            op = "process_batch",
            batch_size = batch.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch complete"
        );

        Ok(batch.len())
    }

    /// Run one task through one phase.
    ///
    /// Repository errors propagate; everything else resolves to a task
    /// status transition.
    async fn process_task_phase(&self, snapshot: &ProcessingTask, phase: Phase) -> Result<()> {
        let doc_id = snapshot.doc_id;

        // Re-read rather than trusting the snapshot: the task may have been
        // deleted, or failed in phase 1.
        let Some(task) = self.tasks.get(doc_id).await? else {
            debug!(
                subsystem = "worker",
                doc_id = %doc_id,
                "Task vanished mid-batch, skipping"
            );
            return Ok(());
        };
        if task.status == TaskStatus::Failed {
            return Ok(());
        }

        // A task whose document is gone fails outright, without ever
        // entering the processing state.
        let document = self.documents.get(doc_id).await?;
        let Some(document) = document else {
            self.fail_task(doc_id, phase, format!("document not found: {doc_id}"))
                .await?;
            return Ok(());
        };

        let processing = match phase {
            Phase::Left => TaskStatus::ProcessingLeft,
            Phase::Right => TaskStatus::ProcessingRight,
        };
        self.tasks
            .update(doc_id, &TaskUpdate::status(processing))
            .await?;

        match self.enrich(&document.content, &task, phase).await {
            Ok(results) => {
                let mut update = TaskUpdate::default().with_results(results);
                if phase == Phase::Right {
                    update.status = Some(TaskStatus::Done);
                }
                self.tasks.update(doc_id, &update).await?;

                debug!(
                    subsystem = "worker",
                    op = "enrich",
                    doc_id = %doc_id,
                    phase = %phase,
                    "Phase complete"
                );
                if phase == Phase::Right {
                    let _ = self.event_tx.send(WorkerEvent::TaskCompleted { doc_id });
                }
            }
            Err(e) => {
                self.fail_task(doc_id, phase, e.to_string()).await?;
            }
        }

        Ok(())
    }

    /// Run both gateway calls for one phase.
    ///
    /// Errors here are task-scoped: a missing config field or a gateway
    /// failure, never a repository problem.
    async fn enrich(&self, content: &str, task: &ProcessingTask, phase: Phase) -> Result<TaskResults> {
        let model = task.config.model_for(phase)?;
        let prompt_meta = task.config.prompt_meta()?;
        let prompt_summary = task.config.prompt_summary()?;

        let metadata = self
            .gateway
            .extract_metadata(content, model, prompt_meta)
            .await?;
        let summary = self
            .gateway
            .generate_content(content, model, prompt_summary)
            .await?;

        Ok(match phase {
            Phase::Left => TaskResults {
                meta_l: Some(metadata),
                sum_l: Some(summary),
                ..Default::default()
            },
            Phase::Right => TaskResults {
                meta_r: Some(metadata),
                sum_r: Some(summary),
                ..Default::default()
            },
        })
    }

    /// Mark a task failed and record the error in its results.
    async fn fail_task(&self, doc_id: Uuid, phase: Phase, message: String) -> Result<()> {
        warn!(
            subsystem = "worker",
            op = "fail_task",
            doc_id = %doc_id,
            phase = %phase,
            error = %message,
            "Task failed"
        );

        self.tasks
            .update(
                doc_id,
                &TaskUpdate::status(TaskStatus::Failed)
                    .with_results(TaskResults::with_error(message.clone())),
            )
            .await?;

        let _ = self.event_tx.send(WorkerEvent::TaskFailed {
            doc_id,
            error: message,
        });
        Ok(())
    }

    /// Run the worker loop: recover, then poll and process until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!(subsystem = "worker", "Worker is disabled, not starting");
            return;
        }

        info!(
            subsystem = "worker",
            poll_interval_ms = self.config.poll_interval_ms,
            error_backoff_ms = self.config.error_backoff_ms,
            "Worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        self.run_loop(shutdown_rx).await;

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!(subsystem = "worker", "Worker stopped");
    }

    /// Recovery and poll loop body. Returns on shutdown.
    async fn run_loop(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let backoff = Duration::from_millis(self.config.error_backoff_ms);

        // Tasks stranded mid-phase must be requeued before any new batch
        // starts, so recovery retries with the same backoff as the loop
        // rather than giving up.
        while let Err(e) = self.recover_interrupted().await {
            error!(
                subsystem = "worker",
                op = "recover",
                error = %e,
                "Startup recovery failed, backing off"
            );
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(subsystem = "worker", "Received shutdown signal");
                    return;
                }
                _ = sleep(backoff) => {}
            }
        }

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!(subsystem = "worker", "Received shutdown signal");
                return;
            }

            match self.process_batch().await {
                // Queue empty — sleep before polling again
                Ok(0) => {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            info!(subsystem = "worker", "Received shutdown signal");
                            return;
                        }
                        _ = sleep(poll_interval) => {}
                    }
                }
                // Work was done — immediately check for more
                Ok(_) => {}
                Err(e) => {
                    error!(
                        subsystem = "worker",
                        op = "process_batch",
                        error = %e,
                        "Batch processing failed, backing off"
                    );
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            info!(subsystem = "worker", "Received shutdown signal");
                            return;
                        }
                        _ = sleep(backoff) => {}
                    }
                }
            }
        }
    }
}

//! recap-worker - standalone enrichment worker binary.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recap_core::{DocumentRepository, LlmGateway, TaskRepository};
use recap_db::Database;
use recap_inference::HttpLlmGateway;
use recap_worker::{PipelineWorker, WorkerConfig, WorkerEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logging configuration:
    //   LOG_FILE  - path to log file (optional, enables file logging)
    //   RUST_LOG  - standard env filter (default: "recap_worker=debug,recap_db=info")
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "recap_worker=debug,recap_db=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let log_file = std::env::var("LOG_FILE").ok();
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("recap-worker.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        registry
            .with(tracing_subscriber::fmt::layer())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false),
            )
            .init();
        Some(guard)
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
        None
    };

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let db = Database::connect(&database_url).await?;

    let documents: Arc<dyn DocumentRepository> = Arc::new(db.documents);
    let tasks: Arc<dyn TaskRepository> = Arc::new(db.tasks);
    let gateway: Arc<dyn LlmGateway> = Arc::new(HttpLlmGateway::from_env()?);

    let config = WorkerConfig::from_env();
    let worker = PipelineWorker::new(documents, tasks, gateway, config);
    let handle = worker.start();
    let mut events = handle.events();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping worker");
    handle.shutdown().await?;

    // Give the current batch a bounded window to wind down.
    let drain = async {
        while let Ok(event) = events.recv().await {
            if matches!(event, WorkerEvent::WorkerStopped) {
                break;
            }
        }
    };
    let _ = tokio::time::timeout(std::time::Duration::from_secs(30), drain).await;

    info!("Worker shut down cleanly");
    Ok(())
}

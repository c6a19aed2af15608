use std::sync::Arc;
use std::time::Duration;

use stmtflow_queue::{HealthStatus, JobQueue, Worker};
use tracing::{info, warn};

use crate::config::{Config, RunMode, StorageConfig, StorageKind};
use crate::handlers::{DetectParserHandler, ParseFileHandler, PipelineContext};
use crate::payload::{DETECT_PARSER_JOB, PARSE_FILE_JOB};
use crate::resolver::{FileResolver, HttpFileResolver, LocalFileResolver, ResolveError};

pub fn build_resolver(config: &StorageConfig) -> Result<Arc<dyn FileResolver>, ResolveError> {
    match config.kind {
        StorageKind::Local => Ok(Arc::new(LocalFileResolver::new(config.root.clone()))),
        StorageKind::Http => {
            let base_url = config
                .base_url
                .as_deref()
                .ok_or_else(|| ResolveError::NotConfigured("storage.base_url".to_string()))?;
            Ok(Arc::new(HttpFileResolver::new(
                base_url,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
    }
}

/// Register both pipeline handlers and start queue maintenance. Stats are
/// logged only when this process is a dedicated worker.
pub async fn start_worker(
    config: &Config,
    ctx: Arc<PipelineContext>,
    queue: Arc<dyn JobQueue>,
) -> Worker {
    let health = queue.health_check().await;
    match health.status {
        HealthStatus::Healthy => info!(stats = ?health.stats, "Job queue healthy"),
        HealthStatus::Unhealthy => warn!(error = ?health.error, "Job queue unhealthy at startup"),
    }

    let mut worker = Worker::new(queue);
    worker.register(
        DETECT_PARSER_JOB,
        Arc::new(DetectParserHandler::new(Arc::clone(&ctx))),
        config.jobs.detect_parser.work_options(&config.queue),
    );
    worker.register(
        PARSE_FILE_JOB,
        Arc::new(ParseFileHandler::new(ctx)),
        config.jobs.parse_file.work_options(&config.queue),
    );
    worker.start_monitor(
        config
            .queue
            .maintenance_options(config.mode == RunMode::Worker),
    );

    info!(
        detect_concurrency = config.jobs.detect_parser.concurrency,
        parse_concurrency = config.jobs.parse_file.concurrency,
        "Worker started"
    );
    worker
}

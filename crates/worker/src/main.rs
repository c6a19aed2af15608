use std::sync::Arc;

use anyhow::Context;
use stmtflow_import::import::registry_from_profiles;
use stmtflow_queue::PgQueue;
use stmtflow_storage::{create_pool, PgStatementStore};
use stmtflow_worker::{build_resolver, init_tracing, start_worker, Config, PipelineContext};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    init_tracing("stmtflow-worker", &config.log)?;

    if !config.mode.runs_worker() {
        info!(mode = ?config.mode, "Worker disabled for this run mode");
        return Ok(());
    }

    let pool = create_pool(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to database")?;

    let queue = Arc::new(PgQueue::new(pool.clone(), &config.database.queue_schema)?);
    queue.start().await.context("Failed to start job queue")?;

    let registry = registry_from_profiles(config.parsers.clone())?;
    info!(parsers = ?registry.list_parsers(), "Parser registry loaded");

    let ctx = Arc::new(PipelineContext::new(
        Arc::new(PgStatementStore::new(pool.clone())),
        build_resolver(&config.storage)?,
        Arc::new(registry),
        config.dedup.policy(),
    ));

    let worker = start_worker(&config, ctx, queue.clone()).await;

    shutdown_signal().await;
    info!("Shutdown signal received, draining in-flight jobs");

    worker.shutdown().await;
    queue.stop().await;
    pool.close().await;
    info!("Worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;

        tokio::select! {
            _ = ctrl_c => {},
            _ = unix_signal(SignalKind::terminate()) => {},
            _ = unix_signal(SignalKind::hangup()) => {},
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}

/// Resolves on the first delivery of `kind`; never resolves if the handler
/// cannot be installed.
#[cfg(unix)]
async fn unix_signal(kind: tokio::signal::unix::SignalKind) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}

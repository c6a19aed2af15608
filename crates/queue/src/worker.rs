use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::JobError;
use crate::job::Job;
use crate::queue::JobQueue;

/// Jobs are handed to handlers one at a time.
const BATCH_SIZE: usize = 1;

/// Code that runs one kind of job. Receives the claimed batch and returns
/// the JSON stored as the job's output.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, jobs: &[Job]) -> Result<serde_json::Value, JobError>;
}

#[derive(Debug, Clone)]
pub struct WorkOptions {
    /// Handlers of this job name allowed in flight at once.
    pub concurrency: usize,
    pub poll_interval: Duration,
    /// Idle polling backs off up to this interval.
    pub max_poll_interval: Duration,
}

impl Default for WorkOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_secs(1),
            max_poll_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaintenanceOptions {
    /// How often active jobs are checked for expiry.
    pub monitor_interval: Duration,
    pub maintenance_interval: Duration,
    pub archive_completed_after: Duration,
    pub delete_after: Duration,
    /// Log queue stats on this interval when set.
    pub stats_interval: Option<Duration>,
}

impl Default for MaintenanceOptions {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(10),
            maintenance_interval: Duration::from_secs(120),
            archive_completed_after: Duration::from_secs(60 * 60 * 24),
            delete_after: Duration::from_secs(60 * 60 * 24 * 7),
            stats_interval: None,
        }
    }
}

/// Runs registered handlers against a `JobQueue`. Each registration gets
/// its own polling loop; `shutdown` stops claiming and waits for every
/// in-flight handler.
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Worker {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            queue,
            stop_tx,
            tasks: Vec::new(),
        }
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn JobHandler>, options: WorkOptions) {
        info!(
            job = name,
            concurrency = options.concurrency,
            "Registering job handler"
        );
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.queue),
            name.to_string(),
            handler,
            options,
            self.stop_tx.subscribe(),
        ));
        self.tasks.push(task);
    }

    /// Start expiry, archiving and optional stats logging.
    pub fn start_monitor(&mut self, options: MaintenanceOptions) {
        let task = tokio::spawn(monitor_loop(
            Arc::clone(&self.queue),
            options,
            self.stop_tx.subscribe(),
        ));
        self.tasks.push(task);
    }

    pub async fn shutdown(mut self) {
        info!("Stopping workers, waiting for in-flight jobs");
        let _ = self.stop_tx.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("Workers stopped");
    }
}

/// Sleep for `duration` unless asked to stop first. Returns false on stop.
async fn idle(duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = stop.changed() => false,
    }
}

async fn poll_loop(
    queue: Arc<dyn JobQueue>,
    name: String,
    handler: Arc<dyn JobHandler>,
    options: WorkOptions,
    mut stop: watch::Receiver<bool>,
) {
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut in_flight = JoinSet::new();
    let mut interval = options.poll_interval;

    loop {
        if *stop.borrow() {
            break;
        }

        let permit = tokio::select! {
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = stop.changed() => break,
        };

        match queue.fetch(&name, BATCH_SIZE).await {
            Ok(mut jobs) if !jobs.is_empty() => {
                interval = options.poll_interval;
                let job = jobs.swap_remove(0);
                let queue = Arc::clone(&queue);
                let handler = Arc::clone(&handler);
                let name = name.clone();
                in_flight.spawn(async move {
                    run_job(queue, &name, handler, job).await;
                    drop(permit);
                });
                while in_flight.try_join_next().is_some() {}
            }
            Ok(_) => {
                drop(permit);
                if !idle(interval, &mut stop).await {
                    break;
                }
                interval = (interval * 2).min(options.max_poll_interval);
            }
            Err(e) => {
                drop(permit);
                error!(job = %name, error = %e, "Failed to fetch jobs");
                if !idle(interval, &mut stop).await {
                    break;
                }
            }
        }
    }

    if !in_flight.is_empty() {
        info!(job = %name, in_flight = in_flight.len(), "Draining in-flight jobs");
    }
    while in_flight.join_next().await.is_some() {}
    debug!(job = %name, "Polling stopped");
}

async fn run_job(queue: Arc<dyn JobQueue>, name: &str, handler: Arc<dyn JobHandler>, job: Job) {
    let id = job.id;
    info!(job = name, job_id = %id, attempt = job.retry_count + 1, "Processing job");

    let outcome = tokio::spawn(async move { handler.handle(std::slice::from_ref(&job)).await }).await;

    let settled = match outcome {
        Ok(Ok(output)) => {
            info!(job = name, job_id = %id, "Job completed");
            queue.complete(id, output).await.map(|_| ())
        }
        Ok(Err(e)) => {
            let result = queue.fail(id, &e.message, e.retryable).await;
            if let Ok(state) = &result {
                error!(job = name, job_id = %id, error = %e, retryable = e.retryable, %state, "Job failed");
            }
            result.map(|_| ())
        }
        Err(e) => {
            let message = format!("Handler panicked: {e}");
            error!(job = name, job_id = %id, error = %message, "Job failed");
            queue.fail(id, &message, true).await.map(|_| ())
        }
    };

    if let Err(e) = settled {
        error!(job = name, job_id = %id, error = %e, "Failed to record job outcome");
    }
}

async fn monitor_loop(
    queue: Arc<dyn JobQueue>,
    options: MaintenanceOptions,
    mut stop: watch::Receiver<bool>,
) {
    let mut monitor = tokio::time::interval(options.monitor_interval);
    let mut maintenance = tokio::time::interval(options.maintenance_interval);
    let mut stats = options.stats_interval.map(tokio::time::interval);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = monitor.tick() => {
                if let Err(e) = queue.expire().await {
                    error!(error = %e, "Job expiry failed");
                }
            }
            _ = maintenance.tick() => {
                match queue.archive(options.archive_completed_after).await {
                    Ok(n) if n > 0 => info!(archived = n, "Archived finished jobs"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Job archive failed"),
                }
                match queue.purge(options.delete_after).await {
                    Ok(n) if n > 0 => info!(deleted = n, "Purged archived jobs"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Job purge failed"),
                }
            }
            _ = async {
                match stats.as_mut() {
                    Some(interval) => { interval.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                match queue.stats(None).await {
                    Ok(s) => info!(
                        queued = s.queued(),
                        active = s.count(crate::JobState::Active),
                        completed = s.count(crate::JobState::Completed),
                        failed = s.count(crate::JobState::Failed),
                        "Queue stats"
                    ),
                    Err(e) => warn!(error = %e, "Failed to read queue stats"),
                }
            }
        }
    }
    debug!("Queue monitor stopped");
}

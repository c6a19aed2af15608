use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{HealthReport, HealthStatus, Job, JobState, QueueStats, SendOptions};

/// A durable job queue. Implementations own all job state; workers only
/// claim and settle jobs through this interface.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn send(
        &self,
        name: &str,
        data: serde_json::Value,
        options: SendOptions,
    ) -> Result<Uuid, QueueError>;

    /// Claim up to `batch_size` due jobs of `name`, highest priority first,
    /// then oldest. Claimed jobs are `active`.
    async fn fetch(&self, name: &str, batch_size: usize) -> Result<Vec<Job>, QueueError>;

    async fn complete(&self, id: Uuid, output: serde_json::Value) -> Result<(), QueueError>;

    /// Settle a failed attempt. Returns the state the job moved to.
    async fn fail(&self, id: Uuid, error: &str, retryable: bool) -> Result<JobState, QueueError>;

    async fn cancel(&self, id: Uuid) -> Result<(), QueueError>;

    /// Put a cancelled job back in the queue.
    async fn resume(&self, id: Uuid) -> Result<(), QueueError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, QueueError>;

    /// Jobs waiting to be claimed, for one queue or all of them.
    async fn queue_size(&self, name: Option<&str>) -> Result<u64, QueueError>;

    async fn stats(&self, name: Option<&str>) -> Result<QueueStats, QueueError>;

    /// Fail active jobs past their expiry, honoring retry policy. Returns
    /// how many were expired.
    async fn expire(&self) -> Result<u64, QueueError>;

    /// Move completed jobs older than `completed_after` out of the live table.
    async fn archive(&self, completed_after: Duration) -> Result<u64, QueueError>;

    /// Delete archived jobs older than `older_than`.
    async fn purge(&self, older_than: Duration) -> Result<u64, QueueError>;

    async fn health_check(&self) -> HealthReport {
        match self.stats(None).await {
            Ok(stats) => HealthReport {
                status: HealthStatus::Healthy,
                stats: Some(stats),
                error: None,
                timestamp: Utc::now(),
            },
            Err(e) => HealthReport {
                status: HealthStatus::Unhealthy,
                stats: None,
                error: Some(e.to_string()),
                timestamp: Utc::now(),
            },
        }
    }
}

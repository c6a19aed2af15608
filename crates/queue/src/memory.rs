use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobState, QueueStats, SendOptions};
use crate::queue::JobQueue;

#[derive(Default)]
struct Tables {
    jobs: HashMap<Uuid, Job>,
    archive: Vec<(Job, DateTime<Utc>)>,
}

/// Process-local `JobQueue` with the same state rules as `PgQueue`.
#[derive(Default)]
pub struct MemoryQueue {
    tables: Mutex<Tables>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn archived(&self) -> usize {
        self.tables.lock().await.archive.len()
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn send(
        &self,
        name: &str,
        data: serde_json::Value,
        options: SendOptions,
    ) -> Result<Uuid, QueueError> {
        let job = Job::new(name, data, &options, Utc::now());
        let id = job.id;
        self.tables.lock().await.jobs.insert(id, job);
        Ok(id)
    }

    async fn fetch(&self, name: &str, batch_size: usize) -> Result<Vec<Job>, QueueError> {
        let now = Utc::now();
        let mut tables = self.tables.lock().await;

        let mut due: Vec<&mut Job> = tables
            .jobs
            .values_mut()
            .filter(|j| j.name == name && j.state.is_queued() && j.start_after <= now)
            .collect();
        due.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_on.cmp(&b.created_on)));

        Ok(due
            .into_iter()
            .take(batch_size)
            .map(|job| {
                job.activate(now);
                job.clone()
            })
            .collect())
    }

    async fn complete(&self, id: Uuid, output: serde_json::Value) -> Result<(), QueueError> {
        let mut tables = self.tables.lock().await;
        let job = tables.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if job.state != JobState::Active {
            return Err(QueueError::InvalidState {
                id,
                state: job.state,
                action: "complete",
            });
        }
        job.state = JobState::Completed;
        job.completed_on = Some(Utc::now());
        job.output = Some(output);
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str, retryable: bool) -> Result<JobState, QueueError> {
        let mut tables = self.tables.lock().await;
        let job = tables.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if job.state != JobState::Active {
            return Err(QueueError::InvalidState {
                id,
                state: job.state,
                action: "fail",
            });
        }
        Ok(job.record_failure(error, retryable, Utc::now()))
    }

    async fn cancel(&self, id: Uuid) -> Result<(), QueueError> {
        let mut tables = self.tables.lock().await;
        let job = tables.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if job.state.is_terminal() {
            return Err(QueueError::InvalidState {
                id,
                state: job.state,
                action: "cancel",
            });
        }
        job.state = JobState::Cancelled;
        job.completed_on = Some(Utc::now());
        Ok(())
    }

    async fn resume(&self, id: Uuid) -> Result<(), QueueError> {
        let mut tables = self.tables.lock().await;
        let job = tables.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if job.state != JobState::Cancelled {
            return Err(QueueError::InvalidState {
                id,
                state: job.state,
                action: "resume",
            });
        }
        job.state = JobState::Created;
        job.completed_on = None;
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        let tables = self.tables.lock().await;
        Ok(tables.jobs.get(&id).cloned().or_else(|| {
            tables
                .archive
                .iter()
                .find(|(j, _)| j.id == id)
                .map(|(j, _)| j.clone())
        }))
    }

    async fn queue_size(&self, name: Option<&str>) -> Result<u64, QueueError> {
        Ok(self.stats(name).await?.queued())
    }

    async fn stats(&self, name: Option<&str>) -> Result<QueueStats, QueueError> {
        let tables = self.tables.lock().await;
        let mut stats = QueueStats::default();
        for job in tables.jobs.values() {
            if name.map_or(true, |n| n == job.name) {
                *stats.by_state.entry(job.state).or_default() += 1;
            }
        }
        Ok(stats)
    }

    async fn expire(&self) -> Result<u64, QueueError> {
        let now = Utc::now();
        let mut tables = self.tables.lock().await;
        let mut expired = 0;
        for job in tables.jobs.values_mut().filter(|j| j.is_expired(now)) {
            job.record_failure("job expired", true, now);
            expired += 1;
        }
        Ok(expired)
    }

    async fn archive(&self, completed_after: Duration) -> Result<u64, QueueError> {
        let now = Utc::now();
        let cutoff = now - to_chrono(completed_after);
        let mut tables = self.tables.lock().await;

        let ids: Vec<Uuid> = tables
            .jobs
            .values()
            .filter(|j| j.state.is_terminal() && j.completed_on.is_some_and(|c| c <= cutoff))
            .map(|j| j.id)
            .collect();
        for id in &ids {
            if let Some(job) = tables.jobs.remove(id) {
                tables.archive.push((job, now));
            }
        }
        Ok(ids.len() as u64)
    }

    async fn purge(&self, older_than: Duration) -> Result<u64, QueueError> {
        let cutoff = Utc::now() - to_chrono(older_than);
        let mut tables = self.tables.lock().await;
        let before = tables.archive.len();
        tables.archive.retain(|(_, archived_on)| *archived_on > cutoff);
        Ok((before - tables.archive.len()) as u64)
    }
}

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Cap on the backoff exponent so delays stay representable.
const MAX_BACKOFF_EXPONENT: i32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Created,
    Retry,
    Active,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    pub const ALL: [JobState; 6] = [
        JobState::Created,
        JobState::Retry,
        JobState::Active,
        JobState::Completed,
        JobState::Cancelled,
        JobState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Retry => "retry",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Cancelled | JobState::Failed)
    }

    /// Waiting to be claimed.
    pub fn is_queued(&self) -> bool {
        matches!(self, JobState::Created | JobState::Retry)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("Unknown job state: {s}"))
    }
}

/// Per-job delivery options given to `send`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendOptions {
    pub priority: i32,
    pub retry_limit: i32,
    pub retry_delay_secs: i32,
    pub retry_backoff: bool,
    pub expire_in_secs: i32,
    pub start_after: Option<DateTime<Utc>>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            retry_limit: 2,
            retry_delay_secs: 0,
            retry_backoff: false,
            expire_in_secs: 15 * 60,
            start_after: None,
        }
    }
}

impl SendOptions {
    pub fn retry_limit(mut self, limit: i32) -> Self {
        self.retry_limit = limit;
        self
    }

    pub fn expire_in_minutes(mut self, minutes: i32) -> Self {
        self.expire_in_secs = minutes.saturating_mul(60);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub data: serde_json::Value,
    pub state: JobState,
    pub priority: i32,
    pub retry_limit: i32,
    pub retry_count: i32,
    pub retry_delay_secs: i32,
    pub retry_backoff: bool,
    pub start_after: DateTime<Utc>,
    pub expire_in_secs: i32,
    pub created_on: DateTime<Utc>,
    pub started_on: Option<DateTime<Utc>>,
    pub completed_on: Option<DateTime<Utc>>,
    pub output: Option<serde_json::Value>,
}

impl Job {
    pub fn new(name: &str, data: serde_json::Value, options: &SendOptions, now: DateTime<Utc>) -> Self {
        Job {
            id: Uuid::new_v4(),
            name: name.to_string(),
            data,
            state: JobState::Created,
            priority: options.priority,
            retry_limit: options.retry_limit,
            retry_count: 0,
            retry_delay_secs: options.retry_delay_secs,
            retry_backoff: options.retry_backoff,
            start_after: options.start_after.unwrap_or(now),
            expire_in_secs: options.expire_in_secs,
            created_on: now,
            started_on: None,
            completed_on: None,
            output: None,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.retry_limit
    }

    /// Delay before the next attempt; doubles per attempt with backoff on.
    pub fn next_retry_delay(&self) -> Duration {
        let base = Duration::seconds(i64::from(self.retry_delay_secs.max(0)));
        if !self.retry_backoff {
            return base;
        }
        let exponent = self.retry_count.clamp(0, MAX_BACKOFF_EXPONENT) as u32;
        base * 2i32.pow(exponent)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Active
            && self
                .started_on
                .is_some_and(|started| now - started > Duration::seconds(i64::from(self.expire_in_secs)))
    }

    /// Mark claimed. Claiming out of `retry` counts as a new attempt.
    pub fn activate(&mut self, now: DateTime<Utc>) {
        if self.state == JobState::Retry {
            self.retry_count += 1;
        }
        self.state = JobState::Active;
        self.started_on = Some(now);
    }

    /// Move to `retry` or `failed` after an unsuccessful attempt.
    pub fn record_failure(&mut self, error: &str, retryable: bool, now: DateTime<Utc>) -> JobState {
        self.output = Some(serde_json::json!({ "message": error }));
        if retryable && self.can_retry() {
            self.state = JobState::Retry;
            self.start_after = now + self.next_retry_delay();
        } else {
            self.state = JobState::Failed;
            self.completed_on = Some(now);
        }
        self.state
    }
}

/// Job counts by state, optionally for one queue name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub by_state: BTreeMap<JobState, u64>,
}

impl QueueStats {
    pub fn count(&self, state: JobState) -> u64 {
        self.by_state.get(&state).copied().unwrap_or(0)
    }

    /// Jobs waiting to be claimed.
    pub fn queued(&self) -> u64 {
        self.count(JobState::Created) + self.count(JobState::Retry)
    }

    pub fn total(&self) -> u64 {
        self.by_state.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<QueueStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

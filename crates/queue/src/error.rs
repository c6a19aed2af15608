use thiserror::Error;
use uuid::Uuid;

use crate::job::JobState;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Job not found: {0}")]
    NotFound(Uuid),
    #[error("Job {id} is {state}, cannot {action}")]
    InvalidState {
        id: Uuid,
        state: JobState,
        action: &'static str,
    },
    #[error("Corrupt job row: {0}")]
    Corrupt(String),
    #[error("Invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("Invalid queue schema name: {0}")]
    InvalidSchema(String),
}

/// What a handler reports when a job did not succeed. `retryable` decides
/// whether the queue's retry policy gets a say.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct JobError {
    pub message: String,
    pub retryable: bool,
}

impl JobError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

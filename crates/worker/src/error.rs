use stmtflow_import::ReadError;
use stmtflow_queue::JobError;
use stmtflow_storage::StoreError;
use thiserror::Error;

use crate::resolver::ResolveError;

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Invalid job payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("Statement not found: {0}")]
    NotFound(String),
    #[error("Statement {statement_id} does not belong to org {org_id}")]
    OwnershipMismatch {
        statement_id: String,
        org_id: String,
    },
    #[error("Statement {0} has no stored file")]
    MissingLocation(String),
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("Failed to decode file: {0}")]
    Read(#[from] ReadError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl HandlerError {
    /// Failures a later attempt cannot fix are not retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            HandlerError::InvalidPayload(_)
            | HandlerError::NotFound(_)
            | HandlerError::OwnershipMismatch { .. }
            | HandlerError::MissingLocation(_)
            | HandlerError::UnsupportedFileType(_)
            | HandlerError::Read(_) => false,
            HandlerError::Store(StoreError::NotFound(_)) => false,
            HandlerError::Store(_) | HandlerError::Resolve(_) | HandlerError::Task(_) => true,
        }
    }
}

impl From<HandlerError> for JobError {
    fn from(e: HandlerError) -> Self {
        JobError {
            message: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}

mod detect;
mod parse;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use stmtflow_core::{FileType, RawData, Statement};
use stmtflow_import::{read, DuplicatePolicy, ParserRegistry, ReadError};
use stmtflow_queue::{Job, JobError, JobHandler};
use stmtflow_storage::StatementStore;
use tracing::warn;

use crate::error::HandlerError;
use crate::resolver::FileResolver;

/// Turns downloaded bytes into rows or PDF lines.
pub type Decoder = fn(FileType, &[u8]) -> Result<RawData, ReadError>;

/// Everything a handler needs to touch statements and their files.
pub struct PipelineContext {
    pub store: Arc<dyn StatementStore>,
    pub resolver: Arc<dyn FileResolver>,
    pub registry: Arc<ParserRegistry>,
    pub dedup: DuplicatePolicy,
    decoder: Decoder,
}

impl PipelineContext {
    pub fn new(
        store: Arc<dyn StatementStore>,
        resolver: Arc<dyn FileResolver>,
        registry: Arc<ParserRegistry>,
        dedup: DuplicatePolicy,
    ) -> Self {
        Self {
            store,
            resolver,
            registry,
            dedup,
            decoder: read,
        }
    }

    /// Replace the built-in file readers.
    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Load a statement and make sure `org_id` owns it. Nothing is written
    /// on either failure.
    async fn load_owned(&self, statement_id: &str, org_id: &str) -> Result<Statement, HandlerError> {
        let statement = self
            .store
            .find_by_id(statement_id)
            .await?
            .ok_or_else(|| HandlerError::NotFound(statement_id.to_string()))?;

        if !statement.belongs_to(org_id) {
            warn!(statement_id, org_id, owner = %statement.org, "Ownership check failed");
            return Err(HandlerError::OwnershipMismatch {
                statement_id: statement_id.to_string(),
                org_id: org_id.to_string(),
            });
        }
        Ok(statement)
    }

    /// Decode off the async runtime; readers are CPU bound. A reader that
    /// panics counts as an unreadable file, not a worker failure.
    async fn decode(&self, file_type: FileType, bytes: Vec<u8>) -> Result<RawData, HandlerError> {
        let decoder = self.decoder;
        match tokio::task::spawn_blocking(move || decoder(file_type, &bytes)).await {
            Ok(raw) => Ok(raw?),
            Err(e) if e.is_panic() => {
                Err(ReadError::Panicked(panic_message(e.into_panic())).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn reader_label(file_type: FileType) -> &'static str {
    match file_type {
        FileType::Csv => "CSV",
        FileType::Excel => "Excel",
        FileType::Pdf => "PDF",
    }
}

fn single_or_array(mut results: Vec<Value>) -> Value {
    if results.len() == 1 {
        results.remove(0)
    } else {
        Value::Array(results)
    }
}

/// Runs `detectParser` jobs.
pub struct DetectParserHandler {
    ctx: Arc<PipelineContext>,
}

impl DetectParserHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl JobHandler for DetectParserHandler {
    async fn handle(&self, jobs: &[Job]) -> Result<Value, JobError> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            results.push(self.ctx.detect_parser(job).await?);
        }
        Ok(single_or_array(results))
    }
}

/// Runs `parse_file` jobs.
pub struct ParseFileHandler {
    ctx: Arc<PipelineContext>,
}

impl ParseFileHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl JobHandler for ParseFileHandler {
    async fn handle(&self, jobs: &[Job]) -> Result<Value, JobError> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            results.push(self.ctx.parse_file(job).await?);
        }
        Ok(single_or_array(results))
    }
}

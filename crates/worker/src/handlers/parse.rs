use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use stmtflow_core::{ExtractedData, FileType, Statement, StatementStatus, StatementUpdate};
use stmtflow_import::extract_transactions;
use stmtflow_queue::Job;
use tracing::{debug, info, instrument, warn};

use super::{reader_label, PipelineContext};
use crate::error::HandlerError;
use crate::payload::ParseFilePayload;

struct ParseOutcome {
    status: StatementStatus,
    rows: usize,
    transactions: usize,
    duplicates_skipped: usize,
    errors: Vec<String>,
}

impl PipelineContext {
    /// Decode a statement's file and, when its parser is known, extract
    /// new transactions. Bad files and unsupported types end as
    /// `status = error` on the statement; only infrastructure failures are
    /// returned as errors.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn parse_file(&self, job: &Job) -> Result<Value, HandlerError> {
        let payload: ParseFilePayload = serde_json::from_value(job.data.clone())?;
        let statement = self
            .load_owned(&payload.statement_id, &payload.org_id)
            .await?;

        info!(
            statement_id = %statement.id,
            file_type = %payload.file_type,
            file_name = %payload.file_name,
            "Starting file parse"
        );

        let outcome = match self.run_parse(&statement, &payload).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(statement_id = %statement.id, error = %e, "File parse failed");
                let update = StatementUpdate {
                    status: Some(StatementStatus::Error),
                    errors: Some(Some(vec![e.to_string()])),
                    ..Default::default()
                };
                if let Err(write_err) = self.store.update(&statement.id, update).await {
                    warn!(statement_id = %statement.id, error = %write_err, "Could not record parse error");
                }
                return Err(e);
            }
        };

        info!(
            statement_id = %statement.id,
            status = %outcome.status,
            rows = outcome.rows,
            transactions = outcome.transactions,
            errors = outcome.errors.len(),
            "File parse finished"
        );

        Ok(json!({
            "statementId": statement.id,
            "status": outcome.status,
            "dataCount": outcome.rows,
            "transactions": outcome.transactions,
            "duplicatesSkipped": outcome.duplicates_skipped,
            "errors": outcome.errors.len(),
            "jobId": job.id,
            "timestamp": Utc::now(),
        }))
    }

    async fn run_parse(
        &self,
        statement: &Statement,
        payload: &ParseFilePayload,
    ) -> Result<ParseOutcome, HandlerError> {
        let mut errors = Vec::new();
        let mut extracted = ExtractedData::default();

        match payload.file_type.parse::<FileType>() {
            Err(_) => errors.push(format!("Unsupported file type: {}", payload.file_type)),
            Ok(file_type) => {
                let bytes = self.resolver.download(&payload.s3_location).await?;
                extracted.checksum = Some(format!("{:x}", Sha256::digest(&bytes)));
                match self.decode(file_type, bytes).await {
                    Ok(raw) => extracted.raw = Some(raw),
                    Err(HandlerError::Read(e)) => {
                        errors.push(format!("{} parsing error: {e}", reader_label(file_type)))
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let mut transactions = 0;
        let mut duplicates_skipped = 0;
        if let Some(raw) = extracted.raw.clone() {
            let parser = statement.parser_type.as_deref().and_then(|name| {
                let parser = self.registry.get(name);
                if parser.is_none() {
                    warn!(parser = name, "Detected parser is no longer registered");
                }
                parser
            });

            if let Some(parser) = parser {
                let existing = self
                    .store
                    .transactions_for(&statement.org, statement.project.as_deref())
                    .await?;
                let policy = self.dedup;
                let extraction = tokio::task::spawn_blocking(move || {
                    extract_transactions(parser.as_ref(), &raw, &existing, policy)
                })
                .await;

                match extraction {
                    Ok(Ok(extraction)) => {
                        transactions = extraction.transactions.len();
                        duplicates_skipped = extraction.duplicates_skipped;
                        extracted.transactions = Some(extraction.transactions);
                        extracted.metadata = extraction.metadata;
                        extracted.duplicates_skipped = Some(extraction.duplicates_skipped);
                    }
                    Ok(Err(e)) => errors.push(format!("Transaction extraction error: {e}")),
                    Err(e) => errors.push(format!("Transaction extraction error: {e}")),
                }
            } else {
                debug!(statement_id = %statement.id, "No detected parser, storing raw data only");
            }
        }

        let rows = extracted.raw.as_ref().map_or(0, |raw| raw.row_count());
        let status = if errors.is_empty() {
            StatementStatus::Completed
        } else {
            StatementStatus::Error
        };

        let update = StatementUpdate {
            status: Some(status),
            extracted_data: Some((extracted != ExtractedData::default()).then_some(extracted)),
            errors: Some((!errors.is_empty()).then(|| errors.clone())),
            ..Default::default()
        };
        self.store.update(&statement.id, update).await?;

        Ok(ParseOutcome {
            status,
            rows,
            transactions,
            duplicates_skipped,
            errors,
        })
    }
}

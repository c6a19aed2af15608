use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use stmtflow_core::{
    Checks, DetectionReport, ParserDetectionCheck, Statement, StatementStatus, StatementUpdate,
};
use stmtflow_import::detect_best_parser;
use stmtflow_queue::Job;
use tracing::{info, instrument, warn};

use super::PipelineContext;
use crate::error::HandlerError;
use crate::payload::DetectParserPayload;

impl PipelineContext {
    /// Score every compatible parser against a statement's file and record
    /// the winner. An inconclusive detection is a normal result; only
    /// lookup, ownership and I/O failures are returned as errors.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn detect_parser(&self, job: &Job) -> Result<Value, HandlerError> {
        let payload: DetectParserPayload = serde_json::from_value(job.data.clone())?;
        let statement = self
            .load_owned(&payload.statement_id, &payload.org_id)
            .await?;

        info!(
            statement_id = %statement.id,
            file_name = %statement.file_name,
            "Starting parser detection"
        );

        let report = match self.run_detection(&statement).await {
            Ok(report) => report,
            Err(e) => {
                warn!(statement_id = %statement.id, error = %e, "Parser detection failed");
                let update = StatementUpdate {
                    checks: Some(Checks {
                        parser_detection: Some(ParserDetectionCheck::errored(
                            e.to_string(),
                            Utc::now(),
                        )),
                    }),
                    ..Default::default()
                };
                if let Err(write_err) = self.store.update(&statement.id, update).await {
                    warn!(statement_id = %statement.id, error = %write_err, "Could not record detection error");
                }
                return Err(e);
            }
        };

        info!(
            statement_id = %statement.id,
            success = report.success,
            best_parser = report.best_parser.as_deref(),
            confidence = report.confidence,
            "Parser detection finished"
        );

        Ok(json!({
            "success": true,
            "jobId": job.id,
            "statement_id": statement.id,
            "org_id": payload.org_id,
            "fileName": statement.file_name,
            "detectionResult": {
                "success": report.success,
                "bestParser": report.best_parser,
                "confidence": report.confidence,
                "alternatives": report.alternatives.len(),
                "totalParsersTested": report.all_results.len(),
            },
            "timestamp": Utc::now(),
        }))
    }

    async fn run_detection(&self, statement: &Statement) -> Result<DetectionReport, HandlerError> {
        let file_type = statement.resolved_file_type().ok_or_else(|| {
            HandlerError::UnsupportedFileType(
                statement
                    .file_type
                    .clone()
                    .unwrap_or_else(|| statement.file_name.clone()),
            )
        })?;

        let raw = match statement.raw_data() {
            Some(raw) => raw.clone(),
            None => {
                let location = statement
                    .location
                    .as_deref()
                    .ok_or_else(|| HandlerError::MissingLocation(statement.id.clone()))?;
                let bytes = self.resolver.download(location).await?;
                self.decode(file_type, bytes).await?
            }
        };

        let report = detect_best_parser(&self.registry, Arc::new(raw), file_type).await;

        let status = if report.success {
            StatementStatus::ParserDetected
        } else {
            StatementStatus::DetectionFailed
        };
        let update = StatementUpdate {
            status: Some(status),
            parser_type: Some(report.best_parser.clone()),
            checks: Some(Checks {
                parser_detection: Some(ParserDetectionCheck::from_report(&report, Utc::now())),
            }),
            ..Default::default()
        };
        self.store.update(&statement.id, update).await?;

        Ok(report)
    }
}

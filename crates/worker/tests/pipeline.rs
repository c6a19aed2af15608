use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use stmtflow_core::{
    Cell, ExtractedData, FileType, RawData, Statement, StatementStatus, Transaction,
};
use stmtflow_import::{
    import::registry_from_profiles, read, DuplicatePolicy, ParserProfile, ReadError,
    NO_COMPATIBLE_PARSER,
};
use stmtflow_queue::{Job, JobError, JobHandler, JobQueue, JobState, MemoryQueue, SendOptions};
use stmtflow_storage::MemoryStatementStore;
use stmtflow_worker::config::Config;
use stmtflow_worker::{
    enqueue_detect_parser, start_worker, Decoder, DetectParserHandler, DetectParserPayload, HandlerError,
    LocalFileResolver, ParseFileHandler, ParseFilePayload, PipelineContext, DETECT_PARSER_JOB,
    PARSE_FILE_JOB,
};
use tempfile::TempDir;

const STATEMENT_CSV: &str = "\
Date,Description,Amount
2024-01-05,Salary,2500.00
2024-01-07,Coffee Shop,-4.50
2024-01-09,Rent,-1200.00
";

fn bank_profile() -> ParserProfile {
    ParserProfile {
        bank: Some("Test Bank".into()),
        skip_rows: 1,
        particulars_column: Some(1),
        amount_column: Some(2),
        ..ParserProfile::new("testbank__csv", 0)
    }
}

struct Harness {
    _dir: TempDir,
    store: Arc<MemoryStatementStore>,
    ctx: Arc<PipelineContext>,
}

impl Harness {
    fn new(policy: DuplicatePolicy) -> Self {
        Self::with_decoder(policy, read)
    }

    fn with_decoder(policy: DuplicatePolicy, decoder: Decoder) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("org1")).unwrap();
        std::fs::write(dir.path().join("org1/jan.csv"), STATEMENT_CSV).unwrap();
        std::fs::write(dir.path().join("org1/broken.pdf"), b"not a pdf at all").unwrap();

        let store = Arc::new(MemoryStatementStore::new());
        let registry = registry_from_profiles([bank_profile()]).unwrap();
        let ctx = Arc::new(
            PipelineContext::new(
                store.clone(),
                Arc::new(LocalFileResolver::new(dir.path())),
                Arc::new(registry),
                policy,
            )
            .with_decoder(decoder),
        );

        Self {
            _dir: dir,
            store,
            ctx,
        }
    }

    async fn add_statement(&self, id: &str, file_name: &str, location: &str) -> Statement {
        let mut statement = Statement::new(id, "org1", file_name);
        statement.location = Some(location.to_string());
        self.store.insert(statement.clone()).await;
        statement
    }
}

fn detect_job(statement_id: &str, org_id: &str) -> Job {
    let payload = DetectParserPayload {
        statement_id: statement_id.into(),
        org_id: org_id.into(),
    };
    Job::new(
        DETECT_PARSER_JOB,
        serde_json::to_value(payload).unwrap(),
        &SendOptions::default(),
        Utc::now(),
    )
}

fn parse_job(statement_id: &str, file_type: &str, location: &Path) -> Job {
    let payload = ParseFilePayload {
        statement_id: statement_id.into(),
        org_id: "org1".into(),
        file_type: file_type.into(),
        file_name: "upload".into(),
        s3_location: location.to_string_lossy().into_owned(),
    };
    Job::new(
        PARSE_FILE_JOB,
        serde_json::to_value(payload).unwrap(),
        &SendOptions::default(),
        Utc::now(),
    )
}

#[tokio::test]
async fn detect_then_parse_extracts_transactions() {
    let h = Harness::new(DuplicatePolicy::Exact);
    h.add_statement("s1", "jan.csv", "org1/jan.csv").await;

    let output = DetectParserHandler::new(h.ctx.clone())
        .handle(&[detect_job("s1", "org1")])
        .await
        .unwrap();
    assert_eq!(output["detectionResult"]["bestParser"], "testbank__csv");
    assert_eq!(output["detectionResult"]["totalParsersTested"], 1);

    let detected = h.store.get("s1").await.unwrap();
    assert_eq!(detected.status, StatementStatus::ParserDetected);
    assert_eq!(detected.parser_type.as_deref(), Some("testbank__csv"));
    let check = detected.checks.parser_detection.unwrap();
    assert!(check.success);
    // 30 + 6 for three rows + 25 + 20 + 5 for bank metadata
    assert_eq!(check.confidence, 86);

    let output = ParseFileHandler::new(h.ctx.clone())
        .handle(&[parse_job("s1", "csv", Path::new("org1/jan.csv"))])
        .await
        .unwrap();
    assert_eq!(output["status"], "completed");
    assert_eq!(output["dataCount"], 4);
    assert_eq!(output["transactions"], 3);

    let parsed = h.store.get("s1").await.unwrap();
    assert_eq!(parsed.status, StatementStatus::Completed);
    assert_eq!(parsed.errors, None);
    let data = parsed.extracted_data.unwrap();
    assert_eq!(data.transactions.unwrap().len(), 3);
    assert_eq!(data.duplicates_skipped, Some(0));
    assert_eq!(data.checksum.unwrap().len(), 64);
    assert_eq!(data.metadata.unwrap()["bank"], "Test Bank");
}

#[tokio::test]
async fn ownership_mismatch_fails_without_writing() {
    let h = Harness::new(DuplicatePolicy::Exact);
    let original = h.add_statement("s1", "jan.csv", "org1/jan.csv").await;

    let err = h.ctx.detect_parser(&detect_job("s1", "org2")).await.unwrap_err();
    assert!(matches!(err, HandlerError::OwnershipMismatch { .. }));

    let job_error: JobError = err.into();
    assert!(!job_error.retryable);

    assert_eq!(h.store.update_count().await, 0);
    assert_eq!(h.store.get("s1").await.unwrap(), original);
}

#[tokio::test]
async fn missing_statement_is_not_retried() {
    let h = Harness::new(DuplicatePolicy::Exact);

    let err = h.ctx.detect_parser(&detect_job("nope", "org1")).await.unwrap_err();
    assert_eq!(err.to_string(), "Statement not found: nope");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn unreadable_and_unsupported_files_are_recorded_not_thrown() {
    let h = Harness::new(DuplicatePolicy::Exact);
    h.add_statement("s1", "scan.docx", "org1/scan.docx").await;
    h.add_statement("s2", "broken.pdf", "org1/broken.pdf").await;

    let output = h
        .ctx
        .parse_file(&parse_job("s1", "docx", Path::new("org1/scan.docx")))
        .await
        .unwrap();
    assert_eq!(output["status"], "error");
    let s1 = h.store.get("s1").await.unwrap();
    assert_eq!(s1.status, StatementStatus::Error);
    assert_eq!(s1.errors, Some(vec!["Unsupported file type: docx".to_string()]));

    h.ctx
        .parse_file(&parse_job("s2", "pdf", Path::new("org1/broken.pdf")))
        .await
        .unwrap();
    let s2 = h.store.get("s2").await.unwrap();
    assert_eq!(s2.status, StatementStatus::Error);
    let errors = s2.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("PDF parsing error: "), "{errors:?}");
    assert!(s2.extracted_data.unwrap().checksum.is_some());
}

fn crashing_reader(_: FileType, _: &[u8]) -> Result<RawData, ReadError> {
    panic!("glyph index out of range")
}

#[tokio::test]
async fn reader_crash_is_recorded_on_the_statement() {
    let h = Harness::with_decoder(DuplicatePolicy::Exact, crashing_reader);
    h.add_statement("s1", "jan.csv", "org1/jan.csv").await;

    let output = h
        .ctx
        .parse_file(&parse_job("s1", "csv", Path::new("org1/jan.csv")))
        .await
        .unwrap();
    assert_eq!(output["status"], "error");
    assert_eq!(output["errors"], 1);

    let s1 = h.store.get("s1").await.unwrap();
    assert_eq!(s1.status, StatementStatus::Error);
    assert_eq!(
        s1.errors,
        Some(vec!["CSV parsing error: Reader crashed: glyph index out of range".to_string()])
    );

    // Detection treats the same crash as an unreadable file.
    let err = h.ctx.detect_parser(&detect_job("s1", "org1")).await.unwrap_err();
    assert!(matches!(err, HandlerError::Read(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn inconclusive_detection_is_a_result_not_an_error() {
    let h = Harness::new(DuplicatePolicy::Exact);
    // Stored rows are used as-is; no file exists at this location.
    let mut statement = Statement::new("s1", "org1", "march.pdf");
    statement.location = Some("org1/missing.pdf".into());
    statement.extracted_data = Some(ExtractedData {
        raw: Some(RawData::Rows(vec![vec![Cell::from("hello")]])),
        ..Default::default()
    });
    h.store.insert(statement).await;

    let output = h.ctx.detect_parser(&detect_job("s1", "org1")).await.unwrap();
    assert_eq!(output["detectionResult"]["success"], false);

    let s1 = h.store.get("s1").await.unwrap();
    assert_eq!(s1.status, StatementStatus::DetectionFailed);
    assert_eq!(s1.parser_type, None);
    let check = s1.checks.parser_detection.unwrap();
    assert!(!check.success);
    assert_eq!(check.error.as_deref(), Some(NO_COMPATIBLE_PARSER));
}

#[tokio::test]
async fn download_failure_records_check_and_is_retryable() {
    let h = Harness::new(DuplicatePolicy::Exact);
    h.add_statement("s1", "feb.csv", "org1/feb.csv").await;

    let err = h.ctx.detect_parser(&detect_job("s1", "org1")).await.unwrap_err();
    assert!(matches!(err, HandlerError::Resolve(_)));
    assert!(err.is_retryable());

    let s1 = h.store.get("s1").await.unwrap();
    assert_eq!(s1.status, StatementStatus::Uploaded);
    let check = s1.checks.parser_detection.unwrap();
    assert!(!check.success);
    assert_eq!(check.error, Some(err.to_string()));
}

#[tokio::test]
async fn parse_skips_transactions_already_stored_for_the_org() {
    let h = Harness::new(DuplicatePolicy::Exact);
    let mut statement = h.add_statement("s1", "jan.csv", "org1/jan.csv").await;
    statement.parser_type = Some("testbank__csv".into());
    h.store.insert(statement).await;

    let salary = Transaction::new(
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
        Some(250_000),
        None,
        "Salary",
    );
    h.store.insert_transactions("org1", None, [salary.clone()]).await;
    h.store.insert_transactions("org2", None, [salary]).await;

    let output = h
        .ctx
        .parse_file(&parse_job("s1", "csv", Path::new("org1/jan.csv")))
        .await
        .unwrap();
    assert_eq!(output["transactions"], 2);
    assert_eq!(output["duplicatesSkipped"], 1);

    let data = h.store.get("s1").await.unwrap().extracted_data.unwrap();
    assert_eq!(data.duplicates_skipped, Some(1));
    assert!(data
        .transactions
        .unwrap()
        .iter()
        .all(|t| t.particulars != "Salary"));
}

#[tokio::test]
async fn worker_runs_queued_detection() {
    let h = Harness::new(DuplicatePolicy::Exact);
    h.add_statement("s1", "jan.csv", "org1/jan.csv").await;

    let mut config = Config::default();
    config.queue.poll_interval_ms = 10;
    config.queue.max_poll_interval_ms = 20;

    let queue = Arc::new(MemoryQueue::new());
    let worker = start_worker(&config, h.ctx.clone(), queue.clone()).await;

    let payload = DetectParserPayload {
        statement_id: "s1".into(),
        org_id: "org1".into(),
    };
    let id = enqueue_detect_parser(queue.as_ref(), &payload, &config.jobs.detect_parser)
        .await
        .unwrap();

    let mut job = None;
    for _ in 0..200 {
        let current = queue.get_job(id).await.unwrap().unwrap();
        if current.state.is_terminal() {
            job = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    worker.shutdown().await;

    let job = job.expect("job did not finish");
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(
        job.output.unwrap()["detectionResult"]["bestParser"],
        json!("testbank__csv")
    );
    assert_eq!(
        h.store.get("s1").await.unwrap().status,
        StatementStatus::ParserDetected
    );
}

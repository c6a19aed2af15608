use stmtflow_queue::{JobQueue, QueueError};
use tracing::info;
use uuid::Uuid;

use crate::config::JobConfig;
use crate::payload::{DetectParserPayload, ParseFilePayload, DETECT_PARSER_JOB, PARSE_FILE_JOB};

/// Queue parser detection for an uploaded statement. Callers wanting a
/// parse after detection enqueue it once this job completes.
pub async fn enqueue_detect_parser(
    queue: &dyn JobQueue,
    payload: &DetectParserPayload,
    config: &JobConfig,
) -> Result<Uuid, QueueError> {
    let id = queue
        .send(
            DETECT_PARSER_JOB,
            serde_json::to_value(payload)?,
            config.send_options(),
        )
        .await?;
    info!(job_id = %id, statement_id = %payload.statement_id, "Queued parser detection");
    Ok(id)
}

pub async fn enqueue_parse_file(
    queue: &dyn JobQueue,
    payload: &ParseFilePayload,
    config: &JobConfig,
) -> Result<Uuid, QueueError> {
    let id = queue
        .send(
            PARSE_FILE_JOB,
            serde_json::to_value(payload)?,
            config.send_options(),
        )
        .await?;
    info!(job_id = %id, statement_id = %payload.statement_id, "Queued file parse");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stmtflow_queue::{JobState, MemoryQueue};

    #[tokio::test]
    async fn jobs_carry_payload_and_configured_policy() {
        let queue = MemoryQueue::new();
        let config = JobConfig {
            retry_limit: 4,
            expire_in_minutes: 5,
            ..JobConfig::default()
        };
        let payload = DetectParserPayload {
            statement_id: "s1".into(),
            org_id: "o1".into(),
        };

        let id = enqueue_detect_parser(&queue, &payload, &config).await.unwrap();

        let job = queue.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.name, DETECT_PARSER_JOB);
        assert_eq!(job.state, JobState::Created);
        assert_eq!(job.retry_limit, 4);
        assert_eq!(job.expire_in_secs, 300);
        assert_eq!(job.data["statement_id"], "s1");
    }

    #[tokio::test]
    async fn parse_jobs_use_camel_case_payloads() {
        let queue = MemoryQueue::new();
        let payload = ParseFilePayload {
            statement_id: "s1".into(),
            org_id: "o1".into(),
            file_type: "csv".into(),
            file_name: "jan.csv".into(),
            s3_location: "o1/jan.csv".into(),
        };

        let id = enqueue_parse_file(&queue, &payload, &JobConfig::default())
            .await
            .unwrap();

        let job = queue.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.name, PARSE_FILE_JOB);
        assert_eq!(job.data["s3Location"], "o1/jan.csv");
        assert_eq!(queue.queue_size(Some(PARSE_FILE_JOB)).await.unwrap(), 1);
    }
}

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobState, QueueStats, SendOptions};
use crate::queue::JobQueue;

const JOB_COLUMNS: &str = "id, name, data, state, priority, retry_limit, retry_count, retry_delay, \
     retry_backoff, start_after, expire_in_seconds, created_on, started_on, completed_on, output";

type JobRow = (
    Uuid,
    String,
    serde_json::Value,
    String,
    i32,
    i32,
    i32,
    i32,
    bool,
    DateTime<Utc>,
    i32,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<serde_json::Value>,
);

fn job_from_row(row: JobRow) -> Result<Job, QueueError> {
    let (
        id,
        name,
        data,
        state,
        priority,
        retry_limit,
        retry_count,
        retry_delay_secs,
        retry_backoff,
        start_after,
        expire_in_secs,
        created_on,
        started_on,
        completed_on,
        output,
    ) = row;

    Ok(Job {
        id,
        name,
        data,
        state: state.parse().map_err(QueueError::Corrupt)?,
        priority,
        retry_limit,
        retry_count,
        retry_delay_secs,
        retry_backoff,
        start_after,
        expire_in_secs,
        created_on,
        started_on,
        completed_on,
        output,
    })
}

/// Schema names are spliced into SQL, so only plain identifiers pass.
pub fn validate_schema(schema: &str) -> Result<(), QueueError> {
    let mut chars = schema.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && schema.len() <= 63;
    if valid {
        Ok(())
    } else {
        Err(QueueError::InvalidSchema(schema.to_string()))
    }
}

/// `JobQueue` on PostgreSQL. Claims use `FOR UPDATE SKIP LOCKED`, so any
/// number of worker processes can share one schema.
#[derive(Clone)]
pub struct PgQueue {
    pool: PgPool,
    schema: String,
}

impl PgQueue {
    pub fn new(pool: PgPool, schema: &str) -> Result<Self, QueueError> {
        validate_schema(schema)?;
        Ok(Self {
            pool,
            schema: schema.to_string(),
        })
    }

    /// Create the schema and tables if they do not exist yet.
    pub async fn start(&self) -> Result<(), QueueError> {
        for statement in schema_statements(&self.schema) {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        info!(schema = %self.schema, "Job queue schema ready");
        Ok(())
    }

    pub async fn stop(&self) {
        self.pool.close().await;
        info!(schema = %self.schema, "Job queue stopped");
    }

    async fn state_of(&self, id: Uuid) -> Result<JobState, QueueError> {
        let state: Option<(String,)> =
            sqlx::query_as(&format!("SELECT state FROM {}.job WHERE id = $1", self.schema))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match state {
            Some((state,)) => state.parse().map_err(QueueError::Corrupt),
            None => Err(QueueError::NotFound(id)),
        }
    }

    async fn invalid_state(&self, id: Uuid, action: &'static str) -> QueueError {
        match self.state_of(id).await {
            Ok(state) => QueueError::InvalidState { id, state, action },
            Err(e) => e,
        }
    }

    /// Write back the retry/failed outcome computed by `Job::record_failure`.
    async fn store_failure<'c, E>(&self, executor: E, job: &Job) -> Result<(), QueueError>
    where
        E: sqlx::PgExecutor<'c>,
    {
        sqlx::query(&format!(
            "UPDATE {}.job SET state = $2, start_after = $3, completed_on = $4, output = $5 \
             WHERE id = $1",
            self.schema
        ))
        .bind(job.id)
        .bind(job.state.as_str())
        .bind(job.start_after)
        .bind(job.completed_on)
        .bind(&job.output)
        .execute(executor)
        .await?;
        Ok(())
    }
}

fn schema_statements(schema: &str) -> Vec<String> {
    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {schema}"),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {schema}.job (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                data JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                state TEXT NOT NULL DEFAULT 'created',
                priority INTEGER NOT NULL DEFAULT 0,
                retry_limit INTEGER NOT NULL DEFAULT 0,
                retry_count INTEGER NOT NULL DEFAULT 0,
                retry_delay INTEGER NOT NULL DEFAULT 0,
                retry_backoff BOOLEAN NOT NULL DEFAULT false,
                start_after TIMESTAMPTZ NOT NULL DEFAULT now(),
                expire_in_seconds INTEGER NOT NULL DEFAULT 900,
                created_on TIMESTAMPTZ NOT NULL DEFAULT now(),
                started_on TIMESTAMPTZ,
                completed_on TIMESTAMPTZ,
                output JSONB
            )
            "#
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS job_fetch_idx ON {schema}.job \
             (name, state, priority DESC, created_on)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.archive \
             (LIKE {schema}.job INCLUDING DEFAULTS, archived_on TIMESTAMPTZ NOT NULL DEFAULT now())"
        ),
    ]
}

fn fetch_sql(schema: &str) -> String {
    format!(
        r#"
        WITH next AS (
            SELECT id FROM {schema}.job
            WHERE name = $1 AND state IN ('created', 'retry') AND start_after <= now()
            ORDER BY priority DESC, created_on, id
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        )
        UPDATE {schema}.job j SET
            state = 'active',
            started_on = now(),
            retry_count = CASE WHEN j.state = 'retry' THEN j.retry_count + 1 ELSE j.retry_count END
        FROM next
        WHERE j.id = next.id
        RETURNING {columns}
        "#,
        columns = JOB_COLUMNS
            .split(", ")
            .map(|c| format!("j.{c}"))
            .collect::<Vec<_>>()
            .join(", ")
    )
}

fn secs(d: Duration) -> f64 {
    d.as_secs_f64()
}

#[async_trait]
impl JobQueue for PgQueue {
    async fn send(
        &self,
        name: &str,
        data: serde_json::Value,
        options: SendOptions,
    ) -> Result<Uuid, QueueError> {
        let job = Job::new(name, data, &options, Utc::now());

        sqlx::query(&format!(
            "INSERT INTO {}.job ({JOB_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            self.schema
        ))
        .bind(job.id)
        .bind(&job.name)
        .bind(&job.data)
        .bind(job.state.as_str())
        .bind(job.priority)
        .bind(job.retry_limit)
        .bind(job.retry_count)
        .bind(job.retry_delay_secs)
        .bind(job.retry_backoff)
        .bind(job.start_after)
        .bind(job.expire_in_secs)
        .bind(job.created_on)
        .bind(job.started_on)
        .bind(job.completed_on)
        .bind(&job.output)
        .execute(&self.pool)
        .await?;

        debug!(job_id = %job.id, name, "Job sent");
        Ok(job.id)
    }

    async fn fetch(&self, name: &str, batch_size: usize) -> Result<Vec<Job>, QueueError> {
        let rows = sqlx::query_as::<_, JobRow>(&fetch_sql(&self.schema))
            .bind(name)
            .bind(batch_size as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut jobs = rows
            .into_iter()
            .map(job_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        jobs.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_on.cmp(&b.created_on)));
        Ok(jobs)
    }

    async fn complete(&self, id: Uuid, output: serde_json::Value) -> Result<(), QueueError> {
        let result = sqlx::query(&format!(
            "UPDATE {}.job SET state = 'completed', completed_on = now(), output = $2 \
             WHERE id = $1 AND state = 'active'",
            self.schema
        ))
        .bind(id)
        .bind(output)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.invalid_state(id, "complete").await);
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str, retryable: bool) -> Result<JobState, QueueError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM {}.job WHERE id = $1 FOR UPDATE",
            self.schema
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut job = job_from_row(row.ok_or(QueueError::NotFound(id))?)?;
        if job.state != JobState::Active {
            return Err(QueueError::InvalidState {
                id,
                state: job.state,
                action: "fail",
            });
        }

        let state = job.record_failure(error, retryable, Utc::now());
        self.store_failure(&mut *tx, &job).await?;
        tx.commit().await?;

        Ok(state)
    }

    async fn cancel(&self, id: Uuid) -> Result<(), QueueError> {
        let result = sqlx::query(&format!(
            "UPDATE {}.job SET state = 'cancelled', completed_on = now() \
             WHERE id = $1 AND state IN ('created', 'retry', 'active')",
            self.schema
        ))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.invalid_state(id, "cancel").await);
        }
        Ok(())
    }

    async fn resume(&self, id: Uuid) -> Result<(), QueueError> {
        let result = sqlx::query(&format!(
            "UPDATE {}.job SET state = 'created', completed_on = NULL \
             WHERE id = $1 AND state = 'cancelled'",
            self.schema
        ))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.invalid_state(id, "resume").await);
        }
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM {s}.job WHERE id = $1 \
             UNION ALL SELECT {JOB_COLUMNS} FROM {s}.archive WHERE id = $1 \
             LIMIT 1",
            s = self.schema
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(job_from_row).transpose()
    }

    async fn queue_size(&self, name: Option<&str>) -> Result<u64, QueueError> {
        Ok(self.stats(name).await?.queued())
    }

    async fn stats(&self, name: Option<&str>) -> Result<QueueStats, QueueError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
            "SELECT state, count(*) FROM {}.job \
             WHERE ($1::text IS NULL OR name = $1) GROUP BY state",
            self.schema
        ))
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = QueueStats::default();
        for (state, count) in rows {
            let state: JobState = state.parse().map_err(QueueError::Corrupt)?;
            stats.by_state.insert(state, count.max(0) as u64);
        }
        Ok(stats)
    }

    async fn expire(&self) -> Result<u64, QueueError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM {}.job \
             WHERE state = 'active' \
               AND started_on + make_interval(secs => expire_in_seconds) < now() \
             FOR UPDATE SKIP LOCKED",
            self.schema
        ))
        .fetch_all(&mut *tx)
        .await?;

        let now = Utc::now();
        let mut expired = 0;
        for row in rows {
            let mut job = job_from_row(row)?;
            job.record_failure("job expired", true, now);
            self.store_failure(&mut *tx, &job).await?;
            expired += 1;
        }
        tx.commit().await?;

        if expired > 0 {
            info!(expired, "Expired active jobs");
        }
        Ok(expired)
    }

    async fn archive(&self, completed_after: Duration) -> Result<u64, QueueError> {
        let result = sqlx::query(&format!(
            r#"
            WITH moved AS (
                DELETE FROM {s}.job
                WHERE state IN ('completed', 'cancelled', 'failed')
                  AND completed_on <= now() - make_interval(secs => $1)
                RETURNING *
            )
            INSERT INTO {s}.archive SELECT *, now() FROM moved
            "#,
            s = self.schema
        ))
        .bind(secs(completed_after))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn purge(&self, older_than: Duration) -> Result<u64, QueueError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {}.archive WHERE archived_on <= now() - make_interval(secs => $1)",
            self.schema
        ))
        .bind(secs(older_than))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use stmtflow_core::{Checks, ExtractedData, Statement, StatementUpdate, Transaction};
use tracing::debug;

use crate::db::DbPool;
use crate::store::{StatementStore, StoreError};

type StatementRow = (
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    Json<Checks>,
    Option<Json<ExtractedData>>,
    Option<Json<Vec<String>>>,
);

const STATEMENT_COLUMNS: &str = "id, org, project, file_name, file_type, mime_type, location, \
     status, parser_type, checks, extracted_data, errors";

/// `StatementStore` over the `statements` and `transactions` tables.
#[derive(Clone)]
pub struct PgStatementStore {
    pool: DbPool,
}

impl PgStatementStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn statement_from_row(row: StatementRow) -> Result<Statement, StoreError> {
    let (
        id,
        org,
        project,
        file_name,
        file_type,
        mime_type,
        location,
        status,
        parser_type,
        checks,
        extracted_data,
        errors,
    ) = row;

    let status = status
        .parse()
        .map_err(|reason| StoreError::Corrupt { id: id.clone(), reason })?;

    Ok(Statement {
        id,
        org,
        project,
        file_name,
        file_type,
        mime_type,
        location,
        status,
        parser_type,
        checks: checks.0,
        extracted_data: extracted_data.map(|j| j.0),
        errors: errors.map(|j| j.0),
    })
}

/// Build the `UPDATE` for the columns `update` touches. `None` when there
/// is nothing to write.
fn build_update<'a>(id: &'a str, update: StatementUpdate) -> Option<QueryBuilder<'a, Postgres>> {
    if update.is_empty() {
        return None;
    }

    let mut qb = QueryBuilder::<Postgres>::new("UPDATE statements SET updated_at = now()");
    if let Some(status) = update.status {
        qb.push(", status = ").push_bind(status.to_string());
    }
    if let Some(parser_type) = update.parser_type {
        qb.push(", parser_type = ").push_bind(parser_type);
    }
    if let Some(checks) = update.checks {
        qb.push(", checks = ").push_bind(Json(checks));
    }
    if let Some(extracted_data) = update.extracted_data {
        qb.push(", extracted_data = ").push_bind(extracted_data.map(Json));
    }
    if let Some(errors) = update.errors {
        qb.push(", errors = ").push_bind(errors.map(Json));
    }
    qb.push(" WHERE id = ").push_bind(id);

    Some(qb)
}

#[async_trait]
impl StatementStore for PgStatementStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Statement>, StoreError> {
        let row = sqlx::query_as::<_, StatementRow>(&format!(
            "SELECT {STATEMENT_COLUMNS} FROM statements WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(statement_from_row).transpose()
    }

    async fn update(&self, id: &str, update: StatementUpdate) -> Result<(), StoreError> {
        let Some(mut qb) = build_update(id, update) else {
            debug!(statement_id = id, "Empty statement update skipped");
            return Ok(());
        };

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn transactions_for(
        &self,
        org: &str,
        project: Option<&str>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query_as::<_, (NaiveDate, Option<i64>, Option<i64>, String)>(
            r#"
            SELECT date, inflow, outflow, particulars
            FROM transactions
            WHERE org = $1 AND ($2::text IS NULL OR project = $2)
            ORDER BY date, id
            "#,
        )
        .bind(org)
        .bind(project)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(date, inflow, outflow, particulars)| Transaction {
                date,
                inflow,
                outflow,
                particulars,
            })
            .collect())
    }
}

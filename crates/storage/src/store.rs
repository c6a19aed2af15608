use std::collections::HashMap;

use async_trait::async_trait;
use stmtflow_core::{Statement, StatementUpdate, Transaction};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Statement not found: {0}")]
    NotFound(String),
    #[error("Corrupt statement row {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Read and partial-write access to statements, plus the stored
/// transactions they are deduplicated against.
#[async_trait]
pub trait StatementStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Statement>, StoreError>;

    /// Apply `update` to one statement. Fails with `NotFound` if the row
    /// is gone.
    async fn update(&self, id: &str, update: StatementUpdate) -> Result<(), StoreError>;

    /// Transactions already stored for an org, narrowed to one project
    /// when given.
    async fn transactions_for(
        &self,
        org: &str,
        project: Option<&str>,
    ) -> Result<Vec<Transaction>, StoreError>;
}

struct StoredTransaction {
    org: String,
    project: Option<String>,
    transaction: Transaction,
}

/// In-process store for tests and single-binary embedding.
#[derive(Default)]
pub struct MemoryStatementStore {
    statements: Mutex<HashMap<String, Statement>>,
    transactions: Mutex<Vec<StoredTransaction>>,
    updates: Mutex<usize>,
}

impl MemoryStatementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, statement: Statement) {
        self.statements
            .lock()
            .await
            .insert(statement.id.clone(), statement);
    }

    pub async fn insert_transactions(
        &self,
        org: &str,
        project: Option<&str>,
        transactions: impl IntoIterator<Item = Transaction>,
    ) {
        let mut stored = self.transactions.lock().await;
        stored.extend(transactions.into_iter().map(|transaction| StoredTransaction {
            org: org.to_string(),
            project: project.map(str::to_string),
            transaction,
        }));
    }

    pub async fn get(&self, id: &str) -> Option<Statement> {
        self.statements.lock().await.get(id).cloned()
    }

    /// Number of successful `update` calls so far.
    pub async fn update_count(&self) -> usize {
        *self.updates.lock().await
    }
}

#[async_trait]
impl StatementStore for MemoryStatementStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Statement>, StoreError> {
        Ok(self.get(id).await)
    }

    async fn update(&self, id: &str, update: StatementUpdate) -> Result<(), StoreError> {
        let mut statements = self.statements.lock().await;
        let statement = statements
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        statement.apply(update);
        *self.updates.lock().await += 1;
        Ok(())
    }

    async fn transactions_for(
        &self,
        org: &str,
        project: Option<&str>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let stored = self.transactions.lock().await;
        Ok(stored
            .iter()
            .filter(|s| s.org == org)
            .filter(|s| project.is_none() || s.project.as_deref() == project)
            .map(|s| s.transaction.clone())
            .collect())
    }
}

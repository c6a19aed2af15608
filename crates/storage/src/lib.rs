pub mod db;
pub mod pg;
pub mod store;

pub use db::{create_pool, run_migrations, DbPool};
pub use pg::PgStatementStore;
pub use store::{MemoryStatementStore, StatementStore, StoreError};

use sqlx::{postgres::PgPoolOptions, PgPool};

pub type DbPool = PgPool;

pub async fn create_pool(url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS statements (
            id TEXT PRIMARY KEY,
            org TEXT NOT NULL,
            project TEXT,
            file_name TEXT NOT NULL,
            file_type TEXT,
            mime_type TEXT,
            location TEXT,
            status TEXT NOT NULL DEFAULT 'uploaded',
            parser_type TEXT,
            checks JSONB NOT NULL DEFAULT '{}'::jsonb,
            extracted_data JSONB,
            errors JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS statements_org_idx ON statements (org)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id BIGSERIAL PRIMARY KEY,
            org TEXT NOT NULL,
            project TEXT,
            statement TEXT REFERENCES statements(id) ON DELETE SET NULL,
            date DATE NOT NULL,
            inflow BIGINT,
            outflow BIGINT,
            particulars TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS transactions_org_project_idx ON transactions (org, project)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

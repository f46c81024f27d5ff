use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};

/// Create the schema if it does not exist. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    run_migrations_on_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Schema: one row per indexed chunk, one row per stored embedding vector.
pub async fn run_migrations_on_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::IndexUnavailable(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::IndexUnavailable(e.to_string()))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
        .execute(pool)
        .await
        .map_err(|e| Error::IndexUnavailable(e.to_string()))?;

    Ok(())
}

//! Schema creation for the document store.
//!
//! Two tables: `documents` holds one row per ingested file, and
//! `documents_vec` is the similarity-search table keyed by the same id.
//! Running the migrations again against an initialized file is a no-op.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// What the store can do after initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaStatus {
    pub vector_search: bool,
}

pub async fn run_migrations(config: &Config) -> Result<SchemaStatus> {
    let pool = db::connect(config).await?;
    let status = migrate_pool(&pool, config.db.vector_search).await;
    pool.close().await;
    status
}

pub async fn migrate_pool(pool: &SqlitePool, want_vectors: bool) -> Result<SchemaStatus> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            content TEXT,
            embedding BLOB
        )
        "#,
    )
    .execute(pool)
    .await?;

    if !want_vectors {
        tracing::warn!("vector search disabled by configuration");
        return Ok(SchemaStatus {
            vector_search: false,
        });
    }

    let created = sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents_vec (
            document_id INTEGER PRIMARY KEY,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await;

    if let Err(e) = created {
        tracing::warn!(error = %e, "could not create vector table, vector search disabled");
        return Ok(SchemaStatus {
            vector_search: false,
        });
    }

    Ok(SchemaStatus {
        vector_search: true,
    })
}

pub async fn vector_table_exists(pool: &SqlitePool) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_vec'",
    )
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(tmp: &TempDir) -> Config {
        let mut config = Config::default();
        config.db.path = tmp.path().join("zhora.db");
        config
    }

    async fn table_count(config: &Config) -> i64 {
        let pool = db::connect(config).await.unwrap();
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type='table'")
            .fetch_one(&pool)
            .await
            .unwrap();
        pool.close().await;
        n
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);

        let first = run_migrations(&config).await.unwrap();
        let tables = table_count(&config).await;
        let second = run_migrations(&config).await.unwrap();

        assert!(first.vector_search);
        assert_eq!(first, second);
        assert_eq!(tables, table_count(&config).await);
    }

    #[tokio::test]
    async fn test_vector_search_disabled_by_config() {
        let tmp = TempDir::new().unwrap();
        let mut config = config_in(&tmp);
        config.db.vector_search = false;

        let status = run_migrations(&config).await.unwrap();
        assert!(!status.vector_search);

        let pool = db::connect(&config).await.unwrap();
        assert!(!vector_table_exists(&pool).await.unwrap());
        pool.close().await;
    }
}

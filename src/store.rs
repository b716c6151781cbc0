//! SQLite-backed document store.
//!
//! Rows live in `documents`; their vectors are mirrored into `documents_vec`
//! under the same id. Nearest-neighbor lookup scans `documents_vec` and ranks
//! by Euclidean distance in Rust.
//!
//! The store is append-only: there is no update or delete of documents.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, l2_distance, vec_to_blob};
use crate::migrate;
use crate::models::{ContextSnapshot, Document};

/// One hit from [`DocumentStore::nearest`].
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: i64,
    pub distance: f32,
}

/// Counts from [`DocumentStore::reconcile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Vector entries re-created from a row's inline embedding.
    pub restored: u64,
    /// Vector entries removed because their row no longer exists.
    pub pruned: u64,
}

pub struct DocumentStore {
    pool: SqlitePool,
    vector_search: bool,
}

impl DocumentStore {
    /// Open the store, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let status = migrate::migrate_pool(&pool, config.db.vector_search).await?;
        Ok(Self {
            pool,
            vector_search: status.vector_search,
        })
    }

    pub fn vector_search(&self) -> bool {
        self.vector_search
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Append a document and its vector entry in one transaction.
    pub async fn insert(
        &self,
        filename: &str,
        snapshot: &ContextSnapshot,
        embedding: &[f32],
    ) -> Result<i64> {
        let content = serde_json::to_string(snapshot)?;
        let blob = vec_to_blob(embedding);

        let mut tx = self.pool.begin().await?;

        let id = sqlx::query("INSERT INTO documents (filename, content, embedding) VALUES (?, ?, ?)")
            .bind(filename)
            .bind(&content)
            .bind(&blob)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        if self.vector_search {
            sqlx::query("INSERT INTO documents_vec (document_id, embedding) VALUES (?, ?)")
                .bind(id)
                .bind(&blob)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    /// The `k` stored vectors closest to `query`, nearest first.
    ///
    /// Equal distances rank the most recently inserted document first.
    /// Returns nothing when vector search is disabled.
    pub async fn nearest(&self, query: &[f32], k: i64) -> Result<Vec<Neighbor>> {
        if !self.vector_search || k < 1 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT document_id, embedding FROM documents_vec")
            .fetch_all(&self.pool)
            .await?;

        let mut neighbors: Vec<Neighbor> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                Neighbor {
                    id: row.get("document_id"),
                    distance: l2_distance(query, &blob_to_vec(&blob)),
                }
            })
            .collect();

        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(b.id.cmp(&a.id)));
        neighbors.truncate(k as usize);

        Ok(neighbors)
    }

    /// Full rows for `ids`, in the order given. Ids without a row are skipped.
    pub async fn fetch(&self, ids: &[i64]) -> Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT id, filename, content FROM documents WHERE id IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut by_id: HashMap<i64, Document> = rows
            .iter()
            .map(|row| {
                let doc = row_to_document(row);
                (doc.id, doc)
            })
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Every document, ascending id.
    pub async fn list(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT id, filename, content FROM documents ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Bring `documents_vec` back in line with `documents`.
    ///
    /// Rows missing a vector entry get one rebuilt from their inline
    /// embedding; vector entries with no row are dropped.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        if !self.vector_search {
            return Ok(ReconcileReport::default());
        }

        let mut tx = self.pool.begin().await?;

        let restored = sqlx::query(
            r#"
            INSERT INTO documents_vec (document_id, embedding)
            SELECT d.id, d.embedding FROM documents d
            WHERE d.embedding IS NOT NULL
              AND NOT EXISTS (SELECT 1 FROM documents_vec v WHERE v.document_id = d.id)
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let pruned = sqlx::query(
            r#"
            DELETE FROM documents_vec
            WHERE NOT EXISTS (SELECT 1 FROM documents d WHERE d.id = documents_vec.document_id)
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if restored > 0 || pruned > 0 {
            tracing::warn!(restored, pruned, "reconciled vector index with documents");
        }

        Ok(ReconcileReport { restored, pruned })
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    let content: Option<String> = row.get("content");
    Document {
        id: row.get("id"),
        filename: row.get("filename"),
        content: content.unwrap_or_default(),
    }
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

    fn snapshot(name: &str, context: &str) -> ContextSnapshot {
        ContextSnapshot {
            filename: name.to_string(),
            context: context.to_string(),
            timestamp: 0.0,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::open(&config_in(&tmp)).await.unwrap();

        let a = store.insert("a.pdf", &snapshot("a.pdf", "alpha"), &[0.0, 1.0]).await.unwrap();
        let b = store.insert("a.pdf", &snapshot("a.pdf", "again"), &[1.0, 0.0]).await.unwrap();
        assert!(b > a);

        let docs = store.list().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, a);
        assert_eq!(docs[1].context_text(), "again");
        store.close().await;
    }

    #[tokio::test]
    async fn test_nearest_orders_by_distance() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::open(&config_in(&tmp)).await.unwrap();

        let far = store.insert("far", &snapshot("far", ""), &[10.0, 0.0]).await.unwrap();
        let near = store.insert("near", &snapshot("near", ""), &[1.0, 0.0]).await.unwrap();
        let mid = store.insert("mid", &snapshot("mid", ""), &[3.0, 0.0]).await.unwrap();

        let hits = store.nearest(&[0.0, 0.0], 5).await.unwrap();
        let ids: Vec<i64> = hits.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![near, mid, far]);
        assert_eq!(hits[0].distance, 1.0);

        let top1 = store.nearest(&[0.0, 0.0], 1).await.unwrap();
        assert_eq!(top1.len(), 1);
        store.close().await;
    }

    #[tokio::test]
    async fn test_nearest_ties_prefer_newest() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::open(&config_in(&tmp)).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..7 {
            let name = format!("f{}.txt", i);
            ids.push(store.insert(&name, &snapshot(&name, ""), &[0.0; 4]).await.unwrap());
        }

        let hits = store.nearest(&[0.0; 4], 5).await.unwrap();
        let got: Vec<i64> = hits.iter().map(|n| n.id).collect();
        let expected: Vec<i64> = ids.iter().rev().take(5).copied().collect();
        assert_eq!(got, expected);
        store.close().await;
    }

    #[tokio::test]
    async fn test_non_finite_vectors_rank_last() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::open(&config_in(&tmp)).await.unwrap();

        let near = store.insert("near", &snapshot("near", ""), &[1.0, 0.0]).await.unwrap();
        let nan = store.insert("nan", &snapshot("nan", ""), &[f32::NAN, 0.0]).await.unwrap();
        let inf = store
            .insert("inf", &snapshot("inf", ""), &[f32::INFINITY, 0.0])
            .await
            .unwrap();

        let hits = store.nearest(&[f32::INFINITY, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|n| !n.distance.is_nan()));

        let hits = store.nearest(&[0.0, 0.0], 5).await.unwrap();
        let ids: Vec<i64> = hits.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![near, inf, nan]);
        store.close().await;
    }

    #[tokio::test]
    async fn test_fetch_preserves_requested_order_and_skips_missing() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::open(&config_in(&tmp)).await.unwrap();

        let a = store.insert("a", &snapshot("a", ""), &[0.0]).await.unwrap();
        let b = store.insert("b", &snapshot("b", ""), &[0.0]).await.unwrap();

        let docs = store.fetch(&[b, 9999, a]).await.unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(store.fetch(&[]).await.unwrap().is_empty());
        store.close().await;
    }

    #[tokio::test]
    async fn test_reconcile_restores_and_prunes() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::open(&config_in(&tmp)).await.unwrap();

        let kept = store.insert("kept", &snapshot("kept", ""), &[2.0, 2.0]).await.unwrap();

        // A row whose vector entry was never written.
        sqlx::query("INSERT INTO documents (filename, content, embedding) VALUES (?, ?, ?)")
            .bind("orphan-row")
            .bind("{}")
            .bind(vec_to_blob(&[0.0, 0.0]))
            .execute(store.pool())
            .await
            .unwrap();
        // A vector entry whose row is gone.
        sqlx::query("INSERT INTO documents_vec (document_id, embedding) VALUES (?, ?)")
            .bind(4242i64)
            .bind(vec_to_blob(&[0.0, 0.0]))
            .execute(store.pool())
            .await
            .unwrap();

        let report = store.reconcile().await.unwrap();
        assert_eq!(report, ReconcileReport { restored: 1, pruned: 1 });

        let hits = store.nearest(&[0.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|n| n.id != 4242));
        assert_eq!(hits[1].id, kept);

        assert_eq!(store.reconcile().await.unwrap(), ReconcileReport::default());
        store.close().await;
    }

    #[tokio::test]
    async fn test_disabled_vector_search_still_stores_rows() {
        let tmp = TempDir::new().unwrap();
        let mut config = config_in(&tmp);
        config.db.vector_search = false;
        let store = DocumentStore::open(&config).await.unwrap();
        assert!(!store.vector_search());

        store.insert("a", &snapshot("a", ""), &[0.0]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.nearest(&[0.0], 5).await.unwrap().is_empty());
        store.close().await;
    }
}

//! SQLite-backed vector store implementation.
//!
//! In-process store using SQLite for documents and metadata and
//! brute-force cosine similarity for nearest-neighbor search.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{DocumentHit, SourceMeta, StoredDocument, VectorStore};
use crate::core::errors::ApiError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS topics (
                name TEXT PRIMARY KEY,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                doc_id TEXT PRIMARY KEY,
                topic TEXT NOT NULL REFERENCES topics(name) ON DELETE CASCADE,
                content TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL DEFAULT '',
                page INTEGER NOT NULL DEFAULT 0,
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_topic ON documents(topic)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> StoredDocument {
        StoredDocument {
            doc_id: row.get("doc_id"),
            content: row.get("content"),
            meta: SourceMeta {
                title: row.get("title"),
                url: row.get("url"),
                page: row.get("page"),
            },
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn create_topic(&self, topic: &str) -> Result<(), ApiError> {
        if topic.trim().is_empty() {
            return Err(ApiError::BadRequest("topic must be non-empty".to_string()));
        }

        let result = sqlx::query("INSERT OR IGNORE INTO topics (name) VALUES (?1)")
            .bind(topic)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            tracing::info!("Topic '{}' already exists, nothing to create", topic);
        }

        Ok(())
    }

    async fn topic_exists(&self, topic: &str) -> Result<bool, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM topics WHERE name = ?1")
            .bind(topic)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(count > 0)
    }

    async fn list_topics(&self) -> Result<Vec<String>, ApiError> {
        let rows = sqlx::query("SELECT name FROM topics ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    async fn delete_topic(&self, topic: &str) -> Result<usize, ApiError> {
        // one transaction: the topic row and its documents go together,
        // never a topic that exists with its documents already gone
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        let removed = sqlx::query("DELETE FROM documents WHERE topic = ?1")
            .bind(topic)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query("DELETE FROM topics WHERE name = ?1")
            .bind(topic)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;

        Ok(removed.rows_affected() as usize)
    }

    async fn insert_batch(
        &self,
        topic: &str,
        items: Vec<(StoredDocument, Vec<f32>)>,
    ) -> Result<(), ApiError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("INSERT OR IGNORE INTO topics (name) VALUES (?1)")
            .bind(topic)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        for (document, embedding) in &items {
            let blob = Self::serialize_embedding(embedding);

            sqlx::query(
                "INSERT OR REPLACE INTO documents (doc_id, topic, content, title, url, page, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&document.doc_id)
            .bind(topic)
            .bind(&document.content)
            .bind(&document.meta.title)
            .bind(&document.meta.url)
            .bind(document.meta.page)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn query(
        &self,
        topic: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<DocumentHit>, ApiError> {
        let rows = sqlx::query(
            "SELECT doc_id, content, title, url, page, embedding
             FROM documents
             WHERE topic = ?1",
        )
        .bind(topic)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored: Vec<DocumentHit> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored_emb = Self::deserialize_embedding(&embedding_bytes);
                let score = Self::cosine_similarity(embedding, &stored_emb);

                Some(DocumentHit {
                    document: Self::row_to_document(row),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k.max(1));

        Ok(scored)
    }

    async fn count(&self, topic: &str) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE topic = ?1")
            .bind(topic)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(count as usize)
    }
}

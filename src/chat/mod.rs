//! Chat store — per-topic message history and citations over SQLite.
//!
//! The pipeline never touches this store; callers persist `ask` results
//! here after the fact. The pool is built at startup and injected, there
//! is no process-wide handle.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;
use crate::pipeline::Citation;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCitation {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub page: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub role: String,
    pub content: String,
    pub created_at: String,
    pub citations: Vec<StoredCitation>,
}

#[derive(Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

impl ChatStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to connect to chat db: {}", e)))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chats (
                topic TEXT PRIMARY KEY,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init chats table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(topic) REFERENCES chats(topic) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init messages table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS citations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL,
                page INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY(message_id) REFERENCES messages(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init citations table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_topic ON messages(topic)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    /// Idempotent: creating an existing chat is a logged no-op.
    pub async fn create_chat(&self, topic: &str) -> Result<(), ApiError> {
        if topic.trim().is_empty() {
            return Err(ApiError::BadRequest("topic must be non-empty".to_string()));
        }

        let result = sqlx::query("INSERT OR IGNORE INTO chats (topic) VALUES (?1)")
            .bind(topic)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            tracing::info!("Chat for topic '{}' already exists", topic);
        }

        Ok(())
    }

    pub async fn chat_exists(&self, topic: &str) -> Result<bool, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chats WHERE topic = ?1")
            .bind(topic)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(count > 0)
    }

    pub async fn list_topics(&self) -> Result<Vec<String>, ApiError> {
        let rows = sqlx::query("SELECT topic FROM chats ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(rows.iter().map(|row| row.get("topic")).collect())
    }

    pub async fn delete_chat(&self, topic: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM chats WHERE topic = ?1")
            .bind(topic)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }

    /// Persists one completed turn: the user question, the assistant answer,
    /// and the answer's citations, all in a single transaction. Returns the
    /// assistant message id the citations reference.
    pub async fn save_turn(
        &self,
        topic: &str,
        question: &str,
        answer: &str,
        citations: &[Citation],
    ) -> Result<i64, ApiError> {
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("INSERT OR IGNORE INTO chats (topic) VALUES (?1)")
            .bind(topic)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query("INSERT INTO messages (topic, role, content, created_at) VALUES (?1, 'user', ?2, ?3)")
            .bind(topic)
            .bind(question)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        let result = sqlx::query(
            "INSERT INTO messages (topic, role, content, created_at) VALUES (?1, 'assistant', ?2, ?3)",
        )
        .bind(topic)
        .bind(answer)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        let message_id = result.last_insert_rowid();

        for citation in citations {
            sqlx::query(
                "INSERT INTO citations (message_id, title, url, page) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(message_id)
            .bind(&citation.title)
            .bind(&citation.url)
            .bind(citation.page)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;

        Ok(message_id)
    }

    pub async fn get_messages(&self, topic: &str) -> Result<Vec<StoredMessage>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, role, content, created_at FROM messages WHERE topic = ?1 ORDER BY id ASC",
        )
        .bind(topic)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            messages.push(StoredMessage {
                id,
                role: row.get("role"),
                content: row.get("content"),
                created_at: row.get("created_at"),
                citations: self.get_citations(id).await?,
            });
        }

        Ok(messages)
    }

    pub async fn get_citations(&self, message_id: i64) -> Result<Vec<StoredCitation>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, title, url, page FROM citations WHERE message_id = ?1 ORDER BY id ASC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .map(|row| StoredCitation {
                id: row.get("id"),
                title: row.get("title"),
                url: row.get("url"),
                page: row.get("page"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> ChatStore {
        let tmp = std::env::temp_dir().join(format!(
            "docchat-chat-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        ChatStore::new(tmp).await.unwrap()
    }

    fn citation(title: &str, page: i64) -> Citation {
        Citation {
            title: title.to_string(),
            url: format!("https://example.org/{}", title),
            page,
        }
    }

    #[tokio::test]
    async fn create_chat_is_idempotent() {
        let store = test_store().await;

        store.create_chat("history").await.unwrap();
        store.create_chat("history").await.unwrap();

        assert_eq!(store.list_topics().await.unwrap(), vec!["history"]);
    }

    #[tokio::test]
    async fn save_turn_persists_both_roles_and_citations() {
        let store = test_store().await;

        let citations = vec![citation("Report A", 3), citation("Report A", 3)];
        let message_id = store
            .save_turn("history", "What happened?", "It began in 1983.", &citations)
            .await
            .unwrap();

        let messages = store.get_messages("history").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, "What happened?");
        assert!(messages[0].citations.is_empty());
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].id, message_id);

        // duplicates across rounds are preserved in order
        assert_eq!(messages[1].citations.len(), 2);
        assert_eq!(messages[1].citations[0].title, "Report A");
        assert_eq!(messages[1].citations[0].page, 3);
        assert_eq!(messages[1].citations[1].title, "Report A");
    }

    #[tokio::test]
    async fn delete_chat_cascades_to_messages() {
        let store = test_store().await;

        store
            .save_turn("history", "q", "a", &[citation("T", 0)])
            .await
            .unwrap();
        store.delete_chat("history").await.unwrap();

        assert!(!store.chat_exists("history").await.unwrap());
        assert!(store.get_messages("history").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_topic_rejected() {
        let store = test_store().await;
        let err = store.create_chat("").await.unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }
}

//! VectorStore trait — topic-scoped document collections.
//!
//! One collection per topic. The ingestion side is a black-box producer;
//! the pipeline only reads via `topic_exists` and `query`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// Source metadata carried by every stored document. This is exactly the
/// shape that survives into a citation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub page: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub doc_id: String,
    pub content: String,
    pub meta: SourceMeta,
}

/// One ranked nearest-neighbor result.
#[derive(Debug, Clone)]
pub struct DocumentHit {
    pub document: StoredDocument,
    /// Similarity score (higher = better).
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a topic collection. Creating an existing topic is a no-op.
    async fn create_topic(&self, topic: &str) -> Result<(), ApiError>;

    /// The single existence probe the pipeline consults.
    async fn topic_exists(&self, topic: &str) -> Result<bool, ApiError>;

    async fn list_topics(&self) -> Result<Vec<String>, ApiError>;

    /// Delete a topic collection and its documents; returns documents removed.
    async fn delete_topic(&self, topic: &str) -> Result<usize, ApiError>;

    /// Insert documents with their embedding vectors.
    async fn insert_batch(
        &self,
        topic: &str,
        items: Vec<(StoredDocument, Vec<f32>)>,
    ) -> Result<(), ApiError>;

    /// Nearest-neighbor query, most relevant first.
    async fn query(
        &self,
        topic: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<DocumentHit>, ApiError>;

    /// Document count for a topic.
    async fn count(&self, topic: &str) -> Result<usize, ApiError>;
}

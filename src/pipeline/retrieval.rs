//! Retrieval — one embed + nearest-neighbor cycle per query, with citation
//! bookkeeping.

use std::sync::Arc;

use super::types::Citation;
use crate::core::errors::ApiError;
use crate::llm::LlmProvider;
use crate::vector::VectorStore;

/// Context text plus one citation per retrieval round executed.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub context: String,
    pub citations: Vec<Citation>,
}

pub struct Retriever {
    embedder: Arc<dyn LlmProvider>,
    store: Arc<dyn VectorStore>,
    embedding_model: String,
    multi_query_results: usize,
    fallback_results: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn LlmProvider>,
        store: Arc<dyn VectorStore>,
        embedding_model: String,
        multi_query_results: usize,
        fallback_results: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            embedding_model,
            multi_query_results,
            fallback_results,
        }
    }

    /// Resolves expanded queries (or the original question when expansion
    /// yielded nothing) into context text and citations. Rounds run in
    /// order, one at a time; any failure aborts the request rather than
    /// answering from partial context.
    pub async fn retrieve(
        &self,
        queries: &[String],
        original_question: &str,
        topic: &str,
    ) -> Result<RetrievedContext, ApiError> {
        if queries.is_empty() {
            let (block, citation) = self
                .round(original_question, topic, self.fallback_results)
                .await?;
            return Ok(RetrievedContext {
                context: block,
                citations: vec![citation],
            });
        }

        let mut blocks = Vec::with_capacity(queries.len());
        let mut citations = Vec::with_capacity(queries.len());

        for query in queries {
            let (block, citation) = self.round(query, topic, self.multi_query_results).await?;
            blocks.push(block);
            citations.push(citation);
        }

        Ok(RetrievedContext {
            context: blocks.join("\n\n"),
            citations,
        })
    }

    /// One retrieval round: embed the query, fetch the `top_k` nearest
    /// documents, keep the top hit's metadata as the round's citation.
    async fn round(
        &self,
        query: &str,
        topic: &str,
        top_k: usize,
    ) -> Result<(String, Citation), ApiError> {
        let embeddings = self
            .embedder
            .embed(&[query.to_string()], &self.embedding_model)
            .await
            .map_err(|e| ApiError::RetrievalUnavailable(format!("embedding failed: {}", e)))?;

        let embedding = embeddings.into_iter().next().ok_or_else(|| {
            ApiError::RetrievalUnavailable("embedding provider returned no vector".to_string())
        })?;

        let hits = self
            .store
            .query(topic, &embedding, top_k)
            .await
            .map_err(|e| ApiError::RetrievalUnavailable(format!("vector query failed: {}", e)))?;

        let top = hits.first().ok_or_else(|| {
            ApiError::RetrievalUnavailable(format!("no documents in collection '{}'", topic))
        })?;

        let citation = Citation::from(&top.document.meta);

        let block = hits
            .iter()
            .map(|hit| hit.document.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok((block, citation))
    }
}

//! Retrieval-and-answer pipeline.
//!
//! `ask` runs one request end to end: expansion, retrieval, synthesis.
//! Every step is an await point and runs strictly after the previous one;
//! concurrency happens across requests, not inside one.

mod expansion;
mod retrieval;
mod synthesis;
mod types;

use std::sync::Arc;

pub use expansion::QueryExpander;
pub use retrieval::{RetrievedContext, Retriever};
pub use synthesis::{AnswerSynthesizer, REFUSAL_PHRASE};
pub use types::{Answer, Citation, ConversationTurn, Role};

use crate::core::config::AppConfig;
use crate::core::errors::ApiError;
use crate::llm::LlmProvider;
use crate::vector::VectorStore;

pub struct AskPipeline {
    expander: QueryExpander,
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
    store: Arc<dyn VectorStore>,
}

impl AskPipeline {
    pub fn new(
        completion: Arc<dyn LlmProvider>,
        embedder: Arc<dyn LlmProvider>,
        store: Arc<dyn VectorStore>,
        config: &AppConfig,
    ) -> Self {
        let expander = QueryExpander::new(
            completion.clone(),
            config.completion.model.clone(),
            config.retrieval.max_expansions,
        );
        let retriever = Retriever::new(
            embedder,
            store.clone(),
            config.embedding.model.clone(),
            config.retrieval.multi_query_results,
            config.retrieval.fallback_results,
        );
        let synthesizer = AnswerSynthesizer::new(
            completion,
            config.completion.model.clone(),
            config.retrieval.max_answer_words,
        );

        Self {
            expander,
            retriever,
            synthesizer,
            store,
        }
    }

    /// Answers one question against one topic's collection.
    ///
    /// The caller's history is never mutated; the new user turn is appended
    /// to an internal copy. No step is retried; the first failure aborts
    /// the request.
    pub async fn ask(
        &self,
        question: &str,
        topic: &str,
        history: &[ConversationTurn],
    ) -> Result<Answer, ApiError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ApiError::EmptyQuestion);
        }
        if topic.trim().is_empty() {
            return Err(ApiError::BadRequest("no topic provided".to_string()));
        }

        // Consolidated existence probe; fails before any completion call.
        if !self.store.topic_exists(topic).await? {
            return Err(ApiError::TopicNotFound(topic.to_string()));
        }

        let mut turns = history.to_vec();
        turns.push(ConversationTurn::user(question));

        let queries = self.expander.expand(question).await;
        tracing::debug!(
            "Running {} retrieval round(s) for topic '{}'",
            queries.len().max(1),
            topic
        );

        let retrieved = self.retriever.retrieve(&queries, question, topic).await?;
        let text = self.synthesizer.synthesize(&turns, &retrieved.context).await?;

        // never a silent empty success
        if text.trim().is_empty() {
            return Err(ApiError::SynthesisUnavailable(
                "completion stream produced no content".to_string(),
            ));
        }

        Ok(Answer {
            text,
            citations: retrieved.citations,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::llm::{ChatMessage, ChatRequest};
    use crate::vector::{DocumentHit, SourceMeta, StoredDocument};

    /// Scripted provider: fixed expansion reply, fixed stream fragments,
    /// unit embeddings. Records calls for assertions.
    struct MockLlm {
        expansion_reply: Option<String>,
        fragments: Vec<Result<String, String>>,
        embed_fails: bool,
        chat_calls: AtomicUsize,
        stream_calls: AtomicUsize,
        last_stream_messages: Mutex<Vec<ChatMessage>>,
    }

    impl MockLlm {
        fn new(expansion_reply: Option<&str>, fragments: Vec<Result<&str, &str>>) -> Self {
            Self {
                expansion_reply: expansion_reply.map(str::to_string),
                fragments: fragments
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
                embed_fails: false,
                chat_calls: AtomicUsize::new(0),
                stream_calls: AtomicUsize::new(0),
                last_stream_messages: Mutex::new(Vec::new()),
            }
        }

        fn completion_calls(&self) -> usize {
            self.chat_calls.load(Ordering::SeqCst) + self.stream_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl crate::llm::LlmProvider for MockLlm {
        fn name(&self) -> &str {
            "mock"
        }

        async fn health_check(&self) -> Result<bool, ApiError> {
            Ok(true)
        }

        async fn chat(&self, _request: ChatRequest, _model_id: &str) -> Result<String, ApiError> {
            self.chat_calls.fetch_add(1, Ordering::SeqCst);
            match &self.expansion_reply {
                Some(reply) => Ok(reply.clone()),
                None => Err(ApiError::Internal("completion refused".to_string())),
            }
        }

        async fn stream_chat(
            &self,
            request: ChatRequest,
            _model_id: &str,
        ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
            self.stream_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_stream_messages.lock().unwrap() = request.messages.clone();

            let (tx, rx) = mpsc::channel(8);
            let fragments = self.fragments.clone();
            tokio::spawn(async move {
                for fragment in fragments {
                    let item = fragment.map_err(ApiError::Internal);
                    if tx.send(item).await.is_err() {
                        return;
                    }
                }
            });
            Ok(rx)
        }

        async fn embed(
            &self,
            inputs: &[String],
            _model_id: &str,
        ) -> Result<Vec<Vec<f32>>, ApiError> {
            if self.embed_fails {
                return Err(ApiError::Internal("embedding backend down".to_string()));
            }
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Fixed-content store recording the `top_k` of every query.
    struct MockStore {
        topics: Vec<String>,
        documents: Vec<StoredDocument>,
        query_sizes: Mutex<Vec<usize>>,
    }

    impl MockStore {
        fn new(topic: &str, documents: Vec<StoredDocument>) -> Self {
            Self {
                topics: vec![topic.to_string()],
                documents,
                query_sizes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VectorStore for MockStore {
        async fn create_topic(&self, _topic: &str) -> Result<(), ApiError> {
            Ok(())
        }

        async fn topic_exists(&self, topic: &str) -> Result<bool, ApiError> {
            Ok(self.topics.iter().any(|t| t == topic))
        }

        async fn list_topics(&self) -> Result<Vec<String>, ApiError> {
            Ok(self.topics.clone())
        }

        async fn delete_topic(&self, _topic: &str) -> Result<usize, ApiError> {
            Ok(0)
        }

        async fn insert_batch(
            &self,
            _topic: &str,
            _items: Vec<(StoredDocument, Vec<f32>)>,
        ) -> Result<(), ApiError> {
            Ok(())
        }

        async fn query(
            &self,
            _topic: &str,
            _embedding: &[f32],
            top_k: usize,
        ) -> Result<Vec<DocumentHit>, ApiError> {
            self.query_sizes.lock().unwrap().push(top_k);
            Ok(self
                .documents
                .iter()
                .take(top_k)
                .map(|document| DocumentHit {
                    document: document.clone(),
                    score: 1.0,
                })
                .collect())
        }

        async fn count(&self, _topic: &str) -> Result<usize, ApiError> {
            Ok(self.documents.len())
        }
    }

    fn document(id: &str, content: &str) -> StoredDocument {
        StoredDocument {
            doc_id: id.to_string(),
            content: content.to_string(),
            meta: SourceMeta {
                title: format!("Title {}", id),
                url: format!("https://example.org/{}", id),
                page: 7,
            },
        }
    }

    fn documents() -> Vec<StoredDocument> {
        vec![
            document("d1", "first passage"),
            document("d2", "second passage"),
            document("d3", "third passage"),
            document("d4", "fourth passage"),
            document("d5", "fifth passage"),
        ]
    }

    const THREE_QUERIES: &str = "<\nangle one\nangle two\nangle three\n>";

    fn pipeline(llm: Arc<MockLlm>, store: Arc<MockStore>) -> AskPipeline {
        let config = AppConfig::default();
        AskPipeline::new(llm.clone(), llm, store, &config)
    }

    #[tokio::test]
    async fn three_expansions_give_three_rounds_and_three_citations() {
        let llm = Arc::new(MockLlm::new(
            Some(THREE_QUERIES),
            vec![Ok("The "), Ok("answer.")],
        ));
        let store = Arc::new(MockStore::new("sl_history", documents()));
        let pipeline = pipeline(llm.clone(), store.clone());

        let answer = pipeline
            .ask("What caused the civil war?", "sl_history", &[])
            .await
            .unwrap();

        assert_eq!(answer.text, "The answer.");
        assert_eq!(answer.citations.len(), 3);
        assert_eq!(*store.query_sizes.lock().unwrap(), vec![2, 2, 2]);
        assert!(!answer.text.contains('!'));
    }

    #[tokio::test]
    async fn failed_expansion_falls_back_to_one_round_of_four() {
        let llm = Arc::new(MockLlm::new(None, vec![Ok("fallback answer")]));
        let store = Arc::new(MockStore::new("sl_history", documents()));
        let pipeline = pipeline(llm.clone(), store.clone());

        let answer = pipeline
            .ask("What caused the civil war?", "sl_history", &[])
            .await
            .unwrap();

        assert_eq!(answer.citations.len(), 1);
        assert_eq!(*store.query_sizes.lock().unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn malformed_expansion_output_also_falls_back() {
        let llm = Arc::new(MockLlm::new(
            Some("Sorry, I cannot help with that."),
            vec![Ok("answer")],
        ));
        let store = Arc::new(MockStore::new("sl_history", documents()));
        let pipeline = pipeline(llm.clone(), store.clone());

        let answer = pipeline.ask("question", "sl_history", &[]).await.unwrap();

        assert_eq!(answer.citations.len(), 1);
        assert_eq!(*store.query_sizes.lock().unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn unknown_topic_fails_before_any_completion_call() {
        let llm = Arc::new(MockLlm::new(Some(THREE_QUERIES), vec![Ok("answer")]));
        let store = Arc::new(MockStore::new("sl_history", documents()));
        let pipeline = pipeline(llm.clone(), store);

        let err = pipeline
            .ask("What caused the civil war?", "missing", &[])
            .await
            .unwrap_err();

        assert_eq!(err.code(), "topic_not_found");
        assert_eq!(llm.completion_calls(), 0);
    }

    #[tokio::test]
    async fn empty_question_is_an_input_error() {
        let llm = Arc::new(MockLlm::new(Some(THREE_QUERIES), vec![Ok("answer")]));
        let store = Arc::new(MockStore::new("sl_history", documents()));
        let pipeline = pipeline(llm.clone(), store);

        let err = pipeline.ask("  ", "sl_history", &[]).await.unwrap_err();

        assert_eq!(err.code(), "empty_question");
        assert_eq!(llm.completion_calls(), 0);
    }

    #[tokio::test]
    async fn history_copy_gets_user_turn_appended_once() {
        let llm = Arc::new(MockLlm::new(None, vec![Ok("answer")]));
        let store = Arc::new(MockStore::new("sl_history", documents()));
        let pipeline = pipeline(llm.clone(), store);

        let history = vec![
            ConversationTurn::user("earlier question"),
            ConversationTurn::assistant("earlier answer"),
        ];
        let frozen = history.clone();

        pipeline
            .ask("new question", "sl_history", &history)
            .await
            .unwrap();

        // caller's sequence untouched
        assert_eq!(history, frozen);

        // synthesis saw: system, context, two history turns, new user turn
        let messages = llm.last_stream_messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[4].role, "user");
        assert_eq!(messages[4].content, "new question");
        assert_eq!(
            messages
                .iter()
                .filter(|m| m.content == "new question")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn citations_match_top_hit_metadata_exactly() {
        let llm = Arc::new(MockLlm::new(Some(THREE_QUERIES), vec![Ok("answer")]));
        let docs = documents();
        let store = Arc::new(MockStore::new("sl_history", docs.clone()));
        let pipeline = pipeline(llm, store);

        let answer = pipeline.ask("question", "sl_history", &[]).await.unwrap();

        for citation in &answer.citations {
            assert_eq!(citation, &Citation::from(&docs[0].meta));
        }
    }

    #[tokio::test]
    async fn context_joins_round_blocks_with_blank_lines() {
        let llm = Arc::new(MockLlm::new(Some(THREE_QUERIES), vec![Ok("answer")]));
        let store = Arc::new(MockStore::new("sl_history", documents()));
        let pipeline = pipeline(llm.clone(), store);

        pipeline.ask("question", "sl_history", &[]).await.unwrap();

        let messages = llm.last_stream_messages.lock().unwrap().clone();
        let context = &messages[1].content;
        // 3 rounds x 2 documents each, all blank-line separated
        assert_eq!(context.matches("first passage").count(), 3);
        assert_eq!(context.matches("\n\n").count(), 5);
    }

    #[tokio::test]
    async fn stop_sentinel_ends_accumulation_and_is_discarded() {
        let llm = Arc::new(MockLlm::new(
            None,
            vec![Ok("partial "), Ok("answer"), Ok("None"), Ok("ignored tail")],
        ));
        let store = Arc::new(MockStore::new("sl_history", documents()));
        let pipeline = pipeline(llm, store);

        let answer = pipeline.ask("question", "sl_history", &[]).await.unwrap();

        assert_eq!(answer.text, "partial answer");
    }

    #[tokio::test]
    async fn mid_stream_error_discards_partial_text() {
        let llm = Arc::new(MockLlm::new(
            None,
            vec![Ok("partial "), Err("connection reset")],
        ));
        let store = Arc::new(MockStore::new("sl_history", documents()));
        let pipeline = pipeline(llm, store);

        let err = pipeline.ask("question", "sl_history", &[]).await.unwrap_err();

        assert_eq!(err.code(), "synthesis_unavailable");
    }

    #[tokio::test]
    async fn empty_stream_is_an_explicit_failure_not_empty_success() {
        let llm = Arc::new(MockLlm::new(None, vec![]));
        let store = Arc::new(MockStore::new("sl_history", documents()));
        let pipeline = pipeline(llm, store);

        let err = pipeline.ask("question", "sl_history", &[]).await.unwrap_err();

        assert_eq!(err.code(), "synthesis_unavailable");
    }

    #[tokio::test]
    async fn embedding_failure_propagates_as_retrieval_failure() {
        let mut llm = MockLlm::new(Some(THREE_QUERIES), vec![Ok("answer")]);
        llm.embed_fails = true;
        let llm = Arc::new(llm);
        let store = Arc::new(MockStore::new("sl_history", documents()));
        let pipeline = pipeline(llm.clone(), store.clone());

        let err = pipeline.ask("question", "sl_history", &[]).await.unwrap_err();

        assert_eq!(err.code(), "retrieval_unavailable");
        // the round aborts the request before any synthesis call
        assert_eq!(llm.stream_calls.load(Ordering::SeqCst), 0);
        assert!(store.query_sizes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_collection_is_a_retrieval_failure_not_a_silent_answer() {
        let llm = Arc::new(MockLlm::new(None, vec![Ok("answer")]));
        let store = Arc::new(MockStore::new("sl_history", Vec::new()));
        let pipeline = pipeline(llm, store);

        let err = pipeline.ask("question", "sl_history", &[]).await.unwrap_err();

        assert_eq!(err.code(), "retrieval_unavailable");
    }
}

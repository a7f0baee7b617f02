use std::sync::Arc;

use crate::chat::ChatStore;
use crate::core::config::{AppConfig, AppPaths};
use crate::llm::{build_provider, LlmProvider};
use crate::pipeline::AskPipeline;
use crate::vector::{SqliteVectorStore, VectorStore};

/// Shared application state: configuration, stores, providers and the
/// assembled pipeline. Cloned per request; everything inside is Arc-backed.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: Arc<AppConfig>,
    pub chat: ChatStore,
    pub vectors: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn LlmProvider>,
    pub completion: Arc<dyn LlmProvider>,
    pub pipeline: Arc<AskPipeline>,
}

impl AppState {
    /// Builds the full state from already-resolved paths. Paths are created
    /// separately so logging can be initialized before any store or config
    /// work emits events.
    pub async fn initialize(paths: Arc<AppPaths>) -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::load(&paths.config_path)?);

        let chat = ChatStore::new(paths.chat_db_path.clone()).await?;
        let vectors: Arc<dyn VectorStore> =
            Arc::new(SqliteVectorStore::new(paths.vector_db_path.clone()).await?);

        let completion = build_provider(&config.completion)?;
        let embedder = build_provider(&config.embedding)?;

        let pipeline = Arc::new(AskPipeline::new(
            completion.clone(),
            embedder.clone(),
            vectors.clone(),
            &config,
        ));

        Ok(Self {
            paths,
            config,
            chat,
            vectors,
            embedder,
            completion,
            pipeline,
        })
    }
}

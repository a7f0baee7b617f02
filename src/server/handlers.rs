use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::pipeline::ConversationTurn;
use crate::state::AppState;
use crate::vector::{SourceMeta, StoredDocument};

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub topic: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let answer = state
        .pipeline
        .ask(&request.question, &request.topic, &request.history)
        .await?;

    state.chat.create_chat(&request.topic).await?;
    let message_id = state
        .chat
        .save_turn(
            &request.topic,
            request.question.trim(),
            &answer.text,
            &answer.citations,
        )
        .await?;

    Ok(Json(json!({
        "answer": answer.text,
        "citations": answer.citations,
        "message_id": message_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct IngestDocument {
    pub content: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub page: i64,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub topic: String,
    pub documents: Vec<IngestDocument>,
}

/// Ingestion boundary for pre-extracted document chunks. The crawler that
/// produces them lives outside this service.
pub async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.topic.trim().is_empty() {
        return Err(ApiError::BadRequest("no topic provided".to_string()));
    }
    if request.documents.is_empty() {
        return Err(ApiError::BadRequest("no documents provided".to_string()));
    }

    let contents: Vec<String> = request
        .documents
        .iter()
        .map(|doc| doc.content.clone())
        .collect();

    let embeddings = state
        .embedder
        .embed(&contents, &state.config.embedding.model)
        .await?;

    if embeddings.len() != request.documents.len() {
        return Err(ApiError::Internal(format!(
            "embedding count mismatch: {} documents, {} vectors",
            request.documents.len(),
            embeddings.len()
        )));
    }

    let items: Vec<(StoredDocument, Vec<f32>)> = request
        .documents
        .iter()
        .zip(embeddings)
        .map(|(doc, embedding)| {
            (
                StoredDocument {
                    doc_id: Uuid::new_v4().to_string(),
                    content: doc.content.clone(),
                    meta: SourceMeta {
                        title: doc.title.clone(),
                        url: doc.url.clone(),
                        page: doc.page,
                    },
                },
                embedding,
            )
        })
        .collect();

    let ingested = items.len();

    state.vectors.create_topic(&request.topic).await?;
    state.vectors.insert_batch(&request.topic, items).await?;
    state.chat.create_chat(&request.topic).await?;

    Ok(Json(json!({
        "topic": request.topic,
        "ingested": ingested,
    })))
}

pub async fn list_topics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let topics = state.chat.list_topics().await?;
    Ok(Json(json!({ "topics": topics })))
}

#[derive(Debug, Deserialize)]
pub struct TopicRequest {
    pub topic: String,
}

pub async fn delete_topic(
    State(state): State<AppState>,
    Json(request): Json<TopicRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.topic.trim().is_empty() {
        return Err(ApiError::BadRequest("no topic provided".to_string()));
    }

    state.chat.delete_chat(&request.topic).await?;
    let removed = state.vectors.delete_topic(&request.topic).await?;

    Ok(Json(json!({
        "topic": request.topic,
        "documents_removed": removed,
    })))
}

pub async fn chat_history(
    State(state): State<AppState>,
    Json(request): Json<TopicRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.topic.trim().is_empty() {
        return Err(ApiError::BadRequest("no topic provided".to_string()));
    }
    if !state.chat.chat_exists(&request.topic).await? {
        return Err(ApiError::TopicNotFound(request.topic.clone()));
    }

    let messages = state.chat.get_messages(&request.topic).await?;
    Ok(Json(json!({ "messages": messages })))
}

pub async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let completion_ok = state.completion.health_check().await.unwrap_or(false);
    let embedding_ok = state.embedder.health_check().await.unwrap_or(false);

    Ok(Json(json!({
        "status": "ok",
        "completion_provider": completion_ok,
        "embedding_provider": embedding_ok,
    })))
}

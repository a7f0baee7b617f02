use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no question provided")]
    EmptyQuestion,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("topic not found: {0}")]
    TopicNotFound(String),
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),
    #[error("synthesis unavailable: {0}")]
    SynthesisUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    /// Stable machine-readable code, one per fatal condition.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::EmptyQuestion => "empty_question",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::TopicNotFound(_) => "topic_not_found",
            ApiError::RetrievalUnavailable(_) => "retrieval_unavailable",
            ApiError::SynthesisUnavailable(_) => "synthesis_unavailable",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::EmptyQuestion | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::TopicNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RetrievalUnavailable(_) | ApiError::SynthesisUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string(), "code": self.code() }));
        (status, body).into_response()
    }
}

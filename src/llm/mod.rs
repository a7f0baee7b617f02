pub mod ollama;
pub mod openai;
pub mod provider;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

pub use provider::LlmProvider;
pub use types::{ChatMessage, ChatRequest};

use crate::core::config::ProviderConfig;
use crate::core::errors::ApiError;

/// Builds a provider from its config section.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, ApiError> {
    let timeout = Duration::from_secs(config.request_timeout_secs);

    match config.kind.as_str() {
        "openai" => Ok(Arc::new(openai::OpenAiCompatProvider::new(
            config.base_url.clone(),
            config.api_key(),
            timeout,
        )?)),
        "ollama" => Ok(Arc::new(ollama::OllamaProvider::new(
            config.base_url.clone(),
            timeout,
        )?)),
        other => Err(ApiError::Internal(format!(
            "unknown provider kind: {}",
            other
        ))),
    }
}

/// Appends a network chunk to `buf` and drains the complete lines out of it,
/// leaving a trailing partial line buffered for the next chunk. A frame
/// split across two chunks is reassembled instead of dropped.
pub(crate) fn drain_lines(buf: &mut String, chunk: &str) -> Vec<String> {
    buf.push_str(chunk);

    let mut lines = Vec::new();
    while let Some(pos) = buf.find('\n') {
        let line: String = buf.drain(..=pos).collect();
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines
}

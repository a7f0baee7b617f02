//! Ollama provider. Used mainly for local embeddings, but the full chat
//! surface is implemented so a single local instance can serve both roles.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    client: Client,
}

impl OllamaProvider {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn chat_body(request: &ChatRequest, model_id: &str, stream: bool) -> Value {
        let mut options = json!({});
        if let Some(obj) = options.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("num_predict".to_string(), json!(t));
            }
            if let Some(s) = &request.stop {
                obj.insert("stop".to_string(), json!(s));
            }
        }

        json!({
            "model": model_id,
            "messages": request.messages,
            "stream": stream,
            "options": options,
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        match self.client.get(&self.base_url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ApiError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::chat_body(&request, model_id, false);

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!("Ollama chat error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;

        let content = payload["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(content)
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::chat_body(&request, model_id, true);

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!("Ollama stream error: {}", text)));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            // NDJSON framing: one object per line, `done: true` terminates.
            // Lines are buffered across chunks so a split frame survives.
            let mut buf = String::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        let chunk_str = String::from_utf8_lossy(&bytes);
                        for line in super::drain_lines(&mut buf, &chunk_str) {
                            if let Some((content, done)) = parse_frame(&line) {
                                if let Some(content) = content {
                                    if tx.send(Ok(content)).await.is_err() {
                                        return;
                                    }
                                }
                                if done {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::internal(e))).await;
                        return;
                    }
                }
            }

            // a final frame may arrive without a trailing newline
            if let Some((Some(content), _)) = parse_frame(buf.trim()) {
                let _ = tx.send(Ok(content)).await;
            }
        });

        Ok(rx)
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/api/embeddings", self.base_url);

        let mut embeddings = Vec::with_capacity(inputs.len());
        for input in inputs {
            let body = json!({
                "model": model_id,
                "prompt": input,
            });

            let res = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(ApiError::internal)?;

            if !res.status().is_success() {
                let text = res.text().await.unwrap_or_default();
                return Err(ApiError::Internal(format!("Ollama embed error: {}", text)));
            }

            let payload: Value = res.json().await.map_err(ApiError::internal)?;

            let vec: Vec<f32> = payload["embedding"]
                .as_array()
                .map(|vals| {
                    vals.iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect()
                })
                .unwrap_or_default();

            if vec.is_empty() {
                return Err(ApiError::Internal(
                    "Ollama embed returned an empty vector".to_string(),
                ));
            }

            embeddings.push(vec);
        }

        Ok(embeddings)
    }
}

/// Parses one NDJSON frame into its content fragment and done flag.
fn parse_frame(line: &str) -> Option<(Option<String>, bool)> {
    let json: Value = serde_json::from_str(line).ok()?;
    let content = json["message"]["content"]
        .as_str()
        .filter(|content| !content.is_empty())
        .map(str::to_string);
    let done = json["done"].as_bool().unwrap_or(false);
    Some((content, done))
}

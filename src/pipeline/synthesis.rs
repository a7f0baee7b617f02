//! Answer synthesis — drives a streaming completion over the retrieved
//! context and the conversation history, accumulating fragments into the
//! final answer.

use std::sync::Arc;

use super::types::ConversationTurn;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};

/// Fixed refusal phrase the model is instructed to use when the context
/// does not answer the question.
pub const REFUSAL_PHRASE: &str = "I'm sorry, but I don't know the answer to that question";

/// Legacy early-stop sentinel some providers emitted as a whole fragment.
/// The primary termination signal is the provider closing the stream; this
/// check only exists for compatibility and discards the fragment.
const STOP_SENTINEL: &str = "None";

pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmProvider>,
    model: String,
    max_answer_words: usize,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LlmProvider>, model: String, max_answer_words: usize) -> Self {
        Self {
            llm,
            model,
            max_answer_words,
        }
    }

    /// Streams a completion and concatenates fragments in arrival order.
    /// A mid-stream provider error discards everything accumulated so far;
    /// a truncated answer could misrepresent the model's conclusion.
    pub async fn synthesize(
        &self,
        history: &[ConversationTurn],
        context: &str,
    ) -> Result<String, ApiError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::new(
            "system",
            system_instruction(self.max_answer_words),
        ));
        messages.push(ChatMessage::new("assistant", context));
        messages.extend(
            history
                .iter()
                .map(|turn| ChatMessage::new(turn.role.as_str(), turn.content.clone())),
        );

        let request = ChatRequest::deterministic(messages);

        let mut rx = self
            .llm
            .stream_chat(request, &self.model)
            .await
            .map_err(|e| ApiError::SynthesisUnavailable(e.to_string()))?;

        let mut answer = String::new();
        while let Some(fragment) = rx.recv().await {
            match fragment {
                Ok(text) => {
                    if text == STOP_SENTINEL {
                        break;
                    }
                    answer.push_str(&text);
                }
                Err(err) => {
                    return Err(ApiError::SynthesisUnavailable(err.to_string()));
                }
            }
        }

        Ok(answer)
    }
}

fn system_instruction(max_words: usize) -> String {
    format!(
        "You are an assistant answering questions about a document collection. Given the \
         user's question and relevant excerpts from the collection, provide concise answers \
         based solely on the context provided, in a human tone. When applicable, use the \
         specific numeric statistics present in the excerpts and give precise answers. \
         Include direct quotations from the text. Keep the tone serious and informational: \
         no exclamation marks. Do not extrapolate from the data. Keep every answer under \
         {max_words} words. Take into account any context block provided in the conversation. \
         If the context does not answer the question, say \"{REFUSAL_PHRASE}\". Do not \
         apologize for previous responses; indicate that new information was gained instead. \
         Do not invent anything that is not drawn directly from the context. Be as specific \
         as possible."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_carries_refusal_and_ceiling() {
        let text = system_instruction(500);
        assert!(text.contains(REFUSAL_PHRASE));
        assert!(text.contains("500 words"));
        assert!(text.contains("no exclamation marks"));
    }
}

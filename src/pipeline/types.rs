use serde::{Deserialize, Serialize};

use crate::vector::SourceMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of conversation history, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Source reference for one retrieval round, taken verbatim from the
/// top hit's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub page: i64,
}

impl From<&SourceMeta> for Citation {
    fn from(meta: &SourceMeta) -> Self {
        Self {
            title: meta.title.clone(),
            url: meta.url.clone(),
            page: meta.page,
        }
    }
}

/// The pipeline's only outward-crossing value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// One citation per retrieval round, in round order. Never deduplicated.
    pub citations: Vec<Citation>,
}

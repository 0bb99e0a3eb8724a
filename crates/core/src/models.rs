use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Fixed-dimension vector produced by the active embedding model. Empty means
/// "no embedding".
pub type EmbeddingVector = Vec<f32>;

/// Retrieval unit of a paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_index: u64,
    pub text: String,
    pub page_start: u32,
    pub page_end: u32,
    pub embedding: Option<EmbeddingVector>,
}

impl Chunk {
    pub fn is_indexed(&self) -> bool {
        self.embedding.as_ref().is_some_and(|vector| !vector.is_empty())
    }
}

/// Storage representation of a [`Chunk`]: the embedding travels as a JSON
/// float array, or an empty string when the chunk was never embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_index: u64,
    pub text: String,
    pub embedding: String,
    pub page_start: u32,
    pub page_end: u32,
}

impl From<&Chunk> for ChunkRecord {
    fn from(value: &Chunk) -> Self {
        let embedding = match &value.embedding {
            Some(vector) if vector.iter().any(|component| !component.is_finite()) => {
                warn!(
                    chunk_index = value.chunk_index,
                    "storing chunk without its non-finite embedding"
                );
                String::new()
            }
            Some(vector) if !vector.is_empty() => {
                serde_json::to_string(vector).unwrap_or_default()
            }
            _ => String::new(),
        };

        Self {
            chunk_index: value.chunk_index,
            text: value.text.clone(),
            embedding,
            page_start: value.page_start,
            page_end: value.page_end,
        }
    }
}

impl From<ChunkRecord> for Chunk {
    fn from(value: ChunkRecord) -> Self {
        // A malformed array decodes as "not embedded" so search skips it.
        let embedding = if value.embedding.trim().is_empty() {
            None
        } else {
            serde_json::from_str::<EmbeddingVector>(&value.embedding)
                .ok()
                .filter(|vector| !vector.is_empty())
        };

        Self {
            chunk_index: value.chunk_index,
            text: value.text,
            page_start: value.page_start,
            page_end: value.page_end,
            embedding,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown chat role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Per-call overrides for the language model. `None` keeps the client default.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatOptions {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            max_tokens: None,
        }
    }
}

use crate::error::IngestError;
use crate::extractor::PageText;
use crate::models::Chunk;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Word-window chunking parameters. `chunk_size` and `overlap` count words,
/// `min_chars` is the shortest trimmed window that is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    #[serde(rename = "chunk_overlap", alias = "overlap")]
    pub overlap: usize,
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 64,
            min_chars: 21,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize, min_chars: usize) -> Result<Self, IngestError> {
        let config = Self {
            chunk_size,
            overlap,
            min_chars,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk_size {}",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Splits `text` into overlapping windows of words, before any length filter.
///
/// Windows advance by `chunk_size - overlap` and stop at the first window that
/// reaches the last word.
pub fn word_windows(text: &str, config: &ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;

    let words: Vec<&str> = text.split_whitespace().collect();
    let mut windows = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + config.chunk_size).min(words.len());
        windows.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += config.stride();
    }

    Ok(windows)
}

/// Chunks every page independently. Indices start at zero and increase by one
/// per emitted chunk across the whole call; a chunk never spans two pages.
pub fn chunk_pages(pages: &[PageText], config: &ChunkingConfig) -> Result<Vec<Chunk>, IngestError> {
    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for page in pages {
        for window in word_windows(&page.text, config)? {
            if window.trim().chars().count() < config.min_chars {
                continue;
            }

            chunks.push(Chunk {
                chunk_index: cursor,
                text: window,
                page_start: page.number,
                page_end: page.number,
                embedding: None,
            });
            cursor += 1;
        }
    }

    info!(pages = pages.len(), chunks = chunks.len(), "chunked page text");
    Ok(chunks)
}

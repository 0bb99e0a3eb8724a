use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Reasons an embedding batch could not be produced.
///
/// Every variant collapses to empty vectors at the [`crate::Embedder::embed`]
/// boundary; the distinction only matters for logging and tests.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("local model could not be loaded: {0}")]
    LocalLoad(String),

    #[error("local inference failed: {0}")]
    LocalInference(String),

    #[error("embedding request failed: {0}")]
    Http(String),

    #[error("embedding service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed embedding response: {0}")]
    Malformed(String),

    #[error("embedding service returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("no embedding backend is available")]
    Disabled,
}

impl From<reqwest::Error> for EmbedError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Malformed(value.to_string())
        } else {
            Self::Http(value.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model request timed out")]
    Timeout,

    #[error("language model returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("language model request failed: {0}")]
    Http(String),

    #[error("malformed language model response: {0}")]
    Malformed(String),
}

impl LlmError {
    /// Inline reply shown in place of a model answer when the call fails.
    pub fn to_reply(&self) -> String {
        match self {
            Self::Timeout => "[Error] API request timed out. Please try again.".to_string(),
            Self::Status { status, .. } => format!("[Error] API returned status {status}"),
            Self::Http(details) | Self::Malformed(details) => format!("[Error] {details}"),
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else if value.is_decode() {
            Self::Malformed(value.to_string())
        } else {
            Self::Http(value.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("store task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::LlmError;

    #[test]
    fn llm_errors_render_distinguishable_replies() {
        assert_eq!(
            LlmError::Timeout.to_reply(),
            "[Error] API request timed out. Please try again."
        );
        let status = LlmError::Status {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert_eq!(status.to_reply(), "[Error] API returned status 503");
        assert!(LlmError::Malformed("no choices".to_string())
            .to_reply()
            .starts_with("[Error] "));
    }
}

use crate::error::EmbedError;
use crate::models::EmbeddingVector;
use std::sync::Arc;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Name that selects the built-in [`HashingModel`].
pub const HASHING_MODEL_NAME: &str = "hashing";

/// A loaded model. Shared behind `Arc` and called from blocking worker threads.
pub trait LocalModel: Send + Sync {
    fn encode(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbedError>;
}

/// Performs the (possibly slow) one-time acquisition of a [`LocalModel`].
pub trait LocalModelLoader: Send + Sync {
    fn model_name(&self) -> &str;
    fn load(&self) -> Result<Arc<dyn LocalModel>, EmbedError>;
}

/// Deterministic character-trigram hashing model. Needs no weights, so it is
/// always loadable.
#[derive(Debug, Clone, Copy)]
pub struct HashingModel {
    pub dimensions: usize,
}

impl Default for HashingModel {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl HashingModel {
    /// Counts boundary-marked character trigrams of each word (`<at`, `att`,
    /// ..., `on>`) into hashed buckets, then L2-normalises. Case and
    /// punctuation do not affect the result.
    pub fn embed_one(&self, text: &str) -> EmbeddingVector {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let buckets = vector.len() as u64;
        let mut marked: Vec<char> = Vec::new();

        for word in text
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            marked.clear();
            marked.push('<');
            marked.extend(word.chars().flat_map(char::to_lowercase));
            marked.push('>');

            for trigram in marked.windows(3) {
                vector[(trigram_hash(trigram) % buckets) as usize] += 1.0;
            }
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|value| *value /= norm);
        }
        vector
    }
}

/// FNV-1a over the UTF-8 bytes of the trigram.
fn trigram_hash(trigram: &[char]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut buffer = [0u8; 4];
    trigram.iter().fold(OFFSET, |hash, ch| {
        ch.encode_utf8(&mut buffer)
            .bytes()
            .fold(hash, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
    })
}

impl LocalModel for HashingModel {
    fn encode(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbedError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HashingModelLoader {
    pub model: HashingModel,
}

impl LocalModelLoader for HashingModelLoader {
    fn model_name(&self) -> &str {
        HASHING_MODEL_NAME
    }

    fn load(&self) -> Result<Arc<dyn LocalModel>, EmbedError> {
        Ok(Arc::new(self.model))
    }
}

/// Stands in for a model this build cannot run; its load always fails so the
/// engine falls back to the remote service.
#[cfg(not(feature = "fastembed"))]
struct UnavailableLoader {
    model_name: String,
}

#[cfg(not(feature = "fastembed"))]
impl LocalModelLoader for UnavailableLoader {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn load(&self) -> Result<Arc<dyn LocalModel>, EmbedError> {
        Err(EmbedError::LocalLoad(format!(
            "{} needs the `fastembed` feature",
            self.model_name
        )))
    }
}

#[cfg(feature = "fastembed")]
mod onnx {
    use super::{LocalModel, LocalModelLoader};
    use crate::error::EmbedError;
    use crate::models::EmbeddingVector;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Arc;

    pub(super) struct FastEmbedLoader {
        pub(super) model_name: String,
    }

    struct FastEmbedModel {
        inner: TextEmbedding,
    }

    impl LocalModelLoader for FastEmbedLoader {
        fn model_name(&self) -> &str {
            &self.model_name
        }

        fn load(&self) -> Result<Arc<dyn LocalModel>, EmbedError> {
            let model = match self.model_name.as_str() {
                "sentence-transformers/all-MiniLM-L6-v2" | "all-MiniLM-L6-v2" => {
                    EmbeddingModel::AllMiniLML6V2
                }
                "BAAI/bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
                other => {
                    return Err(EmbedError::LocalLoad(format!(
                        "unsupported local model: {other}"
                    )))
                }
            };

            let inner = TextEmbedding::try_new(InitOptions::new(model))
                .map_err(|error| EmbedError::LocalLoad(error.to_string()))?;
            Ok(Arc::new(FastEmbedModel { inner }))
        }
    }

    impl LocalModel for FastEmbedModel {
        fn encode(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbedError> {
            self.inner
                .embed(texts.to_vec(), None)
                .map_err(|error| EmbedError::LocalInference(error.to_string()))
        }
    }
}

/// Picks the loader for a configured local model name.
pub fn local_loader_for(model_name: &str) -> Arc<dyn LocalModelLoader> {
    if model_name.trim().eq_ignore_ascii_case(HASHING_MODEL_NAME) {
        return Arc::new(HashingModelLoader::default());
    }

    #[cfg(feature = "fastembed")]
    let loader: Arc<dyn LocalModelLoader> = Arc::new(onnx::FastEmbedLoader {
        model_name: model_name.to_string(),
    });

    #[cfg(not(feature = "fastembed"))]
    let loader: Arc<dyn LocalModelLoader> = Arc::new(UnavailableLoader {
        model_name: model_name.to_string(),
    });

    loader
}

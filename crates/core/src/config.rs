//! Settings handed to each component at composition time.
//!
//! The settings file is plain JSON. Every field has a default, so a partial
//! file is valid.

use crate::chunking::ChunkingConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub const LLM_API_KEY_ENV: &str = "PAPERMINER_LLM_API_KEY";
pub const EMBEDDING_API_KEY_ENV: &str = "PAPERMINER_EMBEDDING_API_KEY";

/// `(provider, base_url, model_name)` for the OpenAI-compatible providers.
pub const PROVIDER_PRESETS: [(&str, &str, &str); 4] = [
    ("deepseek", "https://api.deepseek.com/v1", "deepseek-chat"),
    ("zhipu", "https://open.bigmodel.cn/api/paas/v4", "glm-4-flash"),
    ("siliconflow", "https://api.siliconflow.cn/v1", "Qwen/Qwen2.5-7B-Instruct"),
    ("openai", "https://api.openai.com/v1", "gpt-4o-mini"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub api_key: String,
    pub base_url: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            api_key: String::new(),
            base_url: "https://api.deepseek.com/v1".to_string(),
            model_name: "deepseek-chat".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// Switches to a known provider's endpoint and model. Unknown names leave
    /// the config untouched and return `false`.
    pub fn with_preset(&mut self, provider: &str) -> bool {
        let Some((name, base_url, model_name)) = PROVIDER_PRESETS
            .iter()
            .find(|(name, _, _)| name.eq_ignore_ascii_case(provider.trim()))
        else {
            return false;
        };

        self.provider = (*name).to_string();
        self.base_url = (*base_url).to_string();
        self.model_name = (*model_name).to_string();
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub use_local: bool,
    pub local_model_name: String,
    pub api_key: String,
    pub api_base_url: String,
    pub api_model: String,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            use_local: true,
            local_model_name: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            api_key: String::new(),
            api_base_url: "https://api.siliconflow.cn/v1".to_string(),
            api_model: "BAAI/bge-small-zh-v1.5".to_string(),
            connect_timeout_secs: 10,
            timeout_secs: 30,
        }
    }
}

const DEFAULT_TOP_K_RETRIEVAL: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SettingsFile")]
pub struct RagConfig {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub top_k_retrieval: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            top_k_retrieval: DEFAULT_TOP_K_RETRIEVAL,
        }
    }
}

/// On-disk shape. Older settings files keep `chunk_size` and `chunk_overlap`
/// at the top level instead of in a `chunking` section.
#[derive(Deserialize)]
struct SettingsFile {
    #[serde(default)]
    llm: LlmConfig,
    #[serde(default)]
    embedding: EmbeddingConfig,
    chunking: Option<ChunkingConfig>,
    #[serde(default = "default_top_k_retrieval")]
    top_k_retrieval: usize,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
}

fn default_top_k_retrieval() -> usize {
    DEFAULT_TOP_K_RETRIEVAL
}

impl From<SettingsFile> for RagConfig {
    fn from(file: SettingsFile) -> Self {
        // The `chunking` section wins when both forms are present.
        let chunking = file.chunking.unwrap_or_else(|| {
            let mut chunking = ChunkingConfig::default();
            if let Some(chunk_size) = file.chunk_size {
                chunking.chunk_size = chunk_size;
            }
            if let Some(overlap) = file.chunk_overlap {
                chunking.overlap = overlap;
            }
            chunking
        });

        Self {
            llm: file.llm,
            embedding: file.embedding,
            chunking,
            top_k_retrieval: file.top_k_retrieval,
        }
    }
}

impl RagConfig {
    /// Reads the settings file, writing defaults there first if it is missing.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            info!(path = %path.display(), "wrote default settings");
            return Ok(config);
        }

        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        debug!(
            path = %path.display(),
            provider = %config.llm.provider,
            use_local_embeddings = config.embedding.use_local,
            top_k = config.top_k_retrieval,
            "loaded settings"
        );
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Applies API keys from the environment. Blank variables are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = non_blank_env(LLM_API_KEY_ENV) {
            self.llm.api_key = key;
        }
        if let Some(key) = non_blank_env(EMBEDDING_API_KEY_ENV) {
            self.embedding.api_key = key;
        }
    }
}

fn non_blank_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_created_with_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("settings.json");

        let config = RagConfig::load(&path)?;

        assert_eq!(config, RagConfig::default());
        assert!(path.exists());
        assert_eq!(RagConfig::load(&path)?, config);
        Ok(())
    }

    #[test]
    fn partial_file_fills_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "top_k_retrieval": 3, "chunking": { "chunk_size": 128 }, "embedding": { "use_local": false } }"#,
        )?;

        let config = RagConfig::load(&path)?;

        assert_eq!(config.top_k_retrieval, 3);
        assert_eq!(config.chunking.chunk_size, 128);
        assert_eq!(config.chunking.overlap, 64);
        assert!(!config.embedding.use_local);
        assert_eq!(config.llm.max_tokens, 4096);
        Ok(())
    }

    #[test]
    fn chunk_overlap_key_is_honoured() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "chunking": { "chunk_size": 100, "chunk_overlap": 10 }, "chunk_size": 100, "chunk_overlap": 10 }"#,
        )?;

        let config = RagConfig::load(&path)?;

        assert_eq!(config.chunking.chunk_size, 100);
        assert_eq!(config.chunking.overlap, 10);
        Ok(())
    }

    #[test]
    fn top_level_chunk_settings_are_read() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "chunk_size": 300, "chunk_overlap": 30, "top_k_retrieval": 8 }"#,
        )?;

        let config = RagConfig::load(&path)?;

        assert_eq!(config.chunking.chunk_size, 300);
        assert_eq!(config.chunking.overlap, 30);
        assert_eq!(config.chunking.min_chars, 21);
        assert_eq!(config.top_k_retrieval, 8);

        config.save(&path)?;
        assert!(fs::read_to_string(&path)?.contains("\"chunk_overlap\": 30"));
        assert_eq!(RagConfig::load(&path)?, config);
        Ok(())
    }

    #[test]
    fn invalid_json_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json")?;

        assert!(matches!(RagConfig::load(&path), Err(ConfigError::Parse(_))));
        Ok(())
    }

    #[test]
    fn presets_switch_endpoint_and_model() {
        let mut config = LlmConfig::default();
        assert!(config.with_preset("OpenAI"));
        assert_eq!(config.provider, "openai");
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.model_name, "gpt-4o-mini");

        assert!(!config.with_preset("unknown"));
        assert_eq!(config.provider, "openai");
    }
}

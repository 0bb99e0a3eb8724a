//! Text embedding with a lazily loaded local model and a remote fallback.
//!
//! [`EmbeddingEngine`] tries its local model first. The model is loaded at most
//! once; if loading fails the engine switches to the remote service for the
//! rest of its lifetime and never retries the local load.

pub mod local;
pub mod remote;

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;
use crate::models::EmbeddingVector;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub use local::{
    local_loader_for, HashingModel, HashingModelLoader, LocalModel, LocalModelLoader,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use remote::RemoteEmbeddingClient;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a batch, all or nothing.
    async fn try_embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbedError>;

    /// Embeds a batch, returning one vector per input in order. Any failure
    /// yields an empty vector for every input instead of an error.
    async fn embed(&self, texts: &[String]) -> Vec<EmbeddingVector> {
        match self.try_embed(texts).await {
            Ok(vectors) if vectors.len() == texts.len() => discard_non_finite(vectors),
            Ok(vectors) => {
                let error = EmbedError::CountMismatch {
                    expected: texts.len(),
                    actual: vectors.len(),
                };
                warn!(%error, "discarding misaligned embedding batch");
                vec![Vec::new(); texts.len()]
            }
            Err(error) => {
                warn!(%error, inputs = texts.len(), "embedding failed, returning empty vectors");
                vec![Vec::new(); texts.len()]
            }
        }
    }
}

/// Vectors with NaN or infinite components cannot be scored or stored, so they
/// become empty like any other failed embedding.
fn discard_non_finite(mut vectors: Vec<EmbeddingVector>) -> Vec<EmbeddingVector> {
    let mut discarded = 0usize;
    for vector in &mut vectors {
        if vector.iter().any(|value| !value.is_finite()) {
            vector.clear();
            discarded += 1;
        }
    }
    if discarded > 0 {
        warn!(discarded, "dropping embeddings with non-finite components");
    }
    vectors
}

#[async_trait]
impl<T> Embedder for Arc<T>
where
    T: Embedder + ?Sized,
{
    async fn try_embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbedError> {
        (**self).try_embed(texts).await
    }
}

enum LocalState {
    Unloaded,
    Loaded(Arc<dyn LocalModel>),
    UsingFallback,
}

pub struct EmbeddingEngine {
    loader: Option<Arc<dyn LocalModelLoader>>,
    remote: Option<Arc<dyn Embedder>>,
    state: Mutex<LocalState>,
}

impl EmbeddingEngine {
    pub fn new(
        loader: Option<Arc<dyn LocalModelLoader>>,
        remote: Option<Arc<dyn Embedder>>,
    ) -> Self {
        let state = if loader.is_some() {
            LocalState::Unloaded
        } else {
            LocalState::UsingFallback
        };

        Self {
            loader,
            remote,
            state: Mutex::new(state),
        }
    }

    pub fn local_only(loader: Arc<dyn LocalModelLoader>) -> Self {
        Self::new(Some(loader), None)
    }

    pub fn remote_only(remote: Arc<dyn Embedder>) -> Self {
        Self::new(None, Some(remote))
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let remote: Option<Arc<dyn Embedder>> = if config.api_base_url.trim().is_empty() {
            None
        } else {
            Some(Arc::new(RemoteEmbeddingClient::new(
                &config.api_base_url,
                &config.api_model,
                &config.api_key,
                Duration::from_secs(config.connect_timeout_secs),
                Duration::from_secs(config.timeout_secs),
            )?))
        };

        let loader = config
            .use_local
            .then(|| local_loader_for(&config.local_model_name));

        Ok(Self::new(loader, remote))
    }

    async fn local_model(&self) -> Option<Arc<dyn LocalModel>> {
        // Held across the load so concurrent first calls wait instead of loading twice.
        let mut state = self.state.lock().await;
        match &*state {
            LocalState::Loaded(model) => return Some(Arc::clone(model)),
            LocalState::UsingFallback => return None,
            LocalState::Unloaded => {}
        }

        let Some(loader) = self.loader.as_ref().map(Arc::clone) else {
            *state = LocalState::UsingFallback;
            return None;
        };

        let model_name = loader.model_name().to_string();
        info!(model = %model_name, "loading local embedding model");
        let loaded = tokio::task::spawn_blocking(move || loader.load())
            .await
            .unwrap_or_else(|error| Err(EmbedError::LocalLoad(error.to_string())));

        match loaded {
            Ok(model) => {
                info!(model = %model_name, "local embedding model loaded");
                *state = LocalState::Loaded(Arc::clone(&model));
                Some(model)
            }
            Err(error) => {
                warn!(model = %model_name, %error, "switching to remote embeddings");
                *state = LocalState::UsingFallback;
                None
            }
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingEngine {
    async fn try_embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(model) = self.local_model().await {
            let batch = texts.to_vec();
            return tokio::task::spawn_blocking(move || model.encode(&batch))
                .await
                .unwrap_or_else(|error| Err(EmbedError::LocalInference(error.to_string())));
        }

        match &self.remote {
            Some(remote) => remote.try_embed(texts).await,
            None => Err(EmbedError::Disabled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRemote {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingRemote {
        async fn try_embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![0.0, 1.0]).collect())
        }
    }

    struct ScriptedLoader {
        fail_load: bool,
        fail_encode: bool,
        loads: AtomicUsize,
    }

    impl ScriptedLoader {
        fn new(fail_load: bool, fail_encode: bool) -> Self {
            Self {
                fail_load,
                fail_encode,
                loads: AtomicUsize::new(0),
            }
        }
    }

    struct ScriptedModel {
        fail_encode: bool,
    }

    impl LocalModel for ScriptedModel {
        fn encode(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbedError> {
            if self.fail_encode {
                return Err(EmbedError::LocalInference("out of memory".to_string()));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    impl LocalModelLoader for ScriptedLoader {
        fn model_name(&self) -> &str {
            "scripted"
        }

        fn load(&self) -> Result<Arc<dyn LocalModel>, EmbedError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_load {
                return Err(EmbedError::LocalLoad("weights missing".to_string()));
            }
            Ok(Arc::new(ScriptedModel {
                fail_encode: self.fail_encode,
            }))
        }
    }

    fn texts(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn local_model_is_loaded_once_and_reused() {
        let loader = Arc::new(ScriptedLoader::new(false, false));
        let remote = Arc::new(CountingRemote::default());
        let engine = EmbeddingEngine::new(Some(loader.clone()), Some(remote.clone()));

        for _ in 0..3 {
            let vectors = engine.embed(&texts(&["a", "b"])).await;
            assert_eq!(vectors, vec![vec![1.0, 0.0], vec![1.0, 0.0]]);
        }

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_local_load_degrades_permanently_to_remote() {
        let loader = Arc::new(ScriptedLoader::new(true, false));
        let remote = Arc::new(CountingRemote::default());
        let engine = EmbeddingEngine::new(Some(loader.clone()), Some(remote.clone()));

        for _ in 0..4 {
            let vectors = engine.embed(&texts(&["query"])).await;
            assert_eq!(vectors, vec![vec![0.0, 1.0]]);
        }

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 4);
        assert!(matches!(*engine.state.lock().await, LocalState::UsingFallback));
    }

    #[tokio::test]
    async fn concurrent_first_use_loads_once() {
        let loader = Arc::new(ScriptedLoader::new(false, false));
        let engine = Arc::new(EmbeddingEngine::local_only(loader.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.embed(&texts(&["x"])).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), vec![vec![1.0, 0.0]]);
        }

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn local_inference_failure_yields_empty_vectors_without_switching() {
        let loader = Arc::new(ScriptedLoader::new(false, true));
        let remote = Arc::new(CountingRemote::default());
        let engine = EmbeddingEngine::new(Some(loader), Some(remote.clone()));

        let vectors = engine.embed(&texts(&["a", "b", "c"])).await;

        assert_eq!(vectors, vec![Vec::<f32>::new(); 3]);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(*engine.state.lock().await, LocalState::Loaded(_)));
    }

    #[tokio::test]
    async fn remote_only_engine_never_touches_local_path() {
        let remote = Arc::new(CountingRemote::default());
        let engine = EmbeddingEngine::remote_only(remote.clone());

        let vectors = engine.embed(&texts(&["a"])).await;

        assert_eq!(vectors, vec![vec![0.0, 1.0]]);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_backend_yields_empty_vectors() {
        let engine = EmbeddingEngine::new(None, None);
        assert!(matches!(
            engine.try_embed(&texts(&["a"])).await,
            Err(EmbedError::Disabled)
        ));
        assert_eq!(engine.embed(&texts(&["a"])).await, vec![Vec::<f32>::new()]);
    }

    #[tokio::test]
    async fn from_config_with_hashing_model_embeds_locally() {
        let config = EmbeddingConfig {
            use_local: true,
            local_model_name: "hashing".to_string(),
            api_base_url: String::new(),
            ..EmbeddingConfig::default()
        };
        let engine = EmbeddingEngine::from_config(&config).unwrap();

        let vectors = engine.embed(&texts(&["graph neural networks"])).await;

        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].len(), DEFAULT_EMBEDDING_DIMENSIONS);
    }

    struct NanRemote;

    #[async_trait]
    impl Embedder for NanRemote {
        async fn try_embed(&self, _texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbedError> {
            Ok(vec![vec![0.5, f32::NAN], vec![0.5, 0.5], vec![f32::INFINITY, 0.0]])
        }
    }

    #[tokio::test]
    async fn non_finite_vectors_are_returned_empty() {
        let vectors = NanRemote.embed(&texts(&["a", "b", "c"])).await;
        assert_eq!(vectors, vec![Vec::new(), vec![0.5, 0.5], Vec::new()]);
    }
}

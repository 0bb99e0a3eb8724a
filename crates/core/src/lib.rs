pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod search;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_pages, word_windows, ChunkingConfig};
pub use config::{EmbeddingConfig, LlmConfig, RagConfig, PROVIDER_PRESETS};
pub use embeddings::{
    local_loader_for, Embedder, EmbeddingEngine, HashingModel, HashingModelLoader, LocalModel,
    LocalModelLoader, RemoteEmbeddingClient, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ConfigError, EmbedError, IngestError, LlmError, StoreError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{
    discover_pdf_files, paper_id_for, IndexedPaper, IndexingPipeline, IndexingReport, SkippedPdf,
};
pub use llm::{LlmClient, OpenAiCompatibleClient};
pub use models::{
    ChatMessage, ChatOptions, Chunk, ChunkRecord, EmbeddingVector, RetrievalResult, Role,
};
pub use orchestrator::{
    ChatReply, ChatScope, ChatSession, Grounding, UngroundedReason, DEFAULT_TARGET_LANGUAGE,
    DEFAULT_TOP_K, HISTORY_WINDOW,
};
pub use search::{cosine_similarity, search_similar_chunks};
pub use stores::{InMemoryChunkStore, SqliteChunkStore};
pub use traits::ChunkStore;

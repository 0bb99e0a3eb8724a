use crate::error::StoreError;
use crate::models::Chunk;
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence boundary for indexed chunks, keyed by paper id.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Chunks of one paper ordered by `chunk_index`.
    async fn chunks_for_paper(&self, paper_id: &str) -> Result<Vec<Chunk>, StoreError>;

    /// Chunks of every paper, grouped by paper and ordered by `chunk_index`.
    async fn all_chunks(&self) -> Result<Vec<Chunk>, StoreError>;

    /// Atomically replaces every stored chunk of `paper_id`.
    async fn replace_chunks(&self, paper_id: &str, chunks: &[Chunk]) -> Result<(), StoreError>;

    async fn indexed_papers(&self) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl<T> ChunkStore for Arc<T>
where
    T: ChunkStore + ?Sized,
{
    async fn chunks_for_paper(&self, paper_id: &str) -> Result<Vec<Chunk>, StoreError> {
        (**self).chunks_for_paper(paper_id).await
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>, StoreError> {
        (**self).all_chunks().await
    }

    async fn replace_chunks(&self, paper_id: &str, chunks: &[Chunk]) -> Result<(), StoreError> {
        (**self).replace_chunks(paper_id, chunks).await
    }

    async fn indexed_papers(&self) -> Result<Vec<String>, StoreError> {
        (**self).indexed_papers().await
    }
}

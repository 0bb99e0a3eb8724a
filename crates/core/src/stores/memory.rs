use crate::error::StoreError;
use crate::models::Chunk;
use crate::traits::ChunkStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryChunkStore {
    papers: RwLock<BTreeMap<String, Vec<Chunk>>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn chunks_for_paper(&self, paper_id: &str) -> Result<Vec<Chunk>, StoreError> {
        let papers = self.papers.read().map_err(|_| StoreError::Poisoned)?;
        Ok(papers.get(paper_id).cloned().unwrap_or_default())
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>, StoreError> {
        let papers = self.papers.read().map_err(|_| StoreError::Poisoned)?;
        Ok(papers.values().flatten().cloned().collect())
    }

    async fn replace_chunks(&self, paper_id: &str, chunks: &[Chunk]) -> Result<(), StoreError> {
        let mut sorted = chunks.to_vec();
        sorted.sort_by_key(|chunk| chunk.chunk_index);

        let mut papers = self.papers.write().map_err(|_| StoreError::Poisoned)?;
        if sorted.is_empty() {
            papers.remove(paper_id);
        } else {
            papers.insert(paper_id.to_string(), sorted);
        }
        Ok(())
    }

    async fn indexed_papers(&self) -> Result<Vec<String>, StoreError> {
        let papers = self.papers.read().map_err(|_| StoreError::Poisoned)?;
        Ok(papers.keys().cloned().collect())
    }
}

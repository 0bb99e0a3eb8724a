use crate::chunking::{chunk_pages, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::extractor::{extract_page_texts, PdfExtractor};
use crate::models::Chunk;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

/// Extract, chunk and embed one paper. Results are returned, not stored.
pub struct IndexingPipeline<X, E> {
    extractor: X,
    embedder: E,
    chunking: ChunkingConfig,
}

impl<X, E> IndexingPipeline<X, E>
where
    X: PdfExtractor,
    E: Embedder,
{
    pub fn new(extractor: X, embedder: E, chunking: ChunkingConfig) -> Result<Self, IngestError> {
        chunking.validate()?;
        Ok(Self {
            extractor,
            embedder,
            chunking,
        })
    }

    /// Returns the paper's chunks with embeddings attached where available.
    ///
    /// A file without extractable text yields no chunks and no embedding call.
    /// Only an invalid chunking config is an error.
    pub async fn index_paper(&self, path: &Path) -> Result<Vec<Chunk>, IngestError> {
        let pages = extract_page_texts(&self.extractor, path);
        if pages.is_empty() {
            return Ok(Vec::new());
        }

        let mut chunks = chunk_pages(&pages, &self.chunking)?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await;

        let mut embedded = 0usize;
        for (chunk, vector) in chunks.iter_mut().zip(embeddings) {
            if !vector.is_empty() {
                chunk.embedding = Some(vector);
                embedded += 1;
            }
        }

        if embedded == 0 {
            warn!(path = %path.display(), chunks = chunks.len(), "paper indexed without embeddings");
        }
        info!(path = %path.display(), chunks = chunks.len(), embedded, "paper indexed");
        Ok(chunks)
    }

    /// Indexes every PDF under `folder`, skipping files that produce no chunks.
    pub async fn index_folder(&self, folder: &Path) -> Result<IndexingReport, IngestError> {
        let files = discover_pdf_files(folder);

        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }

        let mut papers = Vec::new();
        let mut skipped_files = Vec::new();

        for path in files {
            let chunks = self.index_paper(&path).await?;
            if chunks.is_empty() {
                skipped_files.push(SkippedPdf {
                    path,
                    reason: "no extractable text".to_string(),
                });
                continue;
            }

            papers.push(IndexedPaper {
                paper_id: paper_id_for(&path),
                path,
                chunks,
            });
        }

        Ok(IndexingReport {
            papers,
            skipped_files,
        })
    }
}

pub struct IndexedPaper {
    pub paper_id: String,
    pub path: PathBuf,
    pub chunks: Vec<Chunk>,
}

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IndexingReport {
    pub papers: Vec<IndexedPaper>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// PDFs below `folder`, sorted. Hidden entries (`.git`, `._paper.pdf`) and
/// office lock files (`~$paper.pdf`) are left out.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_paper_file(entry.path()))
        .map(DirEntry::into_path)
        .collect();

    files.sort_unstable();
    files
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn is_paper_file(path: &Path) -> bool {
    let is_lock_file = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("~$"));

    !is_lock_file
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Stable paper id derived from the file path.
pub fn paper_id_for(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

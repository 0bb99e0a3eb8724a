//! SQLite chunk table. Embeddings are stored as JSON array text, or an empty
//! string for chunks that were never embedded.

use crate::error::StoreError;
use crate::models::{Chunk, ChunkRecord};
use crate::traits::ChunkStore;
use async_trait::async_trait;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS text_chunks (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    paper_id       TEXT NOT NULL,
    chunk_index    INTEGER NOT NULL DEFAULT 0,
    text           TEXT NOT NULL,
    embedding_json TEXT NOT NULL DEFAULT '',
    page_start     INTEGER NOT NULL DEFAULT 0,
    page_end       INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_text_chunks_paper ON text_chunks(paper_id, chunk_index);
"#;

const SELECT_COLUMNS: &str = "chunk_index, text, embedding_json, page_start, page_end";

/// Chunk store over one SQLite connection. Queries run on the blocking pool.
pub struct SqliteChunkStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteChunkStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened chunk store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            work(&mut conn)
        })
        .await
        .map_err(|error| StoreError::Task(error.to_string()))?
    }
}

fn read_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let chunk_index: i64 = row.get(0)?;
    let record = ChunkRecord {
        chunk_index: u64::try_from(chunk_index).unwrap_or_default(),
        text: row.get(1)?,
        embedding: row.get(2)?,
        page_start: row.get(3)?,
        page_end: row.get(4)?,
    };
    Ok(Chunk::from(record))
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn chunks_for_paper(&self, paper_id: &str) -> Result<Vec<Chunk>, StoreError> {
        let paper_id = paper_id.to_string();
        self.run(move |conn| {
            let mut statement = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM text_chunks WHERE paper_id = ?1 ORDER BY chunk_index"
            ))?;
            let chunks = statement
                .query_map(params![paper_id], read_chunk)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(chunks)
        })
        .await
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>, StoreError> {
        self.run(|conn| {
            let mut statement = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM text_chunks ORDER BY paper_id, chunk_index"
            ))?;
            let chunks = statement
                .query_map([], read_chunk)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(chunks)
        })
        .await
    }

    async fn replace_chunks(&self, paper_id: &str, chunks: &[Chunk]) -> Result<(), StoreError> {
        let owner = paper_id.to_string();
        let records: Vec<ChunkRecord> = chunks.iter().map(ChunkRecord::from).collect();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM text_chunks WHERE paper_id = ?1", params![owner])?;
            {
                let mut insert = tx.prepare(
                    "INSERT INTO text_chunks
                        (paper_id, chunk_index, text, embedding_json, page_start, page_end)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for record in &records {
                    insert.execute(params![
                        owner,
                        i64::try_from(record.chunk_index).unwrap_or(i64::MAX),
                        record.text,
                        record.embedding,
                        record.page_start,
                        record.page_end,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await?;

        info!(paper_id, chunks = chunks.len(), "replaced stored chunks");
        Ok(())
    }

    async fn indexed_papers(&self) -> Result<Vec<String>, StoreError> {
        self.run(|conn| {
            let mut statement =
                conn.prepare("SELECT DISTINCT paper_id FROM text_chunks ORDER BY paper_id")?;
            let papers = statement
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(papers)
        })
        .await
    }
}

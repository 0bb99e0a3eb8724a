pub mod memory;
pub mod sqlite;

pub use memory::InMemoryChunkStore;
pub use sqlite::SqliteChunkStore;

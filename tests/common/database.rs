//! Throwaway databases for tests

use stock_news_ingest::checkpoint::SqliteCheckpointStore;
use stock_news_ingest::database::DatabaseManager;
use stock_news_ingest::writer::DedupWriter;
use tempfile::TempDir;

/// A fresh database file that lives as long as the value
pub struct TestDatabase {
    pub manager: DatabaseManager,
    pub path: String,
    // Dropped last so the file outlives the pool
    _dir: TempDir,
}

impl TestDatabase {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test.db").to_string_lossy().to_string();
        let manager = DatabaseManager::new(&path).await.expect("Failed to create test database");
        Self { manager, path, _dir: dir }
    }

    pub fn writer(&self) -> DedupWriter {
        DedupWriter::new(self.manager.clone())
    }

    pub fn store(&self) -> SqliteCheckpointStore {
        SqliteCheckpointStore::new(self.manager.clone())
    }
}

//! Throwaway SQLite databases for integration tests

use sqlx::Row;
use stock_etl::database::{setup, DatabaseManager};
use stock_etl::models::TableRef;
use tempfile::TempDir;

/// A database file living in its own temporary directory. The directory is
/// removed when the value is dropped.
pub struct TestDatabase {
    pub db: DatabaseManager,
    pub path: String,
    _dir: TempDir,
}

impl TestDatabase {
    /// Execute raw DDL / DML
    pub async fn execute(&self, sql: &str) {
        sqlx::query(sql).execute(self.db.pool()).await.unwrap();
    }

    pub async fn count(&self, table: &str) -> i64 {
        self.db.row_count(&TableRef::new(table)).await.unwrap()
    }

    /// Declared type of `column` as reported by the catalog
    pub async fn declared_type(&self, table: &str, column: &str) -> Option<String> {
        let rows = sqlx::query(&format!("PRAGMA table_info(\"{}\")", table))
            .fetch_all(self.db.pool())
            .await
            .unwrap();
        rows.iter()
            .find(|row| row.get::<String, _>("name") == column)
            .map(|row| row.get::<String, _>("type"))
    }

    /// Open a second, independent connection to the same file
    pub async fn reopen(&self) -> DatabaseManager {
        DatabaseManager::open(&self.path).await.unwrap()
    }
}

/// Fresh, empty database
pub async fn open_test_database() -> TestDatabase {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stock_project.db").to_string_lossy().to_string();
    let db = DatabaseManager::open(&path).await.unwrap();
    TestDatabase { db, path, _dir: dir }
}

/// Fresh database with every destination table created
pub async fn open_destination_database() -> TestDatabase {
    let test_db = open_test_database().await;
    setup::ensure_destination_tables(&test_db.db).await.unwrap();
    test_db
}

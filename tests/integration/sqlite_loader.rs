//! Loader integration against real SQLite files

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use sqlx::Row;

use crate::common::database::{open_destination_database, open_test_database};
use crate::common::test_data::{date, distinct_records, ownership_record, ownership_table, write_file};
use crate::common::logging;
use stock_etl::database::DatabaseManager;
use stock_etl::error::{InsertError, LoadError};
use stock_etl::loader::{inspector, BulkLoader, Connector, LoadOptions};
use stock_etl::models::{StagedRecord, StagedTable, StorageCategory, TableRef, Value};
use stock_etl::staging::Source;

const SHARES_TABLE: &str = r#"CREATE TABLE shares (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker VARCHAR(10) NOT NULL,
    day DATE,
    shares INT DEFAULT 0,
    UNIQUE (ticker, day)
)"#;

fn shares_table(records: Vec<StagedRecord>) -> StagedTable {
    StagedTable::new(TableRef::new("shares"), &["ticker", "day", "shares"], &["ticker", "day"])
        .with_records(records)
}

fn shares_record(ticker: &str, day: chrono::NaiveDate, shares: i64) -> StagedRecord {
    StagedRecord::new()
        .with("ticker", ticker)
        .with("day", day)
        .with("shares", shares)
}

#[tokio::test]
async fn test_overlapping_loads_on_sqlite() {
    logging::init_test_logging();
    logging::log_test_step("AAPL loads against a real database");

    let test_db = open_destination_database().await;
    let loader = BulkLoader::new(&test_db.db, LoadOptions::default());

    let first = loader
        .load(&ownership_table(vec![
            ownership_record("AAPL", date(2024, 1, 1), 100),
            ownership_record("AAPL", date(2024, 1, 2), 110),
        ]))
        .await
        .unwrap();
    assert_eq!((first.inserted, first.skipped), (2, 0));

    let second = loader
        .load(&ownership_table(vec![
            ownership_record("AAPL", date(2024, 1, 2), 999),
            ownership_record("AAPL", date(2024, 1, 3), 120),
        ]))
        .await
        .unwrap();
    assert_eq!((second.inserted, second.skipped), (1, 1));

    assert_eq!(test_db.count("ownership_breakdown").await, 3);
    let kept: i64 = sqlx::query(
        "SELECT institutions_shares FROM ownership_breakdown WHERE html_creation_date = '2024-01-02'",
    )
    .fetch_one(test_db.db.pool())
    .await
    .unwrap()
    .get(0);
    assert_eq!(kept, 110);
}

#[tokio::test]
async fn test_unique_violation_is_classified() {
    let test_db = open_destination_database().await;
    let table = TableRef::new("ownership_breakdown");
    let columns = vec!["ticker".to_string(), "html_creation_date".to_string()];
    let row = vec![Value::from("AAPL"), Value::Date(date(2024, 1, 1))];

    test_db.db.insert_batch(&table, &columns, &[row.clone()]).await.unwrap();
    let duplicate = test_db.db.insert_batch(&table, &columns, &[row.clone()]).await;
    assert_matches!(duplicate, Err(InsertError::UniqueViolation(_)));

    let outcomes = test_db
        .db
        .insert_rows(&table, &columns, &[row, vec![Value::from("MSFT"), Value::Date(date(2024, 1, 1))]])
        .await
        .unwrap();
    assert_matches!(outcomes[0], Err(InsertError::UniqueViolation(_)));
    assert_eq!(outcomes[1], Ok(()));
    assert_eq!(test_db.count("ownership_breakdown").await, 2);
}

#[tokio::test]
async fn test_failed_batch_leaves_no_rows_behind() {
    let test_db = open_destination_database().await;
    let loader = BulkLoader::new(
        &test_db.db,
        LoadOptions {
            batch_size: 50,
            progress_step: 10,
        },
    );

    loader.load(&ownership_table(distinct_records(1))).await.unwrap();
    let result = loader.load(&ownership_table(distinct_records(50))).await.unwrap();

    assert_eq!((result.inserted, result.skipped), (49, 1));
    assert_eq!(test_db.count("ownership_breakdown").await, 50);
}

#[tokio::test]
async fn test_int_overflow_widens_to_bigint() {
    let test_db = open_test_database().await;
    test_db.execute(SHARES_TABLE).await;
    test_db.execute("CREATE INDEX idx_shares_shares ON shares(shares)").await;
    let loader = BulkLoader::new(&test_db.db, LoadOptions::default());

    loader
        .load(&shares_table(vec![shares_record("AAPL", date(2024, 1, 1), 7)]))
        .await
        .unwrap();
    let result = loader
        .load(&shares_table(vec![shares_record("AAPL", date(2024, 1, 2), 9_000_000_000)]))
        .await
        .unwrap();
    assert_eq!((result.inserted, result.skipped), (1, 0));

    assert_eq!(test_db.declared_type("shares", "shares").await.as_deref(), Some("BIGINT"));
    let stored: i64 = sqlx::query("SELECT shares FROM shares WHERE day = '2024-01-02'")
        .fetch_one(test_db.db.pool())
        .await
        .unwrap()
        .get(0);
    assert_eq!(stored, 9_000_000_000);

    // constraints, defaults, ids and indexes survive the rebuild
    let sql: String = sqlx::query("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'shares'")
        .fetch_one(test_db.db.pool())
        .await
        .unwrap()
        .get(0);
    assert!(sql.contains("AUTOINCREMENT"), "{}", sql);
    assert!(sql.contains("NOT NULL"), "{}", sql);
    assert!(sql.contains("DEFAULT (0)"), "{}", sql);
    let index: Option<String> = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'index' AND name = 'idx_shares_shares'")
        .fetch_optional(test_db.db.pool())
        .await
        .unwrap()
        .map(|row| row.get(0));
    assert_eq!(index.as_deref(), Some("idx_shares_shares"));
    let ids: Vec<i64> = sqlx::query("SELECT id FROM shares ORDER BY id")
        .fetch_all(test_db.db.pool())
        .await
        .unwrap()
        .iter()
        .map(|row| row.get(0))
        .collect();
    assert_eq!(ids, vec![1, 2]);

    let again = loader
        .load(&shares_table(vec![shares_record("AAPL", date(2024, 1, 2), 9_000_000_000)]))
        .await
        .unwrap();
    assert_eq!((again.inserted, again.skipped), (0, 1));
}

#[tokio::test]
async fn test_long_text_widens_to_text() {
    let test_db = open_test_database().await;
    test_db.execute(SHARES_TABLE).await;
    let loader = BulkLoader::new(&test_db.db, LoadOptions::default());

    let ticker = "BRK.B-PREFERRED-CLASS";
    let result = loader
        .load(&shares_table(vec![shares_record(ticker, date(2024, 1, 1), 1)]))
        .await
        .unwrap();
    assert_eq!(result.inserted, 1);
    assert_eq!(test_db.declared_type("shares", "ticker").await.as_deref(), Some("TEXT"));

    let schema = inspector::inspect(&test_db.db, &TableRef::new("shares")).await.unwrap();
    assert_eq!(schema["ticker"].category, StorageCategory::UnboundedText);

    let again = loader
        .load(&shares_table(vec![shares_record(ticker, date(2024, 1, 1), 1)]))
        .await
        .unwrap();
    assert_eq!(again.skipped, 1);
}

#[tokio::test]
async fn test_schema_only_ever_grows() {
    let test_db = open_test_database().await;
    test_db.execute(SHARES_TABLE).await;
    let loader = BulkLoader::new(&test_db.db, LoadOptions::default());

    loader
        .load(&shares_table(vec![shares_record("AAPL", date(2024, 1, 1), 5_000_000_000)]))
        .await
        .unwrap();
    loader
        .load(&shares_table(vec![shares_record("AAPL", date(2024, 1, 2), 1)]))
        .await
        .unwrap();

    assert_eq!(test_db.declared_type("shares", "shares").await.as_deref(), Some("BIGINT"));
    assert_eq!(test_db.count("shares").await, 2);
}

#[tokio::test]
async fn test_facts_columns_are_added() {
    let test_db = open_destination_database().await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "facts.csv",
        "facts_id,Ticker,HTML Creation Date,Market Cap,Industry,Beta\n\
         1,AAPL,2024-07-01,3400000000000,Consumer Electronics,1.24\n\
         2,MSFT,2024-07-01,NULL,Software,0.9\n",
    );

    let (staged, _) = Source::Facts.stage_file(&path).unwrap();
    let result = BulkLoader::new(&test_db.db, LoadOptions::default())
        .load(&staged)
        .await
        .unwrap();
    assert_eq!(result.inserted, 2);

    assert_eq!(
        test_db.declared_type("simply_wallstreet_facts", "market_cap").await.as_deref(),
        Some("BIGINT")
    );
    assert_eq!(
        test_db.declared_type("simply_wallstreet_facts", "beta").await.as_deref(),
        Some("REAL")
    );
    assert_eq!(
        test_db.declared_type("simply_wallstreet_facts", "industry").await.as_deref(),
        Some("TEXT")
    );

    let row = sqlx::query("SELECT facts_id, market_cap FROM simply_wallstreet_facts WHERE ticker = 'AAPL'")
        .fetch_one(test_db.db.pool())
        .await
        .unwrap();
    assert_eq!(row.get::<i64, _>(1), 3_400_000_000_000);
    // identity comes from the table, not the file
    assert_eq!(row.get::<i64, _>(0), 1);
}

#[tokio::test]
async fn test_ownership_csv_reload_is_idempotent() {
    let test_db = open_destination_database().await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "ownership.csv",
        "Ticker,HTML Creation Date,InstitutionsShares,InstitutionsPercent,GeneralPublicShares,GeneralPublicPercent\n\
         AAPL,2024-05-01,9000000000,61.2,5000000000,38.8\n\
         MSFT,2024-05-01,5000000000,72.0,1900000000,28.0\n\
         MSFT,2024-05-01,5000000000,72.0,1900000000,28.0\n",
    );
    let loader = BulkLoader::new(&test_db.db, LoadOptions::default());

    let (staged, report) = Source::Ownership.stage_file(&path).unwrap();
    assert_eq!(report.duplicates, 1);
    let first = loader.load(&staged).await.unwrap();
    let (staged, _) = Source::Ownership.stage_file(&path).unwrap();
    let second = loader.load(&staged).await.unwrap();

    assert_eq!((first.inserted, first.skipped), (2, 0));
    assert_eq!((second.inserted, second.skipped), (0, 2));
    assert_eq!(test_db.count("ownership_breakdown").await, 2);
}

#[tokio::test]
async fn test_missing_table_has_empty_schema() {
    let test_db = open_test_database().await;

    let schema = inspector::inspect(&test_db.db, &TableRef::new("nowhere")).await.unwrap();
    assert!(schema.is_empty());

    let table = StagedTable::new(TableRef::new("nowhere"), &["a"], &["a"])
        .with_records(vec![StagedRecord::new().with("a", 1i64)]);
    let result = BulkLoader::new(&test_db.db, LoadOptions::default()).load(&table).await;
    assert_matches!(result, Err(LoadError::MissingTable(_)));
}

#[tokio::test]
async fn test_unreachable_database_is_a_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("nested").join("db.sqlite");

    let result = DatabaseManager::open(&path.to_string_lossy()).await;
    assert_matches!(result, Err(LoadError::Connection(_)));
}

#[tokio::test]
async fn test_fractional_overflow_widens_to_bigint() {
    let test_db = open_test_database().await;
    test_db.execute(SHARES_TABLE).await;

    let table = StagedTable::new(TableRef::new("shares"), &["ticker", "day", "shares"], &["ticker", "day"])
        .with_records(vec![StagedRecord::new()
            .with("ticker", "AAPL")
            .with("day", date(2024, 1, 1))
            .with("shares", 5_000_000_000.5)]);
    let result = BulkLoader::new(&test_db.db, LoadOptions::default())
        .load(&table)
        .await
        .unwrap();

    assert_eq!((result.inserted, result.skipped), (1, 0));
    assert_eq!(test_db.declared_type("shares", "shares").await.as_deref(), Some("BIGINT"));
}

#[tokio::test]
async fn test_column_names_are_matched_without_case() {
    let test_db = open_test_database().await;
    test_db.execute(SHARES_TABLE).await;

    let table = StagedTable::new(TableRef::new("shares"), &["Ticker", "day", "Shares"], &["Ticker", "day"])
        .with_records(vec![StagedRecord::new()
            .with("Ticker", "AAPL")
            .with("day", date(2024, 1, 1))
            .with("Shares", 42i64)]);
    let result = BulkLoader::new(&test_db.db, LoadOptions::default())
        .load(&table)
        .await
        .unwrap();

    assert_eq!((result.inserted, result.skipped), (1, 0));
    let columns: Vec<String> = sqlx::query("PRAGMA table_info(\"shares\")")
        .fetch_all(test_db.db.pool())
        .await
        .unwrap()
        .iter()
        .map(|row| row.get::<String, _>("name"))
        .collect();
    assert_eq!(columns, vec!["id", "ticker", "day", "shares"]);
    let stored: i64 = sqlx::query("SELECT shares FROM shares WHERE ticker = 'AAPL'")
        .fetch_one(test_db.db.pool())
        .await
        .unwrap()
        .get(0);
    assert_eq!(stored, 42);
}

#[tokio::test]
async fn test_nan_does_not_turn_a_numeric_column_into_text() {
    let test_db = open_test_database().await;
    test_db.execute(SHARES_TABLE).await;

    let table = StagedTable::new(TableRef::new("shares"), &["ticker", "day", "pe"], &["ticker", "day"])
        .with_records(vec![
            StagedRecord::new()
                .with("ticker", "AAPL")
                .with("day", date(2024, 1, 1))
                .with("pe", f64::NAN),
            StagedRecord::new()
                .with("ticker", "AAPL")
                .with("day", date(2024, 1, 2))
                .with("pe", 12.5),
        ]);
    let result = BulkLoader::new(&test_db.db, LoadOptions::default())
        .load(&table)
        .await
        .unwrap();

    assert_eq!((result.inserted, result.skipped), (2, 0));
    assert_eq!(test_db.declared_type("shares", "pe").await.as_deref(), Some("REAL"));
    let nulls: i64 = sqlx::query("SELECT COUNT(*) FROM shares WHERE pe IS NULL")
        .fetch_one(test_db.db.pool())
        .await
        .unwrap()
        .get(0);
    assert_eq!(nulls, 1);
}

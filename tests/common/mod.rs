//! Common test utilities and helpers

pub mod database;

pub use database::{open_test_database, TestDatabase};
pub use fake_connector::{Event, FakeConnector};

/// Test data utilities
pub mod test_data {
    use chrono::NaiveDate;
    use stock_etl::models::{StagedRecord, StagedTable, TableRef};

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Ownership-style record keyed by (ticker, html_creation_date)
    pub fn ownership_record(ticker: &str, day: NaiveDate, shares: i64) -> StagedRecord {
        StagedRecord::new()
            .with("ticker", ticker)
            .with("html_creation_date", day)
            .with("institutions_shares", shares)
    }

    pub fn ownership_table(records: Vec<StagedRecord>) -> StagedTable {
        StagedTable::new(
            TableRef::new("ownership_breakdown"),
            &["ticker", "html_creation_date", "institutions_shares"],
            &["ticker", "html_creation_date"],
        )
        .with_records(records)
    }

    /// `n` distinct AAPL records on consecutive days starting 2024-01-01
    pub fn distinct_records(n: usize) -> Vec<StagedRecord> {
        (0..n)
            .map(|i| {
                ownership_record(
                    "AAPL",
                    date(2024, 1, 1) + chrono::Duration::days(i as i64),
                    1_000 + i as i64,
                )
            })
            .collect()
    }

    /// Write `contents` to a file named `name` inside `dir`
    pub fn write_file(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

/// Logging utilities for tests
pub mod logging {
    use std::sync::Once;
    use tracing::info;

    static INIT: Once = Once::new();

    /// Initialize test logging
    pub fn init_test_logging() {
        INIT.call_once(|| {
            // Another test harness may already have installed a subscriber
            let _ = tracing::subscriber::set_global_default(
                tracing_subscriber::fmt()
                    .with_env_filter("stock_etl=debug,main=debug")
                    .with_test_writer()
                    .finish(),
            );
        });
    }

    /// Log test step
    pub fn log_test_step(step: &str) {
        info!("🧪 Test Step: {}", step);
    }
}

use tracing::info;

use super::DatabaseManager;
use crate::error::LoadError;

/// Destination tables for every staging source. The loader only ever
/// appends to these, so the DDL is the starting point, not a contract.
const DESTINATION_TABLES: &[(&str, &str)] = &[
    (
        "ownership_breakdown",
        r#"CREATE TABLE IF NOT EXISTS ownership_breakdown (
            ticker VARCHAR(50),
            html_creation_date DATE,
            institutions_shares BIGINT,
            institutions_percent REAL,
            public_companies_shares BIGINT,
            public_companies_percent REAL,
            private_companies_shares BIGINT,
            private_companies_percent REAL,
            individual_insiders_shares BIGINT,
            individual_insiders_percent REAL,
            vcpe_firms_shares BIGINT,
            vcpe_firms_percent REAL,
            general_public_shares BIGINT,
            general_public_percent REAL,
            UNIQUE (ticker, html_creation_date)
        )"#,
    ),
    (
        "insider_transactions",
        r#"CREATE TABLE IF NOT EXISTS insider_transactions (
            ticker VARCHAR(50),
            html_creation_date DATE,
            filing_date DATE,
            owner_name VARCHAR(255),
            owner_type VARCHAR(100),
            transaction_type VARCHAR(50),
            shares BIGINT,
            price_max REAL,
            transaction_value REAL,
            UNIQUE (filing_date, owner_name)
        )"#,
    ),
    (
        "company_info",
        r#"CREATE TABLE IF NOT EXISTS company_info (
            ticker VARCHAR(50),
            html_creation_date DATE,
            owner_name VARCHAR(255),
            owner_type VARCHAR(100),
            shares_held BIGINT,
            percent_shares_outstanding REAL,
            percent_of_portfolio REAL,
            holding_date DATE,
            UNIQUE (owner_name, holding_date)
        )"#,
    ),
    (
        "snowflake_scores",
        r#"CREATE TABLE IF NOT EXISTS snowflake_scores (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tickers VARCHAR(50) NOT NULL,
            date DATE NOT NULL,
            canonical_url VARCHAR(500),
            value INT,
            future INT,
            past INT,
            health INT,
            dividend INT,
            UNIQUE (tickers, date)
        )"#,
    ),
    (
        "google_news",
        r#"CREATE TABLE IF NOT EXISTS google_news (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query_text VARCHAR(200),
            title_text VARCHAR(2000),
            link_url VARCHAR(2000) NOT NULL,
            published_at DATETIME,
            source_name VARCHAR(200),
            sentiment_label VARCHAR(50),
            sentiment_negative DECIMAL(10, 9),
            sentiment_neutral DECIMAL(10, 9),
            sentiment_positive DECIMAL(10, 9),
            UNIQUE (title_text, published_at)
        )"#,
    ),
    (
        "fear_and_greed_index",
        r#"CREATE TABLE IF NOT EXISTS fear_and_greed_index (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date DATE NOT NULL UNIQUE,
            fear_and_greed REAL NOT NULL
        )"#,
    ),
    (
        "simply_wallstreet_facts",
        r#"CREATE TABLE IF NOT EXISTS simply_wallstreet_facts (
            facts_id INTEGER PRIMARY KEY AUTOINCREMENT,
            ticker VARCHAR(50) NOT NULL,
            html_creation_date DATE,
            UNIQUE (ticker, html_creation_date)
        )"#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_insider_transactions_ticker ON insider_transactions(ticker)",
    "CREATE INDEX IF NOT EXISTS idx_google_news_query ON google_news(query_text)",
];

/// Names of the tables created by [`ensure_destination_tables`]
pub fn destination_tables() -> Vec<&'static str> {
    DESTINATION_TABLES.iter().map(|(name, _)| *name).collect()
}

/// Create any destination table that does not exist yet. Existing tables
/// are left untouched.
pub async fn ensure_destination_tables(db: &DatabaseManager) -> Result<(), LoadError> {
    info!("🏗️ Ensuring destination tables in {}", db.path());

    for (name, ddl) in DESTINATION_TABLES {
        sqlx::query(ddl)
            .execute(db.pool())
            .await
            .map_err(|e| LoadError::Catalog {
                table: name.to_string(),
                message: e.to_string(),
            })?;
        info!("  ✅ {}", name);
    }
    for ddl in INDEXES {
        sqlx::query(ddl)
            .execute(db.pool())
            .await
            .map_err(|e| LoadError::Catalog {
                table: "index".to_string(),
                message: e.to_string(),
            })?;
    }

    Ok(())
}

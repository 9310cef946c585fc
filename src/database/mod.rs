pub mod migrations;
pub mod setup;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::query_builder::Separated;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions,
};
use sqlx::{QueryBuilder, Row, SqlitePool};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{InsertError, LoadError};
use crate::loader::Connector;
use crate::models::{CatalogColumn, SchemaChange, StorageCategory, TableRef, Value};

/// SQLite's default SQLITE_MAX_VARIABLE_NUMBER since 3.32
pub const SQLITE_MAX_VARIABLES: usize = 32_766;

/// SQLite-backed connector. Each manager owns a single connection, so a
/// worker that opens its own manager never shares a connection.
#[derive(Clone, Debug)]
pub struct DatabaseManager {
    pool: SqlitePool,
    path: String,
}

impl DatabaseManager {
    /// Open (creating if missing) the database at `database_path`
    pub async fn open(database_path: &str) -> Result<Self, LoadError> {
        let path = database_path
            .strip_prefix("sqlite:")
            .unwrap_or(database_path)
            .to_string();

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| LoadError::Connection(format!("{}: {}", path, e)))?;

        debug!("💾 Connected to database: {}", path);
        Ok(Self { pool, path })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn table_exists(&self, table: &TableRef) -> Result<bool, LoadError> {
        Ok(!self.catalog_columns(table).await?.is_empty())
    }

    pub async fn row_count(&self, table: &TableRef) -> Result<i64, LoadError> {
        let sql = format!("SELECT COUNT(*) AS n FROM {}", qualified_name(table));
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| catalog_error(table, e))?;
        row.try_get::<i64, _>("n").map_err(|e| catalog_error(table, e))
    }

    pub async fn close(self) {
        self.pool.close().await;
        info!("🔒 Database connection closed: {}", self.path);
    }
}

#[async_trait]
impl Connector for DatabaseManager {
    async fn catalog_columns(&self, table: &TableRef) -> Result<Vec<CatalogColumn>, LoadError> {
        let sql = format!(
            "PRAGMA {}table_info({})",
            schema_prefix(table),
            quote_ident(&table.name)
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| catalog_error(table, e))?;

        rows.iter()
            .map(|row| {
                Ok(CatalogColumn {
                    name: row.try_get("name")?,
                    declared_type: row.try_get("type")?,
                    position: row.try_get::<i64, _>("cid")? as usize + 1,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| catalog_error(table, e))
    }

    async fn apply_change(&self, table: &TableRef, change: &SchemaChange) -> Result<(), LoadError> {
        migrations::apply_change(&self.pool, table, change).await
    }

    async fn insert_batch(
        &self,
        table: &TableRef,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<(), InsertError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(classify_insert_error)?;

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            qualified_name(table),
            column_list(columns)
        ));
        builder.push_values(rows, |mut values, row| {
            for value in row {
                push_value(&mut values, value);
            }
        });

        match builder.build().execute(&mut *tx).await {
            Ok(_) => tx.commit().await.map_err(classify_insert_error),
            Err(e) => {
                let error = classify_insert_error(e);
                if let Err(rollback) = tx.rollback().await {
                    debug!("Rollback after failed batch on {} also failed: {}", table, rollback);
                }
                Err(error)
            }
        }
    }

    async fn insert_rows(
        &self,
        table: &TableRef,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<Vec<Result<(), InsertError>>, LoadError> {
        let sql = insert_statement(table, columns);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LoadError::Connection(e.to_string()))?;

        // A failed INSERT only undoes its own statement; the transaction stays usable
        let mut outcomes = Vec::with_capacity(rows.len());
        for row in rows {
            let query = row
                .iter()
                .fold(sqlx::query(&sql), |query, value| bind_value(query, value));
            match query.execute(&mut *tx).await {
                Ok(_) => outcomes.push(Ok(())),
                Err(e) => match classify_insert_error(e) {
                    InsertError::Connection(message) => return Err(LoadError::Connection(message)),
                    other => outcomes.push(Err(other)),
                },
            }
        }

        tx.commit()
            .await
            .map_err(|e| LoadError::Connection(e.to_string()))?;
        Ok(outcomes)
    }

    fn max_parameters(&self) -> usize {
        SQLITE_MAX_VARIABLES
    }
}

/// Quote an identifier for SQLite
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema".` or nothing, for prefixing table names and pragmas
pub(crate) fn schema_prefix(table: &TableRef) -> String {
    match &table.schema {
        Some(schema) => format!("{}.", quote_ident(schema)),
        None => String::new(),
    }
}

pub(crate) fn qualified_name(table: &TableRef) -> String {
    format!("{}{}", schema_prefix(table), quote_ident(&table.name))
}

pub(crate) fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert_statement(table: &TableRef, columns: &[String]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_name(table),
        column_list(columns),
        placeholders
    )
}

/// Declared SQLite type used when adding or widening a column
pub fn declared_type(category: StorageCategory) -> String {
    match category {
        StorageCategory::StandardInteger => "INT".to_string(),
        StorageCategory::WideInteger => "BIGINT".to_string(),
        StorageCategory::Float => "REAL".to_string(),
        StorageCategory::BoundedText(n) => format!("VARCHAR({})", n),
        StorageCategory::UnboundedText => "TEXT".to_string(),
        StorageCategory::Date => "DATE".to_string(),
        StorageCategory::Timestamp => "DATETIME".to_string(),
    }
}

fn push_value(values: &mut Separated<'_, '_, Sqlite, &'static str>, value: &Value) {
    match value {
        Value::Null => values.push_bind(None::<String>),
        Value::Integer(i) => values.push_bind(*i),
        Value::Float(f) => values.push_bind(*f),
        Value::Text(s) => values.push_bind(s.clone()),
        Value::Date(d) => values.push_bind(*d),
        Value::Timestamp(ts) => values.push_bind(*ts),
    };
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Integer(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Date(d) => query.bind(*d),
        Value::Timestamp(ts) => query.bind(*ts),
    }
}

// SQLITE_IOERR, SQLITE_BUSY, SQLITE_LOCKED, SQLITE_NOMEM, SQLITE_FULL, SQLITE_CANTOPEN
const CONNECTION_RESULT_CODES: &[i32] = &[10, 5, 6, 7, 13, 14];

/// Whether an error means the database itself is unusable, as opposed to
/// one statement being rejected
pub(crate) fn is_connection_error(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_) => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| CONNECTION_RESULT_CODES.contains(&(code & 0xff)))
            .unwrap_or(false),
        _ => false,
    }
}

pub(crate) fn classify_insert_error(error: sqlx::Error) -> InsertError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_unique_violation() {
            return InsertError::UniqueViolation(db.message().to_string());
        }
    }
    if is_connection_error(&error) {
        InsertError::Connection(error.to_string())
    } else {
        InsertError::Rejected(error.to_string())
    }
}

fn catalog_error(table: &TableRef, error: sqlx::Error) -> LoadError {
    if is_connection_error(&error) {
        LoadError::Connection(error.to_string())
    } else {
        LoadError::Catalog {
            table: table.to_string(),
            message: error.to_string(),
        }
    }
}

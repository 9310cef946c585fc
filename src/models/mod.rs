use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A single staged scalar, typed once per column by the type negotiator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text rendering used for width measurement and natural-key comparison.
    /// Null has no rendering.
    pub fn render(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    /// Build a text value, mapping blank strings to null
    pub fn text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Value::Null
        } else {
            Value::Text(trimmed.to_string())
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render() {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "NULL"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One row ready for insertion: column name -> value, in staging order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedRecord {
    values: IndexMap<String, Value>,
}

impl StagedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.values.insert(column.to_string(), value.into());
    }

    /// Value for a column; absent columns read as null
    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&Value::Null)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Natural-key identity of this record, or None when any key column is null
    pub fn natural_key(&self, key: &[String]) -> Option<Vec<String>> {
        key.iter().map(|column| self.get(column).render()).collect()
    }

    /// Human readable natural key for log lines
    pub fn describe_key(&self, key: &[String]) -> String {
        if key.is_empty() {
            return "<no natural key>".to_string();
        }
        key.iter()
            .map(|column| format!("{}={}", column, self.get(column)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromIterator<(String, Value)> for StagedRecord {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Records staged for one destination table
#[derive(Debug, Clone, PartialEq)]
pub struct StagedTable {
    pub table: TableRef,
    /// Staged column order
    pub columns: Vec<String>,
    pub natural_key: Vec<String>,
    pub records: Vec<StagedRecord>,
}

impl StagedTable {
    pub fn new(table: TableRef, columns: &[&str], natural_key: &[&str]) -> Self {
        Self {
            table,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            natural_key: natural_key.iter().map(|c| c.to_string()).collect(),
            records: Vec::new(),
        }
    }

    pub fn with_records(mut self, records: Vec<StagedRecord>) -> Self {
        self.records = records;
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Destination table, optionally schema-qualified (`main.company_info`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(name: &str) -> Self {
        Self {
            schema: None,
            name: name.to_string(),
        }
    }

    /// Parse `schema.table` or a bare table name
    pub fn parse(qualified: &str) -> Self {
        match qualified.split_once('.') {
            Some((schema, name)) if !schema.is_empty() && !name.is_empty() => Self {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            },
            _ => Self::new(qualified),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Storage category of a destination column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageCategory {
    /// Fits a signed 32-bit integer
    StandardInteger,
    /// Signed 64-bit integer
    WideInteger,
    Float,
    BoundedText(usize),
    UnboundedText,
    Date,
    Timestamp,
}

impl StorageCategory {
    pub fn is_integer(&self) -> bool {
        matches!(self, StorageCategory::StandardInteger | StorageCategory::WideInteger)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, StorageCategory::BoundedText(_) | StorageCategory::UnboundedText)
    }
}

impl fmt::Display for StorageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageCategory::StandardInteger => write!(f, "standard integer"),
            StorageCategory::WideInteger => write!(f, "wide integer"),
            StorageCategory::Float => write!(f, "floating point"),
            StorageCategory::BoundedText(n) => write!(f, "text({})", n),
            StorageCategory::UnboundedText => write!(f, "unbounded text"),
            StorageCategory::Date => write!(f, "date"),
            StorageCategory::Timestamp => write!(f, "timestamp"),
        }
    }
}

/// Destination-side description of one column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub category: StorageCategory,
    pub max_length: Option<usize>,
    pub position: usize,
    pub declared_type: String,
}

/// Ordered column name -> schema mapping for one table
pub type TableSchema = IndexMap<String, ColumnSchema>;

/// Raw catalog row as reported by the database, before categorisation
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogColumn {
    pub name: String,
    pub declared_type: String,
    pub position: usize,
}

/// Append-only schema migration emitted by the type negotiator
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaChange {
    AddColumn {
        column: String,
        category: StorageCategory,
    },
    WidenToWideInteger {
        column: String,
    },
    WidenToUnboundedText {
        column: String,
    },
}

impl SchemaChange {
    pub fn column(&self) -> &str {
        match self {
            SchemaChange::AddColumn { column, .. }
            | SchemaChange::WidenToWideInteger { column }
            | SchemaChange::WidenToUnboundedText { column } => column,
        }
    }

    /// Category the column has once the change is applied
    pub fn target_category(&self) -> StorageCategory {
        match self {
            SchemaChange::AddColumn { category, .. } => *category,
            SchemaChange::WidenToWideInteger { .. } => StorageCategory::WideInteger,
            SchemaChange::WidenToUnboundedText { .. } => StorageCategory::UnboundedText,
        }
    }
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaChange::AddColumn { column, category } => {
                write!(f, "add column {} ({})", column, category)
            }
            SchemaChange::WidenToWideInteger { column } => {
                write!(f, "widen {} to wide integer", column)
            }
            SchemaChange::WidenToUnboundedText { column } => {
                write!(f, "widen {} to unbounded text", column)
            }
        }
    }
}

/// Outcome of one table load
#[derive(Debug, Clone, PartialEq)]
pub struct LoadResult {
    pub table: String,
    pub inserted: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

impl LoadResult {
    pub fn empty(table: &TableRef) -> Self {
        Self {
            table: table.to_string(),
            inserted: 0,
            skipped: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn total(&self) -> usize {
        self.inserted + self.skipped
    }
}

/// Configuration for an ETL job
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub batch_size: usize,
    pub progress_step: usize,
    pub load_workers: usize,
    pub fear_greed_url: String,
    pub http_timeout_secs: u64,
}

pub const DEFAULT_FEAR_GREED_URL: &str =
    "https://production.dataviz.cnn.io/index/fearandgreed/graphdata/";

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "stock_project.db".to_string(),
            batch_size: 100,
            progress_step: 100,
            load_workers: 3,
            fear_greed_url: DEFAULT_FEAR_GREED_URL.to_string(),
            http_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let defaults = Config::default();
        let config = Config {
            database_path: std::env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            batch_size: env_number("BATCH_SIZE", defaults.batch_size),
            progress_step: env_number("PROGRESS_STEP", defaults.progress_step),
            load_workers: env_number("LOAD_WORKERS", defaults.load_workers),
            fear_greed_url: std::env::var("FEAR_GREED_URL").unwrap_or(defaults.fear_greed_url),
            http_timeout_secs: env_number("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
        };

        if config.batch_size == 0 {
            return Err(anyhow::anyhow!("BATCH_SIZE must be greater than zero"));
        }
        url::Url::parse(&config.fear_greed_url)
            .map_err(|e| anyhow::anyhow!("FEAR_GREED_URL is not a valid URL: {}", e))?;

        Ok(config)
    }
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

use thiserror::Error;

/// Table-level load failures. Any of these aborts the load of one table.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("destination table {0} does not exist; run `stock-etl setup` first")]
    MissingTable(String),

    #[error("catalog query on {table} failed: {message}")]
    Catalog { table: String, message: String },

    #[error("schema change on {table} failed ({change}): {message}")]
    Migration {
        table: String,
        change: String,
        message: String,
    },
}

impl LoadError {
    pub fn is_connection(&self) -> bool {
        matches!(self, LoadError::Connection(_))
    }
}

/// Outcome of a failed insert statement, batch or single row
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InsertError {
    /// The row collides with an existing natural key
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Any other statement-level rejection (type confusion, NOT NULL, ...)
    #[error("row rejected: {0}")]
    Rejected(String),

    #[error("connection lost: {0}")]
    Connection(String),
}

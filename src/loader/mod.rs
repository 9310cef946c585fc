//! Duplicate-safe bulk loading with automatic schema widening.
//!
//! A load runs in two phases. First every staged column is negotiated
//! against the destination schema and any required append-only changes are
//! applied. Then the records are inserted in batches: each batch is tried as
//! one multi-row insert, and on any failure the batch is rolled back and
//! replayed row by row. Rows that collide with the natural key are counted
//! as skipped, other row-level failures are logged and skipped too, so every
//! staged record ends up in exactly one of the two counters.

pub mod inspector;
pub mod negotiator;

use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{InsertError, LoadError};
use crate::models::{
    CatalogColumn, ColumnSchema, Config, LoadResult, SchemaChange, StagedTable, TableRef, TableSchema,
    Value,
};

/// Database operations the loader needs. Implementations must make
/// `insert_batch` all-or-nothing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Catalog rows for `table`; empty when the table does not exist
    async fn catalog_columns(&self, table: &TableRef) -> Result<Vec<CatalogColumn>, LoadError>;

    /// Apply one append-only schema change
    async fn apply_change(&self, table: &TableRef, change: &SchemaChange) -> Result<(), LoadError>;

    /// Insert every row in one transaction, or none of them
    async fn insert_batch(
        &self,
        table: &TableRef,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<(), InsertError>;

    /// Insert rows one statement at a time and commit once at the end,
    /// reporting the outcome of each row in input order
    async fn insert_rows(
        &self,
        table: &TableRef,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<Vec<Result<(), InsertError>>, LoadError>;

    /// Upper bound on bind parameters in a single statement
    fn max_parameters(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadOptions {
    pub batch_size: usize,
    pub progress_step: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            progress_step: 100,
        }
    }
}

impl From<&Config> for LoadOptions {
    fn from(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            progress_step: config.progress_step.max(1),
        }
    }
}

/// Rows per multi-row insert, kept under the statement parameter limit
pub fn effective_batch_size(batch_size: usize, columns: usize, max_parameters: usize) -> usize {
    let by_parameters = max_parameters / columns.max(1);
    batch_size.min(by_parameters).max(1)
}

pub struct BulkLoader<'a, C: Connector + ?Sized> {
    connector: &'a C,
    options: LoadOptions,
}

impl<'a, C: Connector + ?Sized> BulkLoader<'a, C> {
    pub fn new(connector: &'a C, options: LoadOptions) -> Self {
        Self { connector, options }
    }

    /// Load `staged` into its destination table
    pub async fn load(&self, staged: &StagedTable) -> Result<LoadResult, LoadError> {
        let table = &staged.table;
        if staged.records.is_empty() {
            info!("→ No rows to insert into {}.", table);
            return Ok(LoadResult::empty(table));
        }

        let start = Instant::now();
        let schema = self.prepare_schema(staged).await?;

        // Destination ordinal order, restricted to what was staged. Each
        // destination column is paired with the staged name feeding it.
        let targets: Vec<(&ColumnSchema, &String)> = schema
            .values()
            .filter_map(|destination| {
                staged
                    .columns
                    .iter()
                    .find(|c| **c == destination.name)
                    .or_else(|| {
                        staged
                            .columns
                            .iter()
                            .find(|c| c.eq_ignore_ascii_case(&destination.name))
                    })
                    .map(|source| (destination, source))
            })
            .collect();
        let columns: Vec<String> = targets.iter().map(|(d, _)| d.name.clone()).collect();
        let rows: Vec<Vec<Value>> = staged
            .records
            .iter()
            .map(|record| {
                targets
                    .iter()
                    .map(|(destination, source)| {
                        negotiator::coerce(record.get(source), destination.category)
                    })
                    .collect()
            })
            .collect();

        let total = rows.len();
        let per_batch = effective_batch_size(
            self.options.batch_size,
            columns.len(),
            self.connector.max_parameters(),
        );
        info!("⏳ Inserting {} rows into {} (batch_size={})...", total, table, per_batch);

        let mut inserted = 0;
        let mut skipped = 0;
        let mut next_progress = self.options.progress_step;

        for (batch_index, (batch, records)) in rows
            .chunks(per_batch)
            .zip(staged.records.chunks(per_batch))
            .enumerate()
        {
            match self.connector.insert_batch(table, &columns, batch).await {
                Ok(()) => inserted += batch.len(),
                Err(InsertError::Connection(message)) => return Err(LoadError::Connection(message)),
                Err(e) => {
                    debug!(
                        "Batch {} into {} failed ({}); retrying {} rows individually",
                        batch_index + 1,
                        table,
                        e,
                        batch.len()
                    );
                    let outcomes = self.connector.insert_rows(table, &columns, batch).await?;
                    let mut outcomes = outcomes.into_iter();
                    for record in records {
                        match outcomes.next() {
                            Some(Ok(())) => inserted += 1,
                            Some(Err(InsertError::UniqueViolation(_))) => skipped += 1,
                            Some(Err(InsertError::Rejected(reason))) => {
                                warn!(
                                    "  ⚠ SQL error on single row in {} ({}): {}. Row skipped.",
                                    table,
                                    record.describe_key(&staged.natural_key),
                                    reason
                                );
                                skipped += 1;
                            }
                            Some(Err(InsertError::Connection(message))) => {
                                return Err(LoadError::Connection(message))
                            }
                            None => {
                                warn!(
                                    "  ⚠ No outcome reported for row in {} ({}). Row skipped.",
                                    table,
                                    record.describe_key(&staged.natural_key)
                                );
                                skipped += 1;
                            }
                        }
                    }
                }
            }

            let processed = inserted + skipped;
            if processed >= next_progress && processed < total {
                info!("  → {}/{} rows processed", processed, total);
                while next_progress <= processed {
                    next_progress += self.options.progress_step;
                }
            }
        }

        let result = LoadResult {
            table: table.to_string(),
            inserted,
            skipped,
            elapsed: start.elapsed(),
        };
        info!(
            "✔ Insert into {} complete: inserted={}, skipped={} ({:.2}s)",
            table,
            result.inserted,
            result.skipped,
            result.elapsed.as_secs_f64()
        );
        Ok(result)
    }

    /// Negotiate every staged column and apply the resulting changes.
    /// Returns the destination schema as it is after widening.
    async fn prepare_schema(&self, staged: &StagedTable) -> Result<TableSchema, LoadError> {
        let table = &staged.table;
        let schema = inspector::inspect(self.connector, table).await?;
        if schema.is_empty() {
            return Err(LoadError::MissingTable(table.to_string()));
        }

        let changes = negotiator::plan_changes(staged, &schema);
        if changes.is_empty() {
            return Ok(schema);
        }

        for change in &changes {
            info!("🔧 {}: {}", table, change);
            self.connector.apply_change(table, change).await?;
        }

        let schema = inspector::inspect(self.connector, table).await?;
        if let Some(missing) = staged
            .columns
            .iter()
            .find(|c| negotiator::find_column(&schema, c).is_none())
        {
            return Err(LoadError::Migration {
                table: table.to_string(),
                change: format!("add column {}", missing),
                message: "column still missing after schema changes".to_string(),
            });
        }
        Ok(schema)
    }
}

//! Append-only schema changes for SQLite destination tables.
//!
//! New columns are added with `ALTER TABLE .. ADD COLUMN`. SQLite cannot
//! change a column's declared type in place, so widening rebuilds the table:
//! a copy is created with the widened type (keeping primary key, NOT NULL,
//! defaults and UNIQUE constraints), rows are copied across, the original is
//! dropped, the copy renamed, and explicit indexes recreated. The whole
//! rebuild runs in one transaction.

use sqlx::sqlite::SqliteConnection;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::{column_list, declared_type, is_connection_error, qualified_name, quote_ident, schema_prefix};
use crate::error::LoadError;
use crate::models::{SchemaChange, StorageCategory, TableRef};

pub async fn apply_change(
    pool: &SqlitePool,
    table: &TableRef,
    change: &SchemaChange,
) -> Result<(), LoadError> {
    let fail = |message: String| LoadError::Migration {
        table: table.to_string(),
        change: change.to_string(),
        message,
    };
    let sql_fail = |e: sqlx::Error| {
        if is_connection_error(&e) {
            LoadError::Connection(e.to_string())
        } else {
            fail(e.to_string())
        }
    };

    match change {
        SchemaChange::AddColumn { column, category } => {
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                qualified_name(table),
                quote_ident(column),
                declared_type(*category)
            );
            sqlx::query(&sql).execute(pool).await.map_err(sql_fail)?;
            info!(" ➕ Added column {}.{} ({})", table, column, declared_type(*category));
        }
        SchemaChange::WidenToWideInteger { column } => {
            rebuild_with_type(pool, table, column, StorageCategory::WideInteger)
                .await
                .map_err(|e| match e {
                    RebuildError::Sql(e) => sql_fail(e),
                    RebuildError::Invalid(message) => fail(message),
                })?;
            info!(" ⚠ Overflow in {}.{}, converted to BIGINT", table, column);
        }
        SchemaChange::WidenToUnboundedText { column } => {
            rebuild_with_type(pool, table, column, StorageCategory::UnboundedText)
                .await
                .map_err(|e| match e {
                    RebuildError::Sql(e) => sql_fail(e),
                    RebuildError::Invalid(message) => fail(message),
                })?;
            info!(" ⚠ Expanded {}.{} to TEXT", table, column);
        }
    }
    Ok(())
}

enum RebuildError {
    Sql(sqlx::Error),
    Invalid(String),
}

impl From<sqlx::Error> for RebuildError {
    fn from(e: sqlx::Error) -> Self {
        RebuildError::Sql(e)
    }
}

#[derive(Debug)]
struct ColumnDef {
    name: String,
    declared_type: String,
    not_null: bool,
    default: Option<String>,
    /// 1-based position within the primary key, 0 when not part of it
    pk: i64,
}

async fn rebuild_with_type(
    pool: &SqlitePool,
    table: &TableRef,
    column: &str,
    target: StorageCategory,
) -> Result<(), RebuildError> {
    let mut tx = pool.begin().await?;

    let mut columns = read_columns(&mut tx, table).await?;
    let widened = columns
        .iter_mut()
        .find(|c| c.name == column)
        .ok_or_else(|| RebuildError::Invalid(format!("column {} not found", column)))?;
    widened.declared_type = declared_type(target);

    let prefix = schema_prefix(table);
    let create_sql: Option<String> = sqlx::query(&format!(
        "SELECT sql FROM {}sqlite_master WHERE type = 'table' AND name = ?",
        prefix
    ))
    .bind(&table.name)
    .fetch_optional(&mut *tx)
    .await?
    .map(|row| row.try_get("sql"))
    .transpose()?;
    let autoincrement = create_sql
        .map(|sql| sql.to_ascii_uppercase().contains("AUTOINCREMENT"))
        .unwrap_or(false);

    let unique_constraints = read_unique_constraints(&mut tx, table).await?;
    let explicit_indexes: Vec<String> = sqlx::query(&format!(
        "SELECT sql FROM {}sqlite_master WHERE type = 'index' AND tbl_name = ? AND sql IS NOT NULL",
        prefix
    ))
    .bind(&table.name)
    .fetch_all(&mut *tx)
    .await?
    .iter()
    .map(|row| row.try_get("sql"))
    .collect::<Result<_, _>>()?;

    let staging_name = format!("{}__widen", table.name);
    let staging = TableRef {
        schema: table.schema.clone(),
        name: staging_name.clone(),
    };
    let create = create_table_sql(&staging, &columns, &unique_constraints, autoincrement);
    debug!("Rebuilding {}: {}", table, create);

    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    let names = column_list(&names);

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", qualified_name(&staging)))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&create).execute(&mut *tx).await?;
    sqlx::query(&format!(
        "INSERT INTO {} ({}) SELECT {} FROM {}",
        qualified_name(&staging),
        names,
        names,
        qualified_name(table)
    ))
    .execute(&mut *tx)
    .await?;
    sqlx::query(&format!("DROP TABLE {}", qualified_name(table)))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!(
        "ALTER TABLE {} RENAME TO {}",
        qualified_name(&staging),
        quote_ident(&table.name)
    ))
    .execute(&mut *tx)
    .await?;
    for index_sql in &explicit_indexes {
        sqlx::query(index_sql).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn read_columns(
    conn: &mut SqliteConnection,
    table: &TableRef,
) -> Result<Vec<ColumnDef>, RebuildError> {
    let rows = sqlx::query(&format!(
        "PRAGMA {}table_info({})",
        schema_prefix(table),
        quote_ident(&table.name)
    ))
    .fetch_all(&mut *conn)
    .await?;

    if rows.is_empty() {
        return Err(RebuildError::Invalid(format!("table {} not found", table)));
    }

    rows.iter()
        .map(|row| {
            Ok(ColumnDef {
                name: row.try_get("name")?,
                declared_type: row.try_get("type")?,
                not_null: row.try_get::<i64, _>("notnull")? != 0,
                default: row.try_get("dflt_value")?,
                pk: row.try_get("pk")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(RebuildError::from)
}

/// Column lists of every UNIQUE constraint declared on the table
async fn read_unique_constraints(
    conn: &mut SqliteConnection,
    table: &TableRef,
) -> Result<Vec<Vec<String>>, RebuildError> {
    let prefix = schema_prefix(table);
    let indexes = sqlx::query(&format!(
        "PRAGMA {}index_list({})",
        prefix,
        quote_ident(&table.name)
    ))
    .fetch_all(&mut *conn)
    .await?;

    let mut constraints = Vec::new();
    for index in indexes {
        let origin: String = index.try_get("origin")?;
        if origin != "u" {
            continue;
        }
        let name: String = index.try_get("name")?;
        let mut members = sqlx::query(&format!(
            "PRAGMA {}index_info({})",
            prefix,
            quote_ident(&name)
        ))
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|row| Ok((row.try_get::<i64, _>("seqno")?, row.try_get::<String, _>("name")?)))
        .collect::<Result<Vec<_>, sqlx::Error>>()?;
        members.sort_by_key(|(seqno, _)| *seqno);
        constraints.push(members.into_iter().map(|(_, name)| name).collect());
    }
    Ok(constraints)
}

fn create_table_sql(
    table: &TableRef,
    columns: &[ColumnDef],
    unique_constraints: &[Vec<String>],
    autoincrement: bool,
) -> String {
    let mut pk_columns: Vec<&ColumnDef> = columns.iter().filter(|c| c.pk > 0).collect();
    pk_columns.sort_by_key(|c| c.pk);
    let inline_rowid_pk = pk_columns.len() == 1
        && pk_columns[0].declared_type.eq_ignore_ascii_case("INTEGER");

    let mut parts: Vec<String> = columns
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quote_ident(&c.name), c.declared_type);
            if inline_rowid_pk && c.pk > 0 {
                def.push_str(" PRIMARY KEY");
                if autoincrement {
                    def.push_str(" AUTOINCREMENT");
                }
            }
            if c.not_null {
                def.push_str(" NOT NULL");
            }
            if let Some(default) = &c.default {
                def.push_str(&format!(" DEFAULT ({})", default));
            }
            def
        })
        .collect();

    if !inline_rowid_pk && !pk_columns.is_empty() {
        let names: Vec<String> = pk_columns.iter().map(|c| c.name.clone()).collect();
        parts.push(format!("PRIMARY KEY ({})", column_list(&names)));
    }
    for unique in unique_constraints {
        parts.push(format!("UNIQUE ({})", column_list(unique)));
    }

    format!("CREATE TABLE {} ({})", qualified_name(table), parts.join(", "))
}

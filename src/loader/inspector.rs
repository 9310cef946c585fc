use crate::error::LoadError;
use crate::models::{CatalogColumn, ColumnSchema, StorageCategory, TableRef, TableSchema};

use super::Connector;

/// Current schema of `table`, in ordinal order. A missing table yields an
/// empty mapping.
pub async fn inspect<C>(connector: &C, table: &TableRef) -> Result<TableSchema, LoadError>
where
    C: Connector + ?Sized,
{
    let columns = connector.catalog_columns(table).await?;
    Ok(columns
        .into_iter()
        .map(|column| (column.name.clone(), describe(column)))
        .collect())
}

fn describe(column: CatalogColumn) -> ColumnSchema {
    let category = category_for_declared_type(&column.declared_type);
    let max_length = match category {
        StorageCategory::BoundedText(n) => Some(n),
        _ => None,
    };
    ColumnSchema {
        name: column.name,
        category,
        max_length,
        position: column.position,
        declared_type: column.declared_type,
    }
}

/// Map a declared column type onto a storage category.
///
/// SQLite keeps whatever type name the DDL used, so this accepts the
/// SQL Server flavoured names (`NVARCHAR(MAX)`, `BIGINT`) as well as the
/// SQLite ones. `INTEGER` is 64-bit in SQLite and counts as wide.
pub fn category_for_declared_type(declared: &str) -> StorageCategory {
    let upper = declared.trim().to_ascii_uppercase();
    let (base, arg) = match upper.find('(') {
        Some(open) => (
            upper[..open].trim().to_string(),
            upper[open + 1..].trim_end_matches(')').trim().to_string(),
        ),
        None => (upper.clone(), String::new()),
    };

    match base.as_str() {
        "INT" | "SMALLINT" | "TINYINT" | "MEDIUMINT" | "INT2" | "INT4" => {
            StorageCategory::StandardInteger
        }
        "INTEGER" | "BIGINT" | "INT8" | "UNSIGNED BIG INT" => StorageCategory::WideInteger,
        "REAL" | "FLOAT" | "DOUBLE" | "DOUBLE PRECISION" | "NUMERIC" | "DECIMAL" => {
            StorageCategory::Float
        }
        "DATE" => StorageCategory::Date,
        "DATETIME" | "DATETIME2" | "TIMESTAMP" => StorageCategory::Timestamp,
        "VARCHAR" | "NVARCHAR" | "CHAR" | "NCHAR" | "CHARACTER" | "VARYING CHARACTER"
        | "NATIVE CHARACTER" => match arg.parse::<i64>() {
            Ok(n) if n > 0 => StorageCategory::BoundedText(n as usize),
            // MAX, -1 or no length at all
            _ => StorageCategory::UnboundedText,
        },
        _ => StorageCategory::UnboundedText,
    }
}

//! Type negotiation between staged values and the destination schema.
//!
//! Every staged column is profiled once per load. The profile decides the
//! safest storage category for the values, and is compared against the
//! column's current schema to produce at most one append-only change:
//! add the column, widen a standard integer to a wide integer, or widen
//! bounded text to unbounded text. Nothing is ever narrowed.

use tracing::debug;

use crate::models::{ColumnSchema, SchemaChange, StagedTable, StorageCategory, TableSchema, Value};
use crate::utils::{parse_date_only, parse_timestamp};

/// What a column of staged values looks like once nulls are dropped
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InferredKind {
    /// Only nulls were staged
    Empty,
    Integer { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Text,
    Date,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProfile {
    pub kind: InferredKind,
    pub non_null: usize,
    /// Longest rendered value, in characters
    pub max_text_len: usize,
}

impl ColumnProfile {
    /// Storage category the values need on their own
    pub fn category(&self) -> StorageCategory {
        match self.kind {
            InferredKind::Empty | InferredKind::Text => StorageCategory::UnboundedText,
            InferredKind::Integer { min, max } => {
                if min >= i32::MIN as i64 && max <= i32::MAX as i64 {
                    StorageCategory::StandardInteger
                } else {
                    StorageCategory::WideInteger
                }
            }
            InferredKind::Float { .. } => StorageCategory::Float,
            InferredKind::Date => StorageCategory::Date,
            InferredKind::Timestamp => StorageCategory::Timestamp,
        }
    }

    /// Whether any value lies outside the 32-bit integer range, fractional
    /// values included
    pub fn exceeds_standard_integer(&self) -> bool {
        match self.kind {
            InferredKind::Integer { min, max } => min < i32::MIN as i64 || max > i32::MAX as i64,
            InferredKind::Float { min, max } => min < i32::MIN as f64 || max > i32::MAX as f64,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Numeric {
    Int(i64),
    Real(f64),
}

fn as_numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Integer(i) => Some(Numeric::Int(*i)),
        Value::Float(f) if f.is_finite() => Some(Numeric::Real(*f)),
        Value::Text(s) => parse_numeric(s),
        _ => None,
    }
}

fn parse_numeric(raw: &str) -> Option<Numeric> {
    let s = raw.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Numeric::Int(i));
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Numeric::Real)
}

/// Integral value that fits i64, if any
fn integral(n: Numeric) -> Option<i64> {
    match n {
        Numeric::Int(i) => Some(i),
        // 2^63 is exactly representable; anything at or above it overflows i64
        Numeric::Real(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < 9_223_372_036_854_775_808.0 => {
            Some(f as i64)
        }
        Numeric::Real(_) => None,
    }
}

fn is_non_finite(value: &Value) -> bool {
    matches!(value, Value::Float(f) if !f.is_finite())
}

/// Profile one column of staged values
pub fn profile<'a, I>(values: I) -> ColumnProfile
where
    I: IntoIterator<Item = &'a Value>,
{
    // NaN and infinities carry no value; they are stored as null
    let present: Vec<&Value> = values
        .into_iter()
        .filter(|v| !v.is_null() && !is_non_finite(v))
        .collect();
    let max_text_len = present
        .iter()
        .filter_map(|v| v.render())
        .map(|s| s.chars().count())
        .max()
        .unwrap_or(0);

    let kind = infer_kind(&present);
    ColumnProfile {
        kind,
        non_null: present.len(),
        max_text_len,
    }
}

fn infer_kind(present: &[&Value]) -> InferredKind {
    if present.is_empty() {
        return InferredKind::Empty;
    }

    if present.iter().all(|v| matches!(v, Value::Date(_))) {
        return InferredKind::Date;
    }
    if present
        .iter()
        .all(|v| matches!(v, Value::Date(_) | Value::Timestamp(_)))
    {
        return InferredKind::Timestamp;
    }

    let mut numbers = Vec::with_capacity(present.len());
    for value in present {
        match as_numeric(value) {
            Some(n) => numbers.push(n),
            None => return InferredKind::Text,
        }
    }

    let mut low = f64::INFINITY;
    let mut high = f64::NEG_INFINITY;
    let mut integers = Some((i64::MAX, i64::MIN));
    for n in numbers {
        let f = match n {
            Numeric::Int(i) => i as f64,
            Numeric::Real(f) => f,
        };
        low = low.min(f);
        high = high.max(f);
        integers = match (integers, integral(n)) {
            (Some((min, max)), Some(i)) => Some((min.min(i), max.max(i))),
            _ => None,
        };
    }
    match integers {
        Some((min, max)) => InferredKind::Integer { min, max },
        None => InferredKind::Float {
            min: low,
            max: high,
        },
    }
}

/// The destination column a staged column name refers to. SQLite column
/// names are case-insensitive; an exact match wins.
pub fn find_column<'a>(schema: &'a TableSchema, column: &str) -> Option<&'a ColumnSchema> {
    schema.get(column).or_else(|| {
        schema
            .values()
            .find(|existing| existing.name.eq_ignore_ascii_case(column))
    })
}

/// Decide whether `column` needs a schema change before insertion
pub fn negotiate(
    column: &str,
    profile: &ColumnProfile,
    current: Option<&ColumnSchema>,
) -> Option<SchemaChange> {
    let current = match current {
        None => {
            return Some(SchemaChange::AddColumn {
                column: column.to_string(),
                category: profile.category(),
            })
        }
        Some(current) => current,
    };

    match current.category {
        StorageCategory::StandardInteger if profile.exceeds_standard_integer() =>
        {
            Some(SchemaChange::WidenToWideInteger {
                column: column.to_string(),
            })
        }
        StorageCategory::BoundedText(limit) if profile.max_text_len > limit => {
            Some(SchemaChange::WidenToUnboundedText {
                column: column.to_string(),
            })
        }
        _ => None,
    }
}

/// Changes required before `staged` can be inserted into a table with `schema`
pub fn plan_changes(staged: &StagedTable, schema: &TableSchema) -> Vec<SchemaChange> {
    staged
        .columns
        .iter()
        .filter_map(|column| {
            let profile = profile(staged.records.iter().map(|r| r.get(column)));
            debug!(
                "{}.{}: {:?} ({} non-null, max len {})",
                staged.table, column, profile.kind, profile.non_null, profile.max_text_len
            );
            negotiate(column, &profile, find_column(schema, column))
        })
        .collect()
}

/// Coerce a staged value towards the destination column's category.
/// Values that cannot be coerced are returned unchanged; the row-level
/// fallback deals with them.
pub fn coerce(value: &Value, category: StorageCategory) -> Value {
    match (category, value) {
        (_, Value::Null) => Value::Null,
        (_, Value::Float(f)) if !f.is_finite() => Value::Null,
        (StorageCategory::StandardInteger | StorageCategory::WideInteger, v) => {
            match as_numeric(v).and_then(integral) {
                Some(i) => Value::Integer(i),
                None => v.clone(),
            }
        }
        (StorageCategory::Float, Value::Text(s)) => match parse_numeric(s) {
            Some(Numeric::Int(i)) => Value::Integer(i),
            Some(Numeric::Real(f)) => Value::Float(f),
            None => value.clone(),
        },
        (StorageCategory::Date, Value::Text(s)) => parse_date_only(s)
            .map(Value::Date)
            .unwrap_or_else(|| value.clone()),
        (StorageCategory::Date, Value::Timestamp(ts)) => Value::Date(ts.date()),
        (StorageCategory::Timestamp, Value::Text(s)) => parse_timestamp(s)
            .map(Value::Timestamp)
            .unwrap_or_else(|| value.clone()),
        (StorageCategory::Timestamp, Value::Date(d)) => d
            .and_hms_opt(0, 0, 0)
            .map(Value::Timestamp)
            .unwrap_or_else(|| value.clone()),
        _ => value.clone(),
    }
}

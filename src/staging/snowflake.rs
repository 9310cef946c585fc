//! Snowflake chart scores (value, future, past, health, dividend).

use super::{field, Field, FieldKind, MappedNormalizer};

const FIELDS: &[Field] = &[
    field("tickers", "tickers", FieldKind::Text),
    field("date", "date", FieldKind::Date),
    field("canonical_url", "canonical_url", FieldKind::Text),
    field("value", "value", FieldKind::Integer),
    field("future", "future", FieldKind::Integer),
    field("past", "past", FieldKind::Integer),
    field("health", "health", FieldKind::Integer),
    field("dividend", "dividend", FieldKind::Integer),
];

/// Rows with an unparsable date have no natural key and are dropped
pub fn normalizer() -> MappedNormalizer {
    MappedNormalizer {
        source: "snowflake",
        table: "snowflake_scores",
        natural_key: &["tickers", "date"],
        fields: FIELDS,
    }
}

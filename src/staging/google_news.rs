//! Google News headlines with FinBERT sentiment scores.

use super::{field, Field, FieldKind, MappedNormalizer, RawRecord, StagingNormalizer};
use crate::models::{StagedRecord, TableRef, Value};

const FIELDS: &[Field] = &[
    field("query", "query_text", FieldKind::Text),
    field("title", "title_text", FieldKind::Text),
    field("link", "link_url", FieldKind::Text),
    field("published", "published_at", FieldKind::Timestamp),
    field("source", "source_name", FieldKind::Text),
    field("sentiment_label", "sentiment_label", FieldKind::Text),
    field("sentiment_negative", "sentiment_negative", FieldKind::Float),
    field("sentiment_neutral", "sentiment_neutral", FieldKind::Float),
    field("sentiment_positive", "sentiment_positive", FieldKind::Float),
];

#[derive(Debug, Clone)]
pub struct GoogleNewsNormalizer {
    mapping: MappedNormalizer,
}

impl Default for GoogleNewsNormalizer {
    fn default() -> Self {
        Self {
            mapping: MappedNormalizer {
                source: "google news",
                table: "google_news",
                natural_key: &["title_text", "published_at"],
                fields: FIELDS,
            },
        }
    }
}

/// Undo URL encoding left in search queries ("apple+stock", "apple%20stock")
/// and collapse whitespace
pub fn clean_query(raw: &str) -> String {
    raw.replace('+', " ")
        .replace("%20", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl StagingNormalizer for GoogleNewsNormalizer {
    fn source(&self) -> &'static str {
        self.mapping.source
    }

    fn table(&self) -> TableRef {
        self.mapping.table()
    }

    fn natural_key(&self) -> &'static [&'static str] {
        self.mapping.natural_key
    }

    fn columns(&self) -> Vec<String> {
        self.mapping.columns()
    }

    fn stage(&self, raw: &RawRecord) -> Option<StagedRecord> {
        let mut record = self.mapping.stage_fields(raw);
        let cleaned = match record.get("query_text") {
            Value::Text(query) => Some(clean_query(query)),
            _ => None,
        };
        if let Some(query) = cleaned {
            record.set("query_text", Value::text(&query));
        }
        Some(record)
    }
}

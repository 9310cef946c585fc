//! Simply Wall St company facts. The scraper emits a wide, evolving set of
//! columns, so the destination columns are whatever the file carries:
//! headers become snake_case identifiers and the loader adds or widens
//! columns as needed.

use super::{RawRecord, StagingNormalizer};
use crate::models::{StagedRecord, TableRef, Value};
use crate::utils::{parse_date_only, to_snake_case};

/// Identity column owned by the database
const IDENTITY_COLUMN: &str = "facts_id";

/// Cell spellings the cleaning stage writes for a missing value
const NULL_MARKERS: &[&str] = &["NULL", "NaN", "nan", "<NA>", "None"];

pub struct FactsNormalizer;

fn cell_value(raw: &str) -> Value {
    let cell = raw.trim();
    if NULL_MARKERS.contains(&cell) {
        Value::Null
    } else {
        Value::text(cell)
    }
}

impl StagingNormalizer for FactsNormalizer {
    fn source(&self) -> &'static str {
        "facts"
    }

    fn table(&self) -> TableRef {
        TableRef::new("simply_wallstreet_facts")
    }

    fn natural_key(&self) -> &'static [&'static str] {
        &["ticker", "html_creation_date"]
    }

    fn columns(&self) -> Vec<String> {
        Vec::new()
    }

    fn stage(&self, raw: &RawRecord) -> Option<StagedRecord> {
        let mut record = StagedRecord::new();
        for (header, cell) in raw {
            let column = to_snake_case(header);
            if column.is_empty() || column == IDENTITY_COLUMN || record.contains(&column) {
                continue;
            }
            let value = match cell_value(cell) {
                Value::Text(text) if column == "html_creation_date" => parse_date_only(&text).into(),
                other => other,
            };
            record.set(&column, value);
        }
        Some(record)
    }
}

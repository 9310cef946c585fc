//! Per-source staging: raw scraped rows in, typed and deduplicated
//! records out, keyed by destination column names.

pub mod company_info;
pub mod facts;
pub mod fear_greed;
pub mod google_news;
pub mod insider;
pub mod ownership;
pub mod snowflake;

use anyhow::{Context, Result};
use clap::ValueEnum;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::models::{StagedRecord, StagedTable, TableRef, Value};
use crate::utils::{parse_date_only, parse_timestamp};

/// One raw source row: header -> cell text
pub type RawRecord = IndexMap<String, String>;

/// Row accounting for one staging pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingReport {
    pub raw: usize,
    /// Rows rejected by the source rules or lacking a usable natural key
    pub invalid: usize,
    /// Later occurrences of an already staged natural key
    pub duplicates: usize,
}

impl StagingReport {
    pub fn staged(&self) -> usize {
        self.raw - self.invalid - self.duplicates
    }
}

/// How a raw cell is typed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Date,
    Timestamp,
}

impl FieldKind {
    /// Type a raw cell. Blank cells are null, unparsable dates are null,
    /// unparsable numbers are kept as text for the loader to deal with.
    pub fn parse(self, raw: &str) -> Value {
        let cell = raw.trim();
        if cell.is_empty() {
            return Value::Null;
        }
        match self {
            FieldKind::Text => Value::text(cell),
            FieldKind::Integer => parse_integer(cell),
            FieldKind::Float => match cell.parse::<f64>() {
                Ok(f) if f.is_finite() => Value::Float(f),
                _ => Value::text(cell),
            },
            FieldKind::Date => parse_date_only(cell).into(),
            FieldKind::Timestamp => parse_timestamp(cell).into(),
        }
    }
}

fn parse_integer(cell: &str) -> Value {
    let digits = cell.replace(',', "");
    if let Ok(i) = digits.parse::<i64>() {
        return Value::Integer(i);
    }
    match digits.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e18 => Value::Integer(f as i64),
        Ok(f) if f.is_finite() => Value::Float(f),
        _ => Value::text(cell),
    }
}

/// A destination column fed from a source header
#[derive(Debug, Clone, Copy)]
pub struct Field {
    /// Header as written by the scraper
    pub source: &'static str,
    /// Destination column
    pub column: &'static str,
    pub kind: FieldKind,
}

pub const fn field(source: &'static str, column: &'static str, kind: FieldKind) -> Field {
    Field {
        source,
        column,
        kind,
    }
}

impl Field {
    /// Read this field from a raw row, accepting either the scraper's header
    /// or the destination name
    pub fn read(&self, raw: &RawRecord) -> Value {
        raw.get(self.source)
            .or_else(|| raw.get(self.column))
            .map(|cell| self.kind.parse(cell))
            .unwrap_or(Value::Null)
    }
}

/// Cleaning rules for one source feeding one destination table
pub trait StagingNormalizer: Send + Sync {
    /// Short source name for log lines
    fn source(&self) -> &'static str;

    fn table(&self) -> TableRef;

    fn natural_key(&self) -> &'static [&'static str];

    /// Destination columns in insert order. Empty when the columns are
    /// discovered from the data.
    fn columns(&self) -> Vec<String>;

    /// Rename and type one raw row. None drops the row as invalid.
    fn stage(&self, raw: &RawRecord) -> Option<StagedRecord>;

    /// Stage every raw row: drop invalid rows and rows without a usable
    /// natural key, keep the first occurrence of each natural key, and give
    /// every record every destination column (missing ones as null).
    fn normalize(&self, raw: &[RawRecord]) -> (StagedTable, StagingReport) {
        let key: Vec<String> = self.natural_key().iter().map(|c| c.to_string()).collect();
        let mut report = StagingReport {
            raw: raw.len(),
            ..Default::default()
        };
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut kept = Vec::with_capacity(raw.len());

        for row in raw {
            let record = match self.stage(row) {
                Some(record) => record,
                None => {
                    report.invalid += 1;
                    continue;
                }
            };
            match record.natural_key(&key) {
                None => {
                    debug!("{}: dropping row without natural key ({})", self.source(), record.describe_key(&key));
                    report.invalid += 1;
                }
                Some(identity) => {
                    if seen.insert(identity) {
                        kept.push(record);
                    } else {
                        report.duplicates += 1;
                    }
                }
            }
        }

        let mut columns = self.columns();
        if columns.is_empty() {
            let mut discovered: IndexSet<String> = key.iter().cloned().collect();
            for record in &kept {
                discovered.extend(record.columns().map(str::to_string));
            }
            columns = discovered.into_iter().collect();
        }

        let records: Vec<StagedRecord> = kept
            .into_iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| (column.clone(), record.get(column).clone()))
                    .collect::<StagedRecord>()
            })
            .collect();

        info!(
            "🧹 {}: {} raw rows → {} staged ({} invalid, {} duplicates)",
            self.source(),
            report.raw,
            report.staged(),
            report.invalid,
            report.duplicates
        );

        let table = StagedTable {
            table: self.table(),
            columns,
            natural_key: key,
            records,
        };
        (table, report)
    }
}

/// Normalizer driven entirely by a field mapping
#[derive(Debug, Clone)]
pub struct MappedNormalizer {
    pub source: &'static str,
    pub table: &'static str,
    pub natural_key: &'static [&'static str],
    pub fields: &'static [Field],
}

impl MappedNormalizer {
    pub fn stage_fields(&self, raw: &RawRecord) -> StagedRecord {
        self.fields
            .iter()
            .map(|f| (f.column.to_string(), f.read(raw)))
            .collect()
    }
}

impl StagingNormalizer for MappedNormalizer {
    fn source(&self) -> &'static str {
        self.source
    }

    fn table(&self) -> TableRef {
        TableRef::new(self.table)
    }

    fn natural_key(&self) -> &'static [&'static str] {
        self.natural_key
    }

    fn columns(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.column.to_string()).collect()
    }

    fn stage(&self, raw: &RawRecord) -> Option<StagedRecord> {
        Some(self.stage_fields(raw))
    }
}

/// Read a headed CSV file into raw rows. Short rows are padded with blanks.
pub fn read_csv(path: &Path) -> Result<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .clone();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("{}: bad CSV row {}", path.display(), line + 2))?;
        let row: RawRecord = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.to_string(), record.get(i).unwrap_or("").to_string()))
            .collect();
        rows.push(row);
    }

    info!("📄 Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Known staging sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Source {
    Ownership,
    Insider,
    CompanyInfo,
    Snowflake,
    GoogleNews,
    FearGreed,
    Facts,
}

impl Source {
    pub fn all() -> &'static [Source] {
        &[
            Source::Ownership,
            Source::Insider,
            Source::CompanyInfo,
            Source::Snowflake,
            Source::GoogleNews,
            Source::FearGreed,
            Source::Facts,
        ]
    }

    pub fn normalizer(self) -> Box<dyn StagingNormalizer> {
        match self {
            Source::Ownership => Box::new(ownership::normalizer()),
            Source::Insider => Box::new(insider::normalizer()),
            Source::CompanyInfo => Box::new(company_info::normalizer()),
            Source::Snowflake => Box::new(snowflake::normalizer()),
            Source::GoogleNews => Box::new(google_news::GoogleNewsNormalizer::default()),
            Source::FearGreed => Box::new(fear_greed::FearGreedNormalizer),
            Source::Facts => Box::new(facts::FactsNormalizer),
        }
    }

    /// Read raw rows for this source from a file: the fear & greed payload
    /// is JSON, everything else is CSV
    pub fn read_raw(self, path: &Path) -> Result<Vec<RawRecord>> {
        match self {
            Source::FearGreed => fear_greed::read_payload_file(path),
            _ => read_csv(path),
        }
    }

    /// Read and stage a source file in one go
    pub fn stage_file(self, path: &Path) -> Result<(StagedTable, StagingReport)> {
        let raw = self.read_raw(path)?;
        Ok(self.normalizer().normalize(&raw))
    }
}

#[cfg(test)]
pub(crate) fn raw(pairs: &[(&str, &str)]) -> RawRecord {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

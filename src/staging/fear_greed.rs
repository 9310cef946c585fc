//! CNN Fear & Greed index history: epoch-millisecond readings to one
//! value per calendar day.

use anyhow::{Context, Result};
use std::path::Path;

use super::{RawRecord, StagingNormalizer};
use crate::api::fear_greed_client::{parse_payload, FearGreedPoint};
use crate::models::{StagedRecord, TableRef, Value};
use crate::utils::date_from_epoch_millis;

pub struct FearGreedNormalizer;

/// Raw rows (`x` = epoch millis, `y` = index value) in chronological order
pub fn raw_records(points: &[FearGreedPoint]) -> Vec<RawRecord> {
    let mut points = points.to_vec();
    points.sort_by(|a, b| a.x.total_cmp(&b.x));
    points
        .iter()
        .map(|p| {
            let mut row = RawRecord::new();
            row.insert("x".to_string(), p.x.to_string());
            row.insert("y".to_string(), p.y.to_string());
            row
        })
        .collect()
}

/// Read a saved graphdata payload from disk
pub fn read_payload_file(path: &Path) -> Result<Vec<RawRecord>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let points = parse_payload(&body)?;
    Ok(raw_records(&points))
}

impl StagingNormalizer for FearGreedNormalizer {
    fn source(&self) -> &'static str {
        "fear & greed"
    }

    fn table(&self) -> TableRef {
        TableRef::new("fear_and_greed_index")
    }

    fn natural_key(&self) -> &'static [&'static str] {
        &["date"]
    }

    fn columns(&self) -> Vec<String> {
        vec!["date".to_string(), "fear_and_greed".to_string()]
    }

    fn stage(&self, raw: &RawRecord) -> Option<StagedRecord> {
        let millis = raw.get("x")?.trim().parse::<f64>().ok()?;
        let score = raw
            .get("y")?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|y| y.is_finite())?;
        Some(
            StagedRecord::new()
                .with("date", date_from_epoch_millis(millis))
                .with("fear_and_greed", Value::Float(score)),
        )
    }
}

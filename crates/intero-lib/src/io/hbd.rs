use super::{locate_column, parse_cell, require_column};
use crate::error::{PipelineError, Result};
use crate::sensitivity::{HbdTrial, SyncResponse};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const RESTING_RRI_COLUMN: &str = "resting_RRI";
pub const DELAY_COLUMN: &str = "delay";
pub const RESPONSE_COLUMN: &str = "response";

/// Heartbeat-discrimination export for one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct HbdRecord {
    /// First positive `resting_RRI` value (seconds).
    pub resting_rri_s: Option<f64>,
    pub trials: Vec<HbdTrial>,
}

/// Parse an HBD CSV. Any response cell other than exactly `Sync` or `Async`,
/// blank cells included, rejects the whole file.
pub fn read_hbd<R: Read>(source: R) -> Result<HbdRecord> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source);
    let headers = reader.headers()?.clone();
    let delay_idx = require_column(&headers, DELAY_COLUMN)?;
    let response_idx = require_column(&headers, RESPONSE_COLUMN)?;
    let rri_idx = locate_column(&headers, RESTING_RRI_COLUMN);

    let mut first_rri = None;
    let mut trials = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        if first_rri.is_none() {
            if let Some(idx) = rri_idx {
                first_rri = parse_cell(&record, idx, RESTING_RRI_COLUMN, row)?;
            }
        }
        let delay_ms = parse_cell(&record, delay_idx, DELAY_COLUMN, row)?.unwrap_or(f64::NAN);
        let label = record.get(response_idx).unwrap_or("");
        let response =
            SyncResponse::parse(label).ok_or_else(|| PipelineError::InvalidResponse {
                row,
                value: label.to_string(),
            })?;
        trials.push(HbdTrial {
            delay_ms,
            response: Some(response),
        });
    }

    Ok(HbdRecord {
        resting_rri_s: first_rri.filter(|rri| rri.is_finite() && *rri > 0.0),
        trials,
    })
}

pub fn read_hbd_csv(path: &Path) -> Result<HbdRecord> {
    read_hbd(File::open(path)?)
}

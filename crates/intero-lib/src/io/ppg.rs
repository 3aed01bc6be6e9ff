use super::{locate_column, parse_cell, require_column};
use crate::config::DEFAULT_SAMPLE_RATE_HZ;
use crate::error::{PipelineError, Result};
use crate::signal::{StampedSeries, TimeSeries};
use csv::ReaderBuilder;
use log::debug;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const PPG_COLUMN: &str = "PPG";
pub const TIME_COLUMN: &str = "time";

/// One PPG export: amplitudes plus optional timestamps (seconds).
#[derive(Debug, Clone, PartialEq)]
pub struct PpgRecording {
    pub time: Option<Vec<f64>>,
    pub ppg: Vec<f64>,
}

impl PpgRecording {
    pub fn len(&self) -> usize {
        self.ppg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ppg.is_empty()
    }

    /// Median of the positive timestamp steps, as a rate.
    pub fn infer_sample_rate(&self) -> Option<f64> {
        let time = self.time.as_ref()?;
        let mut steps: Vec<f64> = time
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|dt| dt.is_finite() && *dt > 0.0)
            .collect();
        if steps.is_empty() {
            return None;
        }
        steps.sort_by(f64::total_cmp);
        let mid = steps.len() / 2;
        let step = if steps.len() % 2 == 1 {
            steps[mid]
        } else {
            0.5 * (steps[mid - 1] + steps[mid])
        };
        Some(1.0 / step)
    }

    /// Configured rate, else inferred from `time`, else the resampled default.
    pub fn sample_rate(&self, configured: Option<f64>) -> f64 {
        configured
            .or_else(|| self.infer_sample_rate())
            .unwrap_or_else(|| {
                debug!(
                    "no usable time column; assuming {} Hz",
                    DEFAULT_SAMPLE_RATE_HZ
                );
                DEFAULT_SAMPLE_RATE_HZ
            })
    }

    pub fn to_time_series(&self, configured_rate: Option<f64>) -> TimeSeries {
        TimeSeries::new(self.sample_rate(configured_rate), self.ppg.clone())
    }

    /// Samples keyed by timestamp; requires the `time` column.
    pub fn stamped(&self) -> Result<StampedSeries> {
        let time = self
            .time
            .as_ref()
            .ok_or_else(|| PipelineError::schema(TIME_COLUMN))?;
        Ok(StampedSeries::from_pairs(
            time.iter().copied().zip(self.ppg.iter().copied()).collect(),
        ))
    }
}

/// Parse a PPG CSV from any reader.
pub fn read_ppg<R: Read>(source: R) -> Result<PpgRecording> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source);
    let headers = reader.headers()?.clone();
    let ppg_idx = require_column(&headers, PPG_COLUMN)?;
    let time_idx = locate_column(&headers, TIME_COLUMN);

    let mut time = time_idx.map(|_| Vec::new());
    let mut ppg = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let value = parse_cell(&record, ppg_idx, PPG_COLUMN, row)?.ok_or_else(|| {
            PipelineError::InvalidValue {
                column: PPG_COLUMN.into(),
                row,
                value: String::new(),
            }
        })?;
        ppg.push(value);
        if let (Some(idx), Some(times)) = (time_idx, time.as_mut()) {
            let t = parse_cell(&record, idx, TIME_COLUMN, row)?.ok_or_else(|| {
                PipelineError::InvalidValue {
                    column: TIME_COLUMN.into(),
                    row,
                    value: String::new(),
                }
            })?;
            times.push(t);
        }
    }
    Ok(PpgRecording { time, ppg })
}

pub fn read_ppg_csv(path: &Path) -> Result<PpgRecording> {
    read_ppg(File::open(path)?)
}

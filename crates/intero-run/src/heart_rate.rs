use crate::{file_label, list_csv_files, BatchContext, UnitReport};
use anyhow::{Context, Result};
use csv::WriterBuilder;
use intero_lib::io::naming::{RecordingIndex, RecordingKey};
use intero_lib::io::ppg::read_ppg_csv;
use intero_lib::{run_heart_rate_pipeline, HeartRatePipelineResult, PipelineConfig};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateRow {
    pub participant_id: String,
    pub session_id: u32,
    pub peak_index: usize,
    pub hr_bpm: f64,
}

/// Full heart-rate pipeline for one PPG export.
pub fn process_ppg_file(
    path: &Path,
    cfg: &PipelineConfig,
) -> intero_lib::Result<HeartRatePipelineResult> {
    let recording = read_ppg_csv(path)?;
    let series = recording.to_time_series(cfg.sample_rate_hz);
    debug!(
        "{}: {} samples at {} Hz",
        file_label(path),
        series.len(),
        series.fs
    );
    run_heart_rate_pipeline(&series, &cfg.filter, &cfg.peaks, &cfg.heart_rate)
}

fn heart_rate_unit(key: &RecordingKey, path: &Path, cfg: &PipelineConfig) -> UnitReport<HeartRateRow> {
    let source = file_label(path);
    match process_ppg_file(path, cfg) {
        Ok(result) => {
            let mut report = UnitReport::new(source);
            report.rows = result
                .heart_rate
                .iter()
                .map(|sample| HeartRateRow {
                    participant_id: key.participant_id.clone(),
                    session_id: key.session,
                    peak_index: sample.peak_index,
                    hr_bpm: sample.bpm,
                })
                .collect();
            report
        }
        Err(err) => UnitReport::failed(source, err),
    }
}

/// Heart-rate table for every `sub-<id>_sess<n>_PPG.csv` in `input_dir`.
///
/// Rows are ordered by participant, session, then peak.
pub fn run_heart_rate_batch(
    input_dir: &Path,
    cfg: &PipelineConfig,
    ctx: &mut BatchContext,
) -> Result<Vec<HeartRateRow>> {
    let (index, rejected) = RecordingIndex::from_paths(list_csv_files(input_dir)?);
    for (path, err) in &rejected {
        ctx.reject(&file_label(path), err);
    }
    info!(
        "[{}] {} PPG recordings in {}",
        ctx.label(),
        index.len(),
        input_dir.display()
    );

    let units: Vec<(&RecordingKey, &Path)> = index.iter().collect();
    let reports: Vec<UnitReport<HeartRateRow>> = units
        .par_iter()
        .map(|(key, path)| heart_rate_unit(key, path, cfg))
        .collect();

    let mut rows = Vec::new();
    for report in reports {
        rows.extend(ctx.absorb(report));
    }
    Ok(rows)
}

pub fn write_heart_rate_table(path: &Path, rows: &[HeartRateRow]) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().from_writer(file);
    writer.write_record(["participant_id", "session_id", "peak_index", "HR"])?;
    for row in rows {
        writer.write_record(&[
            row.participant_id.clone(),
            row.session_id.to_string(),
            row.peak_index.to_string(),
            row.hr_bpm.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

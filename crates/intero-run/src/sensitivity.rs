use crate::{file_label, format_value, list_csv_files, BatchContext, UnitReport};
use anyhow::{Context, Result};
use csv::WriterBuilder;
use intero_lib::io::hbd::read_hbd_csv;
use intero_lib::io::naming::{participant_from_file_name, RecordingIndex};
use intero_lib::io::ppg::read_ppg_csv;
use intero_lib::sensitivity::{estimate_sensitivity, normalize_cohort, ParticipantSensitivity};
use intero_lib::{resting_rr_interval, PipelineConfig};
use log::{debug, info};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Resting RR interval (seconds) from the participant's earliest baseline recording.
fn baseline_rri(
    participant_id: &str,
    baselines: &RecordingIndex,
    cfg: &PipelineConfig,
    report: &mut UnitReport<ParticipantSensitivity>,
) -> Option<f64> {
    let (key, path) = baselines.sessions_of(participant_id).next()?;
    let result = read_ppg_csv(path).and_then(|rec| {
        let series = rec.to_time_series(cfg.sample_rate_hz);
        resting_rr_interval(&series, &cfg.filter, &cfg.peaks, &cfg.heart_rate)
    });
    match result {
        Ok(rri) => {
            debug!("{}: resting RRI {:.3} s from baseline", key, rri);
            Some(rri)
        }
        Err(err) => {
            report.fail(file_label(path), err);
            None
        }
    }
}

fn sensitivity_unit(
    path: &Path,
    baselines: Option<&RecordingIndex>,
    cfg: &PipelineConfig,
) -> UnitReport<ParticipantSensitivity> {
    let source = file_label(path);
    let participant_id = match participant_from_file_name(&source) {
        Ok(id) => id,
        Err(err) => return UnitReport::failed(source, err),
    };
    let record = match read_hbd_csv(path) {
        Ok(record) => record,
        Err(err) => return UnitReport::failed(source, err),
    };

    let mut report = UnitReport::new(source.clone());
    let resting_rri = match (record.resting_rri_s, baselines) {
        (Some(rri), _) => Some(rri),
        (None, Some(index)) => baseline_rri(&participant_id, index, cfg, &mut report),
        (None, None) => None,
    };
    let row = match estimate_sensitivity(&record.trials, resting_rri, cfg) {
        Ok(estimate) => {
            debug!(
                "{}: {} curve points, fit after {} iterations",
                source,
                estimate.curve.len(),
                estimate.fit.iterations
            );
            ParticipantSensitivity::from_fit(participant_id, resting_rri, &estimate.fit)
        }
        Err(err) => {
            report.fail(source, err);
            ParticipantSensitivity::sentinel(participant_id, resting_rri)
        }
    };
    report.rows.push(row);
    report
}

/// Interoceptive-sensitivity table for every HBD export in `hbd_dir`.
///
/// Participants whose curve cannot be fitted keep a NaN row. When an export
/// carries no usable `resting_RRI` and `baseline_dir` is given, the interval
/// is measured from that participant's lowest-session `_PPG` recording there.
pub fn run_sensitivity_batch(
    hbd_dir: &Path,
    baseline_dir: Option<&Path>,
    cfg: &PipelineConfig,
    ctx: &mut BatchContext,
) -> Result<Vec<ParticipantSensitivity>> {
    let baselines = match baseline_dir {
        Some(dir) => {
            let (index, rejected) = RecordingIndex::from_paths(list_csv_files(dir)?);
            for (path, err) in &rejected {
                ctx.record(&file_label(path), err);
            }
            Some(index)
        }
        None => None,
    };
    let files: Vec<PathBuf> = list_csv_files(hbd_dir)?;
    info!("[{}] {} HBD exports", ctx.label(), files.len());

    let reports: Vec<UnitReport<ParticipantSensitivity>> = files
        .par_iter()
        .map(|path| sensitivity_unit(path, baselines.as_ref(), cfg))
        .collect();
    let mut rows = Vec::new();
    for report in reports {
        rows.extend(ctx.absorb(report));
    }
    rows.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
    normalize_cohort(&mut rows);
    Ok(rows)
}

pub fn write_sensitivity_table(path: &Path, rows: &[ParticipantSensitivity]) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().from_writer(file);
    writer.write_record(["participant_id", "amplitude", "sigma", "resting_RRI", "normalized_IS"])?;
    for row in rows {
        writer.write_record(&[
            row.participant_id.clone(),
            format_value(Some(row.raw_amplitude)),
            format_value(Some(row.sigma)),
            format_value(Some(row.resting_rri)),
            format_value(Some(row.normalized_is)),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_ppg;
    use std::fmt::Write as _;

    /// Ten answers per delay with `round(mean * 10)` of them "Sync".
    fn hbd_text(rri: Option<f64>, means: &[f64]) -> String {
        let mut text = String::from("resting_RRI,delay,response\n");
        for (k, &mean) in means.iter().enumerate() {
            let syncs = (mean * 10.0).round() as usize;
            for t in 0..10 {
                let rri_cell = match (k, t, rri) {
                    (0, 0, Some(v)) => v.to_string(),
                    _ => String::new(),
                };
                let label = if t < syncs { "Sync" } else { "Async" };
                writeln!(text, "{},{},{}", rri_cell, k * 100, label).unwrap();
            }
        }
        text
    }

    #[test]
    fn cohort_rows_with_sentinels() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        fs::write(p.join("sub-01_hbd.csv"), hbd_text(Some(1.0), &[0.1, 0.5, 0.9, 0.5, 0.1])).unwrap();
        fs::write(p.join("sub-02_hbd.csv"), hbd_text(Some(0.9), &[1.0; 5])).unwrap();
        fs::write(p.join("sub-03_hbd.csv"), hbd_text(Some(1.0), &[0.2, 0.4, 0.6, 0.4, 0.2])).unwrap();
        fs::write(p.join("sub-04_hbd.csv"), "delay,response\n0,Maybe\n").unwrap();
        fs::write(p.join("notes.csv"), "delay,response\n0,Sync\n").unwrap();

        let mut ctx = BatchContext::new("is-batch");
        let rows = run_sensitivity_batch(p, None, &PipelineConfig::default(), &mut ctx).unwrap();

        let ids: Vec<&str> = rows.iter().map(|r| r.participant_id.as_str()).collect();
        assert_eq!(ids, vec!["01", "02", "03"]);
        assert!(rows[0].raw_amplitude > rows[2].raw_amplitude);
        assert_eq!(rows[0].normalized_is, 1.0);
        assert!(rows[1].raw_amplitude.is_nan());
        assert!(rows[1].normalized_is.is_nan());
        assert_eq!(rows[1].resting_rri, 0.9);
        assert!(rows[2].normalized_is.is_nan());

        let kinds: Vec<(&str, &str)> = ctx
            .diagnostics()
            .iter()
            .map(|d| (d.source.as_str(), d.kind.as_str()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("notes.csv", "file_name"),
                ("sub-02_hbd.csv", "degenerate_curve"),
                ("sub-04_hbd.csv", "invalid_response"),
            ]
        );
        assert_eq!(ctx.units(), 5);
        assert_eq!(ctx.succeeded(), 3);
    }

    #[test]
    fn missing_rri_comes_from_baseline() {
        let hbd = tempfile::tempdir().unwrap();
        let baseline = tempfile::tempdir().unwrap();
        fs::write(
            hbd.path().join("sub-01_hbd.csv"),
            hbd_text(None, &[0.1, 0.5, 0.9, 0.5, 0.1]),
        )
        .unwrap();
        fs::write(
            hbd.path().join("sub-02_hbd.csv"),
            hbd_text(None, &[0.1, 0.4, 0.8, 0.4, 0.1]),
        )
        .unwrap();
        write_ppg(&baseline.path().join("sub-01_sess1_PPG.csv"), 100.0, 30.0, 0.8, 4);

        let mut ctx = BatchContext::new("is-batch");
        let rows = run_sensitivity_batch(
            hbd.path(),
            Some(baseline.path()),
            &PipelineConfig::default(),
            &mut ctx,
        )
        .unwrap();

        assert!((rows[0].resting_rri - 0.8).abs() < 0.02, "rri {}", rows[0].resting_rri);
        assert!(rows[0].raw_amplitude.is_finite());
        // No interval anywhere: the ms delays leave the amplitude unconstrained.
        assert!(rows[1].resting_rri.is_nan());
        assert!(rows[1].raw_amplitude.is_nan());
        let kinds: Vec<(&str, &str)> = ctx
            .diagnostics()
            .iter()
            .map(|d| (d.source.as_str(), d.kind.as_str()))
            .collect();
        assert_eq!(kinds, vec![("sub-02_hbd.csv", "fit_non_convergence")]);
        assert_eq!(ctx.succeeded(), 2);
    }

    #[test]
    fn table_writes_nan_for_sentinels() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("is.csv");
        write_sensitivity_table(&out, &[ParticipantSensitivity::sentinel("09", Some(0.75))]).unwrap();
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "participant_id,amplitude,sigma,resting_RRI,normalized_IS\n09,NaN,NaN,0.75,NaN\n"
        );
    }
}

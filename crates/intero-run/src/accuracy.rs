use crate::{file_label, format_value, list_csv_files, BatchContext, UnitReport};
use anyhow::{Context, Result};
use csv::WriterBuilder;
use intero_lib::io::naming::{is_trial_file, participant_from_file_name, RecordingIndex, RecordingKey};
use intero_lib::io::ppg::read_ppg_csv;
use intero_lib::io::trials::{read_trials_csv, TrialWindow};
use intero_lib::{PipelineConfig, PipelineError, WindowedBeatCounter};
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// One scored trial window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyRow {
    pub participant_id: String,
    pub session: u32,
    /// 1-based row in the trial export.
    pub trial: usize,
    pub music_type: Option<String>,
    pub valence_rating: Option<f64>,
    pub rt: Option<f64>,
    pub response_start: f64,
    pub iti_start: f64,
    pub recorded_beats: usize,
    pub reported_beats: Option<f64>,
    pub accuracy: Option<f64>,
    pub ppg_mean: Option<f64>,
    pub ppg_at_start: Option<f64>,
}

/// Score every trial of one session against its PPG recording.
fn score_session(
    participant_id: &str,
    session: u32,
    ppg_path: &Path,
    trials: &[(usize, &TrialWindow)],
    cfg: &PipelineConfig,
    report: &mut UnitReport<AccuracyRow>,
) {
    let ppg_label = file_label(ppg_path);
    let stamped = match read_ppg_csv(ppg_path).and_then(|rec| rec.stamped()) {
        Ok(stamped) => stamped,
        Err(err) => {
            report.fail(ppg_label, err);
            return;
        }
    };
    let counter = WindowedBeatCounter::new(&stamped, &cfg.beats);
    for &(trial, window) in trials {
        match counter.score_window(window.response_start, window.iti_start, window.reported_beats) {
            Ok(score) => report.rows.push(AccuracyRow {
                participant_id: participant_id.to_string(),
                session,
                trial,
                music_type: window.music_type.clone(),
                valence_rating: window.valence_rating,
                rt: window.rt,
                response_start: window.response_start,
                iti_start: window.iti_start,
                recorded_beats: score.recorded,
                reported_beats: score.reported,
                accuracy: score.accuracy,
                ppg_mean: score.window_mean,
                ppg_at_start: score.value_at_start,
            }),
            Err(err) => report.fail(format!("{} row {}", report.source, trial), err),
        }
    }
}

fn accuracy_unit(
    trial_path: &Path,
    index: &RecordingIndex,
    cfg: &PipelineConfig,
) -> UnitReport<AccuracyRow> {
    let source = file_label(trial_path);
    let participant_id = match participant_from_file_name(&source) {
        Ok(id) => id,
        Err(err) => return UnitReport::failed(source, err),
    };
    let windows = match read_trials_csv(trial_path) {
        Ok(windows) => windows,
        Err(err) => return UnitReport::failed(source, err),
    };

    let mut report = UnitReport::new(source);
    let sessions: BTreeSet<u32> = windows.iter().map(|w| w.session).collect();
    for session in sessions {
        let key = RecordingKey::new(participant_id.clone(), session);
        let Some(ppg_path) = index.get(&key) else {
            let err = PipelineError::MissingRecording {
                participant_id: participant_id.clone(),
                session,
            };
            report.fail(key.ppg_file_name(), err);
            continue;
        };
        let trials: Vec<(usize, &TrialWindow)> = windows
            .iter()
            .enumerate()
            .filter(|(_, w)| w.session == session)
            .map(|(i, w)| (i + 1, w))
            .collect();
        score_session(&participant_id, session, ppg_path, &trials, cfg, &mut report);
    }
    report
}

/// Interoceptive-accuracy table from trial exports and their PPG recordings.
pub fn run_accuracy_batch(
    ppg_dir: &Path,
    trial_dir: &Path,
    cfg: &PipelineConfig,
    ctx: &mut BatchContext,
) -> Result<Vec<AccuracyRow>> {
    let (index, rejected) = RecordingIndex::from_paths(list_csv_files(ppg_dir)?);
    for (path, err) in &rejected {
        ctx.record(&file_label(path), err);
    }
    let trial_files: Vec<PathBuf> = list_csv_files(trial_dir)?
        .into_iter()
        .filter(|p| is_trial_file(&file_label(p)))
        .collect();
    info!(
        "[{}] {} trial exports, {} PPG recordings",
        ctx.label(),
        trial_files.len(),
        index.len()
    );

    let reports: Vec<UnitReport<AccuracyRow>> = trial_files
        .par_iter()
        .map(|path| accuracy_unit(path, &index, cfg))
        .collect();
    let mut rows = Vec::new();
    for report in reports {
        rows.extend(ctx.absorb(report));
    }
    Ok(rows)
}

pub fn write_accuracy_table(path: &Path, rows: &[AccuracyRow]) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().from_writer(file);
    writer.write_record([
        "participant_id",
        "session",
        "trial",
        "music_type",
        "valence_rating",
        "RT",
        "PPG_response_start",
        "PPG_ITI_start",
        "recorded_beats",
        "reported_beats",
        "IA",
        "PPG_mean",
        "PPG_data",
    ])?;
    for row in rows {
        writer.write_record(&[
            row.participant_id.clone(),
            row.session.to_string(),
            row.trial.to_string(),
            row.music_type.clone().unwrap_or_default(),
            format_value(row.valence_rating),
            format_value(row.rt),
            row.response_start.to_string(),
            row.iti_start.to_string(),
            row.recorded_beats.to_string(),
            format_value(row.reported_beats),
            format_value(row.accuracy),
            format_value(row.ppg_mean),
            format_value(row.ppg_at_start),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;

    /// Noise-free pulses at 0.5 + 0.8k s, sampled at 100 Hz.
    fn write_clean_ppg(path: &Path, seconds: f64) {
        let mut text = String::from("time,PPG\n");
        for i in 0..(100.0 * seconds) as usize {
            let t = i as f64 / 100.0;
            let phase = (t - 0.5).rem_euclid(0.8);
            let dist = phase.min(0.8 - phase);
            writeln!(text, "{:.4},{:.6}", t, (-0.5 * (dist / 0.08).powi(2)).exp()).unwrap();
        }
        fs::write(path, text).unwrap();
    }

    #[test]
    fn scores_windows_and_reports_gaps() {
        let ppg = tempfile::tempdir().unwrap();
        let trials = tempfile::tempdir().unwrap();
        write_clean_ppg(&ppg.path().join("sub-04_sess1_PPG.csv"), 20.0);
        fs::write(
            trials.path().join("sub-04_music_trial_data.csv"),
            "session,music_type,PPG_response_start,PPG_ITI_start,reported_beats\n\
             1,happy,0.4,4.4,4\n\
             1,sad,30.0,35.0,3\n\
             1,calm,5.0,9.0,\n\
             2,happy,0.0,4.0,5\n",
        )
        .unwrap();
        fs::write(trials.path().join("readme.csv"), "x\n1\n").unwrap();

        let mut ctx = BatchContext::new("ia-batch");
        let rows =
            run_accuracy_batch(ppg.path(), trials.path(), &PipelineConfig::default(), &mut ctx)
                .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].trial, 1);
        assert_eq!(rows[0].recorded_beats, 5);
        assert_eq!(rows[0].accuracy, Some(0.8));
        assert_eq!(rows[0].music_type.as_deref(), Some("happy"));
        assert!(rows[0].ppg_mean.is_some());
        assert_eq!(rows[1].trial, 3);
        assert_eq!(rows[1].accuracy, None);

        let kinds: Vec<&str> = ctx.diagnostics().iter().map(|d| d.kind.as_str()).collect();
        assert_eq!(kinds, vec!["no_recorded_beats", "missing_recording"]);
        assert_eq!(ctx.diagnostics()[0].source, "sub-04_music_trial_data.csv row 2");
        assert_eq!(ctx.diagnostics()[1].source, "sub-04_sess2_PPG.csv");
        assert_eq!(ctx.units(), 1);
    }

    #[test]
    fn ppg_without_time_is_reported() {
        let ppg = tempfile::tempdir().unwrap();
        let trials = tempfile::tempdir().unwrap();
        fs::write(ppg.path().join("sub-05_sess1_PPG.csv"), "PPG\n0.1\n0.5\n0.2\n").unwrap();
        fs::write(
            trials.path().join("sub-05_trial_data.csv"),
            "session,PPG_response_start,PPG_ITI_start\n1,0.0,1.0\n",
        )
        .unwrap();
        let mut ctx = BatchContext::new("ia-batch");
        let rows =
            run_accuracy_batch(ppg.path(), trials.path(), &PipelineConfig::default(), &mut ctx)
                .unwrap();
        assert!(rows.is_empty());
        assert_eq!(ctx.diagnostics()[0].kind, "schema");
        assert_eq!(ctx.diagnostics()[0].source, "sub-05_sess1_PPG.csv");
    }
}

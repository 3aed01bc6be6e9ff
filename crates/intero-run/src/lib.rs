//! Batch layer: runs the pipeline over folders of exports and collects
//! per-unit failures instead of aborting.

pub mod accuracy;
pub mod heart_rate;
pub mod sensitivity;

use anyhow::{Context, Result};
use intero_lib::{PipelineConfig, PipelineError};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use accuracy::{run_accuracy_batch, write_accuracy_table, AccuracyRow};
pub use heart_rate::{run_heart_rate_batch, write_heart_rate_table, HeartRateRow};
pub use sensitivity::{run_sensitivity_batch, write_sensitivity_table};

/// A unit that could not be (fully) processed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Diagnostic {
    /// File name, optionally suffixed with a row reference.
    pub source: String,
    pub kind: String,
    pub message: String,
    /// Soft failures mean "nothing to compute", hard ones mean unusable input.
    pub soft: bool,
}

impl Diagnostic {
    pub fn from_error(source: impl Into<String>, err: &PipelineError) -> Self {
        Self {
            source: source.into(),
            kind: err.kind().to_string(),
            message: err.to_string(),
            soft: err.is_soft(),
        }
    }
}

/// Output of one processing unit, merged into the batch in input order.
#[derive(Debug)]
pub struct UnitReport<T> {
    pub source: String,
    pub rows: Vec<T>,
    pub failures: Vec<(String, PipelineError)>,
}

impl<T> UnitReport<T> {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            rows: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn failed(source: impl Into<String>, err: PipelineError) -> Self {
        let source = source.into();
        Self {
            failures: vec![(source.clone(), err)],
            source,
            rows: Vec::new(),
        }
    }

    pub fn fail(&mut self, source: impl Into<String>, err: PipelineError) {
        self.failures.push((source.into(), err));
    }
}

/// Logging scope and diagnostics sink for one batch run.
#[derive(Debug)]
pub struct BatchContext {
    label: String,
    units: usize,
    succeeded: usize,
    diagnostics: Vec<Diagnostic>,
}

impl BatchContext {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            units: 0,
            succeeded: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn record(&mut self, source: &str, err: &PipelineError) {
        warn!("[{}] {}: {}", self.label, source, err);
        self.diagnostics.push(Diagnostic::from_error(source, err));
    }

    /// Fold a unit's failures into the diagnostics list and hand back its rows.
    pub fn absorb<T>(&mut self, report: UnitReport<T>) -> Vec<T> {
        self.units += 1;
        if !report.rows.is_empty() {
            self.succeeded += 1;
        }
        for (source, err) in &report.failures {
            self.record(source, err);
        }
        report.rows
    }

    /// Count a unit that failed before it could be scheduled (e.g. bad file name).
    pub fn reject(&mut self, source: &str, err: &PipelineError) {
        self.units += 1;
        self.record(source, err);
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// End-of-batch summary naming every skipped source.
    pub fn summarize(&self) {
        info!(
            "[{}] {} of {} units produced output",
            self.label, self.succeeded, self.units
        );
        if !self.diagnostics.is_empty() {
            let sources: Vec<&str> = self.diagnostics.iter().map(|d| d.source.as_str()).collect();
            warn!(
                "[{}] {} diagnostics: {}",
                self.label,
                self.diagnostics.len(),
                sources.join(", ")
            );
        }
    }

    pub fn into_manifest(
        self,
        inputs: Vec<String>,
        output: &Path,
        rows: usize,
        config: &PipelineConfig,
    ) -> RunManifest {
        RunManifest {
            command: self.label,
            inputs,
            output: output.display().to_string(),
            units: self.units,
            succeeded: self.succeeded,
            skipped: self.units - self.succeeded,
            rows,
            diagnostics: self.diagnostics,
            config: *config,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RunManifest {
    pub command: String,
    pub inputs: Vec<String>,
    pub output: String,
    pub units: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub rows: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub config: PipelineConfig,
}

pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("creating manifest {}", path.display()))?;
    serde_json::to_writer_pretty(file, manifest)?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<RunManifest> {
    let file =
        fs::File::open(path).with_context(|| format!("opening manifest {}", path.display()))?;
    let manifest = serde_json::from_reader::<_, RunManifest>(file)
        .with_context(|| format!("parsing manifest {}", path.display()))?;
    Ok(manifest)
}

/// `out/hr.csv` -> `out/hr.manifest.json`
pub fn manifest_path_for(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "run".into());
    output.with_file_name(format!("{}.manifest.json", stem))
}

/// CSV files directly inside `dir`, sorted by name.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("reading input folder {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("listing {}", dir.display()))?
            .path();
        if path.is_file() && file_label(&path).to_ascii_lowercase().ends_with(".csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Make sure the output's parent folder exists.
pub fn prepare_output(path: &Path) -> Result<()> {
    if path.is_dir() {
        anyhow::bail!("output path {} is a directory", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output folder {}", parent.display()))?;
    }
    Ok(())
}

pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Empty for `None`, `NaN` for non-finite values.
pub(crate) fn format_value(value: Option<f64>) -> String {
    match value {
        None => String::new(),
        Some(v) if v.is_finite() => v.to_string(),
        Some(_) => "NaN".into(),
    }
}

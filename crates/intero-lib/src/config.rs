use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Sample rate assumed when a recording carries no usable `time` column.
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 100.0;

/// Bandpass settings for the cardiac band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Lower band edge (Hz).
    pub low_hz: f64,
    /// Upper band edge (Hz).
    pub high_hz: f64,
    /// Prototype order; the bandpass has twice as many poles.
    pub order: usize,
    /// Minimum stopband attenuation (dB).
    pub stopband_db: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            low_hz: 0.5,
            high_hz: 5.0,
            order: 4,
            stopband_db: 20.0,
        }
    }
}

/// Peak picking on the filtered waveform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Minimum prominence as a fraction of the global signal maximum.
    pub prominence_ratio: f64,
    /// Refractory distance between accepted peaks (seconds).
    pub min_distance_s: f64,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            prominence_ratio: 0.15,
            min_distance_s: 0.6,
        }
    }
}

impl PeakConfig {
    /// Refractory distance in whole samples (never below one).
    pub fn min_distance_samples(&self, fs: f64) -> usize {
        ((fs * self.min_distance_s) as usize).max(1)
    }
}

/// Physiological plausibility limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartRateLimits {
    pub min_rr_s: f64,
    pub max_rr_s: f64,
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl Default for HeartRateLimits {
    fn default() -> Self {
        Self {
            min_rr_s: 0.3,
            max_rr_s: 1.5,
            min_bpm: 40.0,
            max_bpm: 200.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatCountConfig {
    /// Minimum height of a local maximum to count as a beat.
    pub height_threshold: f64,
}

impl Default for BeatCountConfig {
    fn default() -> Self {
        Self {
            height_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncCurveConfig {
    /// Duplicate each point one resting RR interval later.
    pub mirror_by_rri: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Hard cap on optimizer iterations.
    pub max_iterations: usize,
    /// Starting width of the Gaussian (normalized delay units).
    pub initial_sigma: f64,
    /// Relative cost reduction below which the fit counts as converged.
    pub tolerance: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            initial_sigma: 0.1,
            tolerance: 1e-10,
        }
    }
}

/// Complete set of tunables for one batch run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fixed sample rate; inferred from `time` deltas when absent.
    pub sample_rate_hz: Option<f64>,
    pub filter: FilterConfig,
    pub peaks: PeakConfig,
    pub heart_rate: HeartRateLimits,
    pub beats: BeatCountConfig,
    pub sync: SyncCurveConfig,
    pub fit: FitConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: PipelineConfig = toml::from_str(text).context("parsing pipeline config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Reject settings no input could satisfy.
    pub fn validate(&self) -> Result<()> {
        if let Some(fs) = self.sample_rate_hz {
            if fs.is_nan() || fs <= 0.0 {
                bail!("sample_rate_hz must be positive, got {}", fs);
            }
        }
        let f = &self.filter;
        if f.low_hz.is_nan() || f.low_hz <= 0.0 || f.low_hz >= f.high_hz {
            bail!("filter band [{}, {}] Hz is empty", f.low_hz, f.high_hz);
        }
        if f.order == 0 || f.stopband_db <= 0.0 {
            bail!("filter order and stopband attenuation must be positive");
        }
        if self.peaks.min_distance_s < 0.0 || self.peaks.prominence_ratio < 0.0 {
            bail!("peak settings must be non-negative");
        }
        let hr = &self.heart_rate;
        if hr.min_rr_s > hr.max_rr_s || hr.min_bpm > hr.max_bpm {
            bail!("heart-rate limits are inverted");
        }
        if self.fit.max_iterations == 0 {
            bail!("fit.max_iterations must be at least 1");
        }
        Ok(())
    }
}

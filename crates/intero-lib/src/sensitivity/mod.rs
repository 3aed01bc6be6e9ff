//! Interoceptive sensitivity from heartbeat-discrimination judgements.

pub mod curve;
pub mod fit;
pub mod normalize;

pub use curve::{build_sync_curve, HbdTrial, SyncCurve, SyncRatioPoint, SyncResponse};
pub use fit::{fit_gaussian, GaussianFit, GaussianParams};
pub use normalize::normalize_amplitudes;

use crate::config::PipelineConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// One output row of the sensitivity table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantSensitivity {
    pub participant_id: String,
    /// Fitted amplitude; NaN when the fit failed or was skipped.
    pub raw_amplitude: f64,
    pub sigma: f64,
    /// Resting RR interval (seconds); NaN when unknown.
    pub resting_rri: f64,
    /// Cohort-normalized amplitude; filled by [`normalize_cohort`].
    pub normalized_is: f64,
}

impl ParticipantSensitivity {
    /// Row for a participant whose curve could not be fitted.
    pub fn sentinel(participant_id: impl Into<String>, resting_rri: Option<f64>) -> Self {
        Self {
            participant_id: participant_id.into(),
            raw_amplitude: f64::NAN,
            sigma: f64::NAN,
            resting_rri: resting_rri.unwrap_or(f64::NAN),
            normalized_is: f64::NAN,
        }
    }

    pub fn from_fit(
        participant_id: impl Into<String>,
        resting_rri: Option<f64>,
        fit: &GaussianFit,
    ) -> Self {
        Self {
            raw_amplitude: fit.params.amplitude,
            sigma: fit.params.sigma,
            ..Self::sentinel(participant_id, resting_rri)
        }
    }
}

/// Curve and fit for one participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityEstimate {
    pub curve: SyncCurve,
    pub fit: GaussianFit,
}

/// Build the synchrony curve and fit it.
///
/// `resting_rri_s` is in seconds; non-positive values count as unknown.
pub fn estimate_sensitivity(
    trials: &[HbdTrial],
    resting_rri_s: Option<f64>,
    cfg: &PipelineConfig,
) -> Result<SensitivityEstimate> {
    let rri_ms = resting_rri_s.map(|s| s * 1000.0);
    let curve = build_sync_curve(trials, rri_ms, &cfg.sync);
    let fit = fit_gaussian(&curve.points, &cfg.fit)?;
    Ok(SensitivityEstimate { curve, fit })
}

/// Fill `normalized_is` for every row from the cohort's raw amplitudes.
pub fn normalize_cohort(rows: &mut [ParticipantSensitivity]) {
    let amplitudes: Vec<f64> = rows.iter().map(|r| r.raw_amplitude).collect();
    for (row, value) in rows.iter_mut().zip(normalize_amplitudes(&amplitudes)) {
        row.normalized_is = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn trials_with_means(means: &[f64]) -> Vec<HbdTrial> {
        // Ten trials per delay; `mean * 10` of them answered Sync.
        let mut trials = Vec::new();
        for (k, &mean) in means.iter().enumerate() {
            let syncs = (mean * 10.0).round() as usize;
            for t in 0..10 {
                trials.push(HbdTrial {
                    delay_ms: k as f64 * 100.0,
                    response: Some(if t < syncs {
                        SyncResponse::Sync
                    } else {
                        SyncResponse::Async
                    }),
                });
            }
        }
        trials
    }

    #[test]
    fn bell_shaped_answers_fit() {
        let trials = trials_with_means(&[0.1, 0.5, 0.9, 0.5, 0.1]);
        let est = estimate_sensitivity(&trials, Some(1.0), &PipelineConfig::default()).unwrap();
        assert_eq!(est.curve.len(), 5);
        assert!((est.fit.params.mean - 0.2).abs() < 0.01);
        assert!(est.fit.params.amplitude > 0.8 && est.fit.params.amplitude < 0.9);
    }

    #[test]
    fn mirrored_answers_keep_their_bump() {
        let mut cfg = PipelineConfig::default();
        cfg.sync.mirror_by_rri = true;
        let trials = trials_with_means(&[0.1, 0.5, 0.9, 0.5, 0.1]);
        let est = estimate_sensitivity(&trials, Some(1.0), &cfg).unwrap();
        assert_eq!(est.curve.len(), 10);
        assert!((est.fit.params.mean - 0.2).abs() < 0.01, "mean {}", est.fit.params.mean);
        assert!(est.fit.params.amplitude > 0.5);
    }

    #[test]
    fn unknown_interval_is_not_fitted() {
        let trials = trials_with_means(&[0.1, 0.5, 0.9, 0.5, 0.1]);
        let err = estimate_sensitivity(&trials, None, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::FitNonConvergence(_)), "{:?}", err);
    }

    #[test]
    fn uniform_answers_are_degenerate() {
        let trials = trials_with_means(&[1.0; 5]);
        let err = estimate_sensitivity(&trials, Some(0.9), &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::DegenerateCurve(_)));
        let row = ParticipantSensitivity::sentinel("03", Some(0.9));
        assert!(row.raw_amplitude.is_nan() && row.normalized_is.is_nan());
        assert_eq!(row.resting_rri, 0.9);
    }

    #[test]
    fn cohort_normalization_fills_rows() {
        let fit = |amplitude| GaussianFit {
            params: GaussianParams {
                amplitude,
                mean: 0.2,
                sigma: 0.1,
                offset: 0.0,
            },
            iterations: 5,
            cost: 0.0,
        };
        let mut rows = vec![
            ParticipantSensitivity::from_fit("01", Some(0.8), &fit(0.4)),
            ParticipantSensitivity::sentinel("02", None),
            ParticipantSensitivity::from_fit("03", Some(1.0), &fit(0.9)),
            ParticipantSensitivity::from_fit("04", Some(0.7), &fit(0.65)),
        ];
        normalize_cohort(&mut rows);
        assert!(rows[0].normalized_is.is_nan());
        assert!(rows[1].normalized_is.is_nan());
        assert_eq!(rows[2].normalized_is, 1.0);
        assert!((rows[3].normalized_is - 0.5).abs() < 1e-12);
        assert!(rows[1].resting_rri.is_nan());
    }
}

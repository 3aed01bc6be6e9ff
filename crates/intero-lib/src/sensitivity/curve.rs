use crate::config::SyncCurveConfig;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Participant judgement for one heartbeat-discrimination trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncResponse {
    Sync,
    Async,
}

impl SyncResponse {
    /// Exact, case-sensitive match on `Sync` / `Async`.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "Sync" => Some(Self::Sync),
            "Async" => Some(Self::Async),
            _ => None,
        }
    }

    pub fn value(self) -> f64 {
        match self {
            Self::Sync => 1.0,
            Self::Async => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HbdTrial {
    /// Tone delay relative to the heartbeat (ms, signed).
    pub delay_ms: f64,
    /// `None` when the cell was empty.
    pub response: Option<SyncResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncRatioPoint {
    pub normalized_delay: f64,
    /// Fraction of `Sync` answers at this delay, in `[0, 1]`.
    pub mean_response: f64,
}

/// Synchrony ratio against delay for one participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncCurve {
    pub points: Vec<SyncRatioPoint>,
    /// Delays were divided by the resting RR interval.
    pub normalized: bool,
    /// Every point was duplicated one RR interval later.
    pub mirrored: bool,
}

impl SyncCurve {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn delays(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.normalized_delay).collect()
    }

    pub fn ratios(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.mean_response).collect()
    }

    /// All ratios equal (or no points at all).
    pub fn is_flat(&self) -> bool {
        let mut ratios = self.points.iter().map(|p| p.mean_response);
        match ratios.next() {
            Some(first) => ratios.all(|r| r == first),
            None => true,
        }
    }
}

/// Mean `Sync` fraction per distinct delay, in ascending delay order.
///
/// Trials without a response or with a non-finite delay are ignored. A usable
/// `resting_rri_ms` (finite and positive) turns delays into fractions of the
/// cardiac cycle; otherwise raw milliseconds are kept. Mirroring only applies
/// when the curve was normalized.
pub fn build_sync_curve(
    trials: &[HbdTrial],
    resting_rri_ms: Option<f64>,
    cfg: &SyncCurveConfig,
) -> SyncCurve {
    let rri = resting_rri_ms.filter(|r| r.is_finite() && *r > 0.0);

    let mut answered: Vec<(f64, f64)> = trials
        .iter()
        .filter(|t| t.delay_ms.is_finite())
        .filter_map(|t| t.response.map(|r| (t.delay_ms + 0.0, r.value())))
        .collect();
    answered.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut points: Vec<SyncRatioPoint> = Vec::new();
    let mut i = 0;
    while i < answered.len() {
        let delay = answered[i].0;
        let mut j = i;
        let mut sum = 0.0;
        while j < answered.len() && answered[j].0 == delay {
            sum += answered[j].1;
            j += 1;
        }
        points.push(SyncRatioPoint {
            normalized_delay: rri.map_or(delay, |r| delay / r),
            mean_response: sum / (j - i) as f64,
        });
        i = j;
    }

    if points.is_empty() {
        warn!(
            "no answered trials among {} HBD rows; synchrony curve is empty",
            trials.len()
        );
        return SyncCurve::default();
    }

    let mirrored = cfg.mirror_by_rri && rri.is_some();
    if mirrored {
        let shifted: Vec<SyncRatioPoint> = points
            .iter()
            .map(|p| SyncRatioPoint {
                normalized_delay: p.normalized_delay + 1.0,
                ..*p
            })
            .collect();
        points.extend(shifted);
    } else if cfg.mirror_by_rri {
        debug!("mirroring skipped: no resting RR interval");
    }

    SyncCurve {
        points,
        normalized: rri.is_some(),
        mirrored,
    }
}

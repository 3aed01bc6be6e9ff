use crate::{
    config::{FilterConfig, HeartRateLimits, PeakConfig},
    error::{PipelineError, Result},
    filter::bandpass,
    metrics::heart_rate::{estimate_heart_rate, HrSample},
    signal::{PeakSet, RRSeries, TimeSeries},
};
use serde::{Deserialize, Serialize};

/// Selection rules for [`find_peaks`]; `None` disables a rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakCriteria {
    /// Minimum sample value at the peak.
    pub height: Option<f64>,
    /// Minimum spacing between kept peaks (samples).
    pub distance: Option<usize>,
    /// Minimum topographic prominence.
    pub prominence: Option<f64>,
}

/// Combined result of filtering, peak picking and heart-rate conversion for one recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartRatePipelineResult {
    pub fs: f64,
    pub sample_count: usize,
    pub peaks: PeakSet,
    pub rr: RRSeries,
    pub heart_rate: Vec<HrSample>,
}

/// Local maxima; flat tops report their middle sample (left-biased for even widths).
pub fn local_maxima(data: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if data.len() < 3 {
        return peaks;
    }
    let i_max = data.len() - 1;
    let mut i = 1;
    while i < i_max {
        if data[i - 1] < data[i] {
            let mut ahead = i + 1;
            while ahead < i_max && data[ahead] == data[i] {
                ahead += 1;
            }
            if data[ahead] < data[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Keep the tallest peaks so that survivors are at least `distance` samples apart.
///
/// Candidates are visited tallest first; equal heights favour the earlier index.
pub fn select_by_distance(data: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    if distance <= 1 || peaks.len() < 2 {
        return peaks.to_vec();
    }
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| data[peaks[b]].total_cmp(&data[peaks[a]]).then(a.cmp(&b)));

    let mut keep = vec![true; peaks.len()];
    for &j in &order {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }
    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, kept)| kept.then_some(p))
        .collect()
}

/// Vertical distance between each peak and the higher of its two bases.
///
/// A base is the lowest sample between the peak and the nearest strictly
/// higher sample on that side (or the signal edge).
pub fn prominences(data: &[f64], peaks: &[usize]) -> Vec<f64> {
    peaks
        .iter()
        .map(|&peak| {
            let height = data[peak];
            let mut left_min = height;
            for &v in data[..=peak].iter().rev() {
                if v > height {
                    break;
                }
                left_min = left_min.min(v);
            }
            let mut right_min = height;
            for &v in &data[peak..] {
                if v > height {
                    break;
                }
                right_min = right_min.min(v);
            }
            height - left_min.max(right_min)
        })
        .collect()
}

/// Generic local-maximum picker: height, then distance, then prominence.
pub fn find_peaks(data: &[f64], criteria: &PeakCriteria) -> Vec<usize> {
    let mut peaks = local_maxima(data);
    if let Some(height) = criteria.height {
        peaks.retain(|&p| data[p] >= height);
    }
    if let Some(distance) = criteria.distance {
        peaks = select_by_distance(data, &peaks, distance);
    }
    if let Some(min_prominence) = criteria.prominence {
        let prom = prominences(data, &peaks);
        peaks = peaks
            .into_iter()
            .zip(prom)
            .filter_map(|(p, value)| (value >= min_prominence).then_some(p))
            .collect();
    }
    peaks
}

/// Heartbeat peaks in a bandpassed PPG waveform.
///
/// Returns an empty set when nothing qualifies; callers decide whether that is an error.
pub fn detect_heartbeats(filtered: &TimeSeries, cfg: &PeakConfig) -> PeakSet {
    let Some(max) = filtered.max() else {
        return PeakSet::default();
    };
    let criteria = PeakCriteria {
        height: None,
        distance: Some(cfg.min_distance_samples(filtered.fs)),
        prominence: Some(max * cfg.prominence_ratio),
    };
    PeakSet::from_indices(find_peaks(&filtered.data, &criteria))
}

/// Bandpass then detect; an empty result becomes [`PipelineError::NoPeaksDetected`].
pub fn heartbeat_peaks(
    raw: &TimeSeries,
    filter: &FilterConfig,
    peaks: &PeakConfig,
) -> Result<PeakSet> {
    let filtered = bandpass(raw, filter)?;
    let detected = detect_heartbeats(&filtered, peaks);
    if detected.is_empty() {
        return Err(PipelineError::NoPeaksDetected);
    }
    Ok(detected)
}

/// Raw PPG to heart-rate samples in one shot.
pub fn run_heart_rate_pipeline(
    raw: &TimeSeries,
    filter: &FilterConfig,
    peaks: &PeakConfig,
    limits: &HeartRateLimits,
) -> Result<HeartRatePipelineResult> {
    let detected = heartbeat_peaks(raw, filter, peaks)?;
    let heart_rate = estimate_heart_rate(&detected, raw.fs, limits);
    if heart_rate.is_empty() {
        return Err(PipelineError::NoValidHeartRate);
    }
    Ok(HeartRatePipelineResult {
        fs: raw.fs,
        sample_count: raw.len(),
        rr: RRSeries::from_peaks(&detected, raw.fs),
        peaks: detected,
        heart_rate,
    })
}

/// Mean plausible RR interval (seconds) of a baseline recording.
pub fn resting_rr_interval(
    raw: &TimeSeries,
    filter: &FilterConfig,
    peaks: &PeakConfig,
    limits: &HeartRateLimits,
) -> Result<f64> {
    let detected = heartbeat_peaks(raw, filter, peaks)?;
    let rr = RRSeries::from_peaks(&detected, raw.fs);
    let valid: Vec<f64> = rr
        .rr
        .into_iter()
        .filter(|&v| v >= limits.min_rr_s && v <= limits.max_rr_s)
        .collect();
    RRSeries { rr: valid }
        .mean()
        .ok_or(PipelineError::NoValidHeartRate)
}

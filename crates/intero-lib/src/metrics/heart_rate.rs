use crate::config::HeartRateLimits;
use crate::signal::PeakSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrSample {
    /// Sample index of the peak this value is paired with.
    pub peak_index: usize,
    pub bpm: f64,
}

/// Instantaneous heart rate from successive peaks.
///
/// RR intervals outside `[min_rr_s, max_rr_s]` are dropped first, then
/// rates outside `[min_bpm, max_bpm]`. The i-th surviving rate is paired
/// with the i-th detected peak, so the result may be empty.
pub fn estimate_heart_rate(peaks: &PeakSet, fs: f64, limits: &HeartRateLimits) -> Vec<HrSample> {
    let bpm = peaks
        .indices
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64 / fs)
        .filter(|rr| (limits.min_rr_s..=limits.max_rr_s).contains(rr))
        .map(|rr| 60.0 / rr)
        .filter(|hr| (limits.min_bpm..=limits.max_bpm).contains(hr));
    peaks
        .indices
        .iter()
        .zip(bpm)
        .map(|(&peak_index, bpm)| HrSample { peak_index, bpm })
        .collect()
}

/// Mean of the rates, or `None` when there are none.
pub fn mean_bpm(samples: &[HrSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().map(|s| s.bpm).sum::<f64>() / samples.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn converts_intervals_to_bpm() {
        let peaks = PeakSet::from_indices(vec![0, 100, 180, 260]);
        let hr = estimate_heart_rate(&peaks, 100.0, &HeartRateLimits::default());
        assert_eq!(hr.len(), 3);
        assert_eq!(hr[0], HrSample { peak_index: 0, bpm: 60.0 });
        assert!((hr[1].bpm - 75.0).abs() < 1e-9);
        assert_eq!(hr[2].peak_index, 180);
        assert!((mean_bpm(&hr).unwrap() - 70.0).abs() < 1e-9);
    }

    #[test]
    fn implausible_intervals_are_dropped_and_pairing_shifts() {
        // 0.2 s and 2.0 s gaps fall outside the RR limits.
        let peaks = PeakSet::from_indices(vec![0, 20, 120, 320, 400]);
        let hr = estimate_heart_rate(&peaks, 100.0, &HeartRateLimits::default());
        let bpm: Vec<f64> = hr.iter().map(|s| s.bpm).collect();
        assert_eq!(bpm, vec![60.0, 75.0]);
        assert_eq!(hr[0].peak_index, 0);
        assert_eq!(hr[1].peak_index, 20);
    }

    #[test]
    fn empty_when_nothing_survives() {
        let single = PeakSet::from_indices(vec![42]);
        assert!(estimate_heart_rate(&single, 100.0, &HeartRateLimits::default()).is_empty());
        let too_fast = PeakSet::from_indices(vec![0, 10, 20, 30]);
        assert!(estimate_heart_rate(&too_fast, 100.0, &HeartRateLimits::default()).is_empty());
        assert_eq!(mean_bpm(&[]), None);
    }

    #[test]
    fn retained_values_respect_limits() {
        let limits = HeartRateLimits::default();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let mut idx = 0usize;
            let mut indices = vec![idx];
            for _ in 0..30 {
                idx += rng.gen_range(5..250);
                indices.push(idx);
            }
            let hr = estimate_heart_rate(&PeakSet::from_indices(indices), 100.0, &limits);
            for s in hr {
                assert!(s.bpm >= limits.min_bpm && s.bpm <= limits.max_bpm);
                let rr = 60.0 / s.bpm;
                assert!(rr >= limits.min_rr_s - 1e-12 && rr <= limits.max_rr_s + 1e-12);
            }
        }
    }
}

use crate::config::BeatCountConfig;
use crate::detectors::ppg::{find_peaks, PeakCriteria};
use crate::error::{PipelineError, Result};
use crate::signal::StampedSeries;
use serde::{Deserialize, Serialize};

/// Counts heartbeats of a time-stamped recording inside arbitrary windows.
///
/// Peaks are picked once over the whole recording (local maxima at or above
/// the height threshold, no refractory distance), so a beat sitting on a
/// window edge is judged by its full neighbourhood.
#[derive(Debug, Clone)]
pub struct WindowedBeatCounter<'a> {
    series: &'a StampedSeries,
    peak_times: Vec<f64>,
}

impl<'a> WindowedBeatCounter<'a> {
    pub fn new(series: &'a StampedSeries, cfg: &BeatCountConfig) -> Self {
        let criteria = PeakCriteria {
            height: Some(cfg.height_threshold),
            ..PeakCriteria::default()
        };
        let peak_times = find_peaks(&series.data, &criteria)
            .into_iter()
            .map(|i| series.time[i])
            .collect();
        Self { series, peak_times }
    }

    pub fn series(&self) -> &StampedSeries {
        self.series
    }

    pub fn peak_times(&self) -> &[f64] {
        &self.peak_times
    }

    /// Peaks with `start <= t < end`.
    pub fn count(&self, start: f64, end: f64) -> usize {
        let lo = self.peak_times.partition_point(|&t| t < start);
        let hi = self.peak_times.partition_point(|&t| t < end);
        hi.saturating_sub(lo)
    }

    /// Mean amplitude of the samples inside the window.
    pub fn window_mean(&self, start: f64, end: f64) -> Option<f64> {
        let window = &self.series.data[self.series.window(start, end)];
        if window.is_empty() {
            return None;
        }
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }

    /// Amplitude of the sample closest in time to `t`; earlier sample wins ties.
    pub fn nearest_sample(&self, t: f64) -> Option<f64> {
        let time = &self.series.time;
        if time.is_empty() {
            return None;
        }
        let right = time.partition_point(|&x| x < t);
        let idx = match right {
            0 => 0,
            r if r == time.len() => r - 1,
            r if (time[r] - t) < (t - time[r - 1]) => r,
            r => r - 1,
        };
        Some(self.series.data[idx])
    }

    /// Beat count and amplitude summary for one trial window.
    pub fn score_window(&self, start: f64, end: f64, reported: Option<f64>) -> Result<WindowScore> {
        let recorded = self.count(start, end);
        if recorded == 0 {
            return Err(PipelineError::NoRecordedBeats { start, end });
        }
        Ok(WindowScore {
            recorded,
            reported,
            accuracy: reported.and_then(|r| interoceptive_accuracy(r, recorded)),
            window_mean: self.window_mean(start, end),
            value_at_start: self.nearest_sample(start),
        })
    }
}

/// Per-window result of [`WindowedBeatCounter::score_window`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowScore {
    pub recorded: usize,
    pub reported: Option<f64>,
    pub accuracy: Option<f64>,
    pub window_mean: Option<f64>,
    pub value_at_start: Option<f64>,
}

/// `1 - |reported - recorded| / recorded`; `None` when nothing was recorded.
pub fn interoceptive_accuracy(reported: f64, recorded: usize) -> Option<f64> {
    if recorded == 0 || !reported.is_finite() {
        return None;
    }
    let recorded = recorded as f64;
    Some(1.0 - (reported - recorded).abs() / recorded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    /// 1.2 Hz sine sampled at 50 Hz for 10 s; crests at t = (0.25 + k) / 1.2.
    fn pulse_series() -> StampedSeries {
        let fs = 50.0;
        StampedSeries::from_pairs(
            (0..500)
                .map(|i| {
                    let t = i as f64 / fs;
                    (t, (2.0 * PI * 1.2 * t).sin())
                })
                .collect(),
        )
    }

    #[test]
    fn counts_beats_in_half_open_window() {
        let series = pulse_series();
        let counter = WindowedBeatCounter::new(&series, &BeatCountConfig::default());
        assert_eq!(counter.peak_times().len(), 12);
        assert_eq!(counter.count(0.0, 10.0), 12);
        assert_eq!(counter.count(2.0, 7.0), 6);
        let first = counter.peak_times()[0];
        assert_eq!(counter.count(first, first + 0.1), 1);
        assert_eq!(counter.count(first - 0.1, first), 0);
        assert_eq!(counter.count(7.0, 2.0), 0);
    }

    #[test]
    fn threshold_excludes_low_maxima() {
        let series = StampedSeries::from_pairs(vec![
            (0.0, 0.0),
            (0.1, -0.2),
            (0.2, -0.1),
            (0.3, -0.3),
            (0.4, 0.5),
            (0.5, 0.0),
        ]);
        let counter = WindowedBeatCounter::new(&series, &BeatCountConfig::default());
        assert_eq!(counter.peak_times(), &[0.4]);
        let lenient = WindowedBeatCounter::new(
            &series,
            &BeatCountConfig {
                height_threshold: -1.0,
            },
        );
        assert_eq!(lenient.peak_times(), &[0.2, 0.4]);
    }

    #[test]
    fn accuracy_matches_reported_counts() {
        assert_eq!(interoceptive_accuracy(10.0, 10), Some(1.0));
        assert_eq!(interoceptive_accuracy(8.0, 10), Some(0.8));
        assert_eq!(interoceptive_accuracy(12.0, 10), Some(0.8));
        assert_eq!(interoceptive_accuracy(5.0, 0), None);
        assert_eq!(interoceptive_accuracy(f64::NAN, 4), None);
    }

    #[test]
    fn empty_window_is_a_soft_skip() {
        let series = pulse_series();
        let counter = WindowedBeatCounter::new(&series, &BeatCountConfig::default());
        let err = counter.score_window(20.0, 30.0, Some(3.0)).unwrap_err();
        assert!(err.is_soft());
        assert!(matches!(err, PipelineError::NoRecordedBeats { .. }));
    }

    #[test]
    fn window_score_reports_amplitudes() {
        let series = StampedSeries::from_pairs(vec![
            (0.0, 0.0),
            (1.0, 2.0),
            (2.0, 0.0),
            (3.0, 4.0),
            (4.0, 0.0),
        ]);
        let counter = WindowedBeatCounter::new(&series, &BeatCountConfig::default());
        let score = counter.score_window(0.9, 4.0, None).unwrap();
        assert_eq!(score.recorded, 2);
        assert_eq!(score.accuracy, None);
        assert_eq!(score.window_mean, Some(2.0));
        assert_eq!(score.value_at_start, Some(2.0));
        assert_eq!(counter.nearest_sample(2.5), Some(0.0));
        assert_eq!(counter.nearest_sample(-5.0), Some(0.0));
        assert_eq!(counter.nearest_sample(99.0), Some(0.0));
        let scored = counter.score_window(0.0, 5.0, Some(1.0)).unwrap();
        assert_eq!(scored.accuracy, Some(0.5));
    }
}

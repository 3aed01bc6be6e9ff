use serde::{Deserialize, Serialize};

/// Basic typed time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn new(fs: f64, data: Vec<f64>) -> Self {
        Self { fs, data }
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }
    /// Largest sample value, or `None` for an empty series.
    pub fn max(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::max)
    }
}

/// Samples paired with explicit timestamps (seconds), sorted by time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampedSeries {
    pub time: Vec<f64>,
    pub data: Vec<f64>,
}

impl StampedSeries {
    /// Build from unsorted pairs; samples are reordered by timestamp.
    pub fn from_pairs(mut pairs: Vec<(f64, f64)>) -> Self {
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (time, data) = pairs.into_iter().unzip();
        Self { time, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Index range of samples with `start <= t < end`.
    pub fn window(&self, start: f64, end: f64) -> std::ops::Range<usize> {
        let lo = self.time.partition_point(|&t| t < start);
        let hi = self.time.partition_point(|&t| t < end).max(lo);
        lo..hi
    }
}

/// Strictly increasing sample indices of detected heartbeats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakSet {
    pub indices: Vec<usize>,
}

impl PeakSet {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }
    pub fn len(&self) -> usize {
        self.indices.len()
    }
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// RR intervals (seconds)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    pub fn from_peaks(peaks: &PeakSet, fs: f64) -> Self {
        let mut rr = Vec::new();
        for w in peaks.indices.windows(2) {
            let dt = (w[1] as f64 - w[0] as f64) / fs;
            rr.push(dt);
        }
        Self { rr }
    }

    pub fn mean(&self) -> Option<f64> {
        if self.rr.is_empty() {
            None
        } else {
            Some(self.rr.iter().sum::<f64>() / self.rr.len() as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rr_from_peaks_uses_sample_rate() {
        let peaks = PeakSet::from_indices(vec![10, 110, 190]);
        let rr = RRSeries::from_peaks(&peaks, 100.0);
        assert_eq!(rr.rr, vec![1.0, 0.8]);
        assert!((rr.mean().unwrap() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn stamped_window_is_half_open() {
        let series = StampedSeries::from_pairs(vec![(0.3, 3.0), (0.1, 1.0), (0.2, 2.0), (0.4, 4.0)]);
        assert_eq!(series.data, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(series.window(0.2, 0.4), 1..3);
        assert_eq!(series.window(0.5, 0.9), 4..4);
        assert_eq!(series.window(0.4, 0.1), 3..3);
    }
}

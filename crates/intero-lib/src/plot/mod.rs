use crate::sensitivity::{GaussianParams, SyncCurve};
use crate::signal::{PeakSet, TimeSeries};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Unconnected markers; `style.width` is the marker radius.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatterSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Scatter(ScatterSeries),
}

impl Series {
    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
            Series::Scatter(scatter) => &scatter.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over finite points; `None` for an empty figure.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut finite = self
            .series
            .iter()
            .flat_map(|s| s.points().iter())
            .filter(|p| p[0].is_finite() && p[1].is_finite());
        let first = finite.next()?;
        Some(finite.fold(
            (first[0], first[0], first[1], first[1]),
            |(x0, x1, y0, y1), p| (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1])),
        ))
    }
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

/// Filtered waveform with detected beats marked on top.
pub fn figure_from_peaks(series: &TimeSeries, peaks: &PeakSet, max_points: usize) -> Figure {
    let fs = series.fs;
    let points: Vec<[f64; 2]> = series
        .data
        .iter()
        .enumerate()
        .map(|(i, value)| [i as f64 / fs, *value])
        .collect();
    let markers: Vec<[f64; 2]> = peaks
        .indices
        .iter()
        .filter_map(|&i| series.data.get(i).map(|v| [i as f64 / fs, *v]))
        .collect();
    let mut fig = Figure::new(Some("Filtered PPG".into()));
    fig.x.label = Some("time (s)".into());
    fig.y.label = Some("amplitude".into());
    fig.add_series(Series::Line(LineSeries {
        name: "PPG".into(),
        points: decimate_points(&points, max_points),
        style: Style {
            width: 1.4,
            color: Color(0x1F77B4),
        },
    }));
    fig.add_series(Series::Scatter(ScatterSeries {
        name: "peaks".into(),
        points: markers,
        style: Style {
            width: 3.0,
            color: Color(0xD62728),
        },
    }));
    fig
}

/// Synchrony ratios with the fitted Gaussian sampled across their delay range.
pub fn figure_from_sync_curve(curve: &SyncCurve, fit: Option<&GaussianParams>) -> Figure {
    let mut fig = Figure::new(Some("Synchrony curve".into()));
    fig.x.label = Some(if curve.normalized {
        "delay / resting RRI".into()
    } else {
        "delay (ms)".into()
    });
    fig.y.label = Some("sync ratio".into());
    let points: Vec<[f64; 2]> = curve
        .points
        .iter()
        .map(|p| [p.normalized_delay, p.mean_response])
        .collect();

    if let (Some(params), Some(bounds)) = (fit, span(&points)) {
        const SAMPLES: usize = 200;
        let (lo, hi) = bounds;
        let step = (hi - lo) / (SAMPLES - 1) as f64;
        let line = (0..SAMPLES)
            .map(|i| {
                let x = lo + i as f64 * step;
                [x, params.eval(x)]
            })
            .collect();
        fig.add_series(Series::Line(LineSeries {
            name: "gaussian fit".into(),
            points: line,
            style: Style {
                width: 2.0,
                color: Color(0xFF0077),
            },
        }));
    }
    fig.add_series(Series::Scatter(ScatterSeries {
        name: "sync ratio".into(),
        points,
        style: Style {
            width: 4.0,
            color: Color(0x2CA02C),
        },
    }));
    fig
}

fn span(points: &[[f64; 2]]) -> Option<(f64, f64)> {
    let lo = points.iter().map(|p| p[0]).reduce(f64::min)?;
    let hi = points.iter().map(|p| p[0]).reduce(f64::max)?;
    (hi > lo).then_some((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensitivity::SyncRatioPoint;

    #[test]
    fn decimation_caps_point_count() {
        let points: Vec<[f64; 2]> = (0..1000).map(|i| [i as f64, 0.0]).collect();
        assert_eq!(decimate_points(&points, 100).len(), 100);
        assert_eq!(decimate_points(&points[..10], 100).len(), 10);
    }

    #[test]
    fn sync_figure_has_fit_and_markers() {
        let curve = SyncCurve {
            points: vec![
                SyncRatioPoint {
                    normalized_delay: 0.0,
                    mean_response: 0.2,
                },
                SyncRatioPoint {
                    normalized_delay: 0.4,
                    mean_response: 0.8,
                },
            ],
            normalized: true,
            mirrored: false,
        };
        let params = GaussianParams {
            amplitude: 0.6,
            mean: 0.4,
            sigma: 0.1,
            offset: 0.2,
        };
        let fig = figure_from_sync_curve(&curve, Some(&params));
        assert_eq!(fig.series.len(), 2);
        assert!(matches!(fig.series[0], Series::Line(_)));
        assert_eq!(fig.series[0].points().len(), 200);
        let (x0, x1, y0, y1) = fig.bounds().unwrap();
        assert_eq!(x0, 0.0);
        assert!((x1 - 0.4).abs() < 1e-12);
        assert!(y0 >= 0.2 - 1e-9 && y1 <= 0.8 + 1e-9);
        assert_eq!(figure_from_sync_curve(&curve, None).series.len(), 1);
    }

    #[test]
    fn peak_markers_follow_samples() {
        let ts = TimeSeries::new(10.0, vec![0.0, 1.0, 0.0, 2.0, 0.0]);
        let fig = figure_from_peaks(&ts, &PeakSet::from_indices(vec![1, 3, 9]), 1024);
        assert_eq!(fig.series[1].points(), &[[0.1, 1.0], [0.3, 2.0]]);
        assert_eq!(Color(0x102030).rgb(), (0x10, 0x20, 0x30));
    }
}

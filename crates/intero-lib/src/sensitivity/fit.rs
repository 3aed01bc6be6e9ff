//! Bounded least-squares fit of a Gaussian bump to a synchrony curve.
//!
//! The optimizer is a projected Levenberg-Marquardt iteration with
//! Marquardt (diagonal) damping: every trial step is clipped into the
//! parameter box before its cost is evaluated. The starting point is a pure
//! function of the data and [`FitConfig`], so repeated fits are identical.
//! A stopped iteration only counts as a fit when the undamped Jacobian at the
//! solution has full rank.

use super::curve::SyncRatioPoint;
use crate::config::FitConfig;
use crate::error::{PipelineError, Result};
use log::debug;
use nalgebra::{DMatrix, Matrix4, Vector4};
use serde::{Deserialize, Serialize};

/// Points that must be distinct in x before four parameters are identifiable.
pub const MIN_DISTINCT_POINTS: usize = 4;

const SIGMA_FLOOR: f64 = 1e-6;
const LOWER: [f64; 4] = [0.0, 0.0, SIGMA_FLOOR, -1.0];
const UPPER: [f64; 4] = [1.0, 1.0, 1.0, 1.0];
const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e12;
const COST_FLOOR: f64 = 1e-24;
const STEP_TOL: f64 = 1e-12;
/// Smallest Jacobian singular value, relative to the largest, of a usable fit.
const RANK_TOL: f64 = 1e-6;

/// `f(x) = amplitude * exp(-(x - mean)^2 / (2 sigma^2)) + offset`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianParams {
    pub amplitude: f64,
    pub mean: f64,
    pub sigma: f64,
    pub offset: f64,
}

impl GaussianParams {
    fn from_array(p: [f64; 4]) -> Self {
        Self {
            amplitude: p[0],
            mean: p[1],
            sigma: p[2],
            offset: p[3],
        }
    }

    fn to_vector(self) -> Vector4<f64> {
        Vector4::new(self.amplitude, self.mean, self.sigma, self.offset)
    }

    pub fn eval(&self, x: f64) -> f64 {
        let d = x - self.mean;
        self.amplitude * (-(d * d) / (2.0 * self.sigma * self.sigma)).exp() + self.offset
    }

    /// Partial derivatives with respect to (amplitude, mean, sigma, offset).
    fn gradient(&self, x: f64) -> [f64; 4] {
        let d = x - self.mean;
        let s2 = self.sigma * self.sigma;
        let e = (-(d * d) / (2.0 * s2)).exp();
        let ae = self.amplitude * e;
        [e, ae * d / s2, ae * d * d / (s2 * self.sigma), 1.0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianFit {
    pub params: GaussianParams,
    pub iterations: usize,
    /// Half the residual sum of squares at the solution.
    pub cost: f64,
}

fn project(p: Vector4<f64>) -> [f64; 4] {
    let mut out: [f64; 4] = p.into();
    for (i, v) in out.iter_mut().enumerate() {
        *v = v.clamp(LOWER[i], UPPER[i]);
    }
    out
}

fn cost(params: &GaussianParams, xs: &[f64], ys: &[f64]) -> f64 {
    0.5 * xs
        .iter()
        .zip(ys)
        .map(|(&x, &y)| (params.eval(x) - y).powi(2))
        .sum::<f64>()
}

/// Data-derived starting point: span, delay of the highest ratio (earliest
/// on ties), configured width, floor.
pub fn initial_guess(points: &[SyncRatioPoint], cfg: &FitConfig) -> GaussianParams {
    let (lo, hi) = points
        .iter()
        .map(|p| p.mean_response)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| {
            (lo.min(y), hi.max(y))
        });
    let peak = points
        .iter()
        .filter(|p| p.mean_response == hi)
        .map(|p| p.normalized_delay)
        .fold(f64::INFINITY, f64::min);
    GaussianParams::from_array(project(Vector4::new(hi - lo, peak, cfg.initial_sigma, lo)))
}

/// Check the curve carries enough information for a four-parameter fit.
fn check_fittable(points: &[SyncRatioPoint]) -> Result<()> {
    if points.is_empty() {
        return Err(PipelineError::DegenerateCurve("no synchrony points".into()));
    }
    if points
        .iter()
        .any(|p| !p.normalized_delay.is_finite() || !p.mean_response.is_finite())
    {
        return Err(PipelineError::DegenerateCurve(
            "non-finite synchrony point".into(),
        ));
    }
    let first = points[0].mean_response;
    if points.iter().all(|p| p.mean_response == first) {
        return Err(PipelineError::DegenerateCurve(format!(
            "all synchrony ratios equal {}",
            first
        )));
    }
    let mut xs: Vec<f64> = points.iter().map(|p| p.normalized_delay).collect();
    xs.sort_by(f64::total_cmp);
    xs.dedup();
    if xs.len() < MIN_DISTINCT_POINTS {
        return Err(PipelineError::DegenerateCurve(format!(
            "{} distinct delays; at least {} required",
            xs.len(),
            MIN_DISTINCT_POINTS
        )));
    }
    Ok(())
}

/// Reject a solution at which some parameter no longer moves the model.
fn check_identifiable(params: &GaussianParams, xs: &[f64]) -> Result<()> {
    let jacobian = DMatrix::from_fn(xs.len(), 4, |row, col| params.gradient(xs[row])[col]);
    let singular = jacobian.singular_values();
    let (largest, smallest) = (singular.max(), singular.min());
    if smallest.is_finite() && smallest > RANK_TOL * largest {
        return Ok(());
    }
    Err(PipelineError::FitNonConvergence(format!(
        "rank-deficient Jacobian at the solution (singular values {:.3e}..{:.3e})",
        smallest, largest
    )))
}

/// Fit a bounded Gaussian to the synchrony points.
///
/// Flat, empty or under-determined curves are rejected with
/// [`PipelineError::DegenerateCurve`] before any iteration runs. Running out of
/// iterations, a singular normal matrix, or a solution where the data no
/// longer constrain every parameter yields [`PipelineError::FitNonConvergence`].
pub fn fit_gaussian(points: &[SyncRatioPoint], cfg: &FitConfig) -> Result<GaussianFit> {
    check_fittable(points)?;
    let xs: Vec<f64> = points.iter().map(|p| p.normalized_delay).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.mean_response).collect();

    let mut params = initial_guess(points, cfg);
    let mut current = cost(&params, &xs, &ys);
    let mut lambda = LAMBDA_START;

    for iteration in 1..=cfg.max_iterations {
        let done = |params: GaussianParams, cost: f64, reason: &str| -> Result<GaussianFit> {
            debug!(
                "gaussian fit stopped after {} iterations ({}), cost {:.3e}",
                iteration, reason, cost
            );
            check_identifiable(&params, &xs)?;
            Ok(GaussianFit {
                params,
                iterations: iteration,
                cost,
            })
        };
        if current < COST_FLOOR {
            return done(params, current, "exact");
        }

        let mut jtj = Matrix4::<f64>::zeros();
        let mut jtr = Vector4::<f64>::zeros();
        for (&x, &y) in xs.iter().zip(&ys) {
            let g = Vector4::from(params.gradient(x));
            jtj += g * g.transpose();
            jtr += g * (params.eval(x) - y);
        }

        loop {
            let mut damped = jtj;
            for i in 0..4 {
                damped[(i, i)] += lambda * jtj[(i, i)].max(LAMBDA_MIN);
            }
            let step = damped
                .lu()
                .solve(&-jtr)
                .filter(|s| s.iter().all(|v| v.is_finite()))
                .ok_or_else(|| {
                    PipelineError::FitNonConvergence(format!(
                        "singular normal equations at iteration {}",
                        iteration
                    ))
                })?;

            let p = params.to_vector();
            let trial = project(p + step);
            let moved = (Vector4::from(trial) - p).norm();
            if moved <= STEP_TOL * (p.norm() + STEP_TOL) {
                return done(params, current, "step");
            }

            let candidate = GaussianParams::from_array(trial);
            let next = cost(&candidate, &xs, &ys);
            if next < current {
                let reduction = (current - next) / current;
                params = candidate;
                current = next;
                lambda = (lambda / 10.0).max(LAMBDA_MIN);
                if reduction <= cfg.tolerance {
                    return done(params, current, "cost");
                }
                break;
            }
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                return done(params, current, "stationary");
            }
        }
    }

    Err(PipelineError::FitNonConvergence(format!(
        "no convergence within {} iterations",
        cfg.max_iterations
    )))
}

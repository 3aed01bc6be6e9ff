//! Zero-phase IIR bandpass filtering.
//!
//! The filter is designed as a Chebyshev Type II prototype (flat passband,
//! equiripple stopband), mapped to a bandpass, discretized with the bilinear
//! transform and realized as a cascade of second-order sections. Filtering
//! runs the cascade forward and backward over an odd-extended copy of the
//! signal, so the output has no phase shift and the same length as the input.

use crate::config::FilterConfig;
use crate::error::{PipelineError, Result};
use crate::signal::TimeSeries;
use num_complex::Complex64;
use std::f64::consts::PI;

const ROOT_EPS: f64 = 1e-10;

/// One second-order section, `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
}

impl Biquad {
    pub fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self { b, a }
    }

    pub fn numerator(&self) -> &[f64; 3] {
        &self.b
    }

    pub fn denominator(&self) -> &[f64; 2] {
        &self.a
    }

    /// Poles inside the unit circle.
    pub fn is_stable(&self) -> bool {
        self.a[1].abs() < 1.0 && self.a[0].abs() < 1.0 + self.a[1]
    }

    fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (1.0 + self.a[0] + self.a[1])
    }

    /// Direct Form II Transposed state after settling on a unit step.
    fn step_state(&self) -> [f64; 2] {
        let y = self.dc_gain();
        let s2 = self.b[2] - self.a[1] * y;
        let s1 = self.b[1] - self.a[0] * y + s2;
        [s1, s2]
    }

    fn run(&self, data: &mut [f64], mut state: [f64; 2]) {
        for x in data.iter_mut() {
            let input = *x;
            let output = self.b[0] * input + state[0];
            state[0] = self.b[1] * input - self.a[0] * output + state[1];
            state[1] = self.b[2] * input - self.a[1] * output;
            *x = output;
        }
    }

    fn response(&self, z_inv: Complex64) -> Complex64 {
        let z_inv2 = z_inv * z_inv;
        let num = self.b[0] + self.b[1] * z_inv + self.b[2] * z_inv2;
        let den = 1.0 + self.a[0] * z_inv + self.a[1] * z_inv2;
        num / den
    }
}

/// Cascade of biquads designed for a single frequency band.
#[derive(Debug, Clone)]
pub struct BandpassFilter {
    sections: Vec<Biquad>,
}

impl BandpassFilter {
    /// Design a Chebyshev Type II bandpass with stopband edges `low_hz`/`high_hz`.
    pub fn chebyshev2(
        order: usize,
        stopband_db: f64,
        low_hz: f64,
        high_hz: f64,
        sample_rate: f64,
    ) -> Result<Self> {
        if order == 0 {
            return Err(PipelineError::FilterDesign("order must be at least 1".into()));
        }
        if stopband_db.is_nan() || stopband_db <= 0.0 {
            return Err(PipelineError::FilterDesign(format!(
                "stopband attenuation must be positive, got {} dB",
                stopband_db
            )));
        }
        if sample_rate.is_nan() || sample_rate <= 0.0 {
            return Err(PipelineError::FilterDesign(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }
        let nyquist = sample_rate / 2.0;
        if low_hz.is_nan() || low_hz <= 0.0 || low_hz >= high_hz || high_hz >= nyquist {
            return Err(PipelineError::FilterDesign(format!(
                "band [{}, {}] Hz is not inside (0, {}) Hz",
                low_hz, high_hz, nyquist
            )));
        }

        let (zeros, poles, gain) = chebyshev2_prototype(order, stopband_db);
        let w_low = prewarp(low_hz, sample_rate);
        let w_high = prewarp(high_hz, sample_rate);
        let centre = (w_low * w_high).sqrt();
        let (zeros, poles, gain) = lowpass_to_bandpass(&zeros, &poles, gain, centre, w_high - w_low);
        let (zeros, poles, gain) = bilinear(&zeros, &poles, gain, sample_rate);
        let sections = pair_sections(&zeros, &poles, gain);

        let filter = Self { sections };
        if !filter.is_stable() {
            return Err(PipelineError::FilterDesign(
                "designed filter has poles outside the unit circle".into(),
            ));
        }
        Ok(filter)
    }

    /// Design from the pipeline settings.
    pub fn from_config(cfg: &FilterConfig, sample_rate: f64) -> Result<Self> {
        Self::chebyshev2(cfg.order, cfg.stopband_db, cfg.low_hz, cfg.high_hz, sample_rate)
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    pub fn is_stable(&self) -> bool {
        self.sections.iter().all(Biquad::is_stable)
    }

    /// Edge padding used by [`filtfilt`](Self::filtfilt); the signal must be longer.
    pub fn padlen(&self) -> usize {
        let b2_zero = self.sections.iter().filter(|s| s.b[2] == 0.0).count();
        let a2_zero = self.sections.iter().filter(|s| s.a[1] == 0.0).count();
        3 * (2 * self.sections.len() + 1 - b2_zero.min(a2_zero))
    }

    /// Magnitude of the frequency response at `freq_hz`.
    pub fn magnitude_at(&self, freq_hz: f64, sample_rate: f64) -> f64 {
        let omega = 2.0 * PI * freq_hz / sample_rate;
        let z_inv = Complex64::new(omega.cos(), -omega.sin());
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(z_inv))
            .norm()
    }

    /// Single causal pass with every section starting at its settled state for `x0`.
    fn forward(&self, data: &mut [f64], initial: &[[f64; 2]], x0: f64) {
        for (section, zi) in self.sections.iter().zip(initial) {
            section.run(data, [zi[0] * x0, zi[1] * x0]);
        }
    }

    /// Settled state of each section for a unit step at the cascade input.
    fn steady_state(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        let mut states = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            let zi = section.step_state();
            states.push([zi[0] * scale, zi[1] * scale]);
            scale *= section.dc_gain();
        }
        states
    }

    /// Forward-backward filtering; output length equals input length.
    pub fn filtfilt(&self, data: &[f64]) -> Result<Vec<f64>> {
        let padlen = self.padlen();
        if data.len() <= padlen {
            return Err(PipelineError::InsufficientSamples {
                len: data.len(),
                required: padlen,
            });
        }
        let initial = self.steady_state();
        let mut ext = odd_extend(data, padlen);

        let x0 = ext[0];
        self.forward(&mut ext, &initial, x0);
        ext.reverse();
        let y0 = ext[0];
        self.forward(&mut ext, &initial, y0);
        ext.reverse();

        Ok(ext[padlen..padlen + data.len()].to_vec())
    }
}

/// Bandpass a raw recording into the cardiac band.
pub fn bandpass(ts: &TimeSeries, cfg: &FilterConfig) -> Result<TimeSeries> {
    let filter = BandpassFilter::from_config(cfg, ts.fs)?;
    let data = filter.filtfilt(&ts.data)?;
    Ok(TimeSeries { fs: ts.fs, data })
}

fn odd_extend(data: &[f64], padlen: usize) -> Vec<f64> {
    let n = data.len();
    let first = data[0];
    let last = data[n - 1];
    let mut out = Vec::with_capacity(n + 2 * padlen);
    out.extend((1..=padlen).rev().map(|i| 2.0 * first - data[i]));
    out.extend_from_slice(data);
    out.extend((1..=padlen).map(|i| 2.0 * last - data[n - 1 - i]));
    out
}

/// Pre-warp frequency for bilinear transform.
fn prewarp(freq_hz: f64, sample_rate: f64) -> f64 {
    2.0 * sample_rate * (PI * freq_hz / sample_rate).tan()
}

/// Analog Chebyshev Type II lowpass prototype with stopband edge at 1 rad/s.
fn chebyshev2_prototype(order: usize, stopband_db: f64) -> (Vec<Complex64>, Vec<Complex64>, f64) {
    let n = order as i64;
    let de = 1.0 / (10f64.powf(0.1 * stopband_db) - 1.0).sqrt();
    let mu = (1.0 / de).asinh() / order as f64;

    let zeros: Vec<Complex64> = (-n + 1..n)
        .step_by(2)
        .filter(|&m| m != 0)
        .map(|m| {
            let theta = m as f64 * PI / (2.0 * order as f64);
            Complex64::new(0.0, 1.0 / theta.sin())
        })
        .collect();

    let poles: Vec<Complex64> = (-n + 1..n)
        .step_by(2)
        .map(|m| {
            let theta = m as f64 * PI / (2.0 * order as f64);
            let p = -Complex64::new(theta.cos(), theta.sin());
            Complex64::new(mu.sinh() * p.re, mu.cosh() * p.im).inv()
        })
        .collect();

    let num: Complex64 = poles.iter().map(|&p| -p).product();
    let den: Complex64 = zeros.iter().map(|&z| -z).product();
    (zeros, poles, (num / den).re)
}

fn lowpass_to_bandpass(
    zeros: &[Complex64],
    poles: &[Complex64],
    gain: f64,
    centre: f64,
    bandwidth: f64,
) -> (Vec<Complex64>, Vec<Complex64>, f64) {
    let degree = poles.len() - zeros.len();
    let transform = |roots: &[Complex64]| -> Vec<Complex64> {
        let scaled: Vec<Complex64> = roots.iter().map(|&r| r * (bandwidth / 2.0)).collect();
        let upper = scaled.iter().map(|&r| r + (r * r - centre * centre).sqrt());
        let lower = scaled.iter().map(|&r| r - (r * r - centre * centre).sqrt());
        upper.chain(lower).collect()
    };
    let mut z_bp = transform(zeros);
    z_bp.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(degree));
    let p_bp = transform(poles);
    (z_bp, p_bp, gain * bandwidth.powi(degree as i32))
}

fn bilinear(
    zeros: &[Complex64],
    poles: &[Complex64],
    gain: f64,
    sample_rate: f64,
) -> (Vec<Complex64>, Vec<Complex64>, f64) {
    let fs2 = 2.0 * sample_rate;
    let degree = poles.len() - zeros.len();
    let mut z_d: Vec<Complex64> = zeros.iter().map(|&z| (fs2 + z) / (fs2 - z)).collect();
    z_d.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(degree));
    let p_d: Vec<Complex64> = poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();
    let num: Complex64 = zeros.iter().map(|&z| fs2 - z).product();
    let den: Complex64 = poles.iter().map(|&p| fs2 - p).product();
    (z_d, p_d, gain * (num / den).re)
}

/// Real second-order factor `1 + c1 z^-1 + c2 z^-2` with one representative root.
#[derive(Debug, Clone, Copy)]
struct Factor {
    coeffs: [f64; 3],
    root: Complex64,
}

/// Group conjugate pairs, then leftover real roots two at a time.
fn quadratic_factors(roots: &[Complex64]) -> Vec<Factor> {
    let mut factors: Vec<Factor> = roots
        .iter()
        .filter(|r| r.im > ROOT_EPS)
        .map(|r| Factor {
            coeffs: [1.0, -2.0 * r.re, r.norm_sqr()],
            root: *r,
        })
        .collect();
    let mut reals: Vec<f64> = roots
        .iter()
        .filter(|r| r.im.abs() <= ROOT_EPS)
        .map(|r| r.re)
        .collect();
    reals.sort_by(|a, b| b.abs().total_cmp(&a.abs()));
    for pair in reals.chunks(2) {
        let coeffs = match pair {
            [r1, r2] => [1.0, -(r1 + r2), r1 * r2],
            [r] => [1.0, -r, 0.0],
            _ => continue,
        };
        factors.push(Factor {
            coeffs,
            root: Complex64::new(pair[0], 0.0),
        });
    }
    factors
}

/// Pair every pole factor with the closest remaining zero factor.
fn pair_sections(zeros: &[Complex64], poles: &[Complex64], gain: f64) -> Vec<Biquad> {
    let mut pole_factors = quadratic_factors(poles);
    // Poles nearest the unit circle go last in the cascade.
    pole_factors.sort_by(|a, b| a.root.norm().total_cmp(&b.root.norm()));
    let mut zero_factors = quadratic_factors(zeros);

    let mut sections = Vec::with_capacity(pole_factors.len());
    for pole in pole_factors.iter().rev() {
        let nearest = zero_factors
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (a.root - pole.root)
                    .norm()
                    .total_cmp(&(b.root - pole.root).norm())
            })
            .map(|(i, _)| i);
        let b = match nearest {
            Some(i) => zero_factors.swap_remove(i).coeffs,
            None => [1.0, 0.0, 0.0],
        };
        sections.push(Biquad::new(b, [pole.coeffs[1], pole.coeffs[2]]));
    }
    sections.reverse();
    if let Some(first) = sections.first_mut() {
        for c in first.b.iter_mut() {
            *c *= gain;
        }
    }
    sections
}

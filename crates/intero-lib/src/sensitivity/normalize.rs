/// Min-max scale raw amplitudes across a cohort.
///
/// Non-finite inputs stay NaN. The member(s) sitting at the cohort minimum are
/// NaN as well, and so is everybody when fewer than two amplitudes are valid
/// or they span no range. Everything else lands in `[0, 1]`.
pub fn normalize_amplitudes(amplitudes: &[f64]) -> Vec<f64> {
    let valid = amplitudes.iter().copied().filter(|a| a.is_finite());
    let (count, min, max) = valid.fold((0usize, f64::INFINITY, f64::NEG_INFINITY), |acc, a| {
        (acc.0 + 1, acc.1.min(a), acc.2.max(a))
    });
    let range = max - min;
    if count < 2 || range <= 0.0 {
        return vec![f64::NAN; amplitudes.len()];
    }
    amplitudes
        .iter()
        .map(|&a| {
            if !a.is_finite() || a == min {
                f64::NAN
            } else {
                ((a - min) / range).clamp(0.0, 1.0)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn same(a: &[f64], b: &[f64]) -> bool {
        a.len() == b.len()
            && a
                .iter()
                .zip(b)
                .all(|(x, y)| (x.is_nan() && y.is_nan()) || (x - y).abs() < 1e-12)
    }

    #[test]
    fn scales_between_min_and_max() {
        let out = normalize_amplitudes(&[0.2, 0.6, f64::NAN, 1.0]);
        assert!(same(&out, &[f64::NAN, 0.5, f64::NAN, 1.0]));
    }

    #[test]
    fn degenerate_cohorts_are_all_nan() {
        assert!(same(&normalize_amplitudes(&[0.4]), &[f64::NAN]));
        assert!(same(
            &normalize_amplitudes(&[0.4, f64::NAN]),
            &[f64::NAN, f64::NAN]
        ));
        assert!(same(
            &normalize_amplitudes(&[0.3, 0.3, 0.3]),
            &[f64::NAN; 3]
        ));
        assert!(normalize_amplitudes(&[]).is_empty());
    }

    #[test]
    fn renormalizing_is_stable() {
        let once = [0.0, 0.3, 1.0];
        let twice = normalize_amplitudes(&once);
        assert!(same(&twice, &[f64::NAN, 0.3, 1.0]));
    }

    #[test]
    fn ties_at_minimum_are_all_nan() {
        let out = normalize_amplitudes(&[0.1, 0.1, 0.5]);
        assert!(out[0].is_nan() && out[1].is_nan());
        assert_eq!(out[2], 1.0);
    }
}

// Small statistics helpers shared by the correction and analysis passes.
//
// All helpers are total: empty input yields 0.0 rather than NaN. Finite
// input always yields a finite mean and standard deviation, even when
// intermediate sums would overflow.

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = values.iter().sum::<f64>() / values.len() as f64;
    if m.is_finite() {
        return m;
    }
    rescaled(values, mean).unwrap_or(m)
}

/// Population standard deviation, 0.0 for an empty slice
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    let sd = variance.sqrt();
    if sd.is_finite() {
        return sd;
    }
    rescaled(values, std_dev).unwrap_or(sd)
}

/// Evaluate `stat` on the values divided by their largest magnitude, then
/// scale the result back
///
/// `None` when the input holds a non-finite value or is all zeros.
fn rescaled(values: &[f64], stat: fn(&[f64]) -> f64) -> Option<f64> {
    if !values.iter().all(|v| v.is_finite()) {
        return None;
    }
    let scale = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 {
        return None;
    }
    let scaled: Vec<f64> = values.iter().map(|v| v / scale).collect();
    Some(stat(&scaled) * scale)
}

/// Non-finite values become 0.0
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Signed interval from `reference` to `frequency` in cents
///
/// Formula: cents = 1200 × log2(frequency / reference)
pub fn cents(frequency: f64, reference: f64) -> f64 {
    1200.0 * (frequency / reference).log2()
}

/// `1 - stddev/mean` clamped to [0, 1]
///
/// A zero mean is treated as 1 so silent series stay finite. An
/// unmeasurable ratio scores 0.
pub fn dispersion_score(values: &[f64]) -> f64 {
    let m = mean(values);
    let denom = if m == 0.0 { 1.0 } else { m };
    let score = 1.0 - std_dev(values) / denom;
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&values) - 5.0).abs() < 1e-12);
        assert!((std_dev(&values) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_inputs_are_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
    }

    #[test]
    fn test_cents_octave() {
        assert!((cents(440.0, 220.0) - 1200.0).abs() < 1e-9);
        assert!((cents(220.0, 440.0) + 1200.0).abs() < 1e-9);
        assert!(cents(220.0, 220.0).abs() < 1e-12);
    }

    #[test]
    fn test_dispersion_score() {
        assert_eq!(dispersion_score(&[0.6; 10]), 1.0);
        assert_eq!(dispersion_score(&[0.0; 10]), 1.0);
        assert_eq!(dispersion_score(&[0.0, 10.0]), 0.0);
    }

    #[test]
    fn test_huge_values_do_not_overflow() {
        let flat = [1e308; 10];
        assert_eq!(mean(&flat), 1e308);
        assert_eq!(std_dev(&flat), 0.0);
        assert_eq!(dispersion_score(&flat), 1.0);

        let alternating = [f64::MAX, f64::MAX / 2.0, f64::MAX, f64::MAX / 2.0];
        let m = mean(&alternating);
        let sd = std_dev(&alternating);
        assert!(m.is_finite() && sd.is_finite());
        assert!((m / f64::MAX - 0.75).abs() < 1e-12);
        assert!((sd / f64::MAX - 0.25).abs() < 1e-12);
        assert!((dispersion_score(&alternating) - 2.0 / 3.0).abs() < 1e-12);

        let mixed = [f64::MAX, -f64::MAX];
        assert_eq!(mean(&mixed), 0.0);
        assert!(std_dev(&mixed).is_finite());
    }

    #[test]
    fn test_non_finite_input_stays_non_finite() {
        assert!(mean(&[1.0, f64::INFINITY]).is_infinite());
        assert!(std_dev(&[1.0, f64::NAN]).is_nan());
        assert_eq!(dispersion_score(&[1.0, f64::NAN]), 0.0);
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        assert_eq!(finite_or_zero(-2.5), -2.5);
    }
}

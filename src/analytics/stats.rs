//! Shared statistical helpers
//!
//! Descriptive moments, Pearson correlation with its t-test, and two-tailed
//! normal p-values.

use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::config::PValueMethod;

// Abramowitz & Stegun 26.2.17 coefficients
const AS_P: f64 = 0.231_641_9;
const AS_B: [f64; 5] = [
    0.319_381_530,
    -0.356_563_782,
    1.781_477_937,
    -1.821_255_978,
    1.330_274_429,
];

/// Standard normal CDF via the Abramowitz–Stegun 26.2.17 rational
/// approximation.
///
/// Absolute error is below 7.5e-8. This is an approximation, not an exact
/// CDF: significance calls only rely on it being monotonic.
pub fn normal_cdf_approx(x: f64) -> f64 {
    if x.is_nan() {
        return 0.5;
    }
    if x < 0.0 {
        return 1.0 - normal_cdf_approx(-x);
    }

    let t = 1.0 / (1.0 + AS_P * x);
    let density = (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt();
    let poly = AS_B
        .iter()
        .rev()
        .fold(0.0, |acc, b| (acc + b) * t);

    1.0 - density * poly
}

/// Two-tailed p-value for a standard-normal z-score.
///
/// A non-finite z yields 1 for NaN (no evidence) and 0 for ±∞.
pub fn two_tailed_p_value(z: f64, method: PValueMethod) -> f64 {
    if z.is_nan() {
        return 1.0;
    }
    if z.is_infinite() {
        return 0.0;
    }

    let upper = match method {
        PValueMethod::AbramowitzStegun => 1.0 - normal_cdf_approx(z.abs()),
        PValueMethod::Exact => match Normal::new(0.0, 1.0) {
            Ok(normal) => 1.0 - normal.cdf(z.abs()),
            Err(_) => 1.0 - normal_cdf_approx(z.abs()),
        },
    };

    (2.0 * upper).clamp(0.0, 1.0)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance (divides by n)
pub fn population_variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64)
}

/// Population standard deviation over mean; `None` for fewer than two
/// points or a non-positive mean.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    if m <= 0.0 {
        return None;
    }
    Some(population_variance(values)?.sqrt() / m)
}

/// Pearson correlation; `None` when lengths differ, fewer than two points, or
/// either series is constant.
pub fn pearson_correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mx, y - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Two-tailed p-value of a correlation coefficient over `n` samples, using
/// `t = r·sqrt((n-2)/(1-r²))` with n-2 degrees of freedom.
pub fn correlation_p_value(r: f64, n: usize) -> f64 {
    if n < 3 || !r.is_finite() {
        return 1.0;
    }
    let df = (n - 2) as f64;
    let denom = 1.0 - r * r;
    if denom <= f64::EPSILON {
        return 0.0;
    }

    let t = r * (df / denom).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(err) => {
            tracing::warn!(df = df, error = %err, "Student's t distribution unavailable");
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_cdf_approx_known_values() {
        assert!((normal_cdf_approx(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf_approx(1.96) - 0.975_002).abs() < 1e-6);
        assert!((normal_cdf_approx(-1.0) - 0.158_655).abs() < 1e-6);
    }

    #[test]
    fn test_normal_cdf_approx_is_monotonic() {
        let mut previous = 0.0;
        for i in -80..=80 {
            let value = normal_cdf_approx(i as f64 * 0.1);
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn test_two_tailed_p_value_methods_agree() {
        for z in [0.0, 0.5, 1.0, 1.96, 2.58, 4.0] {
            let approx = two_tailed_p_value(z, PValueMethod::AbramowitzStegun);
            let exact = two_tailed_p_value(z, PValueMethod::Exact);
            assert!((approx - exact).abs() < 1e-6, "z = {}", z);
        }
        assert!((two_tailed_p_value(1.96, PValueMethod::Exact) - 0.05).abs() < 1e-3);
        assert_eq!(two_tailed_p_value(f64::NAN, PValueMethod::Exact), 1.0);
    }

    #[test]
    fn test_coefficient_of_variation() {
        assert!(coefficient_of_variation(&[5.0, 5.0, 5.0]).unwrap().abs() < 1e-12);
        let cv = coefficient_of_variation(&[1.0, 3.0]).unwrap();
        assert!((cv - 0.5).abs() < 1e-12);
        assert!(coefficient_of_variation(&[1.0]).is_none());
        assert!(coefficient_of_variation(&[-1.0, -2.0]).is_none());
    }

    #[test]
    fn test_pearson_correlation() {
        let r = pearson_correlation(&[1.0, 2.0, 3.0, 4.0], &[2.0, 4.0, 6.0, 8.0]).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        let r = pearson_correlation(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
        assert!(pearson_correlation(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(pearson_correlation(&[1.0, 2.0], &[1.0]).is_none());
    }

    #[test]
    fn test_correlation_p_value() {
        // r = 0.9 over 10 samples is clearly significant
        assert!(correlation_p_value(0.9, 10) < 0.01);
        // r = 0.1 over 5 samples is not
        assert!(correlation_p_value(0.1, 5) > 0.5);
        assert_eq!(correlation_p_value(0.99, 2), 1.0);
        assert_eq!(correlation_p_value(1.0, 5), 0.0);
    }
}

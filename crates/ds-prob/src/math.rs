//! Small numerically-stable math utilities used across probability code.

/// Smallest distance from {0, 1} that [`clamp_probability`] allows.
pub const PROB_EPS: f64 = 1e-10;

/// Stable sigmoid: `1 / (1 + exp(-x))`.
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    let abs_x = x.abs();
    let e = (-abs_x).exp();
    let recip = 1.0 / (1.0 + e);
    // x >= 0: sigmoid = 1/(1+exp(-x)) = recip
    // x <  0: sigmoid = exp(x)/(1+exp(x)) = e/(1+e) = e*recip
    if x >= 0.0 { recip } else { e * recip }
}

/// Alias of [`sigmoid`] under its log-odds name.
#[inline]
pub fn inverse_logit(x: f64) -> f64 {
    sigmoid(x)
}

/// Log-odds `ln(p / (1 - p))`.
///
/// Returns `-inf` / `+inf` at the endpoints and NaN outside `[0, 1]`.
#[inline]
pub fn logit(p: f64) -> f64 {
    // ln(p) - ln(1-p), with ln_1p for accuracy near 0
    p.ln() - (-p).ln_1p()
}

/// Clamp a probability into `[PROB_EPS, 1 - PROB_EPS]` so that [`logit`] stays finite.
#[inline]
pub fn clamp_probability(p: f64) -> f64 {
    p.clamp(PROB_EPS, 1.0 - PROB_EPS)
}

/// Two-sided standard-normal tail probability `P(|Z| >= |z|)`.
#[inline]
pub fn normal_two_sided_p(z: f64) -> f64 {
    if !z.is_finite() {
        return if z.is_nan() { f64::NAN } else { 0.0 };
    }
    statrs::function::erf::erfc(z.abs() / std::f64::consts::SQRT_2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sigmoid_bounds_and_symmetry() {
        let xs: [f64; 7] = [-50.0, -10.0, -1.0, 0.0, 1.0, 10.0, 50.0];
        for x in xs {
            let s = sigmoid(x);
            assert!((0.0..=1.0).contains(&s), "sigmoid({})={}", x, s);
            assert_abs_diff_eq!(s + sigmoid(-x), 1.0, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_logit_inverts_sigmoid() {
        let xs: [f64; 6] = [-8.0, -1.5, 0.0, 0.3, 2.0, 8.0];
        for x in xs {
            assert_abs_diff_eq!(logit(sigmoid(x)), x, epsilon = 1e-9);
        }
        for p in [0.01, 0.2, 0.5, 0.93] {
            assert_abs_diff_eq!(inverse_logit(logit(p)), p, epsilon = 1e-12);
        }
        assert_eq!(logit(0.5), 0.0);
        assert!(logit(0.0).is_infinite());
        assert!(logit(1.5).is_nan());
    }

    #[test]
    fn test_clamp_probability_keeps_logit_finite() {
        assert!(logit(clamp_probability(0.0)).is_finite());
        assert!(logit(clamp_probability(1.0)).is_finite());
        assert_eq!(clamp_probability(0.25), 0.25);
    }

    #[test]
    fn test_normal_two_sided_p() {
        assert_abs_diff_eq!(normal_two_sided_p(0.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(normal_two_sided_p(1.959963984540054), 0.05, epsilon = 1e-9);
        assert_abs_diff_eq!(normal_two_sided_p(-1.959963984540054), 0.05, epsilon = 1e-9);
        assert_eq!(normal_two_sided_p(f64::INFINITY), 0.0);
        assert!(normal_two_sided_p(f64::NAN).is_nan());
    }
}

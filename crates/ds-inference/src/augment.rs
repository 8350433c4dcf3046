//! Confounder augmentation ("sensitize").
//!
//! Given observed per-row probabilities `p = P(T=1)`, `r0 = P(Y=1 | T=0)`,
//! `r1 = P(Y=1 | T=1)` and sensitivity parameters `q`, `dp`, `d0`, `d1`, solve
//! for the latent-state quantities that reproduce the observed marginals:
//!
//! ```text
//! (1-q)  σ(γ)    + q  σ(γ + dp)    = p      ptrt_0 = σ(γ), ptrt_1 = σ(γ + dp)
//! (1-q0) σ(β0)   + q0 σ(β0 + d0)   = r0     q0 = q (1 - ptrt_1) / (1 - p)
//! (1-q1) σ(β1)   + q1 σ(β1 + d1)   = r1     q1 = q ptrt_1 / p
//! ```
//!
//! `β0` / `β1` are the baseline outcome log-odds for the `u = 0` state under
//! control / treatment (`beta_ctl`, `beta_trt`).

use ds_core::{Error, Result};
use ds_prob::math::{PROB_EPS, clamp_probability, logit, sigmoid};
use serde::{Deserialize, Serialize};

use crate::expand::ExpandedParams;

const BISECTION_MAX_ITER: usize = 200;
const BISECTION_TOL: f64 = 1e-12;

/// Solve `(1-q) σ(g) + q σ(g + delta) = target` for `g`.
///
/// The left side is increasing in `g`, and because it is a mixture of `σ(g)`
/// and `σ(g + delta)` the root lies in
/// `[logit(target) - max(delta, 0), logit(target) - min(delta, 0)]`.
pub fn solve_mixture_logit(target: f64, q: f64, delta: f64) -> f64 {
    let t = clamp_probability(target);
    let base = logit(t);
    if delta == 0.0 || q == 0.0 {
        return base;
    }
    if q == 1.0 {
        return base - delta;
    }
    let mix = |g: f64| (1.0 - q) * sigmoid(g) + q * sigmoid(g + delta) - t;
    let mut lo = base - delta.max(0.0);
    let mut hi = base - delta.min(0.0);
    for _ in 0..BISECTION_MAX_ITER {
        let mid = 0.5 * (lo + hi);
        if mix(mid) < 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < BISECTION_TOL {
            break;
        }
    }
    0.5 * (lo + hi)
}

/// Latent-state quantities for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfounderRow {
    /// Confounder prevalence.
    pub q: f64,
    /// `P(T=1 | u=0)`.
    pub ptrt_0: f64,
    /// `P(T=1 | u=1)`.
    pub ptrt_1: f64,
    /// Control-regime outcome log-odds for `u = 0`.
    pub beta_ctl: f64,
    /// Treatment-regime outcome log-odds for `u = 0`.
    pub beta_trt: f64,
    /// Treatment log-odds shift for `u = 1`.
    pub dp: f64,
    /// Control-regime outcome log-odds shift for `u = 1`.
    pub d0: f64,
    /// Treatment-regime outcome log-odds shift for `u = 1`.
    pub d1: f64,
}

fn check_probabilities(name: &str, v: &[f64], n: usize) -> Result<()> {
    if v.len() != n {
        return Err(Error::InvalidParameterShape(format!(
            "{} has length {}, expected {}",
            name,
            v.len(),
            n
        )));
    }
    if let Some(x) = v.iter().find(|x| !(0.0..=1.0).contains(*x)) {
        return Err(Error::Validation(format!("{} must lie in [0, 1], found {}", name, x)));
    }
    Ok(())
}

/// Augment each row with latent-state treatment probabilities and outcome log-odds.
///
/// All inputs are row-aligned. Probabilities at exactly 0 or 1 are clamped to
/// `PROB_EPS` from the boundary before solving.
pub fn sensitize(
    ptrt: &[f64],
    resp_ctl: &[f64],
    resp_trt: &[f64],
    params: &ExpandedParams,
) -> Result<Vec<ConfounderRow>> {
    let n = ptrt.len();
    check_probabilities("ptrt", ptrt, n)?;
    check_probabilities("resp_ctl", resp_ctl, n)?;
    check_probabilities("resp_trt", resp_trt, n)?;
    check_probabilities("q", &params.q, n)?;
    for (name, v) in [("dp", &params.dp), ("d0", &params.d0), ("d1", &params.d1)] {
        if v.len() != n {
            return Err(Error::InvalidParameterShape(format!(
                "{} has length {}, expected {}",
                name,
                v.len(),
                n
            )));
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(Error::Validation(format!("{} must be finite", name)));
        }
    }

    let n_clamped = ptrt
        .iter()
        .chain(resp_ctl)
        .chain(resp_trt)
        .filter(|&&p| p < PROB_EPS || p > 1.0 - PROB_EPS)
        .count();
    if n_clamped > 0 {
        log::warn!("sensitize: clamped {} probabilities away from 0/1", n_clamped);
    }

    let rows = (0..n)
        .map(|i| {
            let q = params.q[i];
            let (dp, d0, d1) = (params.dp[i], params.d0[i], params.d1[i]);
            let p = clamp_probability(ptrt[i]);

            let gamma = solve_mixture_logit(p, q, dp);
            let ptrt_0 = sigmoid(gamma);
            let ptrt_1 = sigmoid(gamma + dp);

            let q1 = (q * ptrt_1 / p).clamp(0.0, 1.0);
            let q0 = (q * (1.0 - ptrt_1) / (1.0 - p)).clamp(0.0, 1.0);
            let beta_ctl = solve_mixture_logit(resp_ctl[i], q0, d0);
            let beta_trt = solve_mixture_logit(resp_trt[i], q1, d1);

            ConfounderRow { q, ptrt_0, ptrt_1, beta_ctl, beta_trt, dp, d0, d1 }
        })
        .collect();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn params(n: usize, q: f64, dp: f64, d0: f64, d1: f64) -> ExpandedParams {
        ExpandedParams { q: vec![q; n], dp: vec![dp; n], d0: vec![d0; n], d1: vec![d1; n] }
    }

    #[test]
    fn test_solver_reproduces_target() {
        for &(t, q, d) in &[(0.3, 0.2, 1.5), (0.8, 0.5, -2.0), (0.05, 0.9, 3.0), (0.5, 0.0, 1.0)] {
            let g = solve_mixture_logit(t, q, d);
            let mix = (1.0 - q) * sigmoid(g) + q * sigmoid(g + d);
            assert_abs_diff_eq!(mix, t, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_zero_shift_is_identity() {
        let rows = sensitize(&[0.4], &[0.2], &[0.7], &params(1, 0.3, 0.0, 0.0, 0.0)).unwrap();
        let r = rows[0];
        assert_abs_diff_eq!(r.ptrt_0, 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(r.ptrt_1, 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(r.beta_ctl, logit(0.2), epsilon = 1e-12);
        assert_abs_diff_eq!(r.beta_trt, logit(0.7), epsilon = 1e-12);
    }

    #[test]
    fn test_marginals_are_preserved() {
        let (p, r0, r1) = (0.35, 0.25, 0.6);
        let (q, dp, d0, d1) = (0.3, 1.2, 0.8, -0.5);
        let r = sensitize(&[p], &[r0], &[r1], &params(1, q, dp, d0, d1)).unwrap()[0];

        // Treatment marginal over u.
        assert_abs_diff_eq!((1.0 - q) * r.ptrt_0 + q * r.ptrt_1, p, epsilon = 1e-10);

        // Outcome marginals within each regime.
        let q1 = q * r.ptrt_1 / p;
        let q0 = q * (1.0 - r.ptrt_1) / (1.0 - p);
        let y1 = (1.0 - q1) * sigmoid(r.beta_trt) + q1 * sigmoid(r.beta_trt + d1);
        let y0 = (1.0 - q0) * sigmoid(r.beta_ctl) + q0 * sigmoid(r.beta_ctl + d0);
        assert_abs_diff_eq!(y1, r1, epsilon = 1e-10);
        assert_abs_diff_eq!(y0, r0, epsilon = 1e-10);
    }

    #[test]
    fn test_positive_shift_lowers_state_zero_propensity() {
        let r = sensitize(&[0.5], &[0.5], &[0.5], &params(1, 0.5, 2.0, 0.0, 0.0)).unwrap()[0];
        assert!(r.ptrt_0 < 0.5 && r.ptrt_1 > 0.5);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(sensitize(&[1.2], &[0.2], &[0.2], &params(1, 0.3, 0.0, 0.0, 0.0)).is_err());
        assert!(sensitize(&[0.2], &[0.2], &[0.2], &params(1, 1.3, 0.0, 0.0, 0.0)).is_err());
        assert!(matches!(
            sensitize(&[0.2, 0.3], &[0.2, 0.3], &[0.2, 0.3], &params(1, 0.3, 0.0, 0.0, 0.0)),
            Err(Error::InvalidParameterShape(_))
        ));
    }

    #[test]
    fn test_boundary_probabilities_are_clamped() {
        let r = sensitize(&[0.0], &[1.0], &[0.0], &params(1, 0.2, 1.0, 1.0, 1.0)).unwrap()[0];
        assert!(r.beta_ctl.is_finite() && r.beta_trt.is_finite());
        assert!(r.ptrt_0 > 0.0 && r.ptrt_1 < 1.0);
    }
}

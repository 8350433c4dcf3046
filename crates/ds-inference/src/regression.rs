//! Weighted regression backends implementing [`ds_core::Fitter`].
//!
//! - [`LogisticFitter`]: binomial GLM with logit link fitted by IRLS. Responses may be
//!   fractional in `[0, 1]`, which is what the augmented fit produces (the treatment
//!   column holds confounder-state treatment probabilities).
//! - [`LinearFitter`]: weighted least squares.
//!
//! Standard errors come from the inverse information matrix `(X^T W X)^{-1}`.

use ds_core::{Error, Fitter, Formula, Frame, Result, TidyCoefficient};
use ds_prob::math::{normal_two_sided_p, sigmoid};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::design::{DesignMatrix, model_matrix};

/// Floor for the binomial variance `mu (1 - mu)` inside IRLS.
const MIN_VARIANCE: f64 = 1e-10;

#[inline]
fn row_dot(x_row: &[f64], beta: &[f64]) -> f64 {
    debug_assert_eq!(x_row.len(), beta.len());
    x_row.iter().zip(beta).map(|(&x, &b)| x * b).sum()
}

fn validate_weights(n: usize, weights: &[f64]) -> Result<()> {
    if weights.len() != n {
        return Err(Error::InvalidParameterShape(format!(
            "weights has wrong length: expected n={}, got {}",
            n,
            weights.len()
        )));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(Error::Validation("weights must be finite and non-negative".to_string()));
    }
    if weights.iter().all(|&w| w == 0.0) {
        return Err(Error::Validation("weights must not all be zero".to_string()));
    }
    Ok(())
}

/// Accumulate `X^T W X` and `X^T W z` for per-row working weights and responses.
fn weighted_normal_equations(
    x: &DesignMatrix,
    w: impl Fn(usize) -> f64,
    z: impl Fn(usize) -> f64,
) -> (DMatrix<f64>, DVector<f64>) {
    let p = x.n_cols();
    let mut xtwx = DMatrix::<f64>::zeros(p, p);
    let mut xtwz = DVector::<f64>::zeros(p);
    for i in 0..x.n_rows() {
        let wi = w(i);
        if wi == 0.0 {
            continue;
        }
        let row = x.row(i);
        let zi = z(i);
        for a in 0..p {
            let wxa = wi * row[a];
            xtwz[a] += wxa * zi;
            for b in a..p {
                xtwx[(a, b)] += wxa * row[b];
            }
        }
    }
    for a in 0..p {
        for b in 0..a {
            xtwx[(a, b)] = xtwx[(b, a)];
        }
    }
    (xtwx, xtwz)
}

fn invert_information(info: DMatrix<f64>, names: &[String]) -> Result<DMatrix<f64>> {
    info.try_inverse().ok_or_else(|| {
        Error::Computation(format!(
            "information matrix is singular (terms: {}); check for empty levels or collinear terms",
            names.join(", ")
        ))
    })
}

fn tidy(names: &[String], beta: &[f64], cov: &DMatrix<f64>, scale: f64) -> Result<Vec<TidyCoefficient>> {
    let mut out = Vec::with_capacity(names.len());
    for (j, name) in names.iter().enumerate() {
        let var = scale * cov[(j, j)];
        if !beta[j].is_finite() || !var.is_finite() || var < 0.0 {
            return Err(Error::Computation(format!("non-finite estimate for term '{}'", name)));
        }
        let std_error = var.sqrt();
        let statistic = beta[j] / std_error;
        out.push(TidyCoefficient {
            term: name.clone(),
            estimate: beta[j],
            std_error,
            statistic,
            p_value: normal_two_sided_p(statistic),
        });
    }
    Ok(out)
}

/// Result of an IRLS logistic fit.
#[derive(Debug, Clone)]
pub struct GlmFit {
    /// Coefficients, aligned with the design-matrix column names.
    pub coefficients: Vec<f64>,
    /// Inverse information matrix at the solution.
    pub covariance: DMatrix<f64>,
    /// Weighted binomial deviance at the solution.
    pub deviance: f64,
    /// Whether the relative deviance change dropped below tolerance.
    pub converged: bool,
    /// Number of IRLS iterations performed.
    pub n_iter: usize,
}

#[inline]
fn binomial_deviance_term(y: f64, mu: f64) -> f64 {
    let mu = mu.clamp(MIN_VARIANCE, 1.0 - MIN_VARIANCE);
    let a = if y > 0.0 { y * (y / mu).ln() } else { 0.0 };
    let b = if y < 1.0 { (1.0 - y) * ((1.0 - y) / (1.0 - mu)).ln() } else { 0.0 };
    2.0 * (a + b)
}

/// Weighted logistic regression by iteratively reweighted least squares.
pub fn irls_logistic(
    x: &DesignMatrix,
    y: &[f64],
    weights: &[f64],
    max_iter: usize,
    tol: f64,
) -> Result<GlmFit> {
    let n = x.n_rows();
    if y.len() != n {
        return Err(Error::Validation(format!("y has wrong length: expected n={}, got {}", n, y.len())));
    }
    validate_weights(n, weights)?;
    if y.iter().any(|&v| !(0.0..=1.0).contains(&v)) {
        return Err(Error::Validation("logistic response must lie in [0, 1]".to_string()));
    }

    let p = x.n_cols();
    let mut beta = vec![0.0; p];
    let mut deviance = f64::INFINITY;
    let mut converged = false;
    let mut n_iter = 0;

    for iter in 1..=max_iter.max(1) {
        n_iter = iter;
        let eta: Vec<f64> = (0..n).map(|i| row_dot(x.row(i), &beta)).collect();
        let mu: Vec<f64> = eta.iter().map(|&e| sigmoid(e)).collect();
        let var: Vec<f64> = mu.iter().map(|&m| (m * (1.0 - m)).max(MIN_VARIANCE)).collect();

        let (xtwx, xtwz) = weighted_normal_equations(
            x,
            |i| weights[i] * var[i],
            |i| eta[i] + (y[i] - mu[i]) / var[i],
        );
        let next = xtwx
            .lu()
            .solve(&xtwz)
            .ok_or_else(|| Error::Computation("IRLS solve failed (singular X^T W X)".to_string()))?;
        beta = next.iter().copied().collect();

        let dev_new: f64 = (0..n)
            .map(|i| weights[i] * binomial_deviance_term(y[i], sigmoid(row_dot(x.row(i), &beta))))
            .sum();
        if !dev_new.is_finite() {
            return Err(Error::Computation("IRLS deviance became non-finite".to_string()));
        }
        let rel = (dev_new - deviance).abs() / (dev_new.abs() + 0.1);
        deviance = dev_new;
        if rel < tol {
            converged = true;
            break;
        }
    }

    if !converged {
        log::warn!("IRLS did not converge after {} iterations (deviance={})", n_iter, deviance);
    }

    let (info, _) = weighted_normal_equations(
        x,
        |i| {
            let m = sigmoid(row_dot(x.row(i), &beta));
            weights[i] * (m * (1.0 - m)).max(MIN_VARIANCE)
        },
        |_| 0.0,
    );
    let covariance = invert_information(info, x.names())?;
    Ok(GlmFit { coefficients: beta, covariance, deviance, converged, n_iter })
}

/// Binomial-logit fitter (quasi-binomial when responses are fractional).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticFitter {
    /// Maximum IRLS iterations.
    pub max_iter: usize,
    /// Relative deviance-change tolerance.
    pub tol: f64,
}

impl Default for LogisticFitter {
    fn default() -> Self {
        Self { max_iter: 50, tol: 1e-10 }
    }
}

impl Fitter for LogisticFitter {
    fn fit_weighted(
        &self,
        formula: &Formula,
        data: &Frame,
        weights: &[f64],
    ) -> Result<Vec<TidyCoefficient>> {
        let (x, y) = model_matrix(formula, data)?;
        let fit = irls_logistic(&x, &y, weights, self.max_iter, self.tol)?;
        log::debug!(
            "logistic fit '{}': n={}, p={}, iterations={}, deviance={:.6}",
            formula,
            x.n_rows(),
            x.n_cols(),
            fit.n_iter,
            fit.deviance
        );
        tidy(x.names(), &fit.coefficients, &fit.covariance, 1.0)
    }

    fn name(&self) -> &str {
        "logistic"
    }
}

/// Weighted least-squares fitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearFitter;

impl Fitter for LinearFitter {
    fn fit_weighted(
        &self,
        formula: &Formula,
        data: &Frame,
        weights: &[f64],
    ) -> Result<Vec<TidyCoefficient>> {
        let (x, y) = model_matrix(formula, data)?;
        let n = x.n_rows();
        validate_weights(n, weights)?;
        let p = x.n_cols();
        let n_pos = weights.iter().filter(|&&w| w > 0.0).count();
        if n_pos <= p {
            return Err(Error::Computation(format!(
                "need more than {} positively weighted rows, got {}",
                p, n_pos
            )));
        }

        let (xtwx, xtwy) = weighted_normal_equations(&x, |i| weights[i], |i| y[i]);
        let cov = invert_information(xtwx, x.names())?;
        let beta = &cov * &xtwy;
        let beta: Vec<f64> = beta.iter().copied().collect();

        let wrss: f64 = (0..n)
            .map(|i| {
                let r = y[i] - row_dot(x.row(i), &beta);
                weights[i] * r * r
            })
            .sum();
        let sigma2 = wrss / (n_pos - p) as f64;
        log::debug!("linear fit '{}': n={}, p={}, sigma2={:.6}", formula, n, p, sigma2);
        tidy(x.names(), &beta, &cov, sigma2)
    }

    fn name(&self) -> &str {
        "linear"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ds_core::{Column, Factor};

    fn line_frame() -> Frame {
        // y = 1 + 2x exactly, plus a perturbation that cancels in pairs
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> =
            x.iter().enumerate().map(|(i, &v)| 1.0 + 2.0 * v + if i % 2 == 0 { 0.1 } else { -0.1 }).collect();
        Frame::from_columns(vec![("y".into(), Column::Numeric(y)), ("x".into(), Column::Numeric(x))]).unwrap()
    }

    #[test]
    fn test_linear_fitter_recovers_line() {
        let f = Formula::parse("y ~ x").unwrap();
        let rows = LinearFitter.fit(&f, &line_frame()).unwrap();
        assert_eq!(rows[0].term, "(Intercept)");
        assert_eq!(rows[1].term, "x");
        assert_relative_eq!(rows[1].estimate, 2.0, epsilon = 0.05);
        assert!(rows[1].std_error > 0.0);
    }

    #[test]
    fn test_weights_equal_to_duplication() {
        // Doubling a row's weight must match duplicating the row.
        let f = Formula::parse("y ~ x").unwrap();
        let data = line_frame();
        let mut w = vec![1.0; 10];
        w[3] = 2.0;
        let weighted = LinearFitter.fit_weighted(&f, &data, &w).unwrap();

        let mut rows: Vec<usize> = (0..10).collect();
        rows.push(3);
        let dup = LinearFitter.fit(&f, &data.take(&rows)).unwrap();
        for (a, b) in weighted.iter().zip(&dup) {
            assert_relative_eq!(a.estimate, b.estimate, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_logistic_group_log_odds() {
        // Saturated two-group model: coefficients are the observed log-odds.
        let labels = ["a", "a", "a", "a", "b", "b", "b", "b"];
        let y = vec![1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0];
        let data = Frame::from_columns(vec![
            ("y".into(), Column::Numeric(y)),
            ("g".into(), Column::Factor(Factor::from_labels(&labels))),
        ])
        .unwrap();
        let f = Formula::parse("y ~ g").unwrap();
        let rows = LogisticFitter::default().fit(&f, &data).unwrap();
        assert_relative_eq!(rows[0].estimate, (1.0f64 / 3.0).ln(), epsilon = 1e-6);
        assert_relative_eq!(rows[1].estimate, 3.0f64.ln() - (1.0f64 / 3.0).ln(), epsilon = 1e-6);
        // se of a log-odds from n=4, p=1/4: sqrt(1/(n p (1-p)))
        assert_relative_eq!(rows[0].std_error, (1.0f64 / (4.0 * 0.25 * 0.75)).sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn test_logistic_accepts_fractional_response() {
        let data = Frame::from_columns(vec![
            ("y".into(), Column::Numeric(vec![0.2, 0.4, 0.6, 0.8])),
            ("x".into(), Column::Numeric(vec![-1.0, -0.3, 0.3, 1.0])),
        ])
        .unwrap();
        let f = Formula::parse("y ~ x").unwrap();
        let rows = LogisticFitter::default().fit(&f, &data).unwrap();
        assert!(rows[1].estimate > 0.0);
        assert!(rows.iter().all(|r| r.std_error.is_finite()));
    }

    #[test]
    fn test_bad_weights_rejected() {
        let f = Formula::parse("y ~ x").unwrap();
        let data = line_frame();
        assert!(matches!(
            LinearFitter.fit_weighted(&f, &data, &[1.0; 3]),
            Err(Error::InvalidParameterShape(_))
        ));
        let mut w = vec![1.0; 10];
        w[0] = -1.0;
        assert!(LinearFitter.fit_weighted(&f, &data, &w).is_err());
    }

    #[test]
    fn test_singular_design_reports_computation_error() {
        let data = Frame::from_columns(vec![
            ("y".into(), Column::Numeric(vec![0.0, 1.0, 0.0, 1.0])),
            ("x".into(), Column::Numeric(vec![1.0, 1.0, 1.0, 1.0])),
        ])
        .unwrap();
        let f = Formula::parse("y ~ x").unwrap();
        assert!(matches!(LogisticFitter::default().fit(&f, &data), Err(Error::Computation(_))));
    }
}

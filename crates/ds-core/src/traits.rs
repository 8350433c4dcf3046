//! Core traits for disparity sensitivity analysis
//!
//! The regression routine is an injected capability: the sensitivity engine
//! depends on the [`Fitter`] trait, never on a concrete regression backend.

use crate::{Formula, Frame, Result, TidyCoefficient};

/// Regression backend used for both the weighted (augmented) and naive fits.
pub trait Fitter: Send + Sync {
    /// Fit `formula` on `data` with per-row `weights`, returning tidy coefficients.
    fn fit_weighted(
        &self,
        formula: &Formula,
        data: &Frame,
        weights: &[f64],
    ) -> Result<Vec<TidyCoefficient>>;

    /// Unweighted fit (unit weights).
    fn fit(&self, formula: &Formula, data: &Frame) -> Result<Vec<TidyCoefficient>> {
        let weights = vec![1.0; data.n_rows()];
        self.fit_weighted(formula, data, &weights)
    }

    /// Backend name (e.g., "logistic", "linear")
    fn name(&self) -> &str;
}

//! Parameter sweeps over the sensitivity engine.
//!
//! Every grid point is an independent [`estimate`] call on the same policy, so
//! the grid is evaluated with Rayon and results are returned in grid order.

use ds_core::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::{EstimateOptions, SensitivityReport, estimate};
use crate::expand::SensitivityParams;
use crate::packing::{PackOptions, PackedParameters, pack};
use crate::policy::Policy;

/// One evaluated grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    /// Position in the input grid.
    pub index: usize,
    /// Parameters evaluated.
    pub params: SensitivityParams,
    /// Engine output at these parameters.
    pub report: SensitivityReport,
}

/// Evaluate the engine at every parameter setting in `grid`.
///
/// The first failing grid point aborts the sweep with its error.
pub fn sweep(
    policy: &Policy,
    grid: &[SensitivityParams],
    opts: &EstimateOptions,
) -> Result<Vec<SweepPoint>> {
    policy.validate()?;
    log::debug!("sweep: {} grid points", grid.len());
    grid.par_iter()
        .enumerate()
        .map(|(index, params)| {
            let report = estimate(policy, params, opts)?;
            Ok(SweepPoint { index, params: params.clone(), report })
        })
        .collect()
}

/// Unpack an optimizer vector and evaluate the engine at it.
///
/// The policy's grouping must have exactly two levels in the analyzed rows,
/// base level first.
pub fn evaluate_packed(
    policy: &Policy,
    raw: &[f64],
    pack_opts: &PackOptions,
    opts: &EstimateOptions,
) -> Result<(PackedParameters, SensitivityReport)> {
    let packed = pack(raw, pack_opts)?;
    let report = estimate(policy, &packed.to_sensitivity_params(), opts)?;
    Ok((packed, report))
}

//! # ds-inference
//!
//! Sensitivity analysis of group disparity estimates under an unobserved
//! binary confounder.
//!
//! This crate provides:
//! - parameter broadcasting ([`expand_parameter`], [`SensitivityParams`])
//! - optimizer-vector packing ([`pack`], [`PackedParameters`])
//! - confounder augmentation ([`sensitize`])
//! - the weighted re-estimation engine ([`estimate`], [`sweep`])
//! - min/max bound reduction ([`summarize`])
//!
//! ## Architecture
//!
//! The engine depends on the [`ds_core::Fitter`] trait, NOT on a concrete
//! regression backend. [`LogisticFitter`] and [`LinearFitter`] are the
//! in-crate implementations.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Confounder augmentation: latent-state propensities and outcome log-odds.
pub mod augment;
/// Treatment-contrast design matrices from formulas.
pub mod design;
/// Weighted re-estimation of group terms.
pub mod engine;
/// Per-group / per-row broadcasting of sensitivity parameters.
pub mod expand;
/// Free/fixed packing of the eight-slot optimizer vector.
pub mod packing;
/// Policy capability set and risk regimes.
pub mod policy;
/// IRLS logistic and weighted least-squares fitters.
pub mod regression;
/// Min/max bound pivoting.
pub mod summary;
/// Parallel grid evaluation.
pub mod sweep;

pub use augment::{ConfounderRow, sensitize, solve_mixture_logit};
pub use design::{DesignMatrix, model_matrix};
pub use engine::{EstimateOptions, SensitivityEstimate, SensitivityReport, control_set_id, estimate};
pub use expand::{ExpandedParams, ParamValues, SensitivityParams, expand_parameter};
pub use packing::{N_SLOTS, PackOptions, PackedParameters, Slot, pack};
pub use policy::{Policy, RiskRegime};
pub use regression::{GlmFit, LinearFitter, LogisticFitter, irls_logistic};
pub use summary::{TaggedEstimate, TermBounds, summarize};
pub use sweep::{SweepPoint, evaluate_packed, sweep};

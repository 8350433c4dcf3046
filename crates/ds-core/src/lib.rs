//! # ds-core
//!
//! Core types for disparity sensitivity analysis.
//!
//! This crate provides:
//! - the shared [`Error`] / [`Result`] types
//! - the tabular data model ([`Frame`], [`Column`], [`Factor`])
//! - regression formulas ([`Formula`], [`make_formula`], [`extract_features`])
//! - the injected regression capability ([`Fitter`])

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod formula;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use formula::{Formula, FormulaFeatures, extract_features, make_formula};
pub use traits::Fitter;
pub use types::{Column, Factor, Frame, TidyCoefficient};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

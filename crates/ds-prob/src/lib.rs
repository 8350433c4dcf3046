//! Probability building blocks for disparity sensitivity analysis.
//!
//! Small numeric helpers shared by the augmentation and regression code:
//! stable logistic/log-odds transforms and normal tail probabilities.

pub mod math;

pub use math::{clamp_probability, inverse_logit, logit, normal_two_sided_p, sigmoid};

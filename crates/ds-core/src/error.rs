//! Error types for disparity sensitivity analysis

use thiserror::Error;

/// Sensitivity analysis error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The supplied policy lacks a required capability (column, field, fitter).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A `compare` group is absent from the grouping field.
    #[error("Invalid group specification: {0}")]
    InvalidGroupSpecification(String),

    /// A parameter or override vector has a length matching no permitted granularity.
    #[error("Invalid parameter shape: {0}")]
    InvalidParameterShape(String),

    /// The policy's risk-column tag is not a recognized outcome regime.
    #[error("Misspecified policy: {0}")]
    MisspecifiedPolicy(String),

    /// A coefficient tag cannot be split into `<group>_<bound>`.
    #[error("Malformed tag: {0}")]
    MalformedTag(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_kind() {
        let e = Error::InvalidParameterShape("q has length 3".into());
        assert_eq!(e.to_string(), "Invalid parameter shape: q has length 3");
        let e = Error::MisspecifiedPolicy("risk_col".into());
        assert!(e.to_string().starts_with("Misspecified policy"));
    }
}

//! Broadcasting of sensitivity parameters onto rows.
//!
//! A parameter is given as a scalar, one value per level of a categorical
//! grouping column, or one value per row. The level-indexed form is only
//! accepted for [`Column::Factor`] groupings: a plain column whose distinct
//! value count happens to match the parameter length has no canonical level
//! order and is rejected.

use ds_core::{Column, Error, Result};
use serde::{Deserialize, Serialize};

/// Broadcast `param` to one value per row of `group`.
///
/// Rules, in order:
/// 1. length 1: repeat the value for every row;
/// 2. `group` is a factor and length equals its level count: `param[level_code(row)]`;
/// 3. length equals the row count: returned unchanged;
/// 4. anything else fails with [`Error::InvalidParameterShape`].
pub fn expand_parameter(group: &Column, param: &[f64]) -> Result<Vec<f64>> {
    let n = group.len();
    match (param.len(), group) {
        (0, _) => Err(Error::InvalidParameterShape("parameter vector is empty".to_string())),
        (1, _) => Ok(vec![param[0]; n]),
        (k, Column::Factor(f)) if k == f.n_levels() => {
            Ok(f.codes().iter().map(|&c| param[c]).collect())
        }
        (len, _) if len == n => Ok(param.to_vec()),
        (len, _) => {
            let levels = match group {
                Column::Factor(f) => format!(", {} levels", f.n_levels()),
                _ => String::new(),
            };
            Err(Error::InvalidParameterShape(format!(
                "parameter of length {} does not match 1{} or {} rows ({} grouping)",
                len,
                levels,
                n,
                group.kind()
            )))
        }
    }
}

/// Values of one sensitivity parameter: a scalar, per-level or per-row vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ParamRepr", into = "ParamRepr")]
pub struct ParamValues(pub Vec<f64>);

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ParamRepr {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl From<ParamRepr> for ParamValues {
    fn from(r: ParamRepr) -> Self {
        match r {
            ParamRepr::Scalar(v) => ParamValues(vec![v]),
            ParamRepr::Vector(v) => ParamValues(v),
        }
    }
}

impl From<ParamValues> for ParamRepr {
    fn from(p: ParamValues) -> Self {
        match p.0.as_slice() {
            [v] => ParamRepr::Scalar(*v),
            _ => ParamRepr::Vector(p.0),
        }
    }
}

impl From<f64> for ParamValues {
    fn from(v: f64) -> Self {
        ParamValues(vec![v])
    }
}

impl From<Vec<f64>> for ParamValues {
    fn from(v: Vec<f64>) -> Self {
        ParamValues(v)
    }
}

impl From<&[f64]> for ParamValues {
    fn from(v: &[f64]) -> Self {
        ParamValues(v.to_vec())
    }
}

impl ParamValues {
    /// Raw values.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// The four sensitivity parameters, each at its own granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityParams {
    /// Confounder prevalence `P(u = 1)`.
    pub q: ParamValues,
    /// Log-odds shift of treatment when `u = 1`.
    pub dp: ParamValues,
    /// Log-odds shift of the outcome under control when `u = 1`.
    pub d0: ParamValues,
    /// Log-odds shift of the outcome under treatment when `u = 1`.
    pub d1: ParamValues,
}

impl SensitivityParams {
    /// Build from anything convertible to [`ParamValues`].
    pub fn new(
        q: impl Into<ParamValues>,
        dp: impl Into<ParamValues>,
        d0: impl Into<ParamValues>,
        d1: impl Into<ParamValues>,
    ) -> Self {
        Self { q: q.into(), dp: dp.into(), d0: d0.into(), d1: d1.into() }
    }

    /// Broadcast all four parameters against `group`.
    pub fn expand(&self, group: &Column) -> Result<ExpandedParams> {
        let named = |name: &str, p: &ParamValues| {
            expand_parameter(group, p.as_slice()).map_err(|e| match e {
                Error::InvalidParameterShape(msg) => {
                    Error::InvalidParameterShape(format!("{}: {}", name, msg))
                }
                other => other,
            })
        };
        Ok(ExpandedParams {
            q: named("q", &self.q)?,
            dp: named("dp", &self.dp)?,
            d0: named("d0", &self.d0)?,
            d1: named("d1", &self.d1)?,
        })
    }
}

/// Row-aligned sensitivity parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedParams {
    /// Per-row `q`.
    pub q: Vec<f64>,
    /// Per-row `dp`.
    pub dp: Vec<f64>,
    /// Per-row `d0`.
    pub d0: Vec<f64>,
    /// Per-row `d1`.
    pub d1: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_core::Factor;

    fn race(n: usize) -> Column {
        let labels: Vec<&str> = (0..n).map(|i| ["white", "black", "hispanic"][i % 3]).collect();
        Column::Factor(Factor::from_labels(&labels))
    }

    fn plain(n: usize) -> Column {
        Column::Text((0..n).map(|i| ["white", "black", "hispanic"][i % 3].to_string()).collect())
    }

    #[test]
    fn test_scalar_broadcast() {
        assert_eq!(expand_parameter(&race(10), &[0.3]).unwrap(), vec![0.3; 10]);
        assert_eq!(expand_parameter(&plain(4), &[0.3]).unwrap(), vec![0.3; 4]);
    }

    #[test]
    fn test_level_indexed_broadcast() {
        let g = race(10);
        // levels sorted: black, hispanic, white
        let out = expand_parameter(&g, &[1.0, 2.0, 3.0]).unwrap();
        let f = g.as_factor().unwrap();
        for (i, v) in out.iter().enumerate() {
            assert_eq!(*v, [1.0, 2.0, 3.0][f.codes()[i]]);
        }
        assert_eq!(out[0], 3.0); // white
        assert_eq!(out[1], 1.0); // black
    }

    #[test]
    fn test_per_row_passthrough() {
        let p: Vec<f64> = (0..10).map(|i| i as f64 / 10.0).collect();
        assert_eq!(expand_parameter(&race(10), &p).unwrap(), p);
        assert_eq!(expand_parameter(&plain(10), &p).unwrap(), p);
    }

    #[test]
    fn test_plain_grouping_never_level_indexes() {
        let err = expand_parameter(&plain(10), &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, Error::InvalidParameterShape(_)));
    }

    #[test]
    fn test_invalid_lengths() {
        let g = race(10);
        for len in [0usize, 2, 9, 11, 10_000] {
            let p = vec![0.1; len];
            assert!(
                matches!(expand_parameter(&g, &p), Err(Error::InvalidParameterShape(_))),
                "length {} should be rejected",
                len
            );
        }
    }

    #[test]
    fn test_param_values_deserialize_scalar_or_list() {
        let p: SensitivityParams =
            serde_json::from_str(r#"{"q": 0.3, "dp": 0, "d0": [0.5, 0.5], "d1": [0.5, 0.5]}"#).unwrap();
        assert_eq!(p.q.as_slice(), &[0.3]);
        assert_eq!(p.d0.as_slice(), &[0.5, 0.5]);
    }

    #[test]
    fn test_expand_names_failing_parameter() {
        let p = SensitivityParams::new(0.3, vec![0.0, 1.0], 0.5, 0.5);
        let err = p.expand(&race(10)).unwrap_err();
        assert!(err.to_string().contains("dp"), "{}", err);
    }
}

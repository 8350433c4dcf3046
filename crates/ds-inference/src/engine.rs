//! Sensitivity engine: adjusted group-disparity estimates under a latent confounder.
//!
//! Pipeline for one call:
//!
//! 1. validate the policy and keep the test fold;
//! 2. optionally restrict to the `compare` groups, with their levels reordered
//!    so that the first listed group is the baseline;
//! 3. fit the naive (unweighted) model `treatment ~ group + risk + controls`;
//! 4. expand `q`, `dp`, `d0`, `d1` to rows and run [`sensitize`];
//! 5. duplicate every row into a `u = 0` and a `u = 1` copy carrying the
//!    state's treatment probability, risk `beta + u * delta` and weight
//!    `1 - q` / `q`;
//! 6. refit with weights and keep the terms that mention the grouping field,
//!    alongside the naive standard error.

use std::collections::HashMap;

use ds_core::{Column, Error, Frame, Result, TidyCoefficient, make_formula};
use ds_prob::math::{clamp_probability, logit};
use serde::{Deserialize, Serialize};

use crate::augment::{ConfounderRow, sensitize};
use crate::expand::SensitivityParams;
use crate::policy::{FOLD_COL, PTRT_COL, Policy, RESP_CTL_COL, RESP_TRT_COL, RiskRegime, TEST_FOLD};

/// Confounder state column in the augmented frame.
pub const U_COL: &str = "u";
/// Risk regressor column.
pub const RISK_COL: &str = "risk";
/// Row weight column in the augmented frame.
pub const WEIGHT_COL: &str = "weight";

/// Columns the engine writes into the augmented frame.
pub(crate) const RESERVED: [&str; 11] =
    [U_COL, RISK_COL, WEIGHT_COL, "q", "ptrt_0", "ptrt_1", "beta_ctl", "beta_trt", "dp", "d0", "d1"];

/// Per-call options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimateOptions {
    /// Groups to keep, baseline first.
    pub compare: Option<Vec<String>>,
    /// Override for the fitted treatment probability (length 1 or row count).
    pub ptreat: Option<Vec<f64>>,
    /// Override for the outcome probability under no treatment.
    pub resp_ctl: Option<Vec<f64>>,
    /// Override for the outcome probability under treatment.
    pub resp_trt: Option<Vec<f64>>,
    /// Control terms; `None` uses the policy's controls.
    pub controls: Option<Vec<String>>,
    /// Report the naive (unweighted, non-augmented) standard error alongside.
    pub naive_se: bool,
    /// Also return the augmented frame.
    pub debug: bool,
}

impl Default for EstimateOptions {
    fn default() -> Self {
        Self {
            compare: None,
            ptreat: None,
            resp_ctl: None,
            resp_trt: None,
            controls: None,
            naive_se: true,
            debug: false,
        }
    }
}

/// One adjusted coefficient for a term involving the grouping field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityEstimate {
    /// Term name.
    pub term: String,
    /// Control-set identifier.
    pub controls: String,
    /// Weighted (confounder-adjusted) estimate.
    pub estimate: f64,
    /// Standard error of the weighted fit.
    #[serde(rename = "std.error.weighted")]
    pub std_error_weighted: f64,
    /// Standard error of the naive fit, when requested.
    #[serde(rename = "std.error.naive", default, skip_serializing_if = "Option::is_none")]
    pub std_error_naive: Option<f64>,
}

/// Engine output. `augmented` is present only when `debug` was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityReport {
    /// Group terms of the weighted fit.
    pub estimates: Vec<SensitivityEstimate>,
    /// The `2 n` row augmented frame used for the weighted fit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub augmented: Option<Frame>,
}

/// Treatment, risk and weight of one row in one confounder state.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StateValues {
    treat: f64,
    risk: f64,
    weight: f64,
}

fn confounder_state(row: &ConfounderRow, u: u8, regime: RiskRegime) -> StateValues {
    let (beta, delta) = match regime {
        RiskRegime::Control => (row.beta_ctl, row.d0),
        RiskRegime::Treatment => (row.beta_trt, row.d1),
    };
    let (treat, weight) = if u == 0 { (row.ptrt_0, 1.0 - row.q) } else { (row.ptrt_1, row.q) };
    StateValues { treat, risk: beta + f64::from(u) * delta, weight }
}

/// Control-set identifier used to join naive and weighted results.
pub fn control_set_id(controls: &[String]) -> String {
    if controls.is_empty() { "(none)".to_string() } else { controls.join("+") }
}

fn term_variables(term: &str) -> impl Iterator<Item = &str> {
    term.split(|c: char| c == ':' || c == '*').map(str::trim).filter(|v| !v.is_empty())
}

fn check_controls(data: &Frame, controls: &[String]) -> Result<()> {
    for term in controls {
        for var in term_variables(term) {
            if !data.has_column(var) {
                return Err(Error::InvalidInput(format!("control '{}' is not a data column", var)));
            }
            if RESERVED.contains(&var) {
                return Err(Error::Validation(format!(
                    "control '{}' collides with a reserved engine column",
                    var
                )));
            }
        }
    }
    Ok(())
}

fn test_fold(data: &Frame) -> Result<Frame> {
    let fold = data.require(FOLD_COL)?;
    let rows: Vec<usize> = (0..fold.len()).filter(|&i| fold.label(i) == Some(TEST_FOLD)).collect();
    Ok(data.take(&rows))
}

/// Restrict to `compare` groups and make their order the level order.
fn compare_groups(data: Frame, group: &str, compare: &[String]) -> Result<Frame> {
    let f = data.factor(group)?;
    if compare.is_empty() {
        return Err(Error::InvalidGroupSpecification("compare lists no groups".to_string()));
    }
    let missing: Vec<&str> =
        compare.iter().map(String::as_str).filter(|g| f.level_index(g).is_none()).collect();
    if !missing.is_empty() {
        return Err(Error::InvalidGroupSpecification(format!(
            "groups not present in '{}': {}",
            group,
            missing.join(", ")
        )));
    }
    let mut order: Vec<&str> = Vec::with_capacity(compare.len());
    for g in compare {
        if !order.contains(&g.as_str()) {
            order.push(g);
        }
    }

    let rows: Vec<usize> = (0..f.len()).filter(|&i| order.contains(&f.label(i))).collect();
    let subset = data.take(&rows);
    let kept = subset.factor(group)?.droplevels();
    if let Some(empty) = order.iter().find(|g| kept.level_index(g).is_none()) {
        return Err(Error::InvalidGroupSpecification(format!(
            "group '{}' has no test-fold rows",
            empty
        )));
    }
    let releveled = kept.relevel(&order)?;
    subset.with_column(group, Column::Factor(releveled))
}

/// Caller override (length 1 or `n`) or the policy's fitted column.
fn resolve_override(name: &str, value: Option<&[f64]>, fallback: &[f64]) -> Result<Vec<f64>> {
    let n = fallback.len();
    match value {
        None => Ok(fallback.to_vec()),
        Some([v]) => Ok(vec![*v; n]),
        Some(v) if v.len() == n => Ok(v.to_vec()),
        Some(v) => Err(Error::InvalidParameterShape(format!(
            "{} has length {}, expected 1 or {}",
            name,
            v.len(),
            n
        ))),
    }
}

/// Duplicate rows per confounder state and attach state-dependent columns.
fn augment_frame(
    data: &Frame,
    treatment: &str,
    rows: &[ConfounderRow],
    regime: RiskRegime,
) -> Result<Frame> {
    let n = data.n_rows();
    let index: Vec<usize> = (0..n).chain(0..n).collect();

    let mut u = Vec::with_capacity(2 * n);
    let mut states = Vec::with_capacity(2 * n);
    for state in [0u8, 1] {
        u.extend(std::iter::repeat_n(f64::from(state), n));
        states.extend(rows.iter().map(|r| confounder_state(r, state, regime)));
    }

    let numeric = |f: fn(&StateValues) -> f64| Column::Numeric(states.iter().map(f).collect());
    let per_row = |f: fn(&ConfounderRow) -> f64| {
        Column::Numeric(index.iter().map(|&i| f(&rows[i])).collect())
    };

    data.take(&index)
        .with_column(U_COL, Column::Numeric(u))?
        .with_column(treatment, numeric(|s| s.treat))?
        .with_column(RISK_COL, numeric(|s| s.risk))?
        .with_column(WEIGHT_COL, numeric(|s| s.weight))?
        .with_column("q", per_row(|r| r.q))?
        .with_column("ptrt_0", per_row(|r| r.ptrt_0))?
        .with_column("ptrt_1", per_row(|r| r.ptrt_1))?
        .with_column("beta_ctl", per_row(|r| r.beta_ctl))?
        .with_column("beta_trt", per_row(|r| r.beta_trt))?
        .with_column("dp", per_row(|r| r.dp))?
        .with_column("d0", per_row(|r| r.d0))?
        .with_column("d1", per_row(|r| r.d1))
}

fn merge_naive(
    weighted: Vec<TidyCoefficient>,
    naive: Option<Vec<TidyCoefficient>>,
    group: &str,
    controls_id: &str,
) -> Vec<SensitivityEstimate> {
    let naive_se: Option<HashMap<(String, &str), f64>> = naive.map(|rows| {
        rows.into_iter().map(|r| ((r.term, controls_id), r.std_error)).collect()
    });
    weighted
        .into_iter()
        .filter(|r| r.term.contains(group))
        .map(|r| {
            let std_error_naive =
                naive_se.as_ref().and_then(|m| m.get(&(r.term.clone(), controls_id)).copied());
            SensitivityEstimate {
                term: r.term,
                controls: controls_id.to_string(),
                estimate: r.estimate,
                std_error_weighted: r.std_error,
                std_error_naive,
            }
        })
        .collect()
}

/// Estimate confounder-adjusted group disparities for one parameter setting.
pub fn estimate(
    policy: &Policy,
    params: &SensitivityParams,
    opts: &EstimateOptions,
) -> Result<SensitivityReport> {
    policy.validate()?;
    let group = policy.group.as_str();

    let mut data = test_fold(&policy.data)?;
    if let Some(compare) = &opts.compare {
        data = compare_groups(data, group, compare)?;
    }
    let n = data.n_rows();
    if n == 0 {
        return Err(Error::InvalidInput("policy has no test-fold rows".to_string()));
    }
    log::debug!("sensitivity: {} test rows, {} groups", n, data.factor(group)?.n_levels());

    let ptrt = resolve_override("ptreat", opts.ptreat.as_deref(), data.numeric(PTRT_COL)?)?;
    let resp_ctl =
        resolve_override("resp_ctl", opts.resp_ctl.as_deref(), data.numeric(RESP_CTL_COL)?)?;
    let resp_trt =
        resolve_override("resp_trt", opts.resp_trt.as_deref(), data.numeric(RESP_TRT_COL)?)?;

    let controls = opts.controls.clone().unwrap_or_else(|| policy.controls.clone());
    check_controls(&data, &controls)?;
    let controls_id = control_set_id(&controls);
    let regime = policy.risk_regime()?;

    let mut rhs = vec![group.to_string(), RISK_COL.to_string()];
    rhs.extend(controls.iter().cloned());
    let formula = make_formula(&policy.treatment, &rhs)?;

    let naive = if opts.naive_se {
        let base = match regime {
            RiskRegime::Control => &resp_ctl,
            RiskRegime::Treatment => &resp_trt,
        };
        let risk = base.iter().map(|&p| logit(clamp_probability(p))).collect();
        let naive_data = data.clone().with_column(RISK_COL, Column::Numeric(risk))?;
        Some(policy.fitter().fit(&formula, &naive_data)?)
    } else {
        None
    };

    let expanded = params.expand(data.require(group)?)?;
    let confounded = sensitize(&ptrt, &resp_ctl, &resp_trt, &expanded)?;
    let augmented = augment_frame(&data, &policy.treatment, &confounded, regime)?;

    let weights = augmented.numeric(WEIGHT_COL)?.to_vec();
    let weighted = policy.fitter().fit_weighted(&formula, &augmented, &weights)?;
    log::debug!("sensitivity: weighted fit '{}' on {} rows", formula, augmented.n_rows());

    let estimates = merge_naive(weighted, naive, group, &controls_id);
    Ok(SensitivityReport { estimates, augmented: opts.debug.then_some(augmented) })
}

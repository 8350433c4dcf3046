//! Fitted policy: the data and capabilities the sensitivity engine consumes.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ds_core::{Error, Fitter, Frame, Result};
use serde::{Deserialize, Serialize};

use crate::engine::RESERVED;

/// Fold label column (`"train"` / `"test"`).
pub const FOLD_COL: &str = "fold__";
/// Fitted treatment probability column.
pub const PTRT_COL: &str = "ptrt__";
/// Fitted outcome probability under no treatment.
pub const RESP_CTL_COL: &str = "resp_ctl__";
/// Fitted outcome probability under treatment.
pub const RESP_TRT_COL: &str = "resp_trt__";
/// Fold label selecting the evaluation rows.
pub const TEST_FOLD: &str = "test";

/// Outcome regime used as the base risk measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskRegime {
    /// Outcome under no treatment (`resp_ctl`).
    Control,
    /// Outcome under treatment (`resp_trt`).
    Treatment,
}

impl RiskRegime {
    /// Canonical tag.
    pub fn tag(self) -> &'static str {
        match self {
            RiskRegime::Control => "resp_ctl",
            RiskRegime::Treatment => "resp_trt",
        }
    }

    /// Policy data column holding this regime's fitted probability.
    pub fn column(self) -> &'static str {
        match self {
            RiskRegime::Control => RESP_CTL_COL,
            RiskRegime::Treatment => RESP_TRT_COL,
        }
    }
}

impl fmt::Display for RiskRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for RiskRegime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "resp_ctl" | RESP_CTL_COL => Ok(RiskRegime::Control),
            "resp_trt" | RESP_TRT_COL => Ok(RiskRegime::Treatment),
            other => Err(Error::MisspecifiedPolicy(format!(
                "risk_col must be 'resp_ctl' or 'resp_trt', got '{}'",
                other
            ))),
        }
    }
}

/// A fitted policy.
///
/// `data` holds every observation with the grouping factor, the observed
/// treatment, the fold label, the fitted `ptrt__` / `resp_ctl__` / `resp_trt__`
/// columns and any control features. `fitter` is the regression backend used
/// for both the naive and the weighted fits.
#[derive(Clone)]
pub struct Policy {
    /// Grouping column name.
    pub group: String,
    /// Treatment column name.
    pub treatment: String,
    /// Legitimate-control feature columns (formula terms).
    pub controls: Vec<String>,
    /// Risk-regime tag, `"resp_ctl"` or `"resp_trt"`.
    pub risk_col: String,
    /// Observation table.
    pub data: Frame,
    fitter: Arc<dyn Fitter>,
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("group", &self.group)
            .field("treatment", &self.treatment)
            .field("controls", &self.controls)
            .field("risk_col", &self.risk_col)
            .field("n_rows", &self.data.n_rows())
            .field("fitter", &self.fitter.name())
            .finish()
    }
}

impl Policy {
    /// Create a policy with no controls and `risk_col = "resp_ctl"`.
    pub fn new(
        group: impl Into<String>,
        treatment: impl Into<String>,
        data: Frame,
        fitter: Arc<dyn Fitter>,
    ) -> Self {
        Self {
            group: group.into(),
            treatment: treatment.into(),
            controls: Vec::new(),
            risk_col: RiskRegime::Control.tag().to_string(),
            data,
            fitter,
        }
    }

    /// Set the control features.
    pub fn with_controls<S: Into<String>>(mut self, controls: impl IntoIterator<Item = S>) -> Self {
        self.controls = controls.into_iter().map(Into::into).collect();
        self
    }

    /// Set the risk-regime tag.
    pub fn with_risk_col(mut self, risk_col: impl Into<String>) -> Self {
        self.risk_col = risk_col.into();
        self
    }

    /// Regression backend.
    pub fn fitter(&self) -> &dyn Fitter {
        self.fitter.as_ref()
    }

    /// Parse the risk-regime tag.
    pub fn risk_regime(&self) -> Result<RiskRegime> {
        self.risk_col.parse()
    }

    /// Check the capability set: field names and required columns.
    pub fn validate(&self) -> Result<()> {
        for (what, name) in [("group", &self.group), ("treatment", &self.treatment)] {
            if name.trim().is_empty() {
                return Err(Error::InvalidInput(format!("policy {} field is empty", what)));
            }
        }
        for (what, name) in [("group", &self.group), ("treatment", &self.treatment)] {
            if RESERVED.contains(&name.as_str()) {
                return Err(Error::Validation(format!(
                    "policy {} column '{}' collides with a reserved engine column",
                    what, name
                )));
            }
        }
        if self.risk_col.trim().is_empty() {
            return Err(Error::InvalidInput("policy risk_col tag is empty".to_string()));
        }
        self.data.factor(&self.group)?;
        self.data.numeric(&self.treatment)?;
        for col in [PTRT_COL, RESP_CTL_COL, RESP_TRT_COL] {
            self.data.numeric(col)?;
        }
        let fold = self.data.require(FOLD_COL)?;
        if fold.as_numeric().is_some() {
            return Err(Error::InvalidInput(format!("column '{}' must hold fold labels", FOLD_COL)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regression::LogisticFitter;
    use ds_core::{Column, Factor};

    fn data() -> Frame {
        Frame::from_columns(vec![
            ("race".into(), Column::Factor(Factor::from_labels(&["a", "b"]))),
            ("frisked".into(), Column::Numeric(vec![0.0, 1.0])),
            (FOLD_COL.into(), Column::Text(vec!["train".into(), "test".into()])),
            (PTRT_COL.into(), Column::Numeric(vec![0.3, 0.6])),
            (RESP_CTL_COL.into(), Column::Numeric(vec![0.1, 0.2])),
            (RESP_TRT_COL.into(), Column::Numeric(vec![0.2, 0.4])),
        ])
        .unwrap()
    }

    #[test]
    fn test_risk_regime_parsing() {
        assert_eq!("resp_ctl".parse::<RiskRegime>().unwrap(), RiskRegime::Control);
        assert_eq!("resp_trt__".parse::<RiskRegime>().unwrap(), RiskRegime::Treatment);
        assert!(matches!("risk".parse::<RiskRegime>(), Err(Error::MisspecifiedPolicy(_))));
    }

    #[test]
    fn test_validate_accepts_complete_policy() {
        let pol = Policy::new("race", "frisked", data(), Arc::new(LogisticFitter::default()));
        assert!(pol.validate().is_ok());
        assert_eq!(pol.risk_regime().unwrap(), RiskRegime::Control);
    }

    #[test]
    fn test_validate_rejects_reserved_field_names() {
        let fitter = Arc::new(LogisticFitter::default());
        for reserved in ["weight", "risk", "u", "q", "dp"] {
            let renamed = data()
                .with_column(reserved, Column::Numeric(vec![0.0, 1.0]))
                .unwrap();
            let pol = Policy::new("race", reserved, renamed, fitter.clone());
            assert!(matches!(pol.validate(), Err(Error::Validation(_))), "treatment '{}'", reserved);
        }
        let pol = Policy::new("u", "frisked", data(), fitter);
        assert!(matches!(pol.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_reports_missing_capabilities() {
        let fitter = Arc::new(LogisticFitter::default());
        let pol = Policy::new("sex", "frisked", data(), fitter.clone());
        assert!(matches!(pol.validate(), Err(Error::InvalidInput(_))));

        let pol = Policy::new("frisked", "frisked", data(), fitter.clone());
        assert!(matches!(pol.validate(), Err(Error::InvalidInput(_))));

        let no_fold = data().select(&["race", "frisked", PTRT_COL, RESP_CTL_COL, RESP_TRT_COL]).unwrap();
        let pol = Policy::new("race", "frisked", no_fold, fitter);
        assert!(matches!(pol.validate(), Err(Error::InvalidInput(_))));
    }
}

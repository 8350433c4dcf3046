//! Model formulas of the form `outcome ~ term + term + a:b`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A regression formula: one outcome and an ordered list of right-hand terms.
///
/// Terms are stored verbatim; interaction terms such as `a:b` or `a*b` stay a
/// single compound term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    outcome: String,
    terms: Vec<String>,
}

impl Formula {
    /// Create a formula, validating that neither side is empty.
    pub fn new(outcome: impl Into<String>, terms: Vec<String>) -> Result<Self> {
        let outcome = outcome.into().trim().to_string();
        if outcome.is_empty() {
            return Err(Error::Validation("formula outcome must be non-empty".into()));
        }
        if terms.is_empty() {
            return Err(Error::Validation(format!("formula for '{}' has no terms", outcome)));
        }
        let mut out = Vec::with_capacity(terms.len());
        for t in terms {
            let t = t.trim().to_string();
            if t.is_empty() {
                return Err(Error::Validation(format!("formula for '{}' has an empty term", outcome)));
            }
            out.push(t);
        }
        Ok(Self { outcome, terms: out })
    }

    /// Parse `"y ~ a + b + a:b"`.
    pub fn parse(s: &str) -> Result<Self> {
        let (lhs, rhs) = s
            .split_once('~')
            .ok_or_else(|| Error::Validation(format!("formula '{}' is missing '~'", s)))?;
        if rhs.contains('~') {
            return Err(Error::Validation(format!("formula '{}' has more than one '~'", s)));
        }
        let terms = rhs.split('+').map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "));
        Self::new(lhs, terms.collect())
    }

    /// Outcome (left-hand side) name.
    pub fn outcome(&self) -> &str {
        &self.outcome
    }

    /// Right-hand side terms, in order.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ {}", self.outcome, self.terms.join(" + "))
    }
}

impl FromStr for Formula {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Build `outcome ~ f1 + f2 + ...`.
pub fn make_formula<S: AsRef<str>>(outcome: &str, features: &[S]) -> Result<Formula> {
    Formula::new(outcome, features.iter().map(|f| f.as_ref().to_string()).collect())
}

/// Decomposition of a policy formula `treat ~ group + feats...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaFeatures {
    /// Treatment (outcome) name.
    pub treat: String,
    /// Grouping term: the first right-hand term.
    pub group: String,
    /// Remaining terms, verbatim.
    pub feats: Vec<String>,
}

/// Split a formula into treatment, grouping term and remaining feature terms.
pub fn extract_features(formula: &Formula) -> Result<FormulaFeatures> {
    let (group, feats) = formula.terms().split_first().ok_or_else(|| {
        Error::Validation(format!("formula '{}' has no grouping term", formula))
    })?;
    Ok(FormulaFeatures {
        treat: formula.outcome().to_string(),
        group: group.clone(),
        feats: feats.to_vec(),
    })
}

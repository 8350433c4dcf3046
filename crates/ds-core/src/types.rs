//! Tabular data types: categorical factors, named columns, frames and tidy fit rows.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Categorical column with an explicit, ordered level set.
///
/// Each row stores a 0-based code into `levels`. The level order is meaningful:
/// the first level is the baseline for treatment contrasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FactorRepr")]
pub struct Factor {
    levels: Vec<String>,
    codes: Vec<usize>,
}

#[derive(Deserialize)]
struct FactorRepr {
    levels: Vec<String>,
    codes: Vec<usize>,
}

impl TryFrom<FactorRepr> for Factor {
    type Error = Error;

    fn try_from(r: FactorRepr) -> Result<Self> {
        Factor::new(r.levels, r.codes)
    }
}

impl Factor {
    /// Create a factor from an explicit level set and row codes.
    pub fn new(levels: Vec<String>, codes: Vec<usize>) -> Result<Self> {
        let mut seen = HashMap::with_capacity(levels.len());
        for (i, l) in levels.iter().enumerate() {
            if seen.insert(l.as_str(), i).is_some() {
                return Err(Error::Validation(format!("duplicate factor level '{}'", l)));
            }
        }
        if let Some(&c) = codes.iter().find(|&&c| c >= levels.len()) {
            return Err(Error::Validation(format!(
                "factor code {} out of range for {} levels",
                c,
                levels.len()
            )));
        }
        Ok(Self { levels, codes })
    }

    /// Build a factor whose levels are the sorted distinct labels.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut levels: Vec<String> = labels.iter().map(|s| s.as_ref().to_string()).collect();
        levels.sort();
        levels.dedup();
        let index: HashMap<&str, usize> =
            levels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();
        let codes = labels.iter().map(|s| index[s.as_ref()]).collect();
        Self { levels, codes }
    }

    /// Build a factor against a caller-supplied level order.
    ///
    /// Fails if any label is not one of `levels`.
    pub fn with_levels<S: AsRef<str>>(labels: &[S], levels: Vec<String>) -> Result<Self> {
        let index: HashMap<&str, usize> =
            levels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();
        let mut codes = Vec::with_capacity(labels.len());
        for s in labels {
            let code = index.get(s.as_ref()).copied().ok_or_else(|| {
                Error::Validation(format!("label '{}' is not a declared level", s.as_ref()))
            })?;
            codes.push(code);
        }
        Self::new(levels, codes)
    }

    /// Ordered level set.
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Per-row 0-based level codes.
    pub fn codes(&self) -> &[usize] {
        &self.codes
    }

    /// Number of declared levels.
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// `true` if the factor has no rows.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Label of row `i`.
    pub fn label(&self, i: usize) -> &str {
        &self.levels[self.codes[i]]
    }

    /// Position of `level` in the level set.
    pub fn level_index(&self, level: &str) -> Option<usize> {
        self.levels.iter().position(|l| l == level)
    }

    /// Select rows by index (indices may repeat). The level set is kept.
    pub fn take(&self, rows: &[usize]) -> Self {
        Self { levels: self.levels.clone(), codes: rows.iter().map(|&i| self.codes[i]).collect() }
    }

    /// Remove levels that no row uses, keeping the relative order of the rest.
    pub fn droplevels(&self) -> Self {
        let mut used = vec![false; self.levels.len()];
        for &c in &self.codes {
            used[c] = true;
        }
        let mut remap = vec![usize::MAX; self.levels.len()];
        let mut levels = Vec::new();
        for (i, l) in self.levels.iter().enumerate() {
            if used[i] {
                remap[i] = levels.len();
                levels.push(l.clone());
            }
        }
        Self { levels, codes: self.codes.iter().map(|&c| remap[c]).collect() }
    }

    /// Reorder levels to exactly `order`.
    ///
    /// `order` must not repeat a level and must cover every level used by a row.
    /// Levels in `order` that no row uses are kept (they have no rows).
    pub fn relevel<S: AsRef<str>>(&self, order: &[S]) -> Result<Self> {
        let levels: Vec<String> = order.iter().map(|s| s.as_ref().to_string()).collect();
        let labels: Vec<&str> = (0..self.len()).map(|i| self.label(i)).collect();
        Self::with_levels(&labels, levels)
    }
}

/// A named data column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum Column {
    /// Real-valued column.
    Numeric(Vec<f64>),
    /// Categorical column with ordered levels.
    Factor(Factor),
    /// Untyped string column (not categorical).
    Text(Vec<String>),
}

impl Column {
    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Factor(f) => f.len(),
            Column::Text(v) => v.len(),
        }
    }

    /// `true` if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` for factor columns.
    pub fn is_categorical(&self) -> bool {
        matches!(self, Column::Factor(_))
    }

    /// Numeric values, if this is a numeric column.
    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            Column::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Factor, if this is a categorical column.
    pub fn as_factor(&self) -> Option<&Factor> {
        match self {
            Column::Factor(f) => Some(f),
            _ => None,
        }
    }

    /// String label of row `i` for factor/text columns.
    pub fn label(&self, i: usize) -> Option<&str> {
        match self {
            Column::Factor(f) => Some(f.label(i)),
            Column::Text(v) => Some(v[i].as_str()),
            Column::Numeric(_) => None,
        }
    }

    /// Short kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Column::Numeric(_) => "numeric",
            Column::Factor(_) => "factor",
            Column::Text(_) => "text",
        }
    }

    /// Select rows by index (indices may repeat).
    pub fn take(&self, rows: &[usize]) -> Self {
        match self {
            Column::Numeric(v) => Column::Numeric(rows.iter().map(|&i| v[i]).collect()),
            Column::Factor(f) => Column::Factor(f.take(rows)),
            Column::Text(v) => Column::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

/// Column-oriented table with equal-length named columns, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    n_rows: usize,
    columns: Vec<(String, Column)>,
}

impl Frame {
    /// Empty frame with a fixed row count.
    pub fn new(n_rows: usize) -> Self {
        Self { n_rows, columns: Vec::new() }
    }

    /// Build a frame from named columns; all columns must share one length.
    pub fn from_columns(columns: Vec<(String, Column)>) -> Result<Self> {
        let n_rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        let mut frame = Self::new(n_rows);
        for (name, col) in columns {
            frame = frame.with_column(name, col)?;
        }
        Ok(frame)
    }

    /// Append a column, or replace an existing column of the same name.
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        let name = name.into();
        if column.len() != self.n_rows {
            return Err(Error::Validation(format!(
                "column '{}' has length {}, frame has {} rows",
                name,
                column.len(),
                self.n_rows
            )));
        }
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = column,
            None => self.columns.push((name, column)),
        }
        Ok(self)
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Column names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// `true` if a column named `name` exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Look up a column, failing with [`Error::InvalidInput`] if absent.
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| Error::InvalidInput(format!("missing column '{}'", name)))
    }

    /// Numeric column accessor.
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        let col = self.require(name)?;
        col.as_numeric().ok_or_else(|| {
            Error::InvalidInput(format!("column '{}' must be numeric, found {}", name, col.kind()))
        })
    }

    /// Factor column accessor.
    pub fn factor(&self, name: &str) -> Result<&Factor> {
        let col = self.require(name)?;
        col.as_factor().ok_or_else(|| {
            Error::InvalidInput(format!(
                "column '{}' must be categorical, found {}",
                name,
                col.kind()
            ))
        })
    }

    /// Select rows by index (indices may repeat, so this also duplicates rows).
    pub fn take(&self, rows: &[usize]) -> Self {
        Self {
            n_rows: rows.len(),
            columns: self.columns.iter().map(|(n, c)| (n.clone(), c.take(rows))).collect(),
        }
    }

    /// Keep only the named columns, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let mut out = Self::new(self.n_rows);
        for name in names {
            let col = self.require(name.as_ref())?;
            out = out.with_column(name.as_ref(), col.clone())?;
        }
        Ok(out)
    }
}

/// One row of tidy regression output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TidyCoefficient {
    /// Term name, e.g. `(Intercept)`, `racewhite`, `risk`.
    pub term: String,
    /// Point estimate.
    pub estimate: f64,
    /// Standard error.
    #[serde(rename = "std.error")]
    pub std_error: f64,
    /// Wald statistic `estimate / std_error`.
    pub statistic: f64,
    /// Two-sided p-value of the Wald statistic.
    #[serde(rename = "p.value")]
    pub p_value: f64,
}

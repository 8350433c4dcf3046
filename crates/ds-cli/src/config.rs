//! Run configuration (YAML or JSON) and column-data loading.

use anyhow::{Context, Result, bail};
use ds_core::{Column, Factor, Fitter, Frame};
use ds_inference::{EstimateOptions, LinearFitter, LogisticFitter, Policy, SensitivityParams};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Regression backend used for the naive and weighted fits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    #[default]
    Logistic,
    Linear,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Column data file (JSON object of arrays), relative to the config file.
    pub data: PathBuf,
    pub group: String,
    pub treatment: String,
    #[serde(default)]
    pub controls: Vec<String>,
    #[serde(default = "default_risk_col")]
    pub risk_col: String,
    #[serde(default)]
    pub family: Family,
}

fn default_risk_col() -> String {
    "resp_ctl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub policy: PolicyConfig,
    /// Parameters for `estimate`.
    #[serde(default)]
    pub params: Option<SensitivityParams>,
    #[serde(default)]
    pub options: EstimateOptions,
    /// Parameter grid for `sweep`.
    #[serde(default)]
    pub grid: Vec<SensitivityParams>,
    /// Threads (0 = auto).
    #[serde(default)]
    pub threads: usize,
}

pub fn read_run_config(path: &Path) -> Result<RunConfig> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    // YAML is a superset of JSON, so one parser covers both.
    let cfg: RunConfig = serde_yaml_ng::from_slice(&bytes)
        .with_context(|| format!("parsing run config {}", path.display()))?;
    Ok(cfg)
}

impl RunConfig {
    /// Build the policy, resolving the data path against `base_dir`.
    pub fn load_policy(&self, base_dir: &Path) -> Result<Policy> {
        let p = &self.policy;
        let data_path = if p.data.is_absolute() { p.data.clone() } else { base_dir.join(&p.data) };
        let data = read_column_data(&data_path)?;
        tracing::info!(path = %data_path.display(), rows = data.n_rows(), "loaded column data");

        let fitter: Arc<dyn Fitter> = match p.family {
            Family::Logistic => Arc::new(LogisticFitter::default()),
            Family::Linear => Arc::new(LinearFitter),
        };
        Ok(Policy::new(p.group.clone(), p.treatment.clone(), data, fitter)
            .with_controls(p.controls.iter().cloned())
            .with_risk_col(p.risk_col.clone()))
    }
}

fn column_from_json(name: &str, values: &[serde_json::Value]) -> Result<Column> {
    if values.iter().all(|v| v.is_string()) && !values.is_empty() {
        let labels: Vec<&str> = values.iter().filter_map(|v| v.as_str()).collect();
        return Ok(Column::Factor(Factor::from_labels(&labels)));
    }
    let mut out = Vec::with_capacity(values.len());
    for (i, v) in values.iter().enumerate() {
        let x = match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        };
        match x {
            Some(x) => out.push(x),
            None => bail!("column '{}' row {}: expected a number, bool or string, got {}", name, i, v),
        }
    }
    Ok(Column::Numeric(out))
}

/// Parse a JSON object mapping column name to array.
///
/// String arrays become factors with sorted levels; number and bool arrays become numeric.
pub fn parse_column_data(json: &str) -> Result<Frame> {
    let obj: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(json).context("column data must be a JSON object of arrays")?;
    let mut columns = Vec::with_capacity(obj.len());
    for (name, value) in obj {
        let Some(values) = value.as_array() else {
            bail!("column '{}' is not an array", name);
        };
        let col = column_from_json(&name, values)?;
        columns.push((name, col));
    }
    Ok(Frame::from_columns(columns)?)
}

pub fn read_column_data(path: &Path) -> Result<Frame> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_column_data(&text).with_context(|| format!("loading column data {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_column_data_kinds() {
        let f = parse_column_data(r#"{"g": ["b", "a", "b"], "x": [1, 2.5, 3], "t": [true, false, true]}"#)
            .unwrap();
        assert_eq!(f.n_rows(), 3);
        assert_eq!(f.factor("g").unwrap().levels(), &["a", "b"]);
        assert_eq!(f.numeric("x").unwrap(), &[1.0, 2.5, 3.0]);
        assert_eq!(f.numeric("t").unwrap(), &[1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_parse_column_data_errors() {
        assert!(parse_column_data("[1, 2]").is_err());
        assert!(parse_column_data(r#"{"x": 3}"#).is_err());
        assert!(parse_column_data(r#"{"x": [1, null]}"#).is_err());
        assert!(parse_column_data(r#"{"x": [1, 2], "y": [1]}"#).is_err());
    }

    #[test]
    fn test_run_config_yaml() {
        let yaml = r#"
policy:
  data: data.json
  group: race
  treatment: frisked
  controls: [age]
params:
  q: 0.3
  dp: 0.0
  d0: [0.5, 0.5]
  d1: 0.5
options:
  compare: [white, black]
grid:
  - { q: 0.1, dp: 1.0, d0: 0.0, d1: 0.0 }
"#;
        let cfg: RunConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(cfg.policy.risk_col, "resp_ctl");
        assert_eq!(cfg.policy.family, Family::Logistic);
        let params = cfg.params.unwrap();
        assert_eq!(params.q.as_slice(), &[0.3]);
        assert_eq!(params.d0.as_slice(), &[0.5, 0.5]);
        assert!(cfg.options.naive_se);
        assert_eq!(cfg.options.compare.as_deref().map(<[String]>::len), Some(2));
        assert_eq!(cfg.grid.len(), 1);
    }
}

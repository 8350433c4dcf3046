//! Reduce tagged bound estimates to one `(term, min, max)` row per group.

use std::collections::HashMap;

use ds_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// An estimate tagged `"<group>_<bound>"`, bound being `min` or `max`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedEstimate {
    /// Compound tag, e.g. `"black_max"`.
    pub tag: String,
    /// Coefficient term.
    pub term: String,
    /// Estimate at this bound.
    pub estimate: f64,
}

/// Lower and upper estimate for one term and group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermBounds {
    /// Coefficient term.
    pub term: String,
    /// Group prefix of the tag.
    pub group: String,
    /// Estimate tagged `min`.
    pub min: f64,
    /// Estimate tagged `max`.
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Min,
    Max,
}

/// Split `"<group>_<bound>"` at its last underscore.
fn split_tag(tag: &str) -> Result<(&str, Bound)> {
    let (group, bound) = tag
        .rsplit_once('_')
        .ok_or_else(|| Error::MalformedTag(format!("tag '{}' has no '_' separator", tag)))?;
    if group.is_empty() {
        return Err(Error::MalformedTag(format!("tag '{}' has an empty group", tag)));
    }
    let bound = match bound {
        "min" => Bound::Min,
        "max" => Bound::Max,
        other => {
            return Err(Error::MalformedTag(format!(
                "tag '{}' has bound '{}', expected 'min' or 'max'",
                tag, other
            )));
        }
    };
    Ok((group, bound))
}

/// Pivot tagged estimates so each `(term, group)` gets `min` and `max` columns.
///
/// Output rows follow first appearance in `rows`. Every `(term, group)` needs
/// exactly one `min` and one `max` estimate.
pub fn summarize(rows: &[TaggedEstimate]) -> Result<Vec<TermBounds>> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut cells: HashMap<(String, String), (Option<f64>, Option<f64>)> = HashMap::new();

    for row in rows {
        let (group, bound) = split_tag(&row.tag)?;
        let key = (row.term.clone(), group.to_string());
        let cell = cells.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            (None, None)
        });
        let slot = match bound {
            Bound::Min => &mut cell.0,
            Bound::Max => &mut cell.1,
        };
        if slot.replace(row.estimate).is_some() {
            return Err(Error::Validation(format!(
                "duplicate '{}' estimate for term '{}'",
                row.tag, row.term
            )));
        }
    }

    order
        .into_iter()
        .map(|(term, group)| {
            let (min, max) = cells[&(term.clone(), group.clone())];
            match (min, max) {
                (Some(min), Some(max)) => Ok(TermBounds { term, group, min, max }),
                _ => Err(Error::Validation(format!(
                    "term '{}' in group '{}' lacks a {} estimate",
                    term,
                    group,
                    if min.is_none() { "min" } else { "max" }
                ))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(tag: &str, term: &str, estimate: f64) -> TaggedEstimate {
        TaggedEstimate { tag: tag.into(), term: term.into(), estimate }
    }

    #[test]
    fn test_summarize_pivots_bounds() {
        let rows = vec![
            tagged("A_min", "raceA", 1.0),
            tagged("A_max", "raceA", 3.0),
            tagged("B_min", "raceB", 2.0),
            tagged("B_max", "raceB", 5.0),
        ];
        let out = summarize(&rows).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], TermBounds { term: "raceA".into(), group: "A".into(), min: 1.0, max: 3.0 });
        assert_eq!(out[1], TermBounds { term: "raceB".into(), group: "B".into(), min: 2.0, max: 5.0 });
        assert!(out.iter().all(|b| b.min <= b.max));
    }

    #[test]
    fn test_group_may_contain_underscores() {
        let rows = vec![tagged("native_american_max", "t", 2.0), tagged("native_american_min", "t", 1.0)];
        let out = summarize(&rows).unwrap();
        assert_eq!(out[0].group, "native_american");
        assert_eq!((out[0].min, out[0].max), (1.0, 2.0));
    }

    #[test]
    fn test_malformed_tags() {
        for tag in ["Amin", "A_mid", "_min", "A_"] {
            let err = summarize(&[tagged(tag, "t", 0.0)]).unwrap_err();
            assert!(matches!(err, Error::MalformedTag(_)), "tag {} gave {:?}", tag, err);
        }
    }

    #[test]
    fn test_incomplete_or_duplicate_bounds() {
        assert!(summarize(&[tagged("A_min", "t", 0.0)]).is_err());
        let dup = [tagged("A_min", "t", 0.0), tagged("A_min", "t", 1.0)];
        assert!(matches!(summarize(&dup), Err(Error::Validation(_))));
    }
}

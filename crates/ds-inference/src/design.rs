//! Design-matrix construction from a [`Formula`] and a [`Frame`].
//!
//! Column naming follows treatment contrasts: an intercept `(Intercept)`,
//! one column per numeric variable, `<variable><level>` dummies for every
//! factor level but the first, and `a:b` products for interaction terms.
//! `a*b` expands to `a + b + a:b`.

use ds_core::{Column, Error, Factor, Formula, Frame, Result};

/// Name of the intercept column.
pub const INTERCEPT: &str = "(Intercept)";

/// Dense row-major design matrix with named columns.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    names: Vec<String>,
    n: usize,
    data: Vec<f64>, // length n*p, row-major
}

impl DesignMatrix {
    /// Column names, intercept first.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    /// Row `i` as a slice.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        let p = self.n_cols();
        &self.data[i * p..(i + 1) * p]
    }
}

/// Columns produced by expanding one variable or interaction.
struct Block {
    names: Vec<String>,
    cols: Vec<Vec<f64>>,
}

/// Treatment-contrast dummies over the levels present in `f`.
///
/// Levels with no rows are dropped first, so neither an all-zero column nor an
/// empty baseline can make the design rank-deficient.
fn dummies(name: &str, f: &Factor) -> Block {
    let f = f.droplevels();
    let mut names = Vec::with_capacity(f.n_levels().saturating_sub(1));
    let mut cols = Vec::with_capacity(names.capacity());
    for (k, level) in f.levels().iter().enumerate().skip(1) {
        names.push(format!("{}{}", name, level));
        cols.push(f.codes().iter().map(|&c| if c == k { 1.0 } else { 0.0 }).collect());
    }
    Block { names, cols }
}

fn expand_variable(name: &str, data: &Frame) -> Result<Block> {
    match data.column(name) {
        None => Err(Error::Validation(format!("formula variable '{}' not found in data", name))),
        Some(Column::Numeric(v)) => {
            if v.iter().any(|x| !x.is_finite()) {
                return Err(Error::Validation(format!(
                    "column '{}' must contain only finite values",
                    name
                )));
            }
            Ok(Block { names: vec![name.to_string()], cols: vec![v.clone()] })
        }
        Some(Column::Factor(f)) => Ok(dummies(name, f)),
        Some(Column::Text(v)) => Ok(dummies(name, &Factor::from_labels(v))),
    }
}

fn interact(a: Block, b: Block) -> Block {
    let mut names = Vec::with_capacity(a.names.len() * b.names.len());
    let mut cols = Vec::with_capacity(names.capacity());
    for (na, ca) in a.names.iter().zip(&a.cols) {
        for (nb, cb) in b.names.iter().zip(&b.cols) {
            names.push(format!("{}:{}", na, nb));
            cols.push(ca.iter().zip(cb).map(|(x, y)| x * y).collect());
        }
    }
    Block { names, cols }
}

fn expand_interaction(vars: &[&str], data: &Frame) -> Result<Block> {
    let mut iter = vars.iter();
    let first = iter
        .next()
        .ok_or_else(|| Error::Validation("empty interaction term".to_string()))?;
    let mut block = expand_variable(first, data)?;
    for v in iter {
        block = interact(block, expand_variable(v, data)?);
    }
    Ok(block)
}

/// Expand one formula term into its column blocks.
fn expand_term(term: &str, data: &Frame) -> Result<Vec<Block>> {
    if term.contains('*') {
        let parts: Vec<&str> = term.split('*').map(str::trim).collect();
        if parts.iter().any(|p| p.is_empty()) || parts.len() > 16 {
            return Err(Error::Validation(format!("malformed crossing term '{}'", term)));
        }
        // Main effects first, then higher-order interactions.
        let mut subsets: Vec<Vec<&str>> = (1u32..(1 << parts.len()))
            .map(|mask| {
                parts.iter().enumerate().filter(|(i, _)| mask & (1 << *i) != 0).map(|(_, p)| *p).collect()
            })
            .collect();
        subsets.sort_by_key(|s| s.len());
        subsets.iter().map(|s| expand_interaction(s, data)).collect()
    } else {
        let vars: Vec<&str> = term.split(':').map(str::trim).collect();
        if vars.iter().any(|v| v.is_empty()) {
            return Err(Error::Validation(format!("malformed interaction term '{}'", term)));
        }
        Ok(vec![expand_interaction(&vars, data)?])
    }
}

/// Build the design matrix and response vector for `formula` over `data`.
pub fn model_matrix(formula: &Formula, data: &Frame) -> Result<(DesignMatrix, Vec<f64>)> {
    let n = data.n_rows();
    if n == 0 {
        return Err(Error::Validation("cannot fit a model on an empty frame".to_string()));
    }
    let y = data.numeric(formula.outcome()).map_err(|_| {
        Error::Validation(format!("outcome '{}' must be a numeric column", formula.outcome()))
    })?;
    if y.iter().any(|v| !v.is_finite()) {
        return Err(Error::Validation(format!(
            "outcome '{}' must contain only finite values",
            formula.outcome()
        )));
    }

    let mut names = vec![INTERCEPT.to_string()];
    let mut cols = vec![vec![1.0; n]];
    for term in formula.terms() {
        for block in expand_term(term, data)? {
            for (name, col) in block.names.into_iter().zip(block.cols) {
                if !names.contains(&name) {
                    names.push(name);
                    cols.push(col);
                }
            }
        }
    }

    let p = names.len();
    let mut data_rm = Vec::with_capacity(n * p);
    for i in 0..n {
        data_rm.extend(cols.iter().map(|c| c[i]));
    }
    Ok((DesignMatrix { names, n, data: data_rm }, y.to_vec()))
}

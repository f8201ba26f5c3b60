//! # Polynomial Library
//!
//! Enumerates the degree-≤2 monomials over `r` state variables and indexes
//! them by structure (constant, linear, pure quadratic, mixed quadratic).
//!
//! ## Term Ordering
//!
//! Terms are produced in the conventional polynomial-features order:
//!
//! ```text
//! [1], x0, x1, ..., x0², x0·x1, x0·x2, ..., x1², x1·x2, ..., x(r-1)²
//! ```
//!
//! i.e. the optional bias, then every variable, then all degree-2
//! combinations with replacement in lexicographic order. With
//! `interaction_only` the pure squares are skipped. Every tensor and
//! constraint in the workspace is laid out against this ordering.

use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::LibraryError;

/// Structural class of a monomial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermKind {
    /// All exponents zero.
    Constant,
    /// Exponent sum one.
    Linear,
    /// One variable squared.
    PureQuadratic,
    /// Product of two distinct variables.
    MixedQuadratic,
}

impl fmt::Display for TermKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Constant => "constant",
            Self::Linear => "linear",
            Self::PureQuadratic => "pure quadratic",
            Self::MixedQuadratic => "mixed quadratic",
        };
        f.write_str(s)
    }
}

/// One library column: its position and the exponent of each variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyTerm {
    /// Column index in the feature matrix.
    pub index: usize,
    /// Exponent of each state variable.
    pub exponents: Vec<u32>,
}

impl PolyTerm {
    /// Total degree of the monomial.
    pub fn degree(&self) -> u32 {
        self.exponents.iter().sum()
    }

    /// Classify the monomial. Returns `None` for degree > 2.
    pub fn kind(&self) -> Option<TermKind> {
        let max = self.exponents.iter().copied().max().unwrap_or(0);
        match (self.degree(), max) {
            (0, _) => Some(TermKind::Constant),
            (1, _) => Some(TermKind::Linear),
            (2, 2) => Some(TermKind::PureQuadratic),
            (2, 1) => Some(TermKind::MixedQuadratic),
            _ => None,
        }
    }

    /// Variables with a nonzero exponent, ascending.
    pub fn variables(&self) -> Vec<usize> {
        self.exponents
            .iter()
            .enumerate()
            .filter(|(_, &e)| e > 0)
            .map(|(v, _)| v)
            .collect()
    }

    /// Evaluate the monomial at one state.
    pub fn evaluate(&self, state: &[f64]) -> f64 {
        self.exponents
            .iter()
            .zip(state)
            .fold(1.0, |acc, (&e, &x)| acc * x.powi(e as i32))
    }
}

/// Degree-2 polynomial feature enumeration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolynomialLibrary {
    /// Prepend the constant term.
    pub include_bias: bool,
    /// Drop the pure squares.
    pub interaction_only: bool,
}

impl PolynomialLibrary {
    /// Maximum total degree of any term.
    pub const DEGREE: u32 = 2;

    /// Library without bias, including pure squares.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether the constant term is included.
    pub fn with_bias(mut self, include_bias: bool) -> Self {
        self.include_bias = include_bias;
        self
    }

    /// Set whether pure squares are dropped.
    pub fn with_interaction_only(mut self, interaction_only: bool) -> Self {
        self.interaction_only = interaction_only;
        self
    }

    /// Enumerate terms for `n_vars` variables in library order.
    pub fn terms(&self, n_vars: usize) -> Vec<PolyTerm> {
        let mut exps: Vec<Vec<u32>> = Vec::with_capacity(self.n_features(n_vars));
        if self.include_bias {
            exps.push(vec![0; n_vars]);
        }
        for v in 0..n_vars {
            let mut e = vec![0; n_vars];
            e[v] = 1;
            exps.push(e);
        }
        for a in 0..n_vars {
            let start = if self.interaction_only { a + 1 } else { a };
            for b in start..n_vars {
                let mut e = vec![0; n_vars];
                e[a] += 1;
                e[b] += 1;
                exps.push(e);
            }
        }
        exps.into_iter()
            .enumerate()
            .map(|(index, exponents)| PolyTerm { index, exponents })
            .collect()
    }

    /// Number of terms for `n_vars` variables.
    pub fn n_features(&self, n_vars: usize) -> usize {
        let quadratic = if self.interaction_only {
            n_vars * n_vars.saturating_sub(1) / 2
        } else {
            n_vars * (n_vars + 1) / 2
        };
        usize::from(self.include_bias) + n_vars + quadratic
    }

    /// Evaluate every term on every sample (rows of `x`).
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let terms = self.terms(x.ncols());
        let mut out = Array2::zeros((x.nrows(), terms.len()));
        for (s, row) in x.rows().into_iter().enumerate() {
            let state: Vec<f64> = row.iter().copied().collect();
            for term in &terms {
                out[[s, term.index]] = term.evaluate(&state);
            }
        }
        out
    }

    /// Enumerate and index the library for `n_vars` variables.
    pub fn info(&self, n_vars: usize) -> Result<LibraryInfo, LibraryError> {
        LibraryInfo::from_terms(&self.terms(n_vars))
    }
}

/// Unordered pair of variables, stored sorted so `(j, k)` and `(k, j)`
/// share one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymmetricPair(usize, usize);

impl SymmetricPair {
    /// Canonicalize an unordered pair.
    pub fn new(a: usize, b: usize) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    /// Smaller variable.
    pub fn low(&self) -> usize {
        self.0
    }

    /// Larger variable.
    pub fn high(&self) -> usize {
        self.1
    }
}

/// Structural index of a library: which column holds which monomial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryInfo {
    n_targets: usize,
    n_features: usize,
    constant: Option<usize>,
    linear: BTreeMap<usize, usize>,
    pure: BTreeMap<usize, usize>,
    mixed: BTreeMap<SymmetricPair, usize>,
}

impl LibraryInfo {
    /// Index a term list. The number of targets is the length of the
    /// exponent vectors.
    pub fn from_terms(terms: &[PolyTerm]) -> Result<Self, LibraryError> {
        let n_targets = terms.first().map_or(0, |t| t.exponents.len());
        if terms.is_empty() || n_targets == 0 {
            return Err(LibraryError::Empty { n_targets });
        }
        let mut info = Self {
            n_targets,
            n_features: terms.len(),
            constant: None,
            linear: BTreeMap::new(),
            pure: BTreeMap::new(),
            mixed: BTreeMap::new(),
        };
        for term in terms {
            let vars = term.variables();
            match term.kind() {
                Some(TermKind::Constant) => info.constant = Some(term.index),
                Some(TermKind::Linear) => {
                    info.linear.insert(vars[0], term.index);
                }
                Some(TermKind::PureQuadratic) => {
                    info.pure.insert(vars[0], term.index);
                }
                Some(TermKind::MixedQuadratic) => {
                    info.mixed
                        .insert(SymmetricPair::new(vars[0], vars[1]), term.index);
                }
                None => {}
            }
        }
        Ok(info)
    }

    /// Number of state variables.
    pub fn n_targets(&self) -> usize {
        self.n_targets
    }

    /// Number of library terms.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Column of the constant term, if present.
    pub fn constant_term(&self) -> Option<usize> {
        self.constant
    }

    /// Column of `x_var`.
    pub fn linear_term(&self, var: usize) -> Result<usize, LibraryError> {
        self.linear
            .get(&var)
            .copied()
            .ok_or(LibraryError::MissingTerm {
                kind: TermKind::Linear,
                variables: vec![var],
            })
    }

    /// Column of `x_var²`.
    pub fn pure_term(&self, var: usize) -> Result<usize, LibraryError> {
        self.pure
            .get(&var)
            .copied()
            .ok_or(LibraryError::MissingTerm {
                kind: TermKind::PureQuadratic,
                variables: vec![var],
            })
    }

    /// Column of `x_a·x_b`, in either argument order.
    pub fn mixed_term(&self, a: usize, b: usize) -> Result<usize, LibraryError> {
        let key = SymmetricPair::new(a, b);
        self.mixed
            .get(&key)
            .copied()
            .ok_or(LibraryError::MissingTerm {
                kind: TermKind::MixedQuadratic,
                variables: vec![key.low(), key.high()],
            })
    }

    /// Mixed terms in library order.
    pub fn mixed_terms(&self) -> impl Iterator<Item = (SymmetricPair, usize)> + '_ {
        self.mixed.iter().map(|(&pair, &idx)| (pair, idx))
    }

    /// Pure terms keyed by variable, ascending.
    pub fn pure_terms(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.pure.iter().map(|(&var, &idx)| (var, idx))
    }
}

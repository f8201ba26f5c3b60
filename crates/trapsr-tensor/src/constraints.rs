//! # Energy-Preserving Constraints
//!
//! Builds the homogeneous equality system `C·w = 0` under which the
//! quadratic part of a model conserves energy, the algebraic condition for
//! provable global boundedness. Three families of rows, over the raw
//! `(row, term, target)` layout:
//!
//! ```text
//! pure    (r rows)        x_i² in equation i vanishes
//! double  (2·C(r,2) rows) x_i·x_j in eq. i  +  x_i² in eq. j  = 0
//!                         x_i·x_j in eq. j  +  x_j² in eq. i  = 0
//! triple  (C(r,3) rows)   x_j·x_k in eq. i + x_k·x_i in eq. j + x_i·x_j in eq. k = 0
//! ```
//!
//! The system is data independent; it is built once per fit.

use ndarray::{Array1, Array2, Array3, ArrayView2};
use serde::{Deserialize, Serialize};

use trapsr_core::{LibraryError, LibraryInfo};

/// Flattening convention of the `(p, r)` coefficient layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintOrder {
    /// Column `f * r + t`: all targets of term 0, then term 1, ...
    #[default]
    Feature,
    /// Column `t * p + f`: all terms of target 0, then target 1, ...
    Target,
}

/// Number of rows for `r` targets: `r + 2·C(r,2) + C(r,3)`.
pub fn constraint_count(r: usize) -> usize {
    let pairs = r * r.saturating_sub(1) / 2;
    let triples = r * r.saturating_sub(1) * r.saturating_sub(2) / 6;
    r + 2 * pairs + triples
}

/// Raw constraint tensor of shape `(rows, p, r)`.
pub fn antisymmetry_tensor(info: &LibraryInfo) -> Result<Array3<f64>, LibraryError> {
    let r = info.n_targets();
    let p = info.n_features();
    let mut c = Array3::zeros((constraint_count(r), p, r));
    let mut row = 0;

    for i in 0..r {
        c[[row, info.pure_term(i)?, i]] = 1.0;
        row += 1;
    }

    let pairs: Vec<_> = info.mixed_terms().collect();
    for (pair, mixed) in &pairs {
        let (i, j) = (pair.low(), pair.high());
        c[[row, *mixed, i]] = 1.0;
        c[[row, info.pure_term(i)?, j]] = 1.0;
        row += 1;
    }
    for (pair, mixed) in &pairs {
        let (i, j) = (pair.low(), pair.high());
        c[[row, *mixed, j]] = 1.0;
        c[[row, info.pure_term(j)?, i]] = 1.0;
        row += 1;
    }

    for i in 0..r {
        for j in (i + 1)..r {
            for k in (j + 1)..r {
                c[[row, info.mixed_term(j, k)?, i]] = 1.0;
                c[[row, info.mixed_term(k, i)?, j]] = 1.0;
                c[[row, info.mixed_term(i, j)?, k]] = 1.0;
                row += 1;
            }
        }
    }

    if row != c.dim().0 {
        // A library with fewer mixed terms than C(r,2) lacks some pair.
        let missing = (0..r)
            .flat_map(|a| ((a + 1)..r).map(move |b| (a, b)))
            .find_map(|(a, b)| info.mixed_term(a, b).err());
        if let Some(err) = missing {
            return Err(err);
        }
    }
    Ok(c)
}

/// Contract the target axis of a raw constraint tensor with a modulation
/// matrix: `C'[c, f, t] = Σ_s C[c, f, s] · M[s, t]`.
pub fn modulate(raw: &Array3<f64>, modulation: ArrayView2<'_, f64>) -> Array3<f64> {
    let (rows, p, r) = raw.dim();
    Array3::from_shape_fn((rows, p, r), |(c, f, t)| {
        (0..r).map(|s| raw[[c, f, s]] * modulation[[s, t]]).sum()
    })
}

/// Flatten a `(rows, p, r)` constraint tensor in the requested order.
pub fn flatten(raw: &Array3<f64>, order: ConstraintOrder) -> Array2<f64> {
    let (rows, p, r) = raw.dim();
    Array2::from_shape_fn((rows, p * r), |(c, col)| match order {
        ConstraintOrder::Feature => raw[[c, col / r, col % r]],
        ConstraintOrder::Target => raw[[c, col % p, col / p]],
    })
}

/// Convert a flattened constraint matrix to `output` order, assuming it is
/// currently in the other order.
pub fn reorder_constraints(
    lhs: ArrayView2<'_, f64>,
    n_features: usize,
    output: ConstraintOrder,
) -> Array2<f64> {
    let (rows, cols) = lhs.dim();
    let n_targets = if n_features == 0 { 0 } else { cols / n_features };
    Array2::from_shape_fn((rows, cols), |(c, col)| match output {
        // source is target order: t * p + f
        ConstraintOrder::Feature => {
            let (f, t) = (col / n_targets, col % n_targets);
            lhs[[c, t * n_features + f]]
        }
        // source is feature order: f * r + t
        ConstraintOrder::Target => {
            let (t, f) = (col / n_features, col % n_features);
            lhs[[c, f * n_targets + t]]
        }
    })
}

/// The homogeneous antisymmetry system `(rhs, lhs)`, modulated and
/// flattened in `order`.
pub fn build_constraints(
    info: &LibraryInfo,
    modulation: Option<ArrayView2<'_, f64>>,
    order: ConstraintOrder,
) -> Result<(Array1<f64>, Array2<f64>), LibraryError> {
    let raw = antisymmetry_tensor(info)?;
    let raw = match modulation {
        Some(m) => modulate(&raw, m),
        None => raw,
    };
    let lhs = flatten(&raw, order);
    tracing::debug!(
        rows = lhs.nrows(),
        cols = lhs.ncols(),
        ?order,
        "built antisymmetry constraints"
    );
    Ok((Array1::zeros(lhs.nrows()), lhs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;
    use trapsr_core::PolynomialLibrary;

    fn info(r: usize, bias: bool) -> LibraryInfo {
        PolynomialLibrary::new().with_bias(bias).info(r).unwrap()
    }

    #[test]
    fn row_counts() {
        assert_eq!(constraint_count(1), 1);
        assert_eq!(constraint_count(2), 4);
        assert_eq!(constraint_count(3), 10);
        assert_eq!(constraint_count(4), 20);
        for r in 1..7 {
            let c = antisymmetry_tensor(&info(r, false)).unwrap();
            assert_eq!(c.dim().0, constraint_count(r));
        }
    }

    #[test]
    fn two_targets_have_no_triple_rows() {
        let c = antisymmetry_tensor(&info(2, true)).unwrap();
        assert_eq!(c.dim(), (4, 6, 2));
        // every row touches at most two coefficients
        for row in c.outer_iter() {
            let nnz = row.iter().filter(|&&v| v != 0.0).count();
            assert!((1..=2).contains(&nnz));
        }
    }

    /// Energy-preserving quadratic model on three variables:
    /// ẋ0 = a·x1·x2 + b·x0·x1 ...; every family of rows must vanish.
    #[test]
    fn rows_vanish_on_energy_preserving_model() {
        let li = info(3, false);
        // terms: x0 x1 x2 x0² x0x1 x0x2 x1² x1x2 x2²
        let mut w: Array2<f64> = Array::zeros((9, 3));
        // triple: coefficients of x1x2 in eq0, x2x0 in eq1, x0x1 in eq2 sum to 0
        w[[li.mixed_term(1, 2).unwrap(), 0]] = 2.0;
        w[[li.mixed_term(2, 0).unwrap(), 1]] = -5.0;
        w[[li.mixed_term(0, 1).unwrap(), 2]] = 3.0;
        // double pair (0, 1): x0x1 in eq0 balanced by x0² in eq1
        w[[li.mixed_term(0, 1).unwrap(), 0]] = 1.5;
        w[[li.pure_term(0).unwrap(), 1]] = -1.5;
        // double pair (0, 1): x0x1 in eq1 balanced by x1² in eq0
        w[[li.mixed_term(0, 1).unwrap(), 1]] = -0.25;
        w[[li.pure_term(1).unwrap(), 0]] = 0.25;
        // linear terms are unconstrained
        w[[0, 0]] = -10.0;
        w[[1, 1]] = 7.0;

        let (rhs, lhs) = build_constraints(&li, None, ConstraintOrder::Feature).unwrap();
        let flat = Array::from_iter(w.iter().copied());
        let residual = lhs.dot(&flat);
        assert_eq!(residual.len(), rhs.len());
        for v in residual.iter() {
            assert!(v.abs() < 1e-12, "residual {v}");
        }

        // breaking the cyclic balance is detected
        w[[li.mixed_term(1, 2).unwrap(), 0]] = 2.5;
        let flat = Array::from_iter(w.iter().copied());
        assert!(lhs.dot(&flat).iter().any(|v| v.abs() > 0.1));
    }

    #[test]
    fn target_order_is_a_permutation_of_feature_order() {
        let li = info(3, true);
        let (_, feature) = build_constraints(&li, None, ConstraintOrder::Feature).unwrap();
        let (_, target) = build_constraints(&li, None, ConstraintOrder::Target).unwrap();
        assert_eq!(
            reorder_constraints(target.view(), li.n_features(), ConstraintOrder::Feature),
            feature
        );
        assert_eq!(
            reorder_constraints(feature.view(), li.n_features(), ConstraintOrder::Target),
            target
        );
    }

    #[test]
    fn identity_modulation_is_a_no_op() {
        let li = info(3, false);
        let raw = antisymmetry_tensor(&li).unwrap();
        let eye: Array2<f64> = Array2::eye(3);
        assert_eq!(modulate(&raw, eye.view()), raw);
    }

    #[test]
    fn interaction_only_library_is_rejected() {
        let li = PolynomialLibrary::new()
            .with_interaction_only(true)
            .info(3)
            .unwrap();
        assert!(matches!(
            antisymmetry_tensor(&li),
            Err(LibraryError::MissingTerm { .. })
        ));
    }
}

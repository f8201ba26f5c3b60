//! # Dense Linear Algebra Helpers
//!
//! Bridges the `ndarray` arrays used for tensors and caller-facing data with
//! the `nalgebra` matrices used for factorizations (SVD, symmetric eigen,
//! Cholesky).

use nalgebra::{DMatrix, DVector, SymmetricEigen, SVD};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::LinalgError;

/// Default relative singular-value cutoff for pseudo-inverses.
pub const PINV_RCOND: f64 = 1e-10;

/// Bound on SVD and eigen sweeps before reporting non-convergence.
pub const SVD_MAX_ITER: usize = 10_000;

/// Copy a 2-D array into a column-major matrix.
pub fn to_dmatrix(a: ArrayView2<'_, f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Copy a 1-D array into a vector.
pub fn to_dvector(a: ArrayView1<'_, f64>) -> DVector<f64> {
    DVector::from_iterator(a.len(), a.iter().copied())
}

/// Copy a matrix into a row-major 2-D array.
pub fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Copy a vector into a 1-D array.
pub fn to_array1(v: &DVector<f64>) -> Array1<f64> {
    v.iter().copied().collect()
}

/// Moore-Penrose pseudo-inverse with singular values below
/// `rcond * σ_max` treated as zero.
pub fn pinv(m: &DMatrix<f64>, rcond: f64) -> Result<DMatrix<f64>, LinalgError> {
    let (rows, cols) = m.shape();
    if rows == 0 || cols == 0 {
        return Ok(DMatrix::zeros(cols, rows));
    }
    let (u, singular_values, v_t) = full_svd(m)?;
    let sigma_max = singular_values.max();
    let cutoff = rcond * sigma_max;
    let mut v = v_t.transpose();
    for (j, &s) in singular_values.iter().enumerate() {
        let scale = if s > cutoff { 1.0 / s } else { 0.0 };
        v.column_mut(j).scale_mut(scale);
    }
    Ok(v * u.transpose())
}

/// Thin SVD `(U, Σ, Vᵗ)` with a bounded sweep count. Non-finite input is
/// rejected before iterating.
fn full_svd(m: &DMatrix<f64>) -> Result<(DMatrix<f64>, DVector<f64>, DMatrix<f64>), LinalgError> {
    let (rows, cols) = m.shape();
    if !all_finite(m) {
        return Err(LinalgError::NonFinite { rows, cols });
    }
    let SVD {
        u,
        v_t,
        singular_values,
    } = m
        .clone()
        .try_svd(true, true, f64::EPSILON, SVD_MAX_ITER)
        .ok_or(LinalgError::SvdNotConverged { rows, cols })?;
    match (u, v_t) {
        (Some(u), Some(v_t)) if singular_values.iter().all(|s| s.is_finite()) => {
            Ok((u, singular_values, v_t))
        }
        _ => Err(LinalgError::SvdNotConverged { rows, cols }),
    }
}

/// Symmetric eigendecomposition with eigenvalues in ascending order and
/// eigenvectors permuted to match.
#[derive(Debug, Clone)]
pub struct SortedEigen {
    /// Eigenvalues, ascending.
    pub values: DVector<f64>,
    /// Eigenvectors as columns, in the same order as `values`.
    pub vectors: DMatrix<f64>,
}

/// Eigendecompose a symmetric matrix, sorting ascending.
///
/// Returns `None` for non-finite input or when the iteration does not
/// converge within [`SVD_MAX_ITER`] sweeps.
pub fn sorted_symmetric_eigen(m: DMatrix<f64>) -> Option<SortedEigen> {
    let n = m.nrows();
    if !all_finite(&m) {
        return None;
    }
    let eigen = SymmetricEigen::try_new(m, f64::EPSILON, SVD_MAX_ITER)?;
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    let values = DVector::from_iterator(n, order.iter().map(|&i| eigen.eigenvalues[i]));
    let mut vectors = DMatrix::zeros(n, n);
    for (dst, &src) in order.iter().enumerate() {
        vectors.set_column(dst, &eigen.eigenvectors.column(src));
    }
    Some(SortedEigen { values, vectors })
}

/// Square root and inverse square root of a matrix through its SVD:
/// `U·√Σ·Vᵗ` and `U·√Σ⁻¹·Vᵗ`. Both coincide with the principal roots
/// for symmetric positive-definite input.
pub fn sqrt_pair(m: &DMatrix<f64>) -> Result<(DMatrix<f64>, DMatrix<f64>), LinalgError> {
    let (rows, cols) = m.shape();
    let (u, singular_values, v_t) = full_svd(m)?;
    let floor = f64::EPSILON * rows.max(cols) as f64 * singular_values.max();
    if singular_values.iter().any(|&s| s <= floor) {
        return Err(LinalgError::Singular);
    }
    let root = DMatrix::from_diagonal(&singular_values.map(f64::sqrt));
    let inv_root = DMatrix::from_diagonal(&singular_values.map(|s| 1.0 / s.sqrt()));
    Ok((&u * root * &v_t, u * inv_root * v_t))
}

/// `(m + mᵗ) / 2`.
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

/// Whether every entry is finite.
pub fn all_finite(m: &DMatrix<f64>) -> bool {
    m.iter().all(|v| v.is_finite())
}

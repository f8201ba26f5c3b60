//! # Energy-Form Contractions
//!
//! Maps coefficients onto the quadratic energy form whose negative
//! definiteness certifies a trapping region:
//!
//! ```text
//! P(m)      = sym( R · (PL + PM ×₂ m) · R⁻¹ )      shape (r, r, r, p)
//! PW        = P(m) : w                             shape (r, r)
//! PMW       = sym( R · (PM : w) · R⁻¹ )            shape (r, r, r)
//! ```
//!
//! where `R`/`R⁻¹` are the square root and inverse square root of the
//! modulation (Lyapunov) matrix and `sym` averages the first two axes.
//!
//! Flattened operators returned here always index coefficients
//! feature-major: column `f * r + t` holds `w[f, t]`.

use nalgebra::DMatrix;
use ndarray::{Array3, Array4, ArrayView1, ArrayView2};

use trapsr_core::linalg::{self, sqrt_pair, to_dmatrix};
use trapsr_core::LinalgError;

use crate::projection::ProjectionTensors;

/// Modulation matrix with its precomputed roots.
#[derive(Debug, Clone)]
pub struct Modulation {
    matrix: DMatrix<f64>,
    root: DMatrix<f64>,
    inv_root: DMatrix<f64>,
}

impl Modulation {
    /// Precompute roots of a square, nonsingular matrix.
    pub fn new(matrix: ArrayView2<'_, f64>) -> Result<Self, LinalgError> {
        let matrix = to_dmatrix(matrix);
        let (root, inv_root) = sqrt_pair(&matrix)?;
        Ok(Self {
            matrix,
            root,
            inv_root,
        })
    }

    /// Identity modulation for `r` targets.
    pub fn identity(r: usize) -> Self {
        Self {
            matrix: DMatrix::identity(r, r),
            root: DMatrix::identity(r, r),
            inv_root: DMatrix::identity(r, r),
        }
    }

    /// The modulation matrix itself.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Its square root.
    pub fn root(&self) -> &DMatrix<f64> {
        &self.root
    }

    /// Its inverse square root.
    pub fn inv_root(&self) -> &DMatrix<f64> {
        &self.inv_root
    }

    /// `sym(R · S · R⁻¹)` for one `r × r` slice.
    fn conjugate_sym(&self, slice: &DMatrix<f64>) -> DMatrix<f64> {
        linalg::symmetrize(&(&self.root * slice * &self.inv_root))
    }
}

/// P-tensor at trap center `m`, shape `(r, r, r, p)`, symmetric in its
/// first two axes.
pub fn p_tensor(
    tensors: &ProjectionTensors,
    modulation: &Modulation,
    trap_center: ArrayView1<'_, f64>,
) -> Array4<f64> {
    let r = tensors.n_targets();
    let p = tensors.n_features();
    let pl = tensors.linear();
    let pm = tensors.summed();
    let mut out = Array4::zeros((r, r, r, p));
    let mut slice = DMatrix::zeros(r, r);
    for t in 0..r {
        for f in 0..p {
            for a in 0..r {
                for b in 0..r {
                    let mut v = pl[[a, b, t, f]];
                    for k in 0..r {
                        v += pm[[a, b, k, t, f]] * trap_center[k];
                    }
                    slice[(a, b)] = v;
                }
            }
            let conj = modulation.conjugate_sym(&slice);
            for a in 0..r {
                for b in 0..r {
                    out[[a, b, t, f]] = conj[(a, b)];
                }
            }
        }
    }
    out
}

/// `PW[a, b] = Σ_{t,f} P[a, b, t, f] · w[f, t]`.
pub fn contract_pw(p: &Array4<f64>, w: ArrayView2<'_, f64>) -> DMatrix<f64> {
    let (r, _, _, n_feat) = p.dim();
    DMatrix::from_fn(r, r, |a, b| {
        let mut acc = 0.0;
        for t in 0..r {
            for f in 0..n_feat {
                acc += p[[a, b, t, f]] * w[[f, t]];
            }
        }
        acc
    })
}

/// `PMW`, the summed-quadratic projection contracted with `w`, conjugated
/// by the modulation roots and symmetrized over its first two axes.
pub fn pm_contracted(
    tensors: &ProjectionTensors,
    modulation: &Modulation,
    w: ArrayView2<'_, f64>,
) -> Array3<f64> {
    let r = tensors.n_targets();
    let p = tensors.n_features();
    let pm = tensors.summed();
    let mut out = Array3::zeros((r, r, r));
    let mut slice = DMatrix::zeros(r, r);
    for k in 0..r {
        for a in 0..r {
            for b in 0..r {
                let mut acc = 0.0;
                for t in 0..r {
                    for f in 0..p {
                        acc += pm[[a, b, k, t, f]] * w[[f, t]];
                    }
                }
                slice[(a, b)] = acc;
            }
        }
        let conj = modulation.conjugate_sym(&slice);
        for a in 0..r {
            for b in 0..r {
                out[[a, b, k]] = conj[(a, b)];
            }
        }
    }
    out
}

/// Flatten a P-tensor into the `(r², p·r)` operator with row `a * r + b`
/// and feature-major columns.
pub fn p_matrix(p: &Array4<f64>) -> DMatrix<f64> {
    let (r, _, _, n_feat) = p.dim();
    DMatrix::from_fn(r * r, n_feat * r, |row, col| {
        let (a, b) = (row / r, row % r);
        let (f, t) = (col / r, col % r);
        p[[a, b, t, f]]
    })
}

/// Modulated quadratic coefficients `Q[y, j, k] = Σ_a M[y, a] Q_ajk`.
pub fn modulated_quadratic(
    tensors: &ProjectionTensors,
    modulation: &Modulation,
    w: ArrayView2<'_, f64>,
) -> Array3<f64> {
    let q = tensors.quadratic_part(w);
    let r = tensors.n_targets();
    let m = modulation.matrix();
    Array3::from_shape_fn((r, r, r), |(y, j, k)| {
        (0..r).map(|a| m[(y, a)] * q[[a, j, k]]).sum()
    })
}

/// Cyclic sum `Q_ijk + Q_kij + Q_jki`; zero for energy-preserving models.
pub fn cyclic_sum(q: &Array3<f64>) -> Array3<f64> {
    Array3::from_shape_fn(q.dim(), |(i, j, k)| q[[i, j, k]] + q[[k, i, j]] + q[[j, k, i]])
}

/// Operator mapping flat coefficients to every `Q_ijk`, shape
/// `(r³, p·r)`, row `i·r² + j·r + k`.
pub fn quadratic_operator(tensors: &ProjectionTensors) -> DMatrix<f64> {
    let r = tensors.n_targets();
    let p = tensors.n_features();
    let pq = tensors.quadratic();
    DMatrix::from_fn(r * r * r, p * r, |row, col| {
        let (i, j, k) = (row / (r * r), (row / r) % r, row % r);
        let (f, t) = (col / r, col % r);
        pq[[i, j, k, t, f]]
    })
}

/// Operator mapping flat coefficients to the cyclic sums of the modulated
/// quadratic coefficients, shape `(r³, p·r)`.
pub fn cyclic_operator(tensors: &ProjectionTensors, modulation: &Modulation) -> DMatrix<f64> {
    let r = tensors.n_targets();
    let p = tensors.n_features();
    let pq = tensors.quadratic();
    let m = modulation.matrix();
    let modulated = |y: usize, j: usize, k: usize, t: usize, f: usize| -> f64 {
        (0..r).map(|a| m[(y, a)] * pq[[a, j, k, t, f]]).sum()
    };
    DMatrix::from_fn(r * r * r, p * r, |row, col| {
        let (i, j, k) = (row / (r * r), (row / r) % r, row % r);
        let (f, t) = (col / r, col % r);
        modulated(i, j, k, t, f) + modulated(k, i, j, t, f) + modulated(j, k, i, t, f)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array2};
    use trapsr_core::linalg::to_dvector;
    use trapsr_core::PolynomialLibrary;

    fn tensors(r: usize) -> ProjectionTensors {
        ProjectionTensors::build(&PolynomialLibrary::new(), r).unwrap()
    }

    fn flatten(w: &Array2<f64>) -> nalgebra::DVector<f64> {
        to_dvector(w.view().into_shape_with_order(w.len()).unwrap())
    }

    #[test]
    fn p_tensor_at_origin_is_symmetric_linear_part() {
        let t = tensors(3);
        let p = p_tensor(&t, &Modulation::identity(3), Array1::zeros(3).view());
        assert_eq!(&p, t.linear());
    }

    #[test]
    fn pw_is_symmetrized_linear_part_at_origin() {
        let t = tensors(2);
        // terms: x0, x1, x0², x0x1, x1²
        let w = array![[-1.0, 2.0], [4.0, -3.0], [0.0, 0.0], [0.0, 0.0], [0.0, 0.0]];
        let p = p_tensor(&t, &Modulation::identity(2), Array1::zeros(2).view());
        let pw = contract_pw(&p, w.view());
        assert_eq!(pw[(0, 0)], -1.0);
        assert_eq!(pw[(1, 1)], -3.0);
        assert_eq!(pw[(0, 1)], 3.0);
        assert_eq!(pw[(1, 0)], 3.0);
    }

    #[test]
    fn p_matrix_matches_contraction() {
        let t = tensors(3);
        let m = array![0.3, -1.2, 0.8];
        let p = p_tensor(&t, &Modulation::identity(3), m.view());
        let w = Array2::from_shape_fn((9, 3), |(f, c)| (f as f64 * 0.7 - c as f64).sin());
        let direct = contract_pw(&p, w.view());
        let flat = p_matrix(&p) * flatten(&w);
        for a in 0..3 {
            for b in 0..3 {
                assert!((direct[(a, b)] - flat[a * 3 + b]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn quadratic_operator_matches_structured_part() {
        let t = tensors(3);
        let w = Array2::from_shape_fn((9, 3), |(f, c)| (f * 3 + c) as f64 - 4.0);
        let q = t.quadratic_part(w.view());
        let flat = quadratic_operator(&t) * flatten(&w);
        for ((i, j, k), &v) in q.indexed_iter() {
            assert!((flat[i * 9 + j * 3 + k] - v).abs() < 1e-12);
        }
    }

    #[test]
    fn cyclic_operator_matches_cyclic_sum() {
        let t = tensors(3);
        let modulation = Modulation::new(array![[2.0, 0.5, 0.0], [0.5, 1.0, 0.0], [0.0, 0.0, 1.0]].view()).unwrap();
        let w = Array2::from_shape_fn((9, 3), |(f, c)| ((f + 2 * c) as f64).cos());
        let cyc = cyclic_sum(&modulated_quadratic(&t, &modulation, w.view()));
        let flat = cyclic_operator(&t, &modulation) * flatten(&w);
        for ((i, j, k), &v) in cyc.indexed_iter() {
            assert!((flat[i * 9 + j * 3 + k] - v).abs() < 1e-10);
        }
    }

    fn lyapunov_weighting() -> Modulation {
        Modulation::new(array![[2.0, 0.5, 0.0], [0.5, 1.0, 0.0], [0.0, 0.0, 1.0]].view()).unwrap()
    }

    #[test]
    fn modulated_p_tensor_is_a_symmetric_similarity() {
        let t = tensors(3);
        let modulation = lyapunov_weighting();
        let root = modulation.root();
        assert!((root * root - modulation.matrix()).amax() < 1e-10);
        assert!((root * modulation.inv_root() - DMatrix::identity(3, 3)).amax() < 1e-10);

        let m = array![0.4, -0.9, 1.3];
        let plain = p_tensor(&t, &Modulation::identity(3), m.view());
        let conj = p_tensor(&t, &modulation, m.view());
        let mut moved = 0.0f64;
        for tt in 0..3 {
            for f in 0..9 {
                let trace = |p: &Array4<f64>| (0..3).map(|a| p[[a, a, tt, f]]).sum::<f64>();
                assert!((trace(&conj) - trace(&plain)).abs() < 1e-10);
                for a in 0..3 {
                    for b in 0..3 {
                        assert!((conj[[a, b, tt, f]] - conj[[b, a, tt, f]]).abs() < 1e-12);
                        moved = moved.max((conj[[a, b, tt, f]] - plain[[a, b, tt, f]]).abs());
                    }
                }
            }
        }
        assert!(moved > 1e-3);
    }

    #[test]
    fn pm_contracted_is_derivative_of_pw_in_trap_center() {
        let t = tensors(3);
        let w = Array2::from_shape_fn((9, 3), |(f, c)| ((f * c) as f64 * 0.3).sin());
        let base = array![0.1, 0.2, -0.3];
        for modulation in [Modulation::identity(3), lyapunov_weighting()] {
            let pmw = pm_contracted(&t, &modulation, w.view());
            let pw0 = contract_pw(&p_tensor(&t, &modulation, base.view()), w.view());
            for k in 0..3 {
                let mut shifted = base.clone();
                shifted[k] += 1.0;
                let pw1 = contract_pw(&p_tensor(&t, &modulation, shifted.view()), w.view());
                for a in 0..3 {
                    for b in 0..3 {
                        assert!((pw1[(a, b)] - pw0[(a, b)] - pmw[[a, b, k]]).abs() < 1e-10);
                    }
                }
            }
        }
    }
}

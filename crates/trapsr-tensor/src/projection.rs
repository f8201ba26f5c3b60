//! # Projection Tensors
//!
//! Fixed-shape tensors that extract structured blocks from a flat
//! coefficient matrix `w` of shape `(p, r)` (library term × target):
//!
//! ```text
//! E_i      = Σ_{t,f} PC[i, i, f]          w[f, t]     (constant)
//! L_ij     = Σ_{t,f} PL_unsym[i, j, t, f] w[f, t]     (linear)
//! Q_ijk    = Σ_{t,f} PQ[i, j, k, t, f]    w[f, t]     (quadratic)
//! ```
//!
//! `PQ` is symmetric in its second and third axes: a mixed term `x_j·x_k`
//! contributes half its coefficient to `Q_ijk` and half to `Q_ikj`.
//! `PT` swaps the first two axes of `PQ`, and `PM = PQ + PT` projects out
//! `Q_ijk + Q_jik`, the combination whose contraction with the trap center
//! shifts the linear part of the energy form.
//!
//! All tensors depend only on `r` and the library ordering; they are built
//! once per fit with explicit loops over preallocated arrays.

use ndarray::{Array3, Array4, Array5, ArrayView2};

use trapsr_core::{LibraryError, LibraryInfo, PolynomialLibrary};

/// The projection tensors for one library.
#[derive(Debug, Clone)]
pub struct ProjectionTensors {
    info: LibraryInfo,
    constant: Array3<f64>,
    linear_unsym: Array4<f64>,
    linear: Array4<f64>,
    quadratic: Array5<f64>,
    quadratic_transpose: Array5<f64>,
    summed: Array5<f64>,
}

impl ProjectionTensors {
    /// Enumerate `library` over `n_targets` variables and build every tensor.
    pub fn build(library: &PolynomialLibrary, n_targets: usize) -> Result<Self, LibraryError> {
        Self::from_info(library.info(n_targets)?)
    }

    /// Build every tensor from an indexed library.
    pub fn from_info(info: LibraryInfo) -> Result<Self, LibraryError> {
        let constant = build_constant(&info);
        let (linear, linear_unsym) = build_linear(&info)?;
        let quadratic = build_quadratic(&info)?;
        let quadratic_transpose = swap_leading_axes(&quadratic);
        let summed = &quadratic + &quadratic_transpose;
        tracing::debug!(
            n_targets = info.n_targets(),
            n_features = info.n_features(),
            "built projection tensors"
        );
        Ok(Self {
            info,
            constant,
            linear_unsym,
            linear,
            quadratic,
            quadratic_transpose,
            summed,
        })
    }

    /// Library index the tensors were built against.
    pub fn info(&self) -> &LibraryInfo {
        &self.info
    }

    /// Number of targets `r`.
    pub fn n_targets(&self) -> usize {
        self.info.n_targets()
    }

    /// Number of library terms `p`.
    pub fn n_features(&self) -> usize {
        self.info.n_features()
    }

    /// `PC`, shape `(r, r, p)`.
    pub fn constant(&self) -> &Array3<f64> {
        &self.constant
    }

    /// `PL_unsym`, shape `(r, r, r, p)`.
    pub fn linear_unsym(&self) -> &Array4<f64> {
        &self.linear_unsym
    }

    /// `PL`, shape `(r, r, r, p)`, symmetric in the first two axes.
    pub fn linear(&self) -> &Array4<f64> {
        &self.linear
    }

    /// `PQ`, shape `(r, r, r, r, p)`.
    pub fn quadratic(&self) -> &Array5<f64> {
        &self.quadratic
    }

    /// `PT`, `PQ` with its first two axes swapped.
    pub fn quadratic_transpose(&self) -> &Array5<f64> {
        &self.quadratic_transpose
    }

    /// `PM = PQ + PT`.
    pub fn summed(&self) -> &Array5<f64> {
        &self.summed
    }

    /// Constant coefficients `E_i` of a `(p, r)` coefficient matrix.
    pub fn constant_part(&self, w: ArrayView2<'_, f64>) -> Vec<f64> {
        let r = self.n_targets();
        (0..r)
            .map(|i| {
                (0..self.n_features())
                    .map(|f| self.constant[[i, i, f]] * w[[f, i]])
                    .sum()
            })
            .collect()
    }

    /// Linear coefficients `L_ij`: the coefficient of `x_j` in the
    /// equation for target `i`.
    pub fn linear_part(&self, w: ArrayView2<'_, f64>) -> ndarray::Array2<f64> {
        let r = self.n_targets();
        let p = self.n_features();
        ndarray::Array2::from_shape_fn((r, r), |(i, j)| {
            let mut acc = 0.0;
            for t in 0..r {
                for f in 0..p {
                    acc += self.linear_unsym[[i, j, t, f]] * w[[f, t]];
                }
            }
            acc
        })
    }

    /// Quadratic coefficients `Q_ijk`, symmetric in `j, k`.
    pub fn quadratic_part(&self, w: ArrayView2<'_, f64>) -> Array3<f64> {
        let r = self.n_targets();
        let p = self.n_features();
        Array3::from_shape_fn((r, r, r), |(i, j, k)| {
            let mut acc = 0.0;
            for t in 0..r {
                for f in 0..p {
                    acc += self.quadratic[[i, j, k, t, f]] * w[[f, t]];
                }
            }
            acc
        })
    }
}

/// Constant selector: `PC[i, i, c] = 1` at the constant column, if any.
pub fn build_constant(info: &LibraryInfo) -> Array3<f64> {
    let r = info.n_targets();
    let mut pc = Array3::zeros((r, r, info.n_features()));
    if let Some(c) = info.constant_term() {
        for i in 0..r {
            pc[[i, i, c]] = 1.0;
        }
    }
    pc
}

/// Linear selectors `(PL, PL_unsym)`: `PL_unsym[i, j, i, lin(j)] = 1` and
/// `PL` its average with the first two axes swapped.
pub fn build_linear(info: &LibraryInfo) -> Result<(Array4<f64>, Array4<f64>), LibraryError> {
    let r = info.n_targets();
    let mut unsym = Array4::zeros((r, r, r, info.n_features()));
    for j in 0..r {
        let col = info.linear_term(j)?;
        for i in 0..r {
            unsym[[i, j, i, col]] = 1.0;
        }
    }
    let sym = Array4::from_shape_fn(unsym.dim(), |(a, b, c, d)| {
        0.5 * (unsym[[a, b, c, d]] + unsym[[b, a, c, d]])
    });
    Ok((sym, unsym))
}

/// Quadratic selector: weight 1 on the pure term for `j == k`, weight 1/2
/// on the shared mixed term for `j != k`.
pub fn build_quadratic(info: &LibraryInfo) -> Result<Array5<f64>, LibraryError> {
    let r = info.n_targets();
    let mut pq = Array5::zeros((r, r, r, r, info.n_features()));
    for j in 0..r {
        for k in 0..r {
            let (col, weight) = if j == k {
                (info.pure_term(j)?, 1.0)
            } else {
                (info.mixed_term(j, k)?, 0.5)
            };
            for i in 0..r {
                pq[[i, j, k, i, col]] = weight;
            }
        }
    }
    Ok(pq)
}

fn swap_leading_axes(t: &Array5<f64>) -> Array5<f64> {
    Array5::from_shape_fn(t.dim(), |(a, b, c, d, e)| t[[b, a, c, d, e]])
}

//! # Coefficient Update
//!
//! Minimizes, over flattened coefficients `w` (feature-major, index
//! `f * r + t`),
//!
//! ```text
//! ½‖y − x·w‖² + ½‖P·w − vec(A)‖²/η  [+ ½‖Q·w‖²/α + ½‖Q_cyc·w‖²/β]  + R(w)
//! ```
//!
//! subject to equality and inequality constraints. Expanding the squares
//! gives a quadratic form `½ wᵗHw − gᵗw` with
//!
//! ```text
//! H = blockdiag_r(xᵗx) + PᵗP/η [+ QᵗQ/α + Q_cycᵗQ_cyc/β]
//! g = vec(xᵗy) + Pᵗvec(A)/η
//! ```
//!
//! Without a penalty or inequalities the minimizer is closed form
//! (pseudo-inverse KKT solution); otherwise the problem is handed to a
//! [`ConvexSolver`].

use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, ArrayView2};

use trapsr_core::linalg::{self, pinv, PINV_RCOND};
use trapsr_core::LinalgError;
use trapsr_tensor::energy::{cyclic_operator, quadratic_operator};
use trapsr_tensor::{Modulation, ProjectionTensors};

use crate::qp::{ConvexSolver, LinearSystem, Penalty, QpOutcome, QuadraticProgram};

/// Outcome of one coefficient update.
#[derive(Debug, Clone, PartialEq)]
pub enum CoefficientUpdate {
    /// New coefficients, `(p, r)`.
    Solved(Array2<f64>),
    /// The sub-problem had no solution or the solver broke down.
    Infeasible,
}

/// Flatten `(p, r)` coefficients feature-major.
pub fn flatten_coefficients(w: ArrayView2<'_, f64>) -> DVector<f64> {
    DVector::from_iterator(w.len(), w.iter().copied())
}

/// Inverse of [`flatten_coefficients`].
pub fn unflatten_coefficients(v: &DVector<f64>, n_features: usize, n_targets: usize) -> Array2<f64> {
    Array2::from_shape_fn((n_features, n_targets), |(f, t)| v[f * n_targets + t])
}

/// `PQᵗPQ/α + PQ_cycᵗPQ_cyc/β`, the local-mode curvature.
pub fn local_stability_hessian(
    tensors: &ProjectionTensors,
    modulation: &Modulation,
    alpha: f64,
    beta: f64,
) -> DMatrix<f64> {
    let q = quadratic_operator(tensors);
    let cyc = cyclic_operator(tensors, modulation);
    q.tr_mul(&q) / alpha + cyc.tr_mul(&cyc) / beta
}

/// Constrained least squares on a quadratic form:
/// `H⁺(g + Cᵗ(CH⁺Cᵗ)⁺(d − CH⁺g))`, or `H⁺g` without equalities.
pub fn constrained_least_squares(
    hessian: &DMatrix<f64>,
    gradient: &DVector<f64>,
    equality: Option<&LinearSystem>,
) -> Result<DVector<f64>, LinalgError> {
    let h_inv = pinv(hessian, PINV_RCOND)?;
    let base = &h_inv * gradient;
    let Some(sys) = equality.filter(|s| !s.is_empty()) else {
        return Ok(base);
    };
    let c = &sys.matrix;
    let inner = pinv(&(c * &h_inv * c.transpose()), PINV_RCOND)?;
    let correction = c.transpose() * (inner * (&sys.rhs - c * &base));
    Ok(&h_inv * (gradient + correction))
}

/// The data-dependent parts of the coefficient sub-problem, fixed for one
/// fit. Each update combines them with the current P-operator and
/// certificate.
#[derive(Debug, Clone)]
pub struct CoefficientProblem {
    n_features: usize,
    n_targets: usize,
    eta: f64,
    data_hessian: DMatrix<f64>,
    data_gradient: DVector<f64>,
    stability_hessian: Option<DMatrix<f64>>,
    equality: Option<LinearSystem>,
    inequality: Option<LinearSystem>,
    penalty: Penalty,
    tolerance: f64,
}

impl CoefficientProblem {
    /// Precompute `blockdiag_r(xᵗx)` and `vec(xᵗy)` for features `x` of
    /// shape `(n, p)` and targets `y` of shape `(n, r)`.
    pub fn new(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>, eta: f64) -> Self {
        let p = x.ncols();
        let r = y.ncols();
        let xtx = x.t().dot(&x);
        let xty = x.t().dot(&y);
        let mut data_hessian = DMatrix::zeros(p * r, p * r);
        for f in 0..p {
            for g in 0..p {
                for t in 0..r {
                    data_hessian[(f * r + t, g * r + t)] = xtx[[f, g]];
                }
            }
        }
        Self {
            n_features: p,
            n_targets: r,
            eta,
            data_hessian,
            data_gradient: flatten_coefficients(xty.view()),
            stability_hessian: None,
            equality: None,
            inequality: None,
            penalty: Penalty::None,
            tolerance: 1e-7,
        }
    }

    /// Add the local-mode curvature.
    pub fn with_stability_hessian(mut self, hessian: DMatrix<f64>) -> Self {
        self.stability_hessian = Some(hessian);
        self
    }

    /// Impose `C·w = d`.
    pub fn with_equality(mut self, system: LinearSystem) -> Self {
        self.equality = Some(system).filter(|s| !s.is_empty());
        self
    }

    /// Impose `G·w ≤ h`.
    pub fn with_inequality(mut self, system: LinearSystem) -> Self {
        self.inequality = Some(system).filter(|s| !s.is_empty());
        self
    }

    /// Add a sparsity penalty.
    pub fn with_penalty(mut self, penalty: Penalty) -> Self {
        self.penalty = penalty;
        self
    }

    /// Tolerance handed to the convex solver.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Whether updates go through the convex solver.
    pub fn uses_convex_solver(&self) -> bool {
        !matches!(self.penalty, Penalty::None) || self.inequality.is_some()
    }

    /// Equality constraints, if any.
    pub fn equality(&self) -> Option<&LinearSystem> {
        self.equality.as_ref()
    }

    /// `H` at the given P-operator.
    pub fn hessian(&self, p_matrix: &DMatrix<f64>) -> DMatrix<f64> {
        let mut h = &self.data_hessian + p_matrix.tr_mul(p_matrix) / self.eta;
        if let Some(s) = &self.stability_hessian {
            h += s;
        }
        h
    }

    /// `g` at the given P-operator and certificate.
    pub fn gradient(&self, p_matrix: &DMatrix<f64>, certificate: &DMatrix<f64>) -> DVector<f64> {
        let r = certificate.nrows();
        let vec_a = DVector::from_fn(r * r, |i, _| certificate[(i / r, i % r)]);
        &self.data_gradient + p_matrix.tr_mul(&vec_a) / self.eta
    }

    /// Solve for new coefficients given the P-operator and certificate of
    /// this iteration. `previous` (`(p, r)`) warm-starts the convex path.
    pub fn update<S: ConvexSolver>(
        &self,
        solver: &S,
        p_matrix: &DMatrix<f64>,
        certificate: &DMatrix<f64>,
        previous: ArrayView2<'_, f64>,
    ) -> CoefficientUpdate {
        let hessian = self.hessian(p_matrix);
        let gradient = self.gradient(p_matrix, certificate);
        if !linalg::all_finite(&hessian) || !gradient.iter().all(|v| v.is_finite()) {
            tracing::debug!("coefficient sub-problem has non-finite terms");
            return CoefficientUpdate::Infeasible;
        }

        let solution = if self.uses_convex_solver() {
            let program = QuadraticProgram {
                hessian,
                linear: gradient,
                penalty: self.penalty.clone(),
                equality: self.equality.clone(),
                inequality: self.inequality.clone(),
                tolerance: self.tolerance,
            };
            match solver.solve(&program, &flatten_coefficients(previous)) {
                QpOutcome::Solved {
                    solution,
                    iterations,
                } => {
                    tracing::trace!(iterations, "convex coefficient update solved");
                    solution
                }
                QpOutcome::Infeasible => return CoefficientUpdate::Infeasible,
            }
        } else {
            match constrained_least_squares(&hessian, &gradient, self.equality.as_ref()) {
                Ok(solution) => solution,
                Err(err) => {
                    tracing::debug!(%err, "closed-form coefficient update failed");
                    return CoefficientUpdate::Infeasible;
                }
            }
        };

        if solution.len() != self.n_features * self.n_targets
            || !solution.iter().all(|v| v.is_finite())
        {
            return CoefficientUpdate::Infeasible;
        }
        CoefficientUpdate::Solved(unflatten_coefficients(
            &solution,
            self.n_features,
            self.n_targets,
        ))
    }
}

/// Unconstrained least-squares coefficients `x⁺·y`, `(p, r)`.
pub fn least_squares(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>) -> Result<Array2<f64>, LinalgError> {
    let xp = pinv(&linalg::to_dmatrix(x), PINV_RCOND)?;
    Ok(linalg::to_array2(&(xp * linalg::to_dmatrix(y))))
}

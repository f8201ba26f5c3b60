//! # Convex Quadratic Programs
//!
//! The sparse coefficient update hands a problem of the form
//!
//! ```text
//! minimize    ½ xᵗHx − gᵗx + R(x)
//! subject to  C·x = d
//!             G·x ≤ h
//! ```
//!
//! to a [`ConvexSolver`]. `H` is symmetric positive semi-definite and `R` is
//! a separable L1 or squared-L2 penalty with per-variable weights.
//!
//! [`AdmmSolver`] is the default implementation: an operator-splitting
//! method on the stacked constraint operator `[I; C; G]`, where the identity
//! block carries the penalty, with residual-balanced step-size adaptation.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

/// Separable penalty with one weight per variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Penalty {
    /// No penalty.
    None,
    /// `Σ λ_i |x_i|`.
    L1(DVector<f64>),
    /// `Σ λ_i x_i²`.
    L2(DVector<f64>),
}

impl Penalty {
    /// Penalty value at `x`.
    pub fn value(&self, x: &DVector<f64>) -> f64 {
        match self {
            Self::None => 0.0,
            Self::L1(w) => w.iter().zip(x.iter()).map(|(l, v)| l * v.abs()).sum(),
            Self::L2(w) => w.iter().zip(x.iter()).map(|(l, v)| l * v * v).sum(),
        }
    }

    /// Proximal operator of `R / rho` applied elementwise to `v`.
    pub fn prox(&self, v: &DVector<f64>, rho: f64) -> DVector<f64> {
        match self {
            Self::None => v.clone(),
            Self::L1(w) => v.zip_map(w, |vi, li| soft_threshold(vi, li / rho)),
            Self::L2(w) => v.zip_map(w, |vi, li| vi / (1.0 + 2.0 * li / rho)),
        }
    }
}

/// `sign(v) · max(|v| − k, 0)`.
pub fn soft_threshold(v: f64, k: f64) -> f64 {
    if v > k {
        v - k
    } else if v < -k {
        v + k
    } else {
        0.0
    }
}

/// A linear system `matrix · x (=|≤) rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSystem {
    /// One row per constraint.
    pub matrix: DMatrix<f64>,
    /// One entry per row.
    pub rhs: DVector<f64>,
}

impl LinearSystem {
    /// Pair a matrix with its right-hand side.
    pub fn new(matrix: DMatrix<f64>, rhs: DVector<f64>) -> Self {
        Self { matrix, rhs }
    }

    fn empty(n: usize) -> Self {
        Self::new(DMatrix::zeros(0, n), DVector::zeros(0))
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.matrix.nrows()
    }

    /// Whether the system has no rows.
    pub fn is_empty(&self) -> bool {
        self.matrix.nrows() == 0
    }
}

/// A penalized, linearly constrained convex quadratic program.
#[derive(Debug, Clone)]
pub struct QuadraticProgram {
    /// Symmetric positive semi-definite `H`.
    pub hessian: DMatrix<f64>,
    /// `g` in `−gᵗx`.
    pub linear: DVector<f64>,
    /// Separable penalty `R`.
    pub penalty: Penalty,
    /// `C·x = d`.
    pub equality: Option<LinearSystem>,
    /// `G·x ≤ h`.
    pub inequality: Option<LinearSystem>,
    /// Absolute and relative stopping tolerance.
    pub tolerance: f64,
}

impl QuadraticProgram {
    /// Number of decision variables.
    pub fn n_vars(&self) -> usize {
        self.linear.len()
    }

    /// Objective value `½ xᵗHx − gᵗx + R(x)` (constraints ignored).
    pub fn objective(&self, x: &DVector<f64>) -> f64 {
        0.5 * x.dot(&(&self.hessian * x)) - self.linear.dot(x) + self.penalty.value(x)
    }
}

/// Result of one convex solve.
#[derive(Debug, Clone, PartialEq)]
pub enum QpOutcome {
    /// A solution within tolerance, or the last iterate when the iteration
    /// bound was hit with the constraints nearly satisfied.
    Solved {
        /// Decision variables.
        solution: DVector<f64>,
        /// Iterations used.
        iterations: usize,
    },
    /// The problem is infeasible or the solver broke down.
    Infeasible,
}

/// Seam for the convex sub-problem of the coefficient update.
pub trait ConvexSolver {
    /// Solve `problem`, starting from `warm_start`.
    fn solve(&self, problem: &QuadraticProgram, warm_start: &DVector<f64>) -> QpOutcome;
}

/// Alternating direction method of multipliers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmmSolver {
    /// Initial step size, relative to the mean diagonal of `H`.
    pub rho: f64,
    /// Iteration bound.
    pub max_iter: usize,
    /// Iterations between step-size adaptations; `0` disables adaptation.
    pub adapt_interval: usize,
    /// Relative primal residual accepted when `max_iter` is reached.
    pub infeasibility_tol: f64,
}

impl Default for AdmmSolver {
    fn default() -> Self {
        Self {
            rho: 1.0,
            max_iter: 10_000,
            adapt_interval: 25,
            infeasibility_tol: 1e-3,
        }
    }
}

/// Step size is kept within this factor of its initial value.
const RHO_RANGE: f64 = 1e6;

struct Splitting<'a> {
    qp: &'a QuadraticProgram,
    eq: LinearSystem,
    ineq: LinearSystem,
    gram: DMatrix<f64>,
}

impl<'a> Splitting<'a> {
    fn new(qp: &'a QuadraticProgram) -> Self {
        let n = qp.n_vars();
        let eq = qp.equality.clone().unwrap_or_else(|| LinearSystem::empty(n));
        let ineq = qp.inequality.clone().unwrap_or_else(|| LinearSystem::empty(n));
        // Aᵗ·A for A = [I; C; G]
        let gram = DMatrix::identity(n, n) + eq.matrix.tr_mul(&eq.matrix)
            + ineq.matrix.tr_mul(&ineq.matrix);
        Self { qp, eq, ineq, gram }
    }

    fn factor(&self, rho: f64) -> Option<Cholesky<f64, Dyn>> {
        (&self.qp.hessian + &self.gram * rho).cholesky()
    }

    /// `Aᵗ·[a; b; c]`.
    fn adjoint(&self, a: &DVector<f64>, b: &DVector<f64>, c: &DVector<f64>) -> DVector<f64> {
        a + self.eq.matrix.tr_mul(b) + self.ineq.matrix.tr_mul(c)
    }
}

fn stacked_norm(parts: [&DVector<f64>; 3]) -> f64 {
    parts.iter().map(|p| p.norm_squared()).sum::<f64>().sqrt()
}

impl ConvexSolver for AdmmSolver {
    fn solve(&self, qp: &QuadraticProgram, warm_start: &DVector<f64>) -> QpOutcome {
        let n = qp.n_vars();
        let split = Splitting::new(qp);
        let tol = qp.tolerance;
        let n_rows = n + split.eq.len() + split.ineq.len();

        let scale = if n == 0 {
            1.0
        } else {
            (qp.hessian.trace() / n as f64).max(1e-8)
        };
        let rho_min = self.rho * scale / RHO_RANGE;
        let rho_max = self.rho * scale * RHO_RANGE;
        let mut rho = self.rho * scale;
        let Some(mut chol) = split.factor(rho) else {
            tracing::debug!(rho, "KKT factorization failed");
            return QpOutcome::Infeasible;
        };

        let mut x = warm_start.clone();
        let mut z1 = qp.penalty.prox(&x, rho);
        let mut z2 = split.eq.rhs.clone();
        let mut z3 = (&split.ineq.matrix * &x).zip_map(&split.ineq.rhs, f64::min);
        let mut u1 = DVector::zeros(n);
        let mut u2 = DVector::zeros(split.eq.len());
        let mut u3 = DVector::zeros(split.ineq.len());
        let mut r_prim = f64::INFINITY;
        let mut z_norm = 0.0;

        for iteration in 1..=self.max_iter {
            let rhs = &qp.linear + split.adjoint(&(&z1 - &u1), &(&z2 - &u2), &(&z3 - &u3)) * rho;
            x = chol.solve(&rhs);
            let ax2 = &split.eq.matrix * &x;
            let ax3 = &split.ineq.matrix * &x;

            let z1_old = z1.clone();
            let z3_old = z3.clone();
            z1 = qp.penalty.prox(&(&x + &u1), rho);
            z2.copy_from(&split.eq.rhs);
            z3 = (&ax3 + &u3).zip_map(&split.ineq.rhs, f64::min);

            let p1 = &x - &z1;
            let p2 = &ax2 - &z2;
            let p3 = &ax3 - &z3;
            u1 += &p1;
            u2 += &p2;
            u3 += &p3;

            r_prim = stacked_norm([&p1, &p2, &p3]);
            let dz1 = &z1 - &z1_old;
            let dz3 = &z3 - &z3_old;
            let r_dual = rho * split.adjoint(&dz1, &DVector::zeros(z2.len()), &dz3).norm();
            z_norm = stacked_norm([&z1, &z2, &z3]);
            let ax_norm = stacked_norm([&x, &ax2, &ax3]);
            let eps_prim = (n_rows as f64).sqrt() * tol + tol * ax_norm.max(z_norm);
            let eps_dual = (n as f64).sqrt() * tol + tol * rho * split.adjoint(&u1, &u2, &u3).norm();

            if !(r_prim.is_finite() && r_dual.is_finite()) {
                tracing::debug!(iteration, "non-finite residual");
                return QpOutcome::Infeasible;
            }
            if r_prim <= eps_prim && r_dual <= eps_dual {
                return QpOutcome::Solved {
                    solution: x,
                    iterations: iteration,
                };
            }

            if self.adapt_interval > 0 && iteration % self.adapt_interval == 0 {
                let next = if r_prim > 10.0 * r_dual {
                    (rho * 2.0).min(rho_max)
                } else if r_dual > 10.0 * r_prim {
                    (rho * 0.5).max(rho_min)
                } else {
                    rho
                };
                if next != rho {
                    // scaled duals follow the step size
                    let ratio = rho / next;
                    u1 *= ratio;
                    u2 *= ratio;
                    u3 *= ratio;
                    rho = next;
                    chol = match split.factor(rho) {
                        Some(c) => c,
                        None => return QpOutcome::Infeasible,
                    };
                }
            }
        }

        if r_prim <= self.infeasibility_tol * z_norm.max(1.0) {
            tracing::debug!(
                max_iter = self.max_iter,
                r_prim,
                "ADMM hit its iteration bound; returning last iterate"
            );
            QpOutcome::Solved {
                solution: x,
                iterations: self.max_iter,
            }
        } else {
            tracing::debug!(r_prim, "ADMM primal residual did not vanish");
            QpOutcome::Infeasible
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn program(hessian: DMatrix<f64>, linear: DVector<f64>) -> QuadraticProgram {
        QuadraticProgram {
            hessian,
            linear,
            penalty: Penalty::None,
            equality: None,
            inequality: None,
            tolerance: 1e-9,
        }
    }

    fn solved(outcome: QpOutcome) -> DVector<f64> {
        match outcome {
            QpOutcome::Solved { solution, .. } => solution,
            QpOutcome::Infeasible => panic!("expected a solution"),
        }
    }

    #[test]
    fn soft_threshold_shrinks_toward_zero() {
        assert_eq!(soft_threshold(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold(-3.0, 1.0), -2.0);
        assert_eq!(soft_threshold(0.5, 1.0), 0.0);
    }

    #[test]
    fn unconstrained_quadratic() {
        let h = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        let g = DVector::from_vec(vec![1.0, -1.0]);
        let exact = h.clone().cholesky().unwrap().solve(&g);
        let x = solved(AdmmSolver::default().solve(&program(h, g), &DVector::zeros(2)));
        assert!((x - exact).amax() < 1e-6);
    }

    #[test]
    fn separable_lasso_matches_soft_threshold() {
        let h = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 1.0, 4.0]));
        let g = DVector::from_vec(vec![3.0, 0.5, -6.0]);
        let mut qp = program(h, g);
        qp.penalty = Penalty::L1(DVector::from_element(3, 1.0));
        let x = solved(AdmmSolver::default().solve(&qp, &DVector::zeros(3)));
        // x_i = soft(g_i, 1) / h_ii
        assert!((x[0] - 1.0).abs() < 1e-6);
        assert!(x[1].abs() < 1e-6);
        assert!((x[2] + 1.25).abs() < 1e-6);
    }

    #[test]
    fn ridge_shrinks_by_closed_form() {
        let h = DMatrix::identity(2, 2);
        let g = DVector::from_vec(vec![2.0, -4.0]);
        let mut qp = program(h, g);
        qp.penalty = Penalty::L2(DVector::from_element(2, 0.5));
        let x = solved(AdmmSolver::default().solve(&qp, &DVector::zeros(2)));
        // minimize ½x² − gx + ½x²  →  x = g / 2
        assert!((x[0] - 1.0).abs() < 1e-6);
        assert!((x[1] + 2.0).abs() < 1e-6);
    }

    #[test]
    fn equality_constraint_projects() {
        let mut qp = program(DMatrix::identity(2, 2), DVector::zeros(2));
        qp.equality = Some(LinearSystem::new(
            DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            DVector::from_vec(vec![2.0]),
        ));
        let x = solved(AdmmSolver::default().solve(&qp, &DVector::zeros(2)));
        assert!((x[0] - 1.0).abs() < 1e-6);
        assert!((x[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn inequality_constraint_is_active_when_binding() {
        let mut qp = program(DMatrix::identity(1, 1), DVector::from_vec(vec![3.0]));
        qp.inequality = Some(LinearSystem::new(
            DMatrix::identity(1, 1),
            DVector::from_vec(vec![1.0]),
        ));
        let x = solved(AdmmSolver::default().solve(&qp, &DVector::zeros(1)));
        assert!((x[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn contradictory_equalities_are_infeasible() {
        let mut qp = program(DMatrix::identity(1, 1), DVector::zeros(1));
        qp.equality = Some(LinearSystem::new(
            DMatrix::from_row_slice(2, 1, &[1.0, 1.0]),
            DVector::from_vec(vec![1.0, 2.0]),
        ));
        let solver = AdmmSolver {
            max_iter: 2_000,
            ..AdmmSolver::default()
        };
        assert_eq!(solver.solve(&qp, &DVector::zeros(1)), QpOutcome::Infeasible);
    }

    #[test]
    fn indefinite_hessian_is_rejected() {
        let qp = program(
            DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, -1e9])),
            DVector::zeros(2),
        );
        assert_eq!(
            AdmmSolver::default().solve(&qp, &DVector::zeros(2)),
            QpOutcome::Infeasible
        );
    }

    proptest! {
        #[test]
        fn lasso_solution_is_not_worse_than_origin(
            diag in prop::collection::vec(0.5f64..5.0, 3),
            g in prop::collection::vec(-5.0f64..5.0, 3),
            lam in 0.0f64..2.0,
        ) {
            let mut qp = program(
                DMatrix::from_diagonal(&DVector::from_vec(diag)),
                DVector::from_vec(g),
            );
            qp.penalty = Penalty::L1(DVector::from_element(3, lam));
            let x = solved(AdmmSolver::default().solve(&qp, &DVector::zeros(3)));
            prop_assert!(qp.objective(&x) <= qp.objective(&DVector::zeros(3)) + 1e-6);
        }
    }
}

//! # Alternating-Minimization Driver
//!
//! ## Lifecycle
//!
//! ```text
//! INITIALIZING → ITERATING → CONVERGED
//!                          → MAX_ITER_EXCEEDED
//!                          → INFEASIBLE
//! ```
//!
//! Initialization validates the configuration against the data shapes,
//! builds the projection tensors, the constraint system and the modulation
//! roots once, and seeds `(w, m, A)`. Each iteration then:
//!
//! 1. evaluates the P-tensor at the current trap center;
//! 2. updates the coefficients (closed form or convex program);
//! 3. takes one prox-gradient step on `(m, A)`;
//! 4. records the iterate and its objective breakdown;
//! 5. stops once the coefficient change (L2) is below `tol` and the
//!    trap-center change (L1) is below `tol_m`.
//!
//! Infeasibility in either update keeps the pre-update value of the
//! quantity being updated and ends the fit. Neither case is an error: the
//! result carries the status and a [`FitWarning`].

use nalgebra::DMatrix;
use ndarray::{s, Array1, Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use trapsr_core::linalg::{sorted_symmetric_eigen, to_array1, to_array2, to_dmatrix, to_dvector};
use trapsr_core::{ConfigError, DataError, LibraryInfo, LinalgError, Result, TrapError};
use trapsr_tensor::energy::{contract_pw, p_matrix, p_tensor};
use trapsr_tensor::{build_constraints, reorder_constraints, ConstraintOrder, Modulation, ProjectionTensors};

use crate::certificate::{update_certificate, CertificateStep, CertificateUpdate};
use crate::coefficients::{least_squares, local_stability_hessian, CoefficientProblem, CoefficientUpdate};
use crate::config::{ResolvedConfig, ResolvedMode, TrappingConfig};
use crate::history::TrappingHistory;
use crate::objective::ObjectiveContext;
use crate::qp::{AdmmSolver, ConvexSolver, LinearSystem, Penalty};

/// Seed of the default trap-center draw.
pub const TRAP_CENTER_SEED: u64 = 1;

// ─── Status ─────────────────────────────────────────────────────────

/// Which update reported infeasibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfeasibleStage {
    /// The coefficient sub-problem.
    Coefficients,
    /// The certificate prox-gradient step.
    Certificate,
}

impl std::fmt::Display for InfeasibleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Coefficients => "coefficient update",
            Self::Certificate => "certificate update",
        })
    }
}

/// Terminal state of a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    /// Both convergence criteria met.
    Converged,
    /// Iteration bound reached first.
    MaxIterExceeded,
    /// An update had no solution; the last feasible values are returned.
    Infeasible(InfeasibleStage),
}

impl FitStatus {
    /// Whether the fit met its convergence criteria.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

impl std::fmt::Display for FitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Converged => "CONVERGED",
            Self::MaxIterExceeded => "MAX_ITER_EXCEEDED",
            Self::Infeasible(_) => "INFEASIBLE",
        })
    }
}

/// Non-fatal condition raised during a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitWarning {
    /// The iteration bound was reached before convergence.
    NotConverged {
        /// The bound.
        max_iter: usize,
        /// Last L2 coefficient change.
        coefficient_change: f64,
        /// Last L1 trap-center change.
        trap_center_change: f64,
    },
    /// An update was infeasible at `iteration` (1-based).
    Infeasible {
        /// Failing update.
        stage: InfeasibleStage,
        /// Iteration it failed in.
        iteration: usize,
    },
}

impl std::fmt::Display for FitWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConverged { max_iter, .. } => write!(
                f,
                "trapping optimizer did not converge in {max_iter} iterations; \
                 try increasing max_iter or loosening tol and tol_m"
            ),
            Self::Infeasible { stage, iteration } => write!(
                f,
                "{stage} infeasible at iteration {iteration}; returning the last feasible iterate"
            ),
        }
    }
}

// ─── Result ─────────────────────────────────────────────────────────

/// Everything a fit produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    /// Coefficients, `(r, p)`: one row per target.
    pub coefficients: Array2<f64>,
    /// Final trap center.
    pub trap_center: Array1<f64>,
    /// Final certificate matrix.
    pub certificate: Array2<f64>,
    /// Terminal state.
    pub status: FitStatus,
    /// Non-fatal conditions, in order of occurrence.
    pub warnings: Vec<FitWarning>,
    /// Per-iteration records.
    pub history: TrappingHistory,
}

impl FitResult {
    /// Coefficients laid out `(p, r)`: one column per target.
    pub fn coefficients_by_feature(&self) -> Array2<f64> {
        self.coefficients.t().to_owned()
    }

    /// Number of completed iterations.
    pub fn iterations(&self) -> usize {
        self.history.iterations()
    }
}

// ─── Optimizer ──────────────────────────────────────────────────────

/// Trapping SR3 optimizer: sparse regression of quadratic models with an
/// energy-stability certificate.
///
/// The optimizer is immutable; each [`fit`](Self::fit) returns its own
/// [`FitResult`].
#[derive(Debug, Clone)]
pub struct TrappingSr3<S = AdmmSolver> {
    config: TrappingConfig,
    resolved: ResolvedConfig,
    solver: S,
}

impl TrappingSr3 {
    /// Validate `config` and use the default convex solver.
    pub fn new(config: TrappingConfig) -> Result<Self, ConfigError> {
        Self::with_solver(config, AdmmSolver::default())
    }
}

/// Everything fixed for the duration of one fit.
struct FitSetup {
    tensors: ProjectionTensors,
    modulation: Modulation,
    problem: CoefficientProblem,
    coefficients: Array2<f64>,
    trap_center: Array1<f64>,
    certificate: DMatrix<f64>,
}

impl<S: ConvexSolver> TrappingSr3<S> {
    /// Validate `config` and use `solver` for the convex coefficient
    /// updates.
    pub fn with_solver(config: TrappingConfig, solver: S) -> Result<Self, ConfigError> {
        let resolved = config.validate()?;
        Ok(Self {
            config,
            resolved,
            solver,
        })
    }

    /// The configuration as supplied.
    pub fn config(&self) -> &TrappingConfig {
        &self.config
    }

    /// The configuration after validation.
    pub fn resolved(&self) -> &ResolvedConfig {
        &self.resolved
    }

    /// Fit library features `x` (`(n, p)`) to target derivatives `y`
    /// (`(n, r)`).
    pub fn fit(&self, x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>) -> Result<FitResult> {
        let (n_features, n_targets) = self.check_data(x, y)?;
        let setup = self.setup(x, y, n_features, n_targets)?;
        let FitSetup {
            tensors,
            modulation,
            problem,
            mut coefficients,
            mut trap_center,
            mut certificate,
        } = setup;

        let cfg = &self.config;
        let step = CertificateStep {
            eta: self.resolved.eta,
            alpha_m: self.resolved.alpha_m,
            alpha_a: self.resolved.alpha_a,
            gamma: cfg.gamma,
        };
        let objective = ObjectiveContext {
            x: x.view(),
            y: y.view(),
            tensors: &tensors,
            modulation: &modulation,
            eta: self.resolved.eta,
            mode: self.resolved.mode,
        };
        let report_every = (cfg.max_iter / 10).max(1);

        let mut history = TrappingHistory::seeded(trap_center.clone(), to_array2(&certificate));
        let mut warnings = Vec::new();
        let mut status = FitStatus::MaxIterExceeded;

        tracing::debug!(
            n_samples = x.nrows(),
            n_features,
            n_targets,
            convex = problem.uses_convex_solver(),
            "trapping fit initialized"
        );

        for iteration in 1..=cfg.max_iter {
            let p = p_tensor(&tensors, &modulation, trap_center.view());
            let p_flat = p_matrix(&p);

            match problem.update(&self.solver, &p_flat, &certificate, coefficients.view()) {
                CoefficientUpdate::Solved(next) => coefficients = next,
                CoefficientUpdate::Infeasible => {
                    status = FitStatus::Infeasible(InfeasibleStage::Coefficients);
                    history.p_tensors.push(p);
                    warnings.push(infeasible(InfeasibleStage::Coefficients, iteration));
                    break;
                }
            }

            let pw = contract_pw(&p, coefficients.view());
            let accepted = match update_certificate(
                &tensors,
                &modulation,
                &step,
                &p,
                trap_center.view(),
                &certificate,
                coefficients.view(),
            ) {
                CertificateUpdate::Solved {
                    trap_center: m,
                    certificate: a,
                } => sorted_symmetric_eigen(pw.clone()).map(|eigen| (m, a, eigen)),
                CertificateUpdate::Infeasible => None,
            };
            let Some((m, a, eigen)) = accepted else {
                status = FitStatus::Infeasible(InfeasibleStage::Certificate);
                history.p_tensors.push(p);
                warnings.push(infeasible(InfeasibleStage::Certificate, iteration));
                break;
            };
            trap_center = m;
            certificate = a;

            let by_target = coefficients.t();
            let terms = objective.evaluate(
                coefficients.view(),
                &certificate,
                &pw,
                cfg.regularizer.penalty(cfg.threshold, by_target),
            );

            history.coefficients.push(by_target.to_owned());
            history.trap_centers.push(trap_center.clone());
            history.certificates.push(to_array2(&certificate));
            history.p_tensors.push(p);
            history.pw.push(to_array2(&pw));
            history.pw_eigenvalues.push(to_array1(&eigen.values));
            history.objective.push(terms);

            let coef_change = history.coefficient_change().unwrap_or(f64::INFINITY);
            let m_change = history.trap_center_change().unwrap_or(f64::INFINITY);
            let max_eigenvalue = eigen.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            if cfg.verbose && (iteration % report_every == 0 || iteration == 1) {
                tracing::info!(
                    iteration,
                    max_iter = cfg.max_iter,
                    data_fit = terms.data_fit,
                    relaxation = terms.relaxation,
                    penalty = terms.penalty,
                    nonlinear_energy = terms.nonlinear_energy,
                    cyclic_energy = terms.cyclic_energy,
                    total = terms.total,
                    max_eigenvalue,
                    "trapping iteration"
                );
            } else {
                tracing::debug!(
                    iteration,
                    coef_change,
                    m_change,
                    total = terms.total,
                    max_eigenvalue,
                    "trapping iteration"
                );
            }

            if coef_change < cfg.tol && m_change < cfg.tol_m {
                status = FitStatus::Converged;
                tracing::debug!(iteration, "trapping fit converged");
                break;
            }
        }

        if status == FitStatus::MaxIterExceeded {
            let warning = FitWarning::NotConverged {
                max_iter: cfg.max_iter,
                coefficient_change: history.coefficient_change().unwrap_or(f64::NAN),
                trap_center_change: history.trap_center_change().unwrap_or(f64::NAN),
            };
            tracing::warn!(max_iter = cfg.max_iter, "{warning}");
            warnings.push(warning);
        }

        Ok(FitResult {
            coefficients: coefficients.t().to_owned(),
            trap_center,
            certificate: to_array2(&certificate),
            status,
            warnings,
            history,
        })
    }

    fn check_data(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, f64>,
    ) -> Result<(usize, usize), DataError> {
        if x.nrows() == 0 || y.nrows() == 0 {
            return Err(DataError::Empty);
        }
        if x.nrows() != y.nrows() {
            return Err(DataError::SampleMismatch {
                x_rows: x.nrows(),
                y_rows: y.nrows(),
            });
        }
        let n_targets = y.ncols();
        let expected = self.config.library.n_features(n_targets);
        if x.ncols() != expected {
            return Err(DataError::FeatureMismatch {
                expected,
                n_targets,
                actual: x.ncols(),
            });
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(DataError::NonFinite);
        }
        Ok((expected, n_targets))
    }

    fn setup(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, f64>,
        p: usize,
        r: usize,
    ) -> Result<FitSetup> {
        let cfg = &self.config;
        let tensors = ProjectionTensors::build(&cfg.library, r)?;
        self.check_finite()?;

        let modulation = match &cfg.mod_matrix {
            None => Modulation::identity(r),
            Some(m) if m.dim() != (r, r) => {
                return Err(ConfigError::ModMatrixShape {
                    expected: r,
                    actual: m.dim(),
                }
                .into())
            }
            Some(m) => Modulation::new(m.view()).map_err(|err| match err {
                LinalgError::Singular => TrapError::Config(ConfigError::SingularModMatrix),
                other => TrapError::Linalg(other),
            })?,
        };

        let weights = cfg.regularizer.weights(cfg.threshold, (r, p));
        if weights.dim() != (r, p) {
            return Err(ConfigError::WeightShape {
                expected: (r, p),
                actual: weights.dim(),
            }
            .into());
        }
        let penalty = if cfg.regularizer.is_active(cfg.threshold) {
            let flat = nalgebra::DVector::from_fn(p * r, |i, _| weights[[i % r, i / r]]);
            if cfg.regularizer.is_squared() {
                Penalty::L2(flat)
            } else {
                Penalty::L1(flat)
            }
        } else {
            Penalty::None
        };

        let (equality, inequality) = self.assemble_constraints(tensors.info(), &modulation, p, r)?;

        let mut problem = CoefficientProblem::new(x, y, self.resolved.eta)
            .with_tolerance(cfg.eps_solver)
            .with_penalty(penalty)
            .with_equality(equality);
        if let Some(ineq) = inequality {
            problem = problem.with_inequality(ineq);
        }
        if let ResolvedMode::Local { alpha, beta } = self.resolved.mode {
            problem = problem.with_stability_hessian(local_stability_hessian(
                &tensors,
                &modulation,
                alpha,
                beta,
            ));
        }

        let trap_center = match &cfg.m0 {
            Some(m0) if m0.len() != r => return Err(seed_shape("m0", vec![r], m0.shape())),
            Some(m0) => m0.clone(),
            None => {
                let mut rng = StdRng::seed_from_u64(TRAP_CENTER_SEED);
                Array1::from_shape_fn(r, |_| (rng.gen::<f64>() - 1.0) * 2.0)
            }
        };
        let certificate = match &cfg.a0 {
            Some(a0) if a0.dim() != (r, r) => {
                return Err(seed_shape("A0", vec![r, r], a0.shape()))
            }
            Some(a0) => to_dmatrix(a0.view()),
            None => DMatrix::from_diagonal_element(r, r, cfg.gamma),
        };
        let coefficients = match &cfg.initial_guess {
            Some(g) if g.dim() != (r, p) => {
                return Err(seed_shape("initial_guess", vec![r, p], g.shape()))
            }
            Some(g) => g.t().to_owned(),
            None => least_squares(x, y)?,
        };

        Ok(FitSetup {
            tensors,
            modulation,
            problem,
            coefficients,
            trap_center,
            certificate,
        })
    }

    /// Seeds, modulation and user constraints must be free of NaN and
    /// infinity before anything is factored.
    fn check_finite(&self) -> Result<(), ConfigError> {
        let cfg = &self.config;
        let supplied = [
            ("mod_matrix", cfg.mod_matrix.as_ref().map(|a| a.view().into_dyn())),
            ("m0", cfg.m0.as_ref().map(|a| a.view().into_dyn())),
            ("A0", cfg.a0.as_ref().map(|a| a.view().into_dyn())),
            ("initial_guess", cfg.initial_guess.as_ref().map(|a| a.view().into_dyn())),
            ("constraints", cfg.constraints.as_ref().map(|c| c.lhs.view().into_dyn())),
            ("constraints", cfg.constraints.as_ref().map(|c| c.rhs.view().into_dyn())),
        ];
        match supplied
            .into_iter()
            .find(|(_, values)| values.as_ref().is_some_and(|v| v.iter().any(|x| !x.is_finite())))
        {
            Some((name, _)) => Err(ConfigError::NonFinite { name }),
            None => Ok(()),
        }
    }

    /// User constraints (converted to feature order) followed, in global
    /// mode, by the modulated antisymmetry rows.
    fn assemble_constraints(
        &self,
        info: &LibraryInfo,
        modulation: &Modulation,
        p: usize,
        r: usize,
    ) -> Result<(LinearSystem, Option<LinearSystem>)> {
        let n = p * r;
        let mut eq_lhs = Array2::zeros((0, n));
        let mut eq_rhs = Array1::zeros(0);
        let mut inequality = None;

        if let Some(c) = &self.config.constraints {
            let rows = c.lhs.nrows();
            if c.lhs.ncols() != n || c.rhs.len() != rows || c.inequality_rows > rows {
                return Err(ConfigError::ConstraintShape {
                    expected: n,
                    columns: c.lhs.ncols(),
                    rows,
                    rhs: c.rhs.len(),
                }
                .into());
            }
            let lhs = match c.order {
                ConstraintOrder::Feature => c.lhs.clone(),
                ConstraintOrder::Target => {
                    reorder_constraints(c.lhs.view(), p, ConstraintOrder::Feature)
                }
            };
            let k = c.inequality_rows;
            if k > 0 {
                inequality = Some(LinearSystem::new(
                    to_dmatrix(lhs.slice(s![..k, ..])),
                    to_dvector(c.rhs.slice(s![..k])),
                ));
            }
            eq_lhs = lhs.slice(s![k.., ..]).to_owned();
            eq_rhs = c.rhs.slice(s![k..]).to_owned();
        }

        if self.resolved.mode == ResolvedMode::Global {
            let m = to_array2(modulation.matrix());
            let (rhs, lhs) = build_constraints(info, Some(m.view()), ConstraintOrder::Feature)?;
            eq_lhs = stack_rows(&eq_lhs, &lhs);
            eq_rhs = eq_rhs.iter().chain(rhs.iter()).copied().collect();
        }

        Ok((
            LinearSystem::new(to_dmatrix(eq_lhs.view()), to_dvector(eq_rhs.view())),
            inequality,
        ))
    }
}

fn stack_rows(top: &Array2<f64>, bottom: &Array2<f64>) -> Array2<f64> {
    let split = top.nrows();
    Array2::from_shape_fn((split + bottom.nrows(), top.ncols()), |(i, j)| {
        if i < split {
            top[[i, j]]
        } else {
            bottom[[i - split, j]]
        }
    })
}

fn seed_shape(name: &'static str, expected: Vec<usize>, actual: &[usize]) -> TrapError {
    ConfigError::SeedShape {
        name,
        expected,
        actual: actual.to_vec(),
    }
    .into()
}

fn infeasible(stage: InfeasibleStage, iteration: usize) -> FitWarning {
    let warning = FitWarning::Infeasible { stage, iteration };
    tracing::warn!(%stage, iteration, "{warning}");
    warning
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qp::{QpOutcome, QuadraticProgram};
    use ndarray::array;
    use trapsr_core::PolynomialLibrary;

    struct Refuse;

    impl ConvexSolver for Refuse {
        fn solve(&self, _: &QuadraticProgram, _: &nalgebra::DVector<f64>) -> QpOutcome {
            QpOutcome::Infeasible
        }
    }

    /// Damped linear oscillator on two states, library without bias:
    /// terms x0, x1, x0², x0x1, x1².
    fn oscillator(n: usize) -> (Array2<f64>, Array2<f64>) {
        let lib = PolynomialLibrary::new();
        let mut rng = StdRng::seed_from_u64(7);
        let states = Array2::from_shape_fn((n, 2), |_| rng.gen_range(-2.0..2.0));
        let x = lib.transform(states.view());
        let y = Array2::from_shape_fn((n, 2), |(s, t)| {
            let (a, b) = (states[[s, 0]], states[[s, 1]]);
            if t == 0 {
                -a + 2.0 * b
            } else {
                -2.0 * a - b
            }
        });
        (x, y)
    }

    #[test]
    fn data_shape_errors() {
        let opt = TrappingSr3::new(TrappingConfig::default()).unwrap();
        let (x, y) = oscillator(10);
        assert!(matches!(
            opt.fit(x.slice(s![..0, ..]), y.slice(s![..0, ..])),
            Err(TrapError::Data(DataError::Empty))
        ));
        assert!(matches!(
            opt.fit(x.view(), y.slice(s![..5, ..])),
            Err(TrapError::Data(DataError::SampleMismatch { x_rows: 10, y_rows: 5 }))
        ));
        assert!(matches!(
            opt.fit(x.slice(s![.., ..4]), y.view()),
            Err(TrapError::Data(DataError::FeatureMismatch { expected: 5, .. }))
        ));
        let mut bad = x.clone();
        bad[[3, 1]] = f64::NAN;
        assert!(matches!(
            opt.fit(bad.view(), y.view()),
            Err(TrapError::Data(DataError::NonFinite))
        ));
    }

    #[test]
    fn shape_dependent_config_errors() {
        let (x, y) = oscillator(10);
        let fit = |cfg: TrappingConfig| TrappingSr3::new(cfg).unwrap().fit(x.view(), y.view());
        assert!(matches!(
            fit(TrappingConfig::new().with_m0(array![0.0, 0.0, 0.0])),
            Err(TrapError::Config(ConfigError::SeedShape { name: "m0", .. }))
        ));
        assert!(matches!(
            fit(TrappingConfig::new().with_a0(Array2::zeros((3, 3)))),
            Err(TrapError::Config(ConfigError::SeedShape { name: "A0", .. }))
        ));
        assert!(matches!(
            fit(TrappingConfig::new().with_mod_matrix(Array2::eye(3))),
            Err(TrapError::Config(ConfigError::ModMatrixShape { expected: 2, .. }))
        ));
        assert!(matches!(
            fit(TrappingConfig::new().with_mod_matrix(array![[1.0, 1.0], [1.0, 1.0]])),
            Err(TrapError::Config(ConfigError::SingularModMatrix))
        ));
        assert!(matches!(
            fit(TrappingConfig::new().with_regularizer(crate::config::Regularizer::WeightedL1(
                Array2::ones((5, 2))
            ))),
            Err(TrapError::Config(ConfigError::WeightShape { expected: (2, 5), .. }))
        ));
        assert!(matches!(
            fit(TrappingConfig::new().with_constraints(crate::config::LinearConstraints::equality(
                Array2::zeros((1, 9)),
                array![0.0]
            ))),
            Err(TrapError::Config(ConfigError::ConstraintShape { expected: 10, .. }))
        ));
    }

    #[test]
    fn default_trap_center_is_reproducible() {
        let (x, y) = oscillator(30);
        let cfg = TrappingConfig::new().with_threshold(0.0).with_max_iter(1);
        let opt = TrappingSr3::new(cfg).unwrap();
        let first = opt.fit(x.view(), y.view()).unwrap();
        let second = opt.fit(x.view(), y.view()).unwrap();
        let seed = &first.history.trap_centers[0];
        assert!(seed.iter().all(|&v| (-2.0..0.0).contains(&v)));
        assert_eq!(seed, &second.history.trap_centers[0]);
        assert_eq!(first.coefficients, second.coefficients);
    }

    #[test]
    fn convex_infeasibility_keeps_previous_coefficients() {
        let (x, y) = oscillator(30);
        let guess = Array2::from_elem((2, 5), 0.25);
        let cfg = TrappingConfig::new().with_initial_guess(guess.clone());
        let opt = TrappingSr3::with_solver(cfg, Refuse).unwrap();
        let result = opt.fit(x.view(), y.view()).unwrap();
        assert_eq!(result.status, FitStatus::Infeasible(InfeasibleStage::Coefficients));
        assert_eq!(result.coefficients, guess);
        assert_eq!(result.iterations(), 0);
        assert_eq!(
            result.warnings,
            vec![FitWarning::Infeasible {
                stage: InfeasibleStage::Coefficients,
                iteration: 1
            }]
        );
    }

    #[test]
    fn non_finite_seeds_are_config_errors() {
        let (x, y) = oscillator(10);
        let fit = |cfg: TrappingConfig| TrappingSr3::new(cfg).unwrap().fit(x.view(), y.view());
        assert!(matches!(
            fit(TrappingConfig::new().with_mod_matrix(array![[f64::NAN, 0.0], [0.0, 1.0]])),
            Err(TrapError::Config(ConfigError::NonFinite { name: "mod_matrix" }))
        ));
        assert!(matches!(
            fit(TrappingConfig::new().with_m0(array![f64::INFINITY, 0.0])),
            Err(TrapError::Config(ConfigError::NonFinite { name: "m0" }))
        ));
        assert!(matches!(
            fit(TrappingConfig::new().with_a0(array![[-1.0, f64::NAN], [0.0, -1.0]])),
            Err(TrapError::Config(ConfigError::NonFinite { name: "A0" }))
        ));
        assert!(matches!(
            fit(TrappingConfig::new().with_initial_guess(Array2::from_elem((2, 5), f64::NAN))),
            Err(TrapError::Config(ConfigError::NonFinite { name: "initial_guess" }))
        ));
    }

    #[test]
    fn overflowing_trap_center_ends_fit_as_infeasible() {
        let (x, y) = oscillator(30);
        let cfg = TrappingConfig::new()
            .with_threshold(0.0)
            .with_eta(1.0)
            .with_m0(array![1e300, 1e300]);
        let result = TrappingSr3::new(cfg).unwrap().fit(x.view(), y.view()).unwrap();
        assert_eq!(result.status, FitStatus::Infeasible(InfeasibleStage::Coefficients));
        assert_eq!(result.iterations(), 0);
        assert_eq!(result.history.p_tensors.len(), 1);
        assert!(result.coefficients.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn history_lengths_line_up() {
        let (x, y) = oscillator(40);
        let cfg = TrappingConfig::new()
            .with_threshold(0.0)
            .with_eta(1.0)
            .with_max_iter(4)
            .with_tolerances(1e-300, 1e-300);
        let result = TrappingSr3::new(cfg).unwrap().fit(x.view(), y.view()).unwrap();
        assert_eq!(result.status, FitStatus::MaxIterExceeded);
        let h = &result.history;
        assert_eq!(h.iterations(), 4);
        assert_eq!(h.trap_centers.len(), 5);
        assert_eq!(h.certificates.len(), 5);
        assert_eq!(h.p_tensors.len(), 4);
        assert_eq!(h.pw.len(), 4);
        assert_eq!(h.pw_eigenvalues.len(), 4);
        assert_eq!(h.objective.len(), 4);
        assert_eq!(result.coefficients_by_feature().dim(), (5, 2));
        assert!(matches!(result.warnings[0], FitWarning::NotConverged { max_iter: 4, .. }));
        for cert in &h.certificates[1..] {
            let top = sorted_symmetric_eigen(to_dmatrix(cert.view())).unwrap().values[1];
            assert!(top <= -0.1 + 1e-9);
        }
    }

    #[test]
    fn status_display() {
        assert_eq!(FitStatus::Converged.to_string(), "CONVERGED");
        assert_eq!(FitStatus::MaxIterExceeded.to_string(), "MAX_ITER_EXCEEDED");
        assert_eq!(
            FitStatus::Infeasible(InfeasibleStage::Certificate).to_string(),
            "INFEASIBLE"
        );
        assert!(FitStatus::Converged.is_converged());
    }
}

//! # Optimizer Configuration
//!
//! [`TrappingConfig`] is the serializable, caller-facing parameter set.
//! Every field has a default, so a partial JSON document deserializes into
//! a complete configuration. [`TrappingConfig::validate`] checks the
//! data-independent contracts and resolves the unset stability weights into
//! a [`ResolvedConfig`]; the shape-dependent checks (modulation matrix,
//! seeds, weights, constraint width) run at fit time once the number of
//! targets is known.
//!
//! ## Defaults
//!
//! | parameter    | default                          |
//! |--------------|----------------------------------|
//! | `threshold`  | `0.1`                            |
//! | `tol`        | `1e-5`                           |
//! | `tol_m`      | `1e-5`                           |
//! | `eps_solver` | `1e-7`                           |
//! | `gamma`      | `-0.1`                           |
//! | `max_iter`   | `30`                             |
//! | `eta`        | unset: `1e20`, `alpha_m = 1e18`  |
//! | `alpha_m`    | `0.01 · eta`                     |
//! | `alpha_a`    | `eta`                            |
//! | local `alpha`, `beta` | unset: `1e20`           |

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use trapsr_core::{ConfigError, PolynomialLibrary};
use trapsr_tensor::ConstraintOrder;

/// Weight substituted for an unset stability weight.
pub const UNSET_WEIGHT: f64 = 1e20;

/// How the energy-preserving structure of the quadratic part is imposed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum StabilityMode {
    /// Hard antisymmetry equality constraints: provable global boundedness.
    #[default]
    Global,
    /// Soft penalties on the quadratic coefficients (`alpha`) and on their
    /// cyclic sums (`beta`) instead of hard constraints.
    Local {
        /// Weight of `‖Q‖²`; smaller is stronger.
        alpha: Option<f64>,
        /// Weight of `‖Q_ijk + Q_kij + Q_jki‖²`; smaller is stronger.
        beta: Option<f64>,
    },
}

/// Sparsity-promoting regularizer on the coefficients.
///
/// The unweighted forms are scaled by the configured threshold. The
/// weighted forms carry one non-negative weight per coefficient in the
/// `(n_targets, n_features)` layout and are used as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regularizer {
    /// `threshold · Σ|w|`.
    #[default]
    L1,
    /// `threshold · Σw²`.
    L2,
    /// `Σ weights ⊙ |w|`.
    WeightedL1(Array2<f64>),
    /// `Σ weights ⊙ w²`.
    WeightedL2(Array2<f64>),
}

impl Regularizer {
    /// Per-coefficient weights, `(n_targets, n_features)`, for this
    /// regularizer at `threshold`.
    pub fn weights(&self, threshold: f64, shape: (usize, usize)) -> Array2<f64> {
        match self {
            Self::L1 | Self::L2 => Array2::from_elem(shape, threshold),
            Self::WeightedL1(w) | Self::WeightedL2(w) => w.clone(),
        }
    }

    /// Whether the penalty is quadratic rather than absolute.
    pub fn is_squared(&self) -> bool {
        matches!(self, Self::L2 | Self::WeightedL2(_))
    }

    /// Whether the penalty is nonzero for some coefficient, which selects
    /// the convex-program coefficient update.
    pub fn is_active(&self, threshold: f64) -> bool {
        match self {
            Self::L1 | Self::L2 => threshold > 0.0,
            Self::WeightedL1(w) | Self::WeightedL2(w) => w.iter().any(|&v| v > 0.0),
        }
    }

    /// Value of the penalty at `coefficients`, laid out `(n_targets,
    /// n_features)`.
    pub fn penalty(&self, threshold: f64, coefficients: ArrayView2<'_, f64>) -> f64 {
        let weights = self.weights(threshold, coefficients.dim());
        let squared = self.is_squared();
        weights
            .iter()
            .zip(coefficients.iter())
            .map(|(&lam, &c)| if squared { lam * c * c } else { lam * c.abs() })
            .sum()
    }
}

/// Caller-supplied linear constraints `lhs · w (=|≤) rhs` on the flattened
/// coefficients.
///
/// The first `inequality_rows` rows are inequalities `≤`; the rest are
/// equalities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraints {
    /// Constraint matrix, one column per coefficient.
    pub lhs: Array2<f64>,
    /// Right-hand side, one entry per row.
    pub rhs: Array1<f64>,
    /// Number of leading inequality rows.
    #[serde(default)]
    pub inequality_rows: usize,
    /// Column convention of `lhs`.
    #[serde(default)]
    pub order: ConstraintOrder,
}

impl LinearConstraints {
    /// Equality constraints only.
    pub fn equality(lhs: Array2<f64>, rhs: Array1<f64>) -> Self {
        Self {
            lhs,
            rhs,
            inequality_rows: 0,
            order: ConstraintOrder::default(),
        }
    }

    /// Every row is an inequality `≤`.
    pub fn inequality(lhs: Array2<f64>, rhs: Array1<f64>) -> Self {
        let inequality_rows = lhs.nrows();
        Self {
            lhs,
            rhs,
            inequality_rows,
            order: ConstraintOrder::default(),
        }
    }

    /// Declare the column convention of `lhs`.
    pub fn with_order(mut self, order: ConstraintOrder) -> Self {
        self.order = order;
        self
    }

    /// Whether any row is an inequality.
    pub fn has_inequalities(&self) -> bool {
        self.inequality_rows > 0
    }
}

/// Parameters of the trapping optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrappingConfig {
    /// Feature library the columns of `x` were produced with.
    pub library: PolynomialLibrary,
    /// Global (hard constraints) or local (soft penalties) stability.
    pub mode: StabilityMode,
    /// Shrinkage strength for the unweighted regularizers.
    pub threshold: f64,
    /// Regularizer applied to the coefficients.
    pub regularizer: Regularizer,
    /// Weight of the relaxation term `‖PW − A‖²`; smaller is stronger.
    pub eta: Option<f64>,
    /// Step size of the trap-center update.
    pub alpha_m: Option<f64>,
    /// Step size of the certificate update.
    pub alpha_a: Option<f64>,
    /// Upper bound on the certificate eigenvalues; must be negative.
    pub gamma: f64,
    /// Convergence tolerance on the coefficient change (L2).
    pub tol: f64,
    /// Convergence tolerance on the trap-center change (L1).
    pub tol_m: f64,
    /// Tolerance handed to the convex solver.
    pub eps_solver: f64,
    /// Bound on outer iterations.
    pub max_iter: usize,
    /// Symmetric positive-definite Lyapunov weighting, `(r, r)`.
    pub mod_matrix: Option<Array2<f64>>,
    /// Initial trap center, length `r`.
    pub m0: Option<Array1<f64>>,
    /// Initial certificate, `(r, r)`.
    pub a0: Option<Array2<f64>>,
    /// Initial coefficients, `(r, p)`.
    pub initial_guess: Option<Array2<f64>>,
    /// Extra linear constraints on the coefficients.
    pub constraints: Option<LinearConstraints>,
    /// Emit a progress line every tenth of `max_iter`.
    pub verbose: bool,
}

impl Default for TrappingConfig {
    fn default() -> Self {
        Self {
            library: PolynomialLibrary::default(),
            mode: StabilityMode::Global,
            threshold: 0.1,
            regularizer: Regularizer::L1,
            eta: None,
            alpha_m: None,
            alpha_a: None,
            gamma: -0.1,
            tol: 1e-5,
            tol_m: 1e-5,
            eps_solver: 1e-7,
            max_iter: 30,
            mod_matrix: None,
            m0: None,
            a0: None,
            initial_guess: None,
            constraints: None,
            verbose: false,
        }
    }
}

impl TrappingConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the feature library.
    pub fn with_library(mut self, library: PolynomialLibrary) -> Self {
        self.library = library;
        self
    }

    /// Set the stability mode.
    pub fn with_mode(mut self, mode: StabilityMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the shrinkage threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the regularizer.
    pub fn with_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.regularizer = regularizer;
        self
    }

    /// Set the relaxation weight `eta`.
    pub fn with_eta(mut self, eta: f64) -> Self {
        self.eta = Some(eta);
        self
    }

    /// Set both prox-gradient step sizes.
    pub fn with_step_sizes(mut self, alpha_m: f64, alpha_a: f64) -> Self {
        self.alpha_m = Some(alpha_m);
        self.alpha_a = Some(alpha_a);
        self
    }

    /// Set the eigenvalue clip threshold.
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set both convergence tolerances.
    pub fn with_tolerances(mut self, tol: f64, tol_m: f64) -> Self {
        self.tol = tol;
        self.tol_m = tol_m;
        self
    }

    /// Set the convex solver tolerance.
    pub fn with_eps_solver(mut self, eps_solver: f64) -> Self {
        self.eps_solver = eps_solver;
        self
    }

    /// Set the outer iteration bound.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the modulation matrix.
    pub fn with_mod_matrix(mut self, mod_matrix: Array2<f64>) -> Self {
        self.mod_matrix = Some(mod_matrix);
        self
    }

    /// Seed the trap center.
    pub fn with_m0(mut self, m0: Array1<f64>) -> Self {
        self.m0 = Some(m0);
        self
    }

    /// Seed the certificate.
    pub fn with_a0(mut self, a0: Array2<f64>) -> Self {
        self.a0 = Some(a0);
        self
    }

    /// Seed the coefficients, `(r, p)`.
    pub fn with_initial_guess(mut self, guess: Array2<f64>) -> Self {
        self.initial_guess = Some(guess);
        self
    }

    /// Add linear constraints.
    pub fn with_constraints(mut self, constraints: LinearConstraints) -> Self {
        self.constraints = Some(constraints);
        self
    }

    /// Enable progress logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Check the data-independent contracts and resolve unset weights.
    ///
    /// Unset `eta`, `alpha` and `beta` fall back to [`UNSET_WEIGHT`] with a
    /// `tracing::warn!`, which effectively disables the corresponding term.
    pub fn validate(&self) -> Result<ResolvedConfig, ConfigError> {
        let (eta, default_alpha_m) = match self.eta {
            Some(eta) => (eta, 0.01 * eta),
            None => {
                tracing::warn!(
                    eta = UNSET_WEIGHT,
                    "eta unset; relaxation term is effectively disabled"
                );
                (UNSET_WEIGHT, 1e18)
            }
        };
        if !(eta > 0.0) {
            return Err(ConfigError::NonPositiveEta(eta));
        }
        let alpha_m = self.alpha_m.unwrap_or(default_alpha_m);
        let alpha_a = self.alpha_a.unwrap_or(eta);
        for (name, value) in [("alpha_m", alpha_m), ("alpha_A", alpha_a)] {
            if !(0.0..=eta).contains(&value) {
                return Err(ConfigError::StepSizeOutOfRange { name, value, eta });
            }
        }

        if !(self.gamma < 0.0) {
            return Err(ConfigError::NonNegativeGamma(self.gamma));
        }
        for (name, value) in [
            ("tol", self.tol),
            ("tol_m", self.tol_m),
            ("eps_solver", self.eps_solver),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NonPositiveTolerance { name, value });
            }
        }
        if !(self.threshold >= 0.0) {
            return Err(ConfigError::NegativeThreshold(self.threshold));
        }
        if let Regularizer::WeightedL1(w) | Regularizer::WeightedL2(w) = &self.regularizer {
            if w.iter().any(|&v| !(v >= 0.0)) {
                return Err(ConfigError::NegativeWeight);
            }
        }
        if self.max_iter == 0 {
            return Err(ConfigError::ZeroMaxIter);
        }
        if self.constraints.as_ref().is_some_and(|c| c.has_inequalities())
            && self.threshold == 0.0
        {
            return Err(ConfigError::InequalityWithoutThreshold);
        }

        let mode = match self.mode {
            StabilityMode::Global => ResolvedMode::Global,
            StabilityMode::Local { alpha, beta } => ResolvedMode::Local {
                alpha: resolve_penalty("alpha", alpha)?,
                beta: resolve_penalty("beta", beta)?,
            },
        };

        Ok(ResolvedConfig {
            eta,
            alpha_m,
            alpha_a,
            mode,
        })
    }
}

fn resolve_penalty(name: &'static str, value: Option<f64>) -> Result<f64, ConfigError> {
    match value {
        Some(v) if v > 0.0 => Ok(v),
        Some(v) => Err(ConfigError::NonPositivePenalty { name, value: v }),
        None => {
            tracing::warn!(
                parameter = name,
                value = UNSET_WEIGHT,
                "local stability weight unset; penalty is effectively disabled"
            );
            Ok(UNSET_WEIGHT)
        }
    }
}

/// Stability mode with every weight resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolvedMode {
    /// Hard antisymmetry constraints.
    Global,
    /// Soft penalties with resolved weights.
    Local {
        /// Weight of `‖Q‖²`.
        alpha: f64,
        /// Weight of the cyclic-sum penalty.
        beta: f64,
    },
}

/// Stability weights after validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedConfig {
    /// Relaxation weight.
    pub eta: f64,
    /// Trap-center step size.
    pub alpha_m: f64,
    /// Certificate step size.
    pub alpha_a: f64,
    /// Stability mode.
    pub mode: ResolvedMode,
}

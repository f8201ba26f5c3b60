//! # Error Types — Structured Error Hierarchy
//!
//! Defines the error types used throughout the trapping regression
//! workspace. All errors use `thiserror` for derive-based `Display` and
//! `Error` implementations.
//!
//! ## Design
//!
//! - Configuration and structural errors are fatal and always propagate to
//!   the caller with the offending value attached.
//! - Numerical infeasibility inside an iteration is NOT an error: the
//!   optimizer reports it through its result status. [`LinalgError`] only
//!   escapes when a factorization is needed before the loop starts.

use thiserror::Error;

use crate::library::TermKind;

/// Convenience alias used across the workspace.
pub type Result<T, E = TrapError> = std::result::Result<T, E>;

/// Top-level error type for trapping regression.
#[derive(Error, Debug)]
pub enum TrapError {
    /// Optimizer configuration rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Training data rejected.
    #[error("data error: {0}")]
    Data(#[from] DataError),

    /// Polynomial library cannot support the projection tensors.
    #[error("invalid library: {0}")]
    Library(#[from] LibraryError),

    /// Dense factorization failed outside the iteration loop.
    #[error("linear algebra error: {0}")]
    Linalg(#[from] LinalgError),
}

/// Rejected optimizer parameters.
///
/// Raised at construction time (or at fit time for parameters whose valid
/// shape depends on the number of targets).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The stability weight must be strictly positive.
    #[error("eta must be positive, got {0}")]
    NonPositiveEta(f64),

    /// A prox-gradient step size lies outside `[0, eta]`.
    #[error("step size {name} = {value} must satisfy 0 <= {name} <= eta = {eta}")]
    StepSizeOutOfRange {
        /// Which step size (`alpha_m` or `alpha_A`).
        name: &'static str,
        /// The rejected value.
        value: f64,
        /// The stability weight bounding it.
        eta: f64,
    },

    /// The eigenvalue clip threshold must be negative.
    #[error("gamma must be negative, got {0}")]
    NonNegativeGamma(f64),

    /// A convergence or solver tolerance is not strictly positive.
    #[error("tolerance {name} must be positive, got {value}")]
    NonPositiveTolerance {
        /// Which tolerance.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// A local-mode penalty weight is not strictly positive.
    #[error("local stability weight {name} must be positive, got {value}")]
    NonPositivePenalty {
        /// `alpha` or `beta`.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Shrinkage threshold below zero.
    #[error("threshold must be non-negative, got {0}")]
    NegativeThreshold(f64),

    /// Inequality constraints need the convex-program path.
    #[error("inequality constraints require a nonzero threshold")]
    InequalityWithoutThreshold,

    /// At least one iteration is required.
    #[error("max_iter must be at least 1")]
    ZeroMaxIter,

    /// Per-coefficient shrinkage weights have the wrong shape.
    #[error("shrinkage weights must have shape {expected:?}, got {actual:?}")]
    WeightShape {
        /// `(n_targets, n_features)`.
        expected: (usize, usize),
        /// Shape supplied by the caller.
        actual: (usize, usize),
    },

    /// Per-coefficient shrinkage weights must be non-negative.
    #[error("shrinkage weights must be non-negative")]
    NegativeWeight,

    /// Modulation matrix is not `n_targets × n_targets`.
    #[error("modulation matrix must be {expected}x{expected}, got {actual:?}")]
    ModMatrixShape {
        /// Number of targets.
        expected: usize,
        /// Shape supplied by the caller.
        actual: (usize, usize),
    },

    /// Modulation matrix has a zero singular value.
    #[error("modulation matrix is singular")]
    SingularModMatrix,

    /// An initial guess has the wrong shape.
    #[error("initial guess {name} must have shape {expected:?}, got {actual:?}")]
    SeedShape {
        /// `m0`, `A0` or `initial_guess`.
        name: &'static str,
        /// Required shape.
        expected: Vec<usize>,
        /// Shape supplied by the caller.
        actual: Vec<usize>,
    },

    /// User constraint matrix does not span the flattened coefficients.
    #[error("constraint matrix must have {expected} columns and matching rhs, got {columns} columns and {rhs} rhs entries for {rows} rows")]
    ConstraintShape {
        /// `n_features * n_targets`.
        expected: usize,
        /// Columns supplied.
        columns: usize,
        /// Rows supplied.
        rows: usize,
        /// Right-hand-side entries supplied.
        rhs: usize,
    },

    /// A caller-supplied matrix or vector contains NaN or infinity.
    #[error("{name} contains non-finite values")]
    NonFinite {
        /// `mod_matrix`, `m0`, `A0`, `initial_guess` or `constraints`.
        name: &'static str,
    },
}

/// Rejected training data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// No samples were supplied.
    #[error("no samples supplied")]
    Empty,

    /// `x` and `y` disagree on the number of samples.
    #[error("x has {x_rows} samples but y has {y_rows}")]
    SampleMismatch {
        /// Rows of the feature matrix.
        x_rows: usize,
        /// Rows of the target matrix.
        y_rows: usize,
    },

    /// `x` does not have one column per library term.
    #[error("expected {expected} library features for {n_targets} targets, got {actual}")]
    FeatureMismatch {
        /// Number of library terms for `n_targets` variables.
        expected: usize,
        /// Number of targets.
        n_targets: usize,
        /// Columns of the feature matrix.
        actual: usize,
    },

    /// A sample contains NaN or infinity.
    #[error("samples contain non-finite values")]
    NonFinite,
}

/// Structural errors raised while building tensors or constraints.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    /// The enumeration produced no usable terms.
    #[error("polynomial library for {n_targets} variables has no terms")]
    Empty {
        /// Requested number of variables.
        n_targets: usize,
    },

    /// A term required by the projection tensors is absent.
    #[error("library is missing the {kind} term over variables {variables:?}")]
    MissingTerm {
        /// Which class of term was looked up.
        kind: TermKind,
        /// The variable(s) it should involve.
        variables: Vec<usize>,
    },
}

/// Dense linear-algebra failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinalgError {
    /// Singular value decomposition did not converge.
    #[error("singular value decomposition did not converge for a {rows}x{cols} matrix")]
    SvdNotConverged {
        /// Rows of the input.
        rows: usize,
        /// Columns of the input.
        cols: usize,
    },

    /// Matrix has no inverse.
    #[error("matrix is singular")]
    Singular,

    /// Input to a factorization contains NaN or infinity.
    #[error("cannot factor a {rows}x{cols} matrix with non-finite entries")]
    NonFinite {
        /// Rows of the input.
        rows: usize,
        /// Columns of the input.
        cols: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trap_error_config_display() {
        let err = TrapError::Config(ConfigError::NonPositiveEta(-1.0));
        let msg = format!("{err}");
        assert!(msg.contains("configuration error"));
        assert!(msg.contains("-1"));
    }

    #[test]
    fn step_size_error_names_parameter() {
        let err = ConfigError::StepSizeOutOfRange {
            name: "alpha_m",
            value: 2.0,
            eta: 1.0,
        };
        let msg = format!("{err}");
        assert!(msg.contains("alpha_m"));
        assert!(msg.contains("eta = 1"));
    }

    #[test]
    fn data_error_sample_mismatch_display() {
        let err = TrapError::from(DataError::SampleMismatch {
            x_rows: 10,
            y_rows: 9,
        });
        let msg = format!("{err}");
        assert!(msg.contains("10"));
        assert!(msg.contains("9"));
    }

    #[test]
    fn library_error_missing_term_display() {
        let err = LibraryError::MissingTerm {
            kind: TermKind::PureQuadratic,
            variables: vec![2],
        };
        let msg = format!("{err}");
        assert!(msg.contains("pure quadratic"));
        assert!(msg.contains("[2]"));
    }

    #[test]
    fn inequality_without_threshold_display() {
        let err = ConfigError::InequalityWithoutThreshold;
        assert!(format!("{err}").contains("nonzero threshold"));
    }

    #[test]
    fn non_finite_errors_name_their_source() {
        let err = TrapError::from(ConfigError::NonFinite { name: "m0" });
        assert_eq!(err.to_string(), "configuration error: m0 contains non-finite values");
        let err = LinalgError::NonFinite { rows: 2, cols: 3 };
        assert!(err.to_string().contains("2x3"));
    }

    #[test]
    fn all_error_types_are_debug() {
        let e1 = TrapError::Linalg(LinalgError::Singular);
        let e2 = DataError::Empty;
        let e3 = LibraryError::Empty { n_targets: 0 };
        assert!(!format!("{e1:?}").is_empty());
        assert!(!format!("{e2:?}").is_empty());
        assert!(!format!("{e3:?}").is_empty());
    }
}

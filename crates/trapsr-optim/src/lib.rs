//! # trapsr-optim — Trapping SR3 Optimizer
//!
//! Sparse regression of quadratic polynomial models with a certificate of
//! long-term boundedness. The optimizer alternates between two updates:
//!
//! - **Coefficients** (`coefficients.rs`): a constrained least-squares
//!   problem coupled to the certificate through the relaxation term. Closed
//!   form without shrinkage; otherwise a convex program handed to a
//!   [`ConvexSolver`] (`qp.rs`, default [`AdmmSolver`]).
//!
//! - **Certificate** (`certificate.rs`): one prox-gradient step on the trap
//!   center `m` and the negative-definite matrix `A`, with eigenvalue
//!   clipping at `γ`.
//!
//! [`TrappingSr3`] (`driver.rs`) orchestrates both, records every iterate
//! in a [`TrappingHistory`] and reports non-convergence and infeasibility
//! through [`FitStatus`] and [`FitWarning`] rather than errors.
//!
//! ## Usage
//!
//! ```no_run
//! use ndarray::Array2;
//! use trapsr_core::PolynomialLibrary;
//! use trapsr_optim::{TrappingConfig, TrappingSr3};
//!
//! # fn run(states: Array2<f64>, derivatives: Array2<f64>) -> trapsr_core::Result<()> {
//! let library = PolynomialLibrary::new().with_bias(true);
//! let features = library.transform(states.view());
//! let config = TrappingConfig::new()
//!     .with_library(library)
//!     .with_threshold(0.0)
//!     .with_eta(1.0);
//! let result = TrappingSr3::new(config)?.fit(features.view(), derivatives.view())?;
//! println!("{}: {:?}", result.status, result.coefficients);
//! # Ok(())
//! # }
//! ```

pub mod certificate;
pub mod coefficients;
pub mod config;
pub mod driver;
pub mod history;
pub mod objective;
pub mod qp;

// ─── Configuration re-exports ───────────────────────────────────────

pub use config::{
    LinearConstraints, Regularizer, ResolvedConfig, ResolvedMode, StabilityMode, TrappingConfig,
};

// ─── Optimizer re-exports ───────────────────────────────────────────

pub use driver::{FitResult, FitStatus, FitWarning, InfeasibleStage, TrappingSr3};
pub use history::TrappingHistory;
pub use objective::ObjectiveTerms;

// ─── Sub-problem re-exports ─────────────────────────────────────────

pub use certificate::{CertificateStep, CertificateUpdate};
pub use coefficients::CoefficientUpdate;
pub use qp::{AdmmSolver, ConvexSolver, LinearSystem, Penalty, QpOutcome, QuadraticProgram};

//! # trapsr-tensor — Projection Tensors & Energy Constraints
//!
//! The algebraic layer between flat polynomial coefficients and the
//! energy form whose negative definiteness certifies a trapping region.
//!
//! - **Projection** (`projection.rs`): constant, linear and quadratic
//!   selector tensors built once per fit from the library ordering.
//!
//! - **Energy** (`energy.rs`): the modulation matrix and the contractions
//!   producing the P-tensor at a trap center, `PW`, `PMW`, and the
//!   flattened operators used in the coefficient Hessian.
//!
//! - **Constraints** (`constraints.rs`): the homogeneous equality system
//!   enforcing energy-preserving antisymmetry of quadratic coefficients.
//!
//! ## Mathematical Model
//!
//! A degree-2 model of `r` states is
//!
//! ```text
//! ẋ_i = E_i + Σ_j L_ij x_j + Σ_jk Q_ijk x_j x_k
//! ```
//!
//! With `Q_ijk + Q_jki + Q_kij = 0` the quadratic terms conserve energy and
//! the model is globally bounded whenever the symmetric part of
//! `L + Q·m` is negative definite for some trap center `m`.

pub mod constraints;
pub mod energy;
pub mod projection;

// Re-export primary types.
pub use constraints::{build_constraints, constraint_count, reorder_constraints, ConstraintOrder};
pub use energy::Modulation;
pub use projection::ProjectionTensors;

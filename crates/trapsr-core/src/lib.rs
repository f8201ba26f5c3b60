//! # trapsr-core — Foundational Types for Trapping Sparse Regression
//!
//! This crate is the leaf of the workspace. It defines the pieces every
//! other crate depends on:
//!
//! 1. **Error hierarchy.** [`TrapError`] wraps one `thiserror` enum per
//!    concern: configuration, training data, library structure, and dense
//!    linear algebra.
//!
//! 2. **Polynomial library.** [`PolynomialLibrary`] enumerates degree-≤2
//!    monomials in a fixed order; [`LibraryInfo`] indexes them by structure
//!    with order-free lookup of mixed terms through [`SymmetricPair`].
//!
//! 3. **Linear-algebra bridge.** [`linalg`] converts between `ndarray` and
//!    `nalgebra` and provides the pseudo-inverse, sorted symmetric
//!    eigendecomposition, and matrix square roots used by the optimizer.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `trapsr-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod library;
pub mod linalg;

pub use error::{ConfigError, DataError, LibraryError, LinalgError, Result, TrapError};
pub use library::{LibraryInfo, PolyTerm, PolynomialLibrary, SymmetricPair, TermKind};

//! # Fit History
//!
//! Append-only per-iteration records of a fit.
//!
//! ## Resource Caveat
//!
//! Nothing is evicted. Each iteration stores one P-tensor of `r³·p` values
//! besides the smaller `(r, p)` and `(r, r)` records, so memory grows
//! linearly with `max_iter` and quickly with the number of states.

use ndarray::{Array1, Array2, Array4};
use serde::Serialize;

use crate::objective::ObjectiveTerms;

/// Iterates of one fit, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrappingHistory {
    /// Coefficients after each completed iteration, `(r, p)`.
    pub coefficients: Vec<Array2<f64>>,
    /// Trap centers: the seed, then one per completed iteration.
    pub trap_centers: Vec<Array1<f64>>,
    /// Certificates: the seed, then one per completed iteration.
    pub certificates: Vec<Array2<f64>>,
    /// P-tensor used by each iteration, evaluated at its starting trap
    /// center.
    pub p_tensors: Vec<Array4<f64>>,
    /// `PW` after each completed iteration.
    pub pw: Vec<Array2<f64>>,
    /// Ascending eigenvalues of each `PW`.
    pub pw_eigenvalues: Vec<Array1<f64>>,
    /// Objective breakdown after each completed iteration.
    pub objective: Vec<ObjectiveTerms>,
}

impl TrappingHistory {
    /// History seeded with the initial trap center and certificate.
    pub fn seeded(trap_center: Array1<f64>, certificate: Array2<f64>) -> Self {
        Self {
            trap_centers: vec![trap_center],
            certificates: vec![certificate],
            ..Self::default()
        }
    }

    /// Number of completed iterations.
    pub fn iterations(&self) -> usize {
        self.coefficients.len()
    }

    /// Largest eigenvalue of the latest `PW`; negative once the model is
    /// certified stable around the latest trap center.
    pub fn latest_max_eigenvalue(&self) -> Option<f64> {
        self.pw_eigenvalues.last().and_then(|v| v.last().copied())
    }

    /// L2 norm of the change between the two latest coefficient records,
    /// against zeros when only one exists.
    pub fn coefficient_change(&self) -> Option<f64> {
        let latest = self.coefficients.last()?;
        let change = match self.coefficients.len() {
            1 => latest.iter().map(|v| v * v).sum::<f64>(),
            n => (latest - &self.coefficients[n - 2])
                .iter()
                .map(|v| v * v)
                .sum::<f64>(),
        };
        Some(change.sqrt())
    }

    /// L1 norm of the change between the two latest trap centers.
    pub fn trap_center_change(&self) -> Option<f64> {
        let n = self.trap_centers.len();
        if n < 2 {
            return None;
        }
        Some(
            (&self.trap_centers[n - 1] - &self.trap_centers[n - 2])
                .iter()
                .map(|v| v.abs())
                .sum(),
        )
    }
}

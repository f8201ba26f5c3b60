//! # Objective Breakdown
//!
//! Evaluated once per iteration for monitoring only; the alternating
//! updates do not minimize it jointly, so it need not decrease
//! monotonically.

use nalgebra::DMatrix;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use trapsr_tensor::energy::{cyclic_sum, modulated_quadratic};
use trapsr_tensor::{Modulation, ProjectionTensors};

use crate::config::ResolvedMode;

/// Components of the objective at one iterate.
///
/// `total` follows the historical accounting of the local-mode objective:
/// it adds `nonlinear_energy` twice and leaves `cyclic_energy` out. The
/// cyclic term is still computed and recorded here so callers can form the
/// full sum themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveTerms {
    /// `½‖y − x·w‖²`.
    pub data_fit: f64,
    /// `½‖A − PW‖²/η`.
    pub relaxation: f64,
    /// Regularizer value.
    pub penalty: f64,
    /// `½‖Q‖²/α` on the modulated quadratic coefficients; zero in global
    /// mode.
    pub nonlinear_energy: f64,
    /// `½‖Q_ijk + Q_kij + Q_jki‖²/β`; zero in global mode.
    pub cyclic_energy: f64,
    /// See the type-level note.
    pub total: f64,
}

impl ObjectiveTerms {
    /// Every component summed once.
    pub fn full_sum(&self) -> f64 {
        self.data_fit + self.relaxation + self.penalty + self.nonlinear_energy + self.cyclic_energy
    }
}

/// The fixed inputs of the objective for one fit.
#[derive(Debug, Clone, Copy)]
pub struct ObjectiveContext<'a> {
    /// Library features, `(n, p)`.
    pub x: ArrayView2<'a, f64>,
    /// Targets, `(n, r)`.
    pub y: ArrayView2<'a, f64>,
    /// Projection tensors.
    pub tensors: &'a ProjectionTensors,
    /// Modulation matrix.
    pub modulation: &'a Modulation,
    /// Relaxation weight.
    pub eta: f64,
    /// Stability mode.
    pub mode: ResolvedMode,
}

impl ObjectiveContext<'_> {
    /// Break down the objective at coefficients `w` (`(p, r)`), certificate
    /// `A` and its partner `PW`, with the regularizer already evaluated.
    pub fn evaluate(
        &self,
        w: ArrayView2<'_, f64>,
        certificate: &DMatrix<f64>,
        pw: &DMatrix<f64>,
        penalty: f64,
    ) -> ObjectiveTerms {
        let residual = &self.y - &self.x.dot(&w);
        let data_fit = 0.5 * residual.iter().map(|v| v * v).sum::<f64>();
        let relaxation = 0.5 * (certificate - pw).norm_squared() / self.eta;

        let (nonlinear_energy, cyclic_energy) = match self.mode {
            ResolvedMode::Global => (0.0, 0.0),
            ResolvedMode::Local { alpha, beta } => {
                let q = modulated_quadratic(self.tensors, self.modulation, w);
                let cyc = cyclic_sum(&q);
                (
                    0.5 * q.iter().map(|v| v * v).sum::<f64>() / alpha,
                    0.5 * cyc.iter().map(|v| v * v).sum::<f64>() / beta,
                )
            }
        };

        let total = data_fit + relaxation + penalty + 2.0 * nonlinear_energy;
        ObjectiveTerms {
            data_fit,
            relaxation,
            penalty,
            nonlinear_energy,
            cyclic_energy,
            total,
        }
    }
}

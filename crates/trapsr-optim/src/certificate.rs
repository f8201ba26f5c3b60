//! # Certificate Update
//!
//! One prox-gradient step on the trap center `m` and the certificate
//! matrix `A` of the relaxation term `½‖PW − A‖²/η`:
//!
//! ```text
//! Δ       = (A − PW) / η
//! m_new_x = m_x − α_m · Σ_ab PMW[x, b, a] · Δ[a, b]
//! A_new   = V_PW · min(Λ(A − α_A·Δ), γ) · V_PW⁻¹
//! ```
//!
//! The eigenvalues of the stepped matrix are sorted ascending, clipped at
//! `γ < 0`, and reassembled in the ascending eigenbasis of `PW`, so every
//! eigenvalue of the returned certificate is at most `γ`.

use nalgebra::DMatrix;
use ndarray::{Array1, Array4, ArrayView1, ArrayView2};

use trapsr_core::linalg::{all_finite, sorted_symmetric_eigen, symmetrize};
use trapsr_tensor::energy::{contract_pw, pm_contracted};
use trapsr_tensor::{Modulation, ProjectionTensors};

/// Step sizes and clip threshold of the certificate update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CertificateStep {
    /// Relaxation weight.
    pub eta: f64,
    /// Trap-center step size.
    pub alpha_m: f64,
    /// Certificate step size.
    pub alpha_a: f64,
    /// Eigenvalue ceiling, negative.
    pub gamma: f64,
}

/// Outcome of one certificate update.
#[derive(Debug, Clone, PartialEq)]
pub enum CertificateUpdate {
    /// Updated trap center and certificate.
    Solved {
        /// New `m`.
        trap_center: Array1<f64>,
        /// New `A`, symmetric with eigenvalues `≤ γ`.
        certificate: DMatrix<f64>,
    },
    /// Singular eigenbasis or non-finite values.
    Infeasible,
}

/// Replace every eigenvalue of `stepped` above `gamma` by `gamma` and
/// rotate the sorted result into the ascending eigenbasis of `basis`.
///
/// Returns `None` if either input is non-finite or the basis is singular.
pub fn clip_eigenvalues(
    stepped: &DMatrix<f64>,
    basis: &DMatrix<f64>,
    gamma: f64,
) -> Option<DMatrix<f64>> {
    if !all_finite(stepped) || !all_finite(basis) {
        return None;
    }
    let values = sorted_symmetric_eigen(symmetrize(stepped))?.values;
    let vectors = sorted_symmetric_eigen(symmetrize(basis))?.vectors;
    let clipped = values.map(|v| v.min(gamma));
    let inverse = vectors.clone().try_inverse()?;
    let out = symmetrize(&(&vectors * DMatrix::from_diagonal(&clipped) * inverse));
    all_finite(&out).then_some(out)
}

/// Advance `(m, A)` one step given the coefficients `w` (`(p, r)`) and the
/// P-tensor evaluated at `m`.
pub fn update_certificate(
    tensors: &ProjectionTensors,
    modulation: &Modulation,
    step: &CertificateStep,
    p_tensor: &Array4<f64>,
    trap_center: ArrayView1<'_, f64>,
    certificate: &DMatrix<f64>,
    w: ArrayView2<'_, f64>,
) -> CertificateUpdate {
    let r = tensors.n_targets();
    let pw = contract_pw(p_tensor, w);
    let pmw = pm_contracted(tensors, modulation, w);
    let delta = (certificate - &pw) / step.eta;

    let next_center = Array1::from_shape_fn(r, |x| {
        let mut grad = 0.0;
        for a in 0..r {
            for b in 0..r {
                grad += pmw[[x, b, a]] * delta[(a, b)];
            }
        }
        trap_center[x] - step.alpha_m * grad
    });
    if next_center.iter().any(|v| !v.is_finite()) {
        return CertificateUpdate::Infeasible;
    }

    let stepped = certificate - &delta * step.alpha_a;
    match clip_eigenvalues(&stepped, &pw, step.gamma) {
        Some(next) => CertificateUpdate::Solved {
            trap_center: next_center,
            certificate: next,
        },
        None => CertificateUpdate::Infeasible,
    }
}

//! Shared fixtures for the scenario tests.

#![allow(dead_code)]

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trapsr_core::PolynomialLibrary;

/// Route `tracing` output through the test harness. Safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Uniform random states in `[-scale, scale]`.
pub fn random_states(n: usize, r: usize, scale: f64, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((n, r), |_| rng.gen_range(-scale..scale))
}

/// Lorenz-shaped system:
///
/// ```text
/// ẋ = 10 (y − x)
/// ẏ = 28 x − y − x z
/// ż = x y − 8/3 z
/// ```
pub fn lorenz_derivatives(states: &Array2<f64>) -> Array2<f64> {
    Array2::from_shape_fn((states.nrows(), 3), |(s, t)| {
        let (x, y, z) = (states[[s, 0]], states[[s, 1]], states[[s, 2]]);
        match t {
            0 => 10.0 * (y - x),
            1 => 28.0 * x - y - x * z,
            _ => x * y - 8.0 / 3.0 * z,
        }
    })
}

/// True Lorenz coefficients `(3, 10)` for a library with bias:
/// terms 1, x, y, z, x², xy, xz, y², yz, z².
pub fn lorenz_coefficients() -> Array2<f64> {
    let mut c = Array2::zeros((3, 10));
    c[[0, 1]] = -10.0;
    c[[0, 2]] = 10.0;
    c[[1, 1]] = 28.0;
    c[[1, 2]] = -1.0;
    c[[1, 6]] = -1.0;
    c[[2, 3]] = -8.0 / 3.0;
    c[[2, 5]] = 1.0;
    c
}

/// Library features and derivatives of the Lorenz-shaped system on random
/// states.
pub fn lorenz_data(n: usize, seed: u64) -> (PolynomialLibrary, Array2<f64>, Array2<f64>) {
    let library = PolynomialLibrary::new().with_bias(true);
    let states = random_states(n, 3, 10.0, seed);
    (library, library.transform(states.view()), lorenz_derivatives(&states))
}

/// Two-state linear system `ẋ = L·x`, library without bias: terms
/// x0, x1, x0², x0x1, x1².
pub const LINEAR_SYSTEM: [[f64; 2]; 2] = [[-1.0, 2.0], [-2.0, -0.5]];

/// Features and derivatives of [`LINEAR_SYSTEM`] with optional additive
/// perturbation of the derivatives.
pub fn linear_data(n: usize, noise: f64, seed: u64) -> (PolynomialLibrary, Array2<f64>, Array2<f64>) {
    let library = PolynomialLibrary::new();
    let states = random_states(n, 2, 2.0, seed);
    let mut rng = StdRng::seed_from_u64(seed + 1);
    let y = Array2::from_shape_fn((n, 2), |(s, t)| {
        let clean: f64 = (0..2).map(|j| LINEAR_SYSTEM[t][j] * states[[s, j]]).sum();
        clean + noise * rng.gen_range(-1.0..1.0)
    });
    (library, library.transform(states.view()), y)
}

/// Relative error of the nonzero entries and the largest magnitude on the
/// zero entries of `truth`.
pub fn compare(found: &Array2<f64>, truth: &Array2<f64>) -> (f64, f64) {
    let mut worst_rel: f64 = 0.0;
    let mut worst_zero: f64 = 0.0;
    for (f, t) in found.iter().zip(truth.iter()) {
        if *t == 0.0 {
            worst_zero = worst_zero.max(f.abs());
        } else {
            worst_rel = worst_rel.max(((f - t) / t).abs());
        }
    }
    (worst_rel, worst_zero)
}

//! Projective measurement of a single qudit
//!
//! Outcome probabilities come from the target's reduced density matrix,
//! `p_k = ⟨v_k| ρ_t |v_k⟩` for the basis vectors `v_k`. A single uniform
//! variate selects the outcome, after which the state is projected with
//! `P_k = |v_k⟩⟨v_k|` on the target and renormalized.

use ndarray::Array2;
use num_complex::Complex64;
use tracing::warn;

use crate::circuit::MeasurementBasis;
use crate::error::Result;
use crate::state::QuantumState;
use crate::tensor;

/// Total probability below which the distribution is treated as degenerate
pub const DEGENERACY_EPSILON: f64 = 1e-12;

/// Probability of each outcome when measuring `target` in `basis`.
///
/// Round-off negatives are clamped to zero.
pub fn outcome_probabilities(
    state: &QuantumState,
    target: usize,
    basis: &MeasurementBasis,
) -> Result<Vec<f64>> {
    let rho = state.reduced(&[target])?;
    let probs = match basis {
        MeasurementBasis::Computational => rho.diag().iter().map(|c| c.re).collect::<Vec<_>>(),
        MeasurementBasis::Columns(v) => {
            // diag(V† ρ V)
            let rotated = tensor::adjoint(v.matrix()).dot(&rho).dot(v.matrix());
            rotated.diag().iter().map(|c| c.re).collect()
        }
    };
    Ok(probs.into_iter().map(|p| p.max(0.0)).collect())
}

/// Selects an outcome from `probs` with the uniform variate `r ∈ [0, 1)`.
///
/// The cumulative sum is scaled by the total probability. If the total is
/// below [`DEGENERACY_EPSILON`] the choice falls back to `floor(r · d)`.
pub fn sample_index(probs: &[f64], r: f64) -> usize {
    let d = probs.len();
    if d == 0 {
        return 0;
    }

    let total: f64 = probs.iter().sum();
    if total < DEGENERACY_EPSILON {
        warn!(total, "degenerate outcome distribution, sampling uniformly");
        return ((r * d as f64) as usize).min(d - 1);
    }

    let threshold = r * total;
    let mut cumulative = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumulative += p;
        if threshold < cumulative {
            return i;
        }
    }

    // Round-off pushed r past the last bucket
    probs.iter().rposition(|&p| p > 0.0).unwrap_or(d - 1)
}

/// Projector `|v_k⟩⟨v_k|` for outcome `k`
fn projector(basis: &MeasurementBasis, outcome: usize, d: usize) -> Array2<Complex64> {
    match basis {
        MeasurementBasis::Computational => {
            let mut p = Array2::zeros((d, d));
            p[[outcome, outcome]] = Complex64::new(1.0, 0.0);
            p
        }
        MeasurementBasis::Columns(v) => {
            let col = v.matrix().column(outcome);
            Array2::from_shape_fn((d, d), |(i, j)| col[i] * col[j].conj())
        }
    }
}

/// Projects `target` onto outcome `outcome` and renormalizes
pub fn collapse(
    state: &mut QuantumState,
    target: usize,
    basis: &MeasurementBasis,
    outcome: usize,
) -> Result<()> {
    let d = state.dims().get(target).copied().unwrap_or(0);
    tensor::check_subsystems(&[target], state.num_subsystems())?;
    state.apply(&projector(basis, outcome, d), &[target])?;
    if !state.normalize() {
        warn!(target, outcome, "collapsed onto a zero-probability outcome");
    }
    Ok(())
}

/// Measures `target` with the uniform variate `r`: returns the outcome and
/// its probability, leaving the state collapsed.
pub fn measure(
    state: &mut QuantumState,
    target: usize,
    basis: &MeasurementBasis,
    r: f64,
) -> Result<(usize, f64)> {
    let probs = outcome_probabilities(state, target, basis)?;
    let outcome = sample_index(&probs, r);
    collapse(state, target, basis, outcome)?;
    Ok((outcome, probs[outcome]))
}

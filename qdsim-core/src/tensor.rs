//! Subsystem-aware tensor kernels
//!
//! Dense complex kernels over a joint Hilbert space described by a list of
//! local dimensions `dims`. Subsystem 0 is the most significant factor of the
//! tensor-product basis, so for `dims = [d0, d1, d2]` the basis index of
//! `|a b c⟩` is `a * d1 * d2 + b * d2 + c`.
//!
//! # Kernels
//! - `permute_subsystems` / `permute_subsystems_ket`: reorder subsystems
//! - `expand`: embed an operator on a subset into the full space
//! - `apply_operator` / `apply_conjugation`: act with an embedded operator
//!   without materializing it
//! - `partial_trace`, `partial_transpose`, `reduced_density`
//!
//! All kernels reject subsystem lists that do not factor the operand.

use ndarray::{Array1, Array2, ArrayView1};
use num_complex::Complex64;

use crate::error::{QuditError, Result};

/// Tolerance for treating an operator as the identity
pub const IDENTITY_TOLERANCE: f64 = 1e-10;

/// Tolerance for the `U†U = I` check on user-supplied gates
pub const UNITARY_TOLERANCE: f64 = 1e-8;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);

// =============================================================================
// Validation Helpers
// =============================================================================

/// Product of `dims`, or `InvalidRegisterSize` when it does not fit a `usize`
pub(crate) fn total_dimension(dims: &[usize]) -> Result<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| {
            QuditError::InvalidRegisterSize(format!(
                "joint dimension of {:?} overflows usize",
                dims
            ))
        })
}

fn check_dims(dims: &[usize], found: usize) -> Result<()> {
    let expected = total_dimension(dims)?;
    if expected != found {
        return Err(QuditError::DimensionMismatch { expected, found });
    }
    Ok(())
}

fn check_square(m: &Array2<Complex64>) -> Result<()> {
    if m.nrows() != m.ncols() {
        return Err(QuditError::DimensionMismatch {
            expected: m.nrows(),
            found: m.ncols(),
        });
    }
    Ok(())
}

pub(crate) fn check_subsystems(subset: &[usize], n: usize) -> Result<()> {
    let mut seen = vec![false; n];
    for &s in subset {
        if s >= n {
            return Err(QuditError::subsystem(s, n));
        }
        if seen[s] {
            return Err(QuditError::DuplicateIndex(s));
        }
        seen[s] = true;
    }
    Ok(())
}

fn check_permutation(perm: &[usize], n: usize) -> Result<()> {
    if perm.len() != n {
        return Err(QuditError::InvalidPermutation(perm.to_vec()));
    }
    let mut seen = vec![false; n];
    for &p in perm {
        if p >= n || seen[p] {
            return Err(QuditError::InvalidPermutation(perm.to_vec()));
        }
        seen[p] = true;
    }
    Ok(())
}

// =============================================================================
// Index Arithmetic
// =============================================================================

/// Row-major strides: `strides[k]` is the product of `dims[k+1..]`
fn strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for k in (0..dims.len().saturating_sub(1)).rev() {
        strides[k] = strides[k + 1] * dims[k + 1];
    }
    strides
}

/// Subsystems not listed in `subset`, in ascending order
pub(crate) fn complement(subset: &[usize], n: usize) -> Vec<usize> {
    (0..n).filter(|k| !subset.contains(k)).collect()
}

/// Flat offsets of every basis state of `subsystems` (first listed is most
/// significant) inside the full index space
fn offsets(subsystems: &[usize], dims: &[usize], strides: &[usize]) -> Vec<usize> {
    let mut result = vec![0usize];
    for &s in subsystems {
        let mut next = Vec::with_capacity(result.len() * dims[s]);
        for &base in &result {
            for digit in 0..dims[s] {
                next.push(base + digit * strides[s]);
            }
        }
        result = next;
    }
    result
}

/// `map[new_idx]` is the index in the original layout of basis state
/// `new_idx` of the permuted layout
fn permutation_map(perm: &[usize], dims: &[usize]) -> Vec<usize> {
    let old_strides = strides(dims);
    offsets(perm, dims, &old_strides)
}

// =============================================================================
// Basic Matrix Helpers
// =============================================================================

/// Kronecker product `a ⊗ b`
pub fn kron(a: &Array2<Complex64>, b: &Array2<Complex64>) -> Array2<Complex64> {
    ndarray::linalg::kron(a, b)
}

/// `n × n` identity
pub fn identity(n: usize) -> Array2<Complex64> {
    Array2::eye(n)
}

/// Conjugate transpose
pub fn adjoint(m: &Array2<Complex64>) -> Array2<Complex64> {
    m.t().mapv(|c| c.conj())
}

/// Entrywise check against the identity within `tol`
pub fn is_identity(m: &Array2<Complex64>, tol: f64) -> bool {
    if m.nrows() != m.ncols() {
        return false;
    }
    m.indexed_iter().all(|((i, j), &v)| {
        let expected = if i == j { 1.0 } else { 0.0 };
        (v - Complex64::new(expected, 0.0)).norm() < tol
    })
}

/// `U†U = I` within `tol`
pub fn is_unitary(m: &Array2<Complex64>, tol: f64) -> bool {
    m.nrows() == m.ncols() && is_identity(&adjoint(m).dot(m), tol)
}

/// `m^k`, with `m^0 = I`
pub fn matrix_power(m: &Array2<Complex64>, k: usize) -> Array2<Complex64> {
    let mut result = identity(m.nrows());
    for _ in 0..k {
        result = result.dot(m);
    }
    result
}

// =============================================================================
// Subsystem Permutation
// =============================================================================

/// Reorders the subsystems of a state vector.
///
/// Position `i` of the result holds subsystem `perm[i]` of the input, so the
/// result lives on `perm.iter().map(|&p| dims[p])`.
pub fn permute_subsystems_ket(
    psi: &Array1<Complex64>,
    perm: &[usize],
    dims: &[usize],
) -> Result<Array1<Complex64>> {
    check_dims(dims, psi.len())?;
    check_permutation(perm, dims.len())?;

    let map = permutation_map(perm, dims);
    Ok(map.iter().map(|&old| psi[old]).collect())
}

/// Reorders the subsystems of a square operator or density matrix.
///
/// Rows and columns are permuted together; see [`permute_subsystems_ket`]
/// for the meaning of `perm`.
pub fn permute_subsystems(
    rho: &Array2<Complex64>,
    perm: &[usize],
    dims: &[usize],
) -> Result<Array2<Complex64>> {
    check_square(rho)?;
    check_dims(dims, rho.nrows())?;
    check_permutation(perm, dims.len())?;

    let map = permutation_map(perm, dims);
    let n = map.len();
    Ok(Array2::from_shape_fn((n, n), |(i, j)| rho[[map[i], map[j]]]))
}

// =============================================================================
// Expansion and Application
// =============================================================================

/// Target dimension of `op` acting on `targets`, after validation
fn check_operator(op: &Array2<Complex64>, targets: &[usize], dims: &[usize]) -> Result<usize> {
    check_square(op)?;
    check_subsystems(targets, dims.len())?;
    let target_dim: usize = targets.iter().map(|&t| dims[t]).product();
    if op.nrows() != target_dim {
        return Err(QuditError::DimensionMismatch {
            expected: target_dim,
            found: op.nrows(),
        });
    }
    Ok(target_dim)
}

/// Embeds `op` (acting on `targets`, first target most significant) into the
/// full space described by `dims`.
///
/// The targets are permuted to the front, `op ⊗ I` is formed and the result
/// is permuted back, so non-adjacent and out-of-order targets are handled.
pub fn expand(
    op: &Array2<Complex64>,
    targets: &[usize],
    dims: &[usize],
) -> Result<Array2<Complex64>> {
    check_operator(op, targets, dims)?;

    let rest = complement(targets, dims.len());
    let order: Vec<usize> = targets.iter().chain(rest.iter()).copied().collect();
    let rest_dim: usize = rest.iter().map(|&r| dims[r]).product();

    let front = kron(op, &identity(rest_dim));
    let front_dims: Vec<usize> = order.iter().map(|&o| dims[o]).collect();

    let mut inverse = vec![0; order.len()];
    for (pos, &sub) in order.iter().enumerate() {
        inverse[sub] = pos;
    }
    permute_subsystems(&front, &inverse, &front_dims)
}

struct Layout {
    target_offsets: Vec<usize>,
    bases: Vec<usize>,
}

impl Layout {
    fn new(targets: &[usize], dims: &[usize]) -> Self {
        let strides = strides(dims);
        let rest = complement(targets, dims.len());
        Layout {
            target_offsets: offsets(targets, dims, &strides),
            bases: offsets(&rest, dims, &strides),
        }
    }

    fn apply(
        &self,
        op: &Array2<Complex64>,
        input: ArrayView1<Complex64>,
        out: &mut [Complex64],
    ) {
        let k = self.target_offsets.len();
        let mut local = vec![ZERO; k];
        for &base in &self.bases {
            for (slot, &off) in local.iter_mut().zip(&self.target_offsets) {
                *slot = input[base + off];
            }
            for (r, &off) in self.target_offsets.iter().enumerate() {
                let mut acc = ZERO;
                for (c, &amp) in local.iter().enumerate() {
                    acc += op[[r, c]] * amp;
                }
                out[base + off] = acc;
            }
        }
    }
}

/// Computes `expand(op, targets, dims) · ψ` without building the full operator.
///
/// `op` need not be unitary; the engine also uses this for projectors.
pub fn apply_operator(
    op: &Array2<Complex64>,
    psi: &Array1<Complex64>,
    targets: &[usize],
    dims: &[usize],
) -> Result<Array1<Complex64>> {
    check_dims(dims, psi.len())?;
    check_operator(op, targets, dims)?;

    let layout = Layout::new(targets, dims);
    let mut out = vec![ZERO; psi.len()];
    layout.apply(op, psi.view(), &mut out);
    Ok(Array1::from(out))
}

fn apply_left(layout: &Layout, op: &Array2<Complex64>, m: &Array2<Complex64>) -> Array2<Complex64> {
    let n = m.nrows();
    let mut result = Array2::zeros((n, m.ncols()));
    let mut column = vec![ZERO; n];
    for (j, col) in m.columns().into_iter().enumerate() {
        layout.apply(op, col, &mut column);
        for (i, &v) in column.iter().enumerate() {
            result[[i, j]] = v;
        }
    }
    result
}

/// Computes `E ρ E†` with `E = expand(op, targets, dims)`.
pub fn apply_conjugation(
    op: &Array2<Complex64>,
    rho: &Array2<Complex64>,
    targets: &[usize],
    dims: &[usize],
) -> Result<Array2<Complex64>> {
    check_square(rho)?;
    check_dims(dims, rho.nrows())?;
    check_operator(op, targets, dims)?;

    // E ρ E† = (E (E ρ)†)†
    let layout = Layout::new(targets, dims);
    let left = apply_left(&layout, op, rho);
    let both = apply_left(&layout, op, &adjoint(&left));
    Ok(adjoint(&both))
}

// =============================================================================
// Partial Trace / Transpose
// =============================================================================

/// Traces out the subsystems in `subset`.
///
/// The result lives on the complementary subsystems, kept in their original
/// order. Tracing out every subsystem yields the 1×1 trace.
pub fn partial_trace(
    rho: &Array2<Complex64>,
    subset: &[usize],
    dims: &[usize],
) -> Result<Array2<Complex64>> {
    check_square(rho)?;
    check_dims(dims, rho.nrows())?;
    check_subsystems(subset, dims.len())?;

    let keep = complement(subset, dims.len());
    let order: Vec<usize> = keep.iter().chain(subset.iter()).copied().collect();
    let permuted = permute_subsystems(rho, &order, dims)?;

    let dk: usize = keep.iter().map(|&k| dims[k]).product();
    let dt: usize = subset.iter().map(|&s| dims[s]).product();

    Ok(Array2::from_shape_fn((dk, dk), |(a, b)| {
        (0..dt).map(|t| permuted[[a * dt + t, b * dt + t]]).sum()
    }))
}

/// Transposes the indices of the subsystems in `subset`.
pub fn partial_transpose(
    rho: &Array2<Complex64>,
    subset: &[usize],
    dims: &[usize],
) -> Result<Array2<Complex64>> {
    check_square(rho)?;
    check_dims(dims, rho.nrows())?;
    check_subsystems(subset, dims.len())?;

    let strides = strides(dims);
    let n = rho.nrows();
    let mut out = Array2::zeros((n, n));

    for ((i, j), &v) in rho.indexed_iter() {
        let (mut ni, mut nj) = (i, j);
        for &s in subset {
            let di = (i / strides[s]) % dims[s];
            let dj = (j / strides[s]) % dims[s];
            ni = ni - di * strides[s] + dj * strides[s];
            nj = nj - dj * strides[s] + di * strides[s];
        }
        out[[ni, nj]] = v;
    }
    Ok(out)
}

/// Reduced density matrix of the `keep` subsystems of the pure state `ψ`.
///
/// Equal to `partial_trace(|ψ⟩⟨ψ|, complement(keep), dims)` with the kept
/// subsystems ordered as listed in `keep`, but never forms the full
/// projector.
pub fn reduced_density(
    psi: &Array1<Complex64>,
    keep: &[usize],
    dims: &[usize],
) -> Result<Array2<Complex64>> {
    check_dims(dims, psi.len())?;
    check_subsystems(keep, dims.len())?;

    let traced = complement(keep, dims.len());
    let order: Vec<usize> = keep.iter().chain(traced.iter()).copied().collect();
    let permuted = permute_subsystems_ket(psi, &order, dims)?;

    let dk: usize = keep.iter().map(|&k| dims[k]).product();
    let dt = psi.len() / dk;
    let m = Array2::from_shape_vec((dk, dt), permuted.to_vec()).map_err(|_| {
        QuditError::DimensionMismatch {
            expected: dk * dt,
            found: psi.len(),
        }
    })?;
    Ok(m.dot(&adjoint(&m)))
}

use ndarray::{Array1, Array2};
use num_complex::Complex64;

use crate::error::{QuditError, Result};
use crate::tensor;

/// Squared norms below this are treated as the zero vector
const NORM_EPSILON: f64 = 1e-12;

/// Deviation of `Tr(ρ²)` from 1 still reported as pure
const PURITY_TOLERANCE: f64 = 1e-9;

/// Storage of a [`QuantumState`]
#[derive(Debug, Clone, PartialEq)]
pub enum StateData {
    /// Pure state vector `|ψ⟩`
    Vector(Array1<Complex64>),
    /// Density matrix `ρ`
    Density(Array2<Complex64>),
}

/// Joint state of a qudit register.
///
/// Subsystem 0 is the most significant digit of the basis index:
/// for `dims = [d0, d1]`, `|a b⟩` sits at index `a * d1 + b`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantumState {
    dims: Vec<usize>,
    data: StateData,
}

impl QuantumState {
    /// Creates `|0…0⟩` on the given subsystems.
    ///
    /// Panics when the joint dimension overflows `usize`; dimensions taken
    /// from a [`Circuit`](crate::circuit::Circuit) never do.
    pub fn zero(dims: &[usize]) -> Self {
        let total: usize = dims.iter().product();
        let mut psi = Array1::<Complex64>::zeros(total);
        psi[0] = Complex64::new(1.0, 0.0);
        QuantumState {
            dims: dims.to_vec(),
            data: StateData::Vector(psi),
        }
    }

    /// Creates the computational basis state `|digits⟩`
    pub fn basis(dims: &[usize], digits: &[usize]) -> Result<Self> {
        if digits.len() != dims.len() {
            return Err(QuditError::DimensionMismatch {
                expected: dims.len(),
                found: digits.len(),
            });
        }
        tensor::total_dimension(dims)?;
        let mut index = 0;
        for (k, (&digit, &d)) in digits.iter().zip(dims).enumerate() {
            if digit >= d {
                return Err(QuditError::InvalidDitValue {
                    slot: k,
                    value: digit,
                    dim: d,
                });
            }
            index = index * d + digit;
        }
        let mut state = Self::zero(dims);
        if let StateData::Vector(psi) = &mut state.data {
            psi[0] = Complex64::new(0.0, 0.0);
            psi[index] = Complex64::new(1.0, 0.0);
        }
        Ok(state)
    }

    /// Wraps a state vector, normalizing it.
    pub fn from_vector(psi: Array1<Complex64>, dims: &[usize]) -> Result<Self> {
        let expected = tensor::total_dimension(dims)?;
        if psi.len() != expected {
            return Err(QuditError::DimensionMismatch {
                expected,
                found: psi.len(),
            });
        }
        let mut state = QuantumState {
            dims: dims.to_vec(),
            data: StateData::Vector(psi),
        };
        if !state.normalize() {
            return Err(QuditError::InvalidRegisterSize(
                "state vector has zero norm".into(),
            ));
        }
        Ok(state)
    }

    /// Wraps a density matrix, rescaling it to unit trace.
    pub fn from_density(rho: Array2<Complex64>, dims: &[usize]) -> Result<Self> {
        let expected = tensor::total_dimension(dims)?;
        for found in [rho.nrows(), rho.ncols()] {
            if found != expected {
                return Err(QuditError::DimensionMismatch { expected, found });
            }
        }
        let mut state = QuantumState {
            dims: dims.to_vec(),
            data: StateData::Density(rho),
        };
        if !state.normalize() {
            return Err(QuditError::InvalidRegisterSize(
                "density matrix has zero trace".into(),
            ));
        }
        Ok(state)
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn num_subsystems(&self) -> usize {
        self.dims.len()
    }

    pub fn dimension(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn data(&self) -> &StateData {
        &self.data
    }

    /// True when the state is stored as a vector
    pub fn is_vector(&self) -> bool {
        matches!(self.data, StateData::Vector(_))
    }

    /// True when `Tr(ρ²) = 1`, whatever the storage
    pub fn is_pure(&self) -> bool {
        (self.purity() - 1.0).abs() < PURITY_TOLERANCE
    }

    /// The state vector, if the state is stored as one
    pub fn vector(&self) -> Option<&Array1<Complex64>> {
        match &self.data {
            StateData::Vector(psi) => Some(psi),
            StateData::Density(_) => None,
        }
    }

    /// Density matrix of the state (`|ψ⟩⟨ψ|` for a vector)
    pub fn to_density(&self) -> Array2<Complex64> {
        match &self.data {
            StateData::Vector(psi) => {
                let n = psi.len();
                Array2::from_shape_fn((n, n), |(i, j)| psi[i] * psi[j].conj())
            }
            StateData::Density(rho) => rho.clone(),
        }
    }

    /// Same state stored as a density matrix
    pub fn into_density(self) -> Self {
        match self.data {
            StateData::Density(_) => self,
            StateData::Vector(_) => QuantumState {
                data: StateData::Density(self.to_density()),
                dims: self.dims,
            },
        }
    }

    /// Squared norm of a vector, trace of a density matrix
    pub fn norm_sqr(&self) -> f64 {
        match &self.data {
            StateData::Vector(psi) => psi.iter().map(|c| c.norm_sqr()).sum(),
            StateData::Density(rho) => rho.diag().iter().map(|c| c.re).sum(),
        }
    }

    /// Rescales to unit norm (unit trace). Returns `false` and leaves the
    /// state untouched when it is numerically zero.
    pub fn normalize(&mut self) -> bool {
        let norm_sq = self.norm_sqr();
        if norm_sq < NORM_EPSILON {
            return false;
        }
        match &mut self.data {
            StateData::Vector(psi) => {
                let norm = norm_sq.sqrt();
                psi.mapv_inplace(|c| c / norm);
            }
            StateData::Density(rho) => rho.mapv_inplace(|c| c / norm_sq),
        }
        true
    }

    /// Probability of the computational basis state at `index`
    pub fn probability(&self, index: usize) -> f64 {
        if index >= self.dimension() {
            return 0.0;
        }
        match &self.data {
            StateData::Vector(psi) => psi[index].norm_sqr(),
            StateData::Density(rho) => rho[[index, index]].re,
        }
    }

    /// Computational-basis distribution over the whole register
    pub fn probabilities(&self) -> Vec<f64> {
        (0..self.dimension()).map(|i| self.probability(i)).collect()
    }

    /// `Tr(ρ²)`: 1 for pure states
    pub fn purity(&self) -> f64 {
        match &self.data {
            StateData::Vector(_) => 1.0,
            StateData::Density(rho) => rho.dot(rho).diag().iter().map(|c| c.re).sum(),
        }
    }

    /// Applies `op` on `targets` in place: `E ψ` or `E ρ E†`
    pub fn apply(&mut self, op: &Array2<Complex64>, targets: &[usize]) -> Result<()> {
        match &mut self.data {
            StateData::Vector(psi) => {
                *psi = tensor::apply_operator(op, psi, targets, &self.dims)?;
            }
            StateData::Density(rho) => {
                *rho = tensor::apply_conjugation(op, rho, targets, &self.dims)?;
            }
        }
        Ok(())
    }

    /// Reduced density matrix of `keep`, in the listed order
    pub fn reduced(&self, keep: &[usize]) -> Result<Array2<Complex64>> {
        match &self.data {
            StateData::Vector(psi) => tensor::reduced_density(psi, keep, &self.dims),
            StateData::Density(rho) => {
                tensor::check_subsystems(keep, self.dims.len())?;
                let traced = tensor::complement(keep, self.dims.len());
                let reduced = tensor::partial_trace(rho, &traced, &self.dims)?;
                // partial_trace keeps ascending order; restore the requested one
                let mut sorted = keep.to_vec();
                sorted.sort_unstable();
                let perm: Vec<usize> = keep
                    .iter()
                    .map(|k| sorted.iter().position(|s| s == k).unwrap_or(0))
                    .collect();
                let kept_dims: Vec<usize> = sorted.iter().map(|&s| self.dims[s]).collect();
                tensor::permute_subsystems(&reduced, &perm, &kept_dims)
            }
        }
    }
}

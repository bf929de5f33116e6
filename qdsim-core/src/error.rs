//! Error types for qdsim
//!
//! Every error is raised synchronously at the point of misuse:
//! - Register construction (sizes, local dimension)
//! - Circuit building (indices, operator dimensions, classical reads)
//! - Engine setup (pre-set dits, initial states)
//! - Tensor kernels (subsystem lists that do not factor the operand)

use std::fmt;

use thiserror::Error;

/// Result type alias for qdsim operations
pub type Result<T> = std::result::Result<T, QuditError>;

/// Which kind of index was out of range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Qudit,
    ClassicalSlot,
    Subsystem,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Qudit => write!(f, "qudit"),
            IndexKind::ClassicalSlot => write!(f, "classical slot"),
            IndexKind::Subsystem => write!(f, "subsystem"),
        }
    }
}

/// Error type for circuit construction, execution setup and tensor kernels
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuditError {
    // ==========================================================================
    // Register / Index Errors
    // ==========================================================================
    /// Qudit, classical-slot or subsystem index beyond the declared size
    #[error("{kind} index {index} out of range (size {bound})")]
    OutOfRangeIndex {
        kind: IndexKind,
        index: usize,
        bound: usize,
    },

    /// Same index listed twice where distinct indices are required
    #[error("index {0} listed more than once")]
    DuplicateIndex(usize),

    /// Non-positive qudit/slot counts or local dimension < 2
    #[error("invalid register size: {0}")]
    InvalidRegisterSize(String),

    /// Value written to a classical slot outside [0, d)
    #[error("value {value} for classical slot {slot} outside [0, {dim})")]
    InvalidDitValue { slot: usize, value: usize, dim: usize },

    // ==========================================================================
    // Operator Errors
    // ==========================================================================
    /// Operator or state size incompatible with the subsystem dimensions
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// User-supplied operator failed the unitarity check
    #[error("operator '{0}' is not unitary")]
    NonUnitaryOperator(String),

    /// Gate name not present in the registry
    #[error("unknown gate '{0}'")]
    UnknownGate(String),

    /// Subsystem permutation is not a permutation of 0..n
    #[error("invalid subsystem permutation {0:?}")]
    InvalidPermutation(Vec<usize>),

    // ==========================================================================
    // Circuit / Classical Control Errors
    // ==========================================================================
    /// Classically-controlled operation reads a slot not proven clean
    #[error("classical slot {slot} is read before it is written or set")]
    UncleanClassicalRead { slot: usize },

    /// Append attempted on a sealed circuit
    #[error("circuit is finalized and can no longer be modified")]
    CircuitFinalized,
}

impl QuditError {
    pub(crate) fn qudit(index: usize, bound: usize) -> Self {
        QuditError::OutOfRangeIndex {
            kind: IndexKind::Qudit,
            index,
            bound,
        }
    }

    pub(crate) fn slot(index: usize, bound: usize) -> Self {
        QuditError::OutOfRangeIndex {
            kind: IndexKind::ClassicalSlot,
            index,
            bound,
        }
    }

    pub(crate) fn subsystem(index: usize, bound: usize) -> Self {
        QuditError::OutOfRangeIndex {
            kind: IndexKind::Subsystem,
            index,
            bound,
        }
    }

    /// True for errors caused by malformed indices or shapes, as opposed to
    /// classical-control ordering or lifecycle violations
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            QuditError::OutOfRangeIndex { .. }
                | QuditError::DuplicateIndex(_)
                | QuditError::DimensionMismatch { .. }
                | QuditError::InvalidPermutation(_)
                | QuditError::InvalidDitValue { .. }
        )
    }
}

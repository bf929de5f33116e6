//! # qdsim-core: Qudit Circuits and Shot-Based Execution
//!
//! Circuits over registers of d-level systems, with quantum and classical
//! control, projective measurement and a semantics-preserving compression
//! pass, executed shot by shot on a dense state-vector or density-matrix
//! simulator.
//!
//! ## Features
//!
//! - **Tensor kernels**: expansion, partial trace/transpose, subsystem permutation
//! - **Gate registry**: generalized Pauli, Fourier and controlled gates for any d
//! - **Circuit model**: validated appends and clean classical-slot tracking
//! - **Execution**: seeded, optionally parallel shots with outcome counting
//!
//! ## Quick Start
//!
//! ```rust
//! use qdsim_core::{Circuit, Engine, EngineConfig, Gate, NamedGate};
//!
//! let x = Gate::named(NamedGate::X, 2)?;
//! let cx = Gate::named(NamedGate::Cx, 2)?;
//!
//! let mut circuit = Circuit::new(2, 2, 2)?;
//! circuit
//!     .append_gate(&x, &[0])?
//!     .append_gate(&cx, &[0, 1])?
//!     .append_measurement(0, 0)?
//!     .append_measurement(1, 1)?;
//!
//! let mut engine = Engine::bind(circuit).with_config(EngineConfig::new().with_seed(42));
//! let counts = engine.execute(1000)?;
//! assert_eq!(counts.count(&[1, 1]), 1000);
//! # Ok::<(), qdsim_core::QuditError>(())
//! ```

pub mod circuit;
pub mod compress; // Gate fusion and identity elimination
pub mod engine; // Shot loop, classical register
pub mod error;
pub mod gates;
pub mod measurement; // Projective measurement and sampling
pub mod results;
pub mod state;
pub mod tensor; // Subsystem-aware dense kernels

// Re-exports
pub use circuit::{Circuit, ClassicalCondition, MeasurementBasis, Operation};
pub use compress::CompressionStats;
pub use engine::{Engine, EngineConfig, Representation};
pub use error::{IndexKind, QuditError, Result};
pub use gates::{ControlMode, Gate, GateSource, NamedGate};
pub use measurement::DEGENERACY_EPSILON;
pub use results::{MeasurementRecord, OutcomeCounts, Register};
pub use state::{QuantumState, StateData};
pub use tensor::{
    apply_conjugation, apply_operator, expand, kron, partial_trace, partial_transpose,
    permute_subsystems, permute_subsystems_ket, reduced_density, IDENTITY_TOLERANCE,
    UNITARY_TOLERANCE,
};

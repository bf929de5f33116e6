//! Circuit model
//!
//! A [`Circuit`] is a single linear sequence of operations over `N` qudits of
//! local dimension `d` and `M` classical slots. Every append is validated
//! before it touches the sequence, so a failed append leaves the circuit
//! unchanged.
//!
//! Lifecycle: a circuit is *open* until it is sealed, compressed or bound to
//! an [`Engine`](crate::engine::Engine); after that it is immutable and shared
//! through `Arc`.

use std::fmt;

use crate::compress::{self, CompressionStats};
use crate::error::{QuditError, Result};
use crate::gates::{ControlMode, Gate};

/// Rule deciding whether a classically-controlled gate fires
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClassicalCondition {
    /// Apply `U` when every read slot is non-zero
    #[default]
    AllNonZero,
    /// Apply `U` when the read slots equal these values, slot by slot
    Equals(Vec<usize>),
    /// Apply `U^m` when every read slot holds the same value `m`
    Power,
}

impl ClassicalCondition {
    /// Power of the gate to apply for the given slot values (0 = skip)
    pub fn exponent(&self, values: &[usize]) -> usize {
        match self {
            ClassicalCondition::AllNonZero => ControlMode::NonZero.exponent(values),
            ClassicalCondition::Equals(expected) => usize::from(expected.as_slice() == values),
            ClassicalCondition::Power => ControlMode::Power.exponent(values),
        }
    }
}

/// Basis of a projective measurement
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementBasis {
    /// Computational ("Z") basis
    Computational,
    /// Orthonormal basis given by the columns of a unitary
    Columns(Gate),
}

/// One step of a circuit
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Gate {
        gate: Gate,
        targets: Vec<usize>,
    },
    /// Quantum control; `joint` acts on `controls ++ targets`
    Controlled {
        gate: Gate,
        controls: Vec<usize>,
        targets: Vec<usize>,
        mode: ControlMode,
        joint: Gate,
    },
    /// Classical control; under `ClassicalCondition::Power`, `powers[m]`
    /// holds `U^m` for every dit value `m`, otherwise it is empty
    ClassicallyControlled {
        gate: Gate,
        slots: Vec<usize>,
        targets: Vec<usize>,
        condition: ClassicalCondition,
        powers: Vec<Gate>,
    },
    Measure {
        target: usize,
        slot: usize,
        basis: MeasurementBasis,
    },
}

impl Operation {
    pub(crate) fn controlled(
        gate: Gate,
        controls: Vec<usize>,
        targets: Vec<usize>,
        mode: ControlMode,
        local_dim: usize,
    ) -> Self {
        let joint = gate.controlled(controls.len(), local_dim, mode);
        Operation::Controlled {
            gate,
            controls,
            targets,
            mode,
            joint,
        }
    }

    pub(crate) fn classically_controlled(
        gate: Gate,
        slots: Vec<usize>,
        targets: Vec<usize>,
        condition: ClassicalCondition,
        local_dim: usize,
    ) -> Self {
        let powers = match condition {
            ClassicalCondition::Power => (0..local_dim).map(|m| gate.power(m)).collect(),
            _ => Vec::new(),
        };
        Operation::ClassicallyControlled {
            gate,
            slots,
            targets,
            condition,
            powers,
        }
    }

    /// Operator applied for condition exponent `m` (`m > 0`)
    pub(crate) fn conditional_gate(&self, m: usize) -> Option<&Gate> {
        match self {
            Operation::ClassicallyControlled { gate, .. } if m == 1 => Some(gate),
            Operation::ClassicallyControlled { powers, .. } => powers.get(m),
            _ => None,
        }
    }

    /// Qudits touched by this operation
    pub fn qudits(&self) -> Vec<usize> {
        match self {
            Operation::Gate { targets, .. } | Operation::ClassicallyControlled { targets, .. } => {
                targets.clone()
            }
            Operation::Controlled {
                controls, targets, ..
            } => controls.iter().chain(targets.iter()).copied().collect(),
            Operation::Measure { target, .. } => vec![*target],
        }
    }

    /// Classical slots read or written by this operation
    pub fn slots(&self) -> Vec<usize> {
        match self {
            Operation::ClassicallyControlled { slots, .. } => slots.clone(),
            Operation::Measure { slot, .. } => vec![*slot],
            _ => Vec::new(),
        }
    }

    /// True when the operation shares a qudit or a classical slot with `other`
    pub fn conflicts_with(&self, other: &Operation) -> bool {
        let qudits = self.qudits();
        let slots = self.slots();
        other.qudits().iter().any(|q| qudits.contains(q))
            || other.slots().iter().any(|s| slots.contains(s))
    }

    /// The operator carried by a gate-like operation
    pub fn gate(&self) -> Option<&Gate> {
        match self {
            Operation::Gate { gate, .. }
            | Operation::Controlled { gate, .. }
            | Operation::ClassicallyControlled { gate, .. } => Some(gate),
            Operation::Measure { .. } => None,
        }
    }

    /// Gate-like operation whose operator is the identity
    pub fn is_identity(&self) -> bool {
        self.gate().map_or(false, Gate::is_identity)
    }

    pub fn is_measurement(&self) -> bool {
        matches!(self, Operation::Measure { .. })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Gate { gate, targets } => write!(f, "{} {:?}", gate.label(), targets),
            Operation::Controlled {
                gate,
                controls,
                targets,
                mode,
                ..
            } => write!(
                f,
                "ctrl({:?}) {:?} {} {:?}",
                mode,
                controls,
                gate.label(),
                targets
            ),
            Operation::ClassicallyControlled {
                gate,
                slots,
                targets,
                condition,
                ..
            } => write!(
                f,
                "c-if({:?}) slots {:?} {} {:?}",
                condition,
                slots,
                gate.label(),
                targets
            ),
            Operation::Measure {
                target,
                slot,
                basis,
            } => match basis {
                MeasurementBasis::Computational => write!(f, "measure {} -> c{}", target, slot),
                MeasurementBasis::Columns(v) => {
                    write!(f, "measure[{}] {} -> c{}", v.label(), target, slot)
                }
            },
        }
    }
}

/// `d^n`, or `None` on overflow
fn checked_dim_pow(d: usize, n: usize) -> Option<usize> {
    u32::try_from(n).ok().and_then(|n| d.checked_pow(n))
}

/// Ordered operation sequence over a qudit register and a classical register
#[derive(Debug, Clone, PartialEq)]
pub struct Circuit {
    num_qudits: usize,
    local_dim: usize,
    num_slots: usize,
    operations: Vec<Operation>,
    /// Slots written by a measurement so far or declared as inputs
    clean: Vec<bool>,
    inputs: Vec<bool>,
    finalized: bool,
}

impl Circuit {
    /// Creates an empty circuit on `num_qudits` qudits of dimension
    /// `local_dim` with `num_slots` classical slots.
    pub fn new(num_qudits: usize, local_dim: usize, num_slots: usize) -> Result<Self> {
        if num_qudits == 0 {
            return Err(QuditError::InvalidRegisterSize(
                "circuit needs at least one qudit".into(),
            ));
        }
        if num_slots == 0 {
            return Err(QuditError::InvalidRegisterSize(
                "circuit needs at least one classical slot".into(),
            ));
        }
        if local_dim < 2 {
            return Err(QuditError::InvalidRegisterSize(format!(
                "local dimension {} < 2",
                local_dim
            )));
        }
        // Every later size computation is bounded by the joint dimension
        if checked_dim_pow(local_dim, num_qudits).is_none() {
            return Err(QuditError::InvalidRegisterSize(format!(
                "{}^{} overflows usize",
                local_dim, num_qudits
            )));
        }
        Ok(Circuit {
            num_qudits,
            local_dim,
            num_slots,
            operations: Vec::new(),
            clean: vec![false; num_slots],
            inputs: vec![false; num_slots],
            finalized: false,
        })
    }

    pub fn num_qudits(&self) -> usize {
        self.num_qudits
    }

    pub fn local_dim(&self) -> usize {
        self.local_dim
    }

    /// Local dimension of every qudit, in register order
    pub fn dims(&self) -> Vec<usize> {
        vec![self.local_dim; self.num_qudits]
    }

    /// Dimension of the joint Hilbert space
    pub fn total_dim(&self) -> usize {
        self.local_dim.pow(self.num_qudits as u32)
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn gate_count(&self) -> usize {
        self.operations.iter().filter(|op| !op.is_measurement()).count()
    }

    pub fn measurement_count(&self) -> usize {
        self.operations.iter().filter(|op| op.is_measurement()).count()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Seals the circuit; later appends fail with `CircuitFinalized`
    pub fn seal(&mut self) {
        self.finalized = true;
    }

    // =========================================================================
    // Classical Slot Queries
    // =========================================================================

    /// Slots written by some earlier operation or declared as inputs
    pub fn clean_slots(&self) -> Vec<usize> {
        (0..self.num_slots).filter(|&s| self.clean[s]).collect()
    }

    /// Slots no operation has written so far
    pub fn dirty_slots(&self) -> Vec<usize> {
        (0..self.num_slots).filter(|&s| !self.clean[s]).collect()
    }

    /// Slots declared as externally supplied
    pub fn input_slots(&self) -> Vec<usize> {
        (0..self.num_slots).filter(|&s| self.inputs[s]).collect()
    }

    pub fn is_clean(&self, slot: usize) -> bool {
        self.clean.get(slot).copied().unwrap_or(false)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn check_open(&self) -> Result<()> {
        if self.finalized {
            return Err(QuditError::CircuitFinalized);
        }
        Ok(())
    }

    fn check_qudits(&self, groups: &[&[usize]]) -> Result<()> {
        let mut seen = vec![false; self.num_qudits];
        for &q in groups.iter().flat_map(|g| g.iter()) {
            if q >= self.num_qudits {
                return Err(QuditError::qudit(q, self.num_qudits));
            }
            if seen[q] {
                return Err(QuditError::DuplicateIndex(q));
            }
            seen[q] = true;
        }
        Ok(())
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= self.num_slots {
            return Err(QuditError::slot(slot, self.num_slots));
        }
        Ok(())
    }

    fn check_gate_dim(&self, gate: &Gate, num_targets: usize) -> Result<()> {
        let expected = checked_dim_pow(self.local_dim, num_targets).ok_or_else(|| {
            QuditError::InvalidRegisterSize(format!("{} targets overflow usize", num_targets))
        })?;
        if num_targets == 0 || gate.dim() != expected {
            return Err(QuditError::DimensionMismatch {
                expected,
                found: gate.dim(),
            });
        }
        Ok(())
    }

    fn check_nonempty(&self, list: &[usize], what: &str) -> Result<()> {
        if list.is_empty() {
            return Err(QuditError::InvalidRegisterSize(format!("empty {} list", what)));
        }
        Ok(())
    }

    // =========================================================================
    // Appends
    // =========================================================================

    /// Appends `gate` acting on `targets` (first target most significant)
    pub fn append_gate(&mut self, gate: &Gate, targets: &[usize]) -> Result<&mut Self> {
        self.check_open()?;
        self.check_nonempty(targets, "target")?;
        self.check_qudits(&[targets])?;
        self.check_gate_dim(gate, targets.len())?;

        self.operations.push(Operation::Gate {
            gate: gate.clone(),
            targets: targets.to_vec(),
        });
        Ok(self)
    }

    /// Appends `gate` on `targets`, applied when every control is non-zero
    pub fn append_controlled_gate(
        &mut self,
        gate: &Gate,
        controls: &[usize],
        targets: &[usize],
    ) -> Result<&mut Self> {
        self.append_controlled_gate_with(gate, controls, targets, ControlMode::NonZero)
    }

    /// Appends a quantum-controlled gate with an explicit [`ControlMode`]
    pub fn append_controlled_gate_with(
        &mut self,
        gate: &Gate,
        controls: &[usize],
        targets: &[usize],
        mode: ControlMode,
    ) -> Result<&mut Self> {
        self.check_open()?;
        self.check_nonempty(controls, "control")?;
        self.check_nonempty(targets, "target")?;
        self.check_qudits(&[controls, targets])?;
        self.check_gate_dim(gate, targets.len())?;

        self.operations.push(Operation::controlled(
            gate.clone(),
            controls.to_vec(),
            targets.to_vec(),
            mode,
            self.local_dim,
        ));
        Ok(self)
    }

    /// Appends `gate` on `targets`, applied when `condition` holds for the
    /// values of `slots` at that point of the run.
    ///
    /// Every slot must be clean here: measured earlier in the circuit or
    /// declared with [`Circuit::mark_input_slot`].
    pub fn append_classically_controlled_gate(
        &mut self,
        gate: &Gate,
        slots: &[usize],
        targets: &[usize],
        condition: ClassicalCondition,
    ) -> Result<&mut Self> {
        self.check_open()?;
        self.check_nonempty(slots, "classical slot")?;
        self.check_nonempty(targets, "target")?;
        self.check_qudits(&[targets])?;
        self.check_gate_dim(gate, targets.len())?;

        let mut seen = vec![false; self.num_slots];
        for &s in slots {
            self.check_slot(s)?;
            if seen[s] {
                return Err(QuditError::DuplicateIndex(s));
            }
            seen[s] = true;
        }
        if let ClassicalCondition::Equals(values) = &condition {
            if values.len() != slots.len() {
                return Err(QuditError::DimensionMismatch {
                    expected: slots.len(),
                    found: values.len(),
                });
            }
            if let Some((&slot, &value)) = slots
                .iter()
                .zip(values.iter())
                .find(|(_, &v)| v >= self.local_dim)
            {
                return Err(QuditError::InvalidDitValue {
                    slot,
                    value,
                    dim: self.local_dim,
                });
            }
        }
        if let Some(&slot) = slots.iter().find(|&&s| !self.clean[s]) {
            return Err(QuditError::UncleanClassicalRead { slot });
        }

        self.operations.push(Operation::classically_controlled(
            gate.clone(),
            slots.to_vec(),
            targets.to_vec(),
            condition,
            self.local_dim,
        ));
        Ok(self)
    }

    /// Appends a computational-basis measurement of `target` into `slot`
    pub fn append_measurement(&mut self, target: usize, slot: usize) -> Result<&mut Self> {
        self.push_measurement(target, slot, MeasurementBasis::Computational)
    }

    /// Appends a measurement of `target` in the basis formed by the columns
    /// of `basis`; outcome `k` corresponds to column `k`.
    pub fn append_measurement_in_basis(
        &mut self,
        target: usize,
        slot: usize,
        basis: &Gate,
    ) -> Result<&mut Self> {
        self.check_gate_dim(basis, 1)?;
        self.push_measurement(target, slot, MeasurementBasis::Columns(basis.clone()))
    }

    fn push_measurement(
        &mut self,
        target: usize,
        slot: usize,
        basis: MeasurementBasis,
    ) -> Result<&mut Self> {
        self.check_open()?;
        self.check_qudits(&[std::slice::from_ref(&target)])?;
        self.check_slot(slot)?;

        self.operations.push(Operation::Measure {
            target,
            slot,
            basis,
        });
        self.clean[slot] = true;
        Ok(self)
    }

    /// Declares `slot` as supplied through [`Engine::set_dit`](crate::engine::Engine::set_dit).
    /// From this point on it may be read by classically-controlled gates.
    pub fn mark_input_slot(&mut self, slot: usize) -> Result<&mut Self> {
        self.check_open()?;
        self.check_slot(slot)?;
        self.inputs[slot] = true;
        self.clean[slot] = true;
        Ok(self)
    }

    // =========================================================================
    // Compression
    // =========================================================================

    /// Returns an equivalent, finalized circuit with no more operations.
    ///
    /// See [`compress`](crate::compress) for the rewrite rules.
    pub fn compress(&self, aggressive: bool) -> Circuit {
        self.compress_with_stats(aggressive).0
    }

    pub fn compress_with_stats(&self, aggressive: bool) -> (Circuit, CompressionStats) {
        let (operations, stats) = compress::compress(self, aggressive);
        let circuit = Circuit {
            operations,
            finalized: true,
            ..self.clone()
        };
        (circuit, stats)
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Circuit: {} qudits (d = {}), {} slots, {} ops{}",
            self.num_qudits,
            self.local_dim,
            self.num_slots,
            self.operations.len(),
            if self.finalized { " [finalized]" } else { "" }
        )?;
        for (i, op) in self.operations.iter().enumerate() {
            writeln!(f, "  {:>3}: {}", i, op)?;
        }
        Ok(())
    }
}

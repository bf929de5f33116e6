//! Shot-based execution engine
//!
//! An [`Engine`] binds a finalized circuit and runs it repeatedly. Every shot
//! starts from a private copy of the initial state and of the preset classical
//! register, applies the operations in order and records the final register
//! in an [`OutcomeCounts`] table.
//!
//! Reproducibility: the engine owns one `StdRng`. Before a run it draws one
//! seed per shot, so the counts do not depend on whether shots run
//! sequentially or on the rayon pool.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::circuit::{Circuit, Operation};
use crate::error::{QuditError, Result};
use crate::measurement;
use crate::results::{MeasurementRecord, OutcomeCounts, Register};
use crate::state::QuantumState;

// =============================================================================
// Configuration
// =============================================================================

/// How the simulated state is stored during a shot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Representation {
    /// Pure state vector, `O(D)` memory
    #[default]
    StateVector,
    /// Density matrix, `O(D²)` memory
    DensityMatrix,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Seed of the engine's random generator; `None` draws from entropy
    pub seed: Option<u64>,
    pub representation: Representation,
    /// Run shots on the rayon thread pool
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            representation: Representation::StateVector,
            parallel: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

// =============================================================================
// Single Shot
// =============================================================================

struct Shot {
    register: Register,
    state: QuantumState,
    records: Vec<MeasurementRecord>,
}

/// Read-only view shared by all shots of one run
struct ShotRunner<'a> {
    circuit: &'a Circuit,
    initial: &'a QuantumState,
    preset: &'a [Option<usize>],
}

impl ShotRunner<'_> {
    fn run(&self, seed: u64) -> Result<Shot> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut state = self.initial.clone();
        let mut register = self.preset.to_vec();
        let mut records = Vec::new();

        for (step, op) in self.circuit.operations().iter().enumerate() {
            trace!(step, op = %op, "apply");
            match op {
                Operation::Gate { gate, targets } => state.apply(gate.matrix(), targets)?,
                Operation::Controlled {
                    controls,
                    targets,
                    joint,
                    ..
                } => {
                    let qudits: Vec<usize> = controls.iter().chain(targets).copied().collect();
                    state.apply(joint.matrix(), &qudits)?;
                }
                Operation::ClassicallyControlled {
                    slots,
                    targets,
                    condition,
                    ..
                } => {
                    let values = slots
                        .iter()
                        .map(|&slot| {
                            register
                                .get(slot)
                                .copied()
                                .flatten()
                                .ok_or(QuditError::UncleanClassicalRead { slot })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    let m = condition.exponent(&values);
                    if m > 0 {
                        let gate = op.conditional_gate(m).ok_or(QuditError::InvalidDitValue {
                            slot: slots[0],
                            value: m,
                            dim: self.circuit.local_dim(),
                        })?;
                        state.apply(gate.matrix(), targets)?;
                    }
                }
                Operation::Measure {
                    target,
                    slot,
                    basis,
                } => {
                    let r: f64 = rng.gen();
                    let (outcome, probability) =
                        measurement::measure(&mut state, *target, basis, r)?;
                    register[*slot] = Some(outcome);
                    records.push(MeasurementRecord {
                        step,
                        qudit: *target,
                        slot: *slot,
                        outcome,
                        probability,
                    });
                }
            }
        }

        Ok(Shot {
            register,
            state,
            records,
        })
    }

    fn tally(&self, counts: &mut OutcomeCounts, seed: u64) {
        match self.run(seed) {
            Ok(shot) => counts.record(shot.register),
            Err(err) => {
                warn!(%err, "shot aborted");
                counts.record_failure();
            }
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Runs a bound circuit shot by shot
#[derive(Debug)]
pub struct Engine {
    circuit: Arc<Circuit>,
    config: EngineConfig,
    rng: StdRng,
    /// Values set with `set_dit`, copied into every shot
    preset: Vec<Option<usize>>,
    initial: QuantumState,
    /// State at the end of the last shot, or the initial state before any run
    state: QuantumState,
    records: Vec<MeasurementRecord>,
    counts: OutcomeCounts,
}

impl Engine {
    /// Binds `circuit`, sealing it
    pub fn bind(mut circuit: Circuit) -> Self {
        circuit.seal();
        Self::bind_shared(Arc::new(circuit))
    }

    /// Binds a shared circuit. An open circuit is sealed on a private copy.
    pub fn bind_shared(circuit: Arc<Circuit>) -> Self {
        let circuit = if circuit.is_finalized() {
            circuit
        } else {
            let mut sealed = (*circuit).clone();
            sealed.seal();
            Arc::new(sealed)
        };
        debug!(
            qudits = circuit.num_qudits(),
            dim = circuit.local_dim(),
            slots = circuit.num_slots(),
            ops = circuit.len(),
            "bound circuit"
        );

        let config = EngineConfig::default();
        let initial = QuantumState::zero(&circuit.dims());
        Engine {
            rng: seeded_rng(config.seed),
            config,
            preset: vec![None; circuit.num_slots()],
            state: initial.clone(),
            initial,
            records: Vec::new(),
            counts: OutcomeCounts::new(),
            circuit,
        }
    }

    /// Replaces the configuration and reseeds the generator
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.rng = seeded_rng(config.seed);
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn circuit(&self) -> &Arc<Circuit> {
        &self.circuit
    }

    // =========================================================================
    // Classical Register
    // =========================================================================

    /// Presets classical slot `slot` to `value` for every following run
    pub fn set_dit(&mut self, slot: usize, value: usize) -> Result<()> {
        let num_slots = self.circuit.num_slots();
        if slot >= num_slots {
            return Err(QuditError::slot(slot, num_slots));
        }
        let dim = self.circuit.local_dim();
        if value >= dim {
            return Err(QuditError::InvalidDitValue { slot, value, dim });
        }
        self.preset[slot] = Some(value);
        Ok(())
    }

    /// Removes a preset value
    pub fn clear_dit(&mut self, slot: usize) -> Result<()> {
        let num_slots = self.circuit.num_slots();
        if slot >= num_slots {
            return Err(QuditError::slot(slot, num_slots));
        }
        self.preset[slot] = None;
        Ok(())
    }

    pub fn dit(&self, slot: usize) -> Option<usize> {
        self.preset.get(slot).copied().flatten()
    }

    pub fn dits(&self) -> &[Option<usize>] {
        &self.preset
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Replaces the initial state (`|0…0⟩` by default)
    pub fn set_state(&mut self, state: QuantumState) -> Result<()> {
        let dims = self.circuit.dims();
        if state.dims() != dims.as_slice() {
            let expected = self.circuit.total_dim();
            return Err(if state.dimension() != expected {
                QuditError::DimensionMismatch {
                    expected,
                    found: state.dimension(),
                }
            } else {
                QuditError::DimensionMismatch {
                    expected: dims.len(),
                    found: state.num_subsystems(),
                }
            });
        }
        self.state = state.clone();
        self.initial = state;
        Ok(())
    }

    /// State after the final shot of the last run
    pub fn state(&self) -> &QuantumState {
        &self.state
    }

    /// Measurements performed during the final shot of the last run
    pub fn measurements(&self) -> &[MeasurementRecord] {
        &self.records
    }

    /// Counts of the last run
    pub fn counts(&self) -> &OutcomeCounts {
        &self.counts
    }

    fn prepared_initial(&self) -> QuantumState {
        match self.config.representation {
            Representation::StateVector => self.initial.clone(),
            Representation::DensityMatrix => self.initial.clone().into_density(),
        }
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Runs `shots` independent shots and returns the outcome table.
    ///
    /// Fails before any shot when a declared input slot has not been set.
    /// A shot failing at run time is counted in
    /// [`OutcomeCounts::failed_shots`] without aborting the others.
    #[tracing::instrument(skip(self), fields(qudits = self.circuit.num_qudits(), ops = self.circuit.len()))]
    pub fn execute(&mut self, shots: usize) -> Result<&OutcomeCounts> {
        if let Some(&slot) = self
            .circuit
            .input_slots()
            .iter()
            .find(|&&s| self.preset[s].is_none())
        {
            return Err(QuditError::UncleanClassicalRead { slot });
        }

        let seeds: Vec<u64> = (0..shots).map(|_| self.rng.gen()).collect();
        let initial = self.prepared_initial();
        let runner = ShotRunner {
            circuit: &self.circuit,
            initial: &initial,
            preset: &self.preset,
        };

        let Some((&last, rest)) = seeds.split_last() else {
            self.counts = OutcomeCounts::new();
            return Ok(&self.counts);
        };

        let mut counts = if self.config.parallel {
            rest.par_iter()
                .fold(OutcomeCounts::new, |mut acc, &seed| {
                    runner.tally(&mut acc, seed);
                    acc
                })
                .reduce(OutcomeCounts::new, |mut a, b| {
                    a.merge(b);
                    a
                })
        } else {
            rest.iter().fold(OutcomeCounts::new(), |mut acc, &seed| {
                runner.tally(&mut acc, seed);
                acc
            })
        };

        // The final shot keeps its state and measurement records
        match runner.run(last) {
            Ok(shot) => {
                counts.record(shot.register);
                self.state = shot.state;
                self.records = shot.records;
            }
            Err(err) => {
                warn!(%err, "shot aborted");
                counts.record_failure();
                self.records.clear();
            }
        }

        info!(
            shots,
            failed = counts.failed_shots(),
            distinct = counts.len(),
            "execution finished"
        );
        self.counts = counts;
        Ok(&self.counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ClassicalCondition;
    use crate::gates::{Gate, NamedGate};

    const EPSILON: f64 = 1e-10;

    fn gate(name: NamedGate, d: usize) -> Gate {
        Gate::named(name, d).unwrap()
    }

    fn seeded(circuit: Circuit, seed: u64) -> Engine {
        Engine::bind(circuit).with_config(EngineConfig::new().with_seed(seed))
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new()
            .with_seed(7)
            .with_representation(Representation::DensityMatrix)
            .with_parallel(false);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.representation, Representation::DensityMatrix);
        assert!(!config.parallel);
        assert!(EngineConfig::default().parallel);
    }

    #[test]
    fn test_bind_seals_circuit() {
        let c = Circuit::new(1, 2, 1).unwrap();
        let engine = Engine::bind(c);
        assert!(engine.circuit().is_finalized());

        let shared = Arc::new(Circuit::new(1, 2, 1).unwrap());
        let engine = Engine::bind_shared(shared.clone());
        assert!(engine.circuit().is_finalized());
        assert!(!shared.is_finalized());
    }

    #[test]
    fn test_set_dit_validation() {
        let mut engine = Engine::bind(Circuit::new(1, 3, 2).unwrap());
        assert!(matches!(
            engine.set_dit(2, 0),
            Err(QuditError::OutOfRangeIndex { .. })
        ));
        assert_eq!(
            engine.set_dit(1, 3),
            Err(QuditError::InvalidDitValue {
                slot: 1,
                value: 3,
                dim: 3
            })
        );
        assert_eq!(engine.dits(), &[None, None]);

        engine.set_dit(1, 2).unwrap();
        assert_eq!(engine.dit(1), Some(2));
        engine.clear_dit(1).unwrap();
        assert_eq!(engine.dit(1), None);
    }

    #[test]
    fn test_qutrit_shift_and_measure() {
        let x = gate(NamedGate::X, 3);
        let mut c = Circuit::new(1, 3, 1).unwrap();
        c.append_gate(&x, &[0])
            .unwrap()
            .append_gate(&x, &[0])
            .unwrap()
            .append_measurement(0, 0)
            .unwrap();

        let mut engine = seeded(c, 1);
        let counts = engine.execute(50).unwrap();
        assert_eq!(counts.count(&[2]), 50);

        let records = engine.measurements();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, 2);
        assert!((records[0].probability - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_missing_input_slot_rejected() {
        let x = gate(NamedGate::X, 2);
        let mut c = Circuit::new(1, 2, 1).unwrap();
        c.mark_input_slot(0)
            .unwrap()
            .append_classically_controlled_gate(&x, &[0], &[0], ClassicalCondition::AllNonZero)
            .unwrap()
            .append_measurement(0, 0)
            .unwrap();

        let mut engine = seeded(c, 3);
        assert_eq!(
            engine.execute(10).unwrap_err(),
            QuditError::UncleanClassicalRead { slot: 0 }
        );
        assert_eq!(engine.counts().total_shots(), 0);

        engine.set_dit(0, 1).unwrap();
        assert_eq!(engine.execute(10).unwrap().count(&[1]), 10);

        engine.set_dit(0, 0).unwrap();
        assert_eq!(engine.execute(10).unwrap().count(&[0]), 10);
    }

    #[test]
    fn test_power_condition() {
        // Slot value 2 applies X² on a qutrit
        let x = gate(NamedGate::X, 3);
        let mut c = Circuit::new(1, 3, 2).unwrap();
        c.mark_input_slot(0)
            .unwrap()
            .append_classically_controlled_gate(&x, &[0], &[0], ClassicalCondition::Power)
            .unwrap()
            .append_measurement(0, 1)
            .unwrap();

        let mut engine = seeded(c, 5);
        engine.set_dit(0, 2).unwrap();
        let counts = engine.execute(20).unwrap();
        assert_eq!(counts.count(&[2, 2]), 20);
    }

    #[test]
    fn test_density_representation_matches() {
        let mut c = Circuit::new(2, 2, 2).unwrap();
        c.append_gate(&gate(NamedGate::H, 2), &[0])
            .unwrap()
            .append_gate(&gate(NamedGate::Cx, 2), &[0, 1])
            .unwrap()
            .append_measurement(0, 0)
            .unwrap()
            .append_measurement(1, 1)
            .unwrap();

        let mut vector = seeded(c.clone(), 11);
        let mut density = Engine::bind(c).with_config(
            EngineConfig::new()
                .with_seed(11)
                .with_representation(Representation::DensityMatrix),
        );

        let a = vector.execute(200).unwrap().clone();
        let b = density.execute(200).unwrap();
        assert_eq!(&a, b);
        assert_eq!(a.count(&[0, 1]) + a.count(&[1, 0]), 0);
        assert!(!density.state().is_vector());
        // Collapse leaves a pure density matrix
        assert!(density.state().is_pure());
    }

    #[test]
    fn test_set_state_validation() {
        let mut engine = seeded(Circuit::new(2, 2, 1).unwrap(), 0);
        assert!(matches!(
            engine.set_state(QuantumState::zero(&[3])),
            Err(QuditError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            engine.set_state(QuantumState::zero(&[4])),
            Err(QuditError::DimensionMismatch { .. })
        ));
        engine
            .set_state(QuantumState::basis(&[2, 2], &[1, 0]).unwrap())
            .unwrap();
        assert!((engine.state().probability(2) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_zero_shots() {
        let mut engine = seeded(Circuit::new(1, 2, 1).unwrap(), 0);
        let counts = engine.execute(0).unwrap();
        assert_eq!(counts.total_shots(), 0);
        assert!(counts.is_empty());
    }
}

use qdsim_core::{
    Circuit, ClassicalCondition, ControlMode, Engine, EngineConfig, Gate, NamedGate, QuantumState,
    QuditError, Representation,
};

fn gate(name: NamedGate, d: usize) -> Gate {
    Gate::named(name, d).unwrap()
}

fn seeded(circuit: Circuit, seed: u64) -> Engine {
    Engine::bind(circuit).with_config(EngineConfig::new().with_seed(seed))
}

fn bell_pair() -> Circuit {
    let mut c = Circuit::new(2, 2, 2).unwrap();
    c.append_gate(&gate(NamedGate::H, 2), &[0])
        .unwrap()
        .append_gate(&gate(NamedGate::Cx, 2), &[0, 1])
        .unwrap()
        .append_measurement(0, 0)
        .unwrap()
        .append_measurement(1, 1)
        .unwrap();
    c
}

#[test]
fn test_x_then_cx_measures_one_one() {
    let mut c = Circuit::new(2, 2, 2).unwrap();
    c.append_gate(&gate(NamedGate::X, 2), &[0])
        .unwrap()
        .append_gate(&gate(NamedGate::Cx, 2), &[0, 1])
        .unwrap()
        .append_measurement(0, 0)
        .unwrap()
        .append_measurement(1, 1)
        .unwrap();

    let mut engine = seeded(c, 2024);
    let counts = engine.execute(1000).unwrap();
    assert_eq!(counts.count(&[1, 1]), 1000);
    assert_eq!(counts.len(), 1);
    assert_eq!(counts.failed_shots(), 0);
}

#[test]
fn test_empty_circuit_measures_zero() {
    let mut c = Circuit::new(1, 2, 1).unwrap();
    c.append_measurement(0, 0).unwrap();

    let mut engine = seeded(c, 9);
    let counts = engine.execute(500).unwrap();
    assert_eq!(counts.count(&[0]), 500);
    assert_eq!(counts.total_shots(), 500);
}

#[test]
fn test_unitary_only_circuit_is_deterministic() {
    // No measurement: every shot ends with the register untouched
    let mut c = Circuit::new(2, 3, 2).unwrap();
    c.append_gate(&gate(NamedGate::H, 3), &[0])
        .unwrap()
        .append_gate(&gate(NamedGate::Cx, 3), &[0, 1])
        .unwrap();

    let mut engine = seeded(c, 1);
    let counts = engine.execute(64).unwrap();
    assert_eq!(counts.count_register(&[None, None]), 64);
    assert_eq!(counts.len(), 1);

    // The final state is the qutrit GHZ-like superposition
    let state = engine.state();
    for digit in 0..3 {
        assert!((state.probability(digit * 3 + digit) - 1.0 / 3.0).abs() < 1e-10);
    }
}

#[test]
fn test_same_seed_same_counts() {
    let mut a = seeded(bell_pair(), 77);
    let mut b = seeded(bell_pair(), 77);
    assert_eq!(a.execute(500).unwrap(), b.execute(500).unwrap());

    // Successive runs draw fresh seeds but stay in lockstep
    assert_eq!(a.execute(500).unwrap(), b.execute(500).unwrap());
}

#[test]
fn test_parallel_matches_sequential() {
    let mut parallel = seeded(bell_pair(), 5);
    let mut sequential = Engine::bind(bell_pair())
        .with_config(EngineConfig::new().with_seed(5).with_parallel(false));

    let a = parallel.execute(2000).unwrap().clone();
    let b = sequential.execute(2000).unwrap();
    assert_eq!(&a, b);
    assert_eq!(parallel.measurements(), sequential.measurements());
}

#[test]
fn test_bell_pair_statistics() {
    let mut engine = seeded(bell_pair(), 31);
    let counts = engine.execute(4000).unwrap();

    assert_eq!(counts.count(&[0, 1]) + counts.count(&[1, 0]), 0);
    let p00 = counts.probability(&[0, 0]);
    assert!((p00 - 0.5).abs() < 0.05, "p00 = {}", p00);
}

#[test]
fn test_qubit_teleportation() {
    // Teleport |1⟩ from qudit 0 to qudit 2
    let h = gate(NamedGate::H, 2);
    let x = gate(NamedGate::X, 2);
    let z = gate(NamedGate::Z, 2);
    let cx = gate(NamedGate::Cx, 2);

    let mut c = Circuit::new(3, 2, 3).unwrap();
    c.append_gate(&x, &[0])
        .unwrap()
        .append_gate(&h, &[1])
        .unwrap()
        .append_gate(&cx, &[1, 2])
        .unwrap()
        .append_gate(&cx, &[0, 1])
        .unwrap()
        .append_gate(&h, &[0])
        .unwrap()
        .append_measurement(0, 0)
        .unwrap()
        .append_measurement(1, 1)
        .unwrap()
        .append_classically_controlled_gate(&x, &[1], &[2], ClassicalCondition::AllNonZero)
        .unwrap()
        .append_classically_controlled_gate(&z, &[0], &[2], ClassicalCondition::AllNonZero)
        .unwrap()
        .append_measurement(2, 2)
        .unwrap();

    let mut engine = seeded(c, 123);
    let counts = engine.execute(400).unwrap();
    let teleported: usize = counts
        .iter()
        .filter(|(register, _)| register[2] == Some(1))
        .map(|(_, &count)| count)
        .sum();
    assert_eq!(teleported, 400);
    // All four Bell-measurement outcomes show up
    assert_eq!(counts.len(), 4);
}

#[test]
fn test_qutrit_classical_copy() {
    // Measure a uniform qutrit, then copy the outcome with X^m
    let mut c = Circuit::new(2, 3, 2).unwrap();
    c.append_gate(&gate(NamedGate::H, 3), &[0])
        .unwrap()
        .append_measurement(0, 0)
        .unwrap()
        .append_classically_controlled_gate(
            &gate(NamedGate::X, 3),
            &[0],
            &[1],
            ClassicalCondition::Power,
        )
        .unwrap()
        .append_measurement(1, 1)
        .unwrap();

    let mut engine = seeded(c, 8);
    let counts = engine.execute(900).unwrap();
    let diagonal: usize = (0..3).map(|m| counts.count(&[m, m])).sum();
    assert_eq!(diagonal, 900);
    for m in 0..3 {
        assert!(counts.count(&[m, m]) > 200);
    }
}

#[test]
fn test_power_controlled_gate() {
    // Control in |2⟩ applies X² to the target
    let x = gate(NamedGate::X, 3);
    let mut c = Circuit::new(2, 3, 1).unwrap();
    c.append_gate(&x, &[0])
        .unwrap()
        .append_gate(&x, &[0])
        .unwrap()
        .append_controlled_gate_with(&x, &[0], &[1], ControlMode::Power)
        .unwrap()
        .append_measurement(1, 0)
        .unwrap();

    let mut engine = seeded(c.clone(), 0);
    assert_eq!(engine.execute(20).unwrap().count(&[2]), 20);

    // NonZero mode applies X once
    let mut nonzero = Circuit::new(2, 3, 1).unwrap();
    nonzero
        .append_gate(&x, &[0])
        .unwrap()
        .append_gate(&x, &[0])
        .unwrap()
        .append_controlled_gate(&x, &[0], &[1])
        .unwrap()
        .append_measurement(1, 0)
        .unwrap();
    let mut engine = seeded(nonzero, 0);
    assert_eq!(engine.execute(20).unwrap().count(&[1]), 20);
}

#[test]
fn test_custom_initial_state() {
    let mut c = Circuit::new(2, 2, 2).unwrap();
    c.append_measurement(0, 0)
        .unwrap()
        .append_measurement(1, 1)
        .unwrap();

    let mut engine = seeded(c, 4);
    engine
        .set_state(QuantumState::basis(&[2, 2], &[1, 0]).unwrap())
        .unwrap();
    assert_eq!(engine.execute(10).unwrap().count(&[1, 0]), 10);
}

#[test]
fn test_mixed_initial_state_uses_density_path() {
    let mut c = Circuit::new(1, 2, 1).unwrap();
    c.append_measurement(0, 0).unwrap();

    let rho = ndarray::Array2::from_diag(&ndarray::Array1::from(vec![
        num_complex::Complex64::new(0.5, 0.0),
        num_complex::Complex64::new(0.5, 0.0),
    ]));
    let mut engine = seeded(c, 17);
    engine
        .set_state(QuantumState::from_density(rho, &[2]).unwrap())
        .unwrap();

    let counts = engine.execute(2000).unwrap();
    let p0 = counts.probability(&[0]);
    assert!((p0 - 0.5).abs() < 0.05, "p0 = {}", p0);
    assert!(!engine.state().is_vector());
    assert!(engine.state().is_pure());
    assert!((engine.state().purity() - 1.0).abs() < 1e-10);
}

#[test]
fn test_density_matrix_representation() {
    let mut vector = seeded(bell_pair(), 99);
    let mut density = Engine::bind(bell_pair()).with_config(
        EngineConfig::new()
            .with_seed(99)
            .with_representation(Representation::DensityMatrix),
    );

    let a = vector.execute(300).unwrap().clone();
    assert_eq!(&a, density.execute(300).unwrap());
}

#[test]
fn test_missing_input_fails_before_any_shot() {
    let mut c = Circuit::new(1, 2, 2).unwrap();
    c.mark_input_slot(1)
        .unwrap()
        .append_classically_controlled_gate(
            &gate(NamedGate::X, 2),
            &[1],
            &[0],
            ClassicalCondition::AllNonZero,
        )
        .unwrap()
        .append_measurement(0, 0)
        .unwrap();

    let mut engine = seeded(c, 0);
    assert_eq!(
        engine.execute(5).unwrap_err(),
        QuditError::UncleanClassicalRead { slot: 1 }
    );

    engine.set_dit(1, 1).unwrap();
    let counts = engine.execute(5).unwrap();
    // Preset values are part of the final register
    assert_eq!(counts.count(&[1, 1]), 5);
}

#[test]
fn test_measurement_records_of_last_shot() {
    let mut engine = seeded(bell_pair(), 3);
    engine.execute(10).unwrap();

    let records = engine.measurements();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].qudit, 0);
    assert_eq!(records[0].step, 2);
    assert_eq!(records[1].slot, 1);
    assert_eq!(records[0].outcome, records[1].outcome);
    assert!((records[0].probability - 0.5).abs() < 1e-10);
    assert!((records[1].probability - 1.0).abs() < 1e-10);
}

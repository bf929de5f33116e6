//! Gate registry
//!
//! Named qudit gates are generated for any local dimension `d ≥ 2`; a few
//! qubit gates (Y, S, T) exist only for `d = 2`. User matrices enter through
//! [`Gate::custom`], which checks unitarity. Every [`Gate`] carries its
//! resolved dense matrix, so execution never looks a gate up by name.

use std::f64::consts::{FRAC_PI_4, PI};
use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use num_complex::Complex64;

use crate::error::{QuditError, Result};
use crate::tensor::{self, IDENTITY_TOLERANCE, UNITARY_TOLERANCE};

/// Registry of built-in gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedGate {
    /// Identity
    Id,
    /// Shift: |k⟩ → |k+1 mod d⟩ (Pauli-X for qubits)
    X,
    /// Pauli-Y (qubit only)
    Y,
    /// Clock: |k⟩ → ω^k |k⟩ (Pauli-Z for qubits)
    Z,
    /// Quantum Fourier transform on one qudit (Hadamard for qubits)
    H,
    /// Phase gate diag(1, i) (qubit only)
    S,
    /// π/8 gate diag(1, e^{iπ/4}) (qubit only)
    T,
    /// Controlled shift: |a, b⟩ → |a, a + b mod d⟩ (CNOT for qubits)
    Cx,
    /// Controlled clock: |a, b⟩ → ω^{ab} |a, b⟩
    Cz,
    /// |a, b⟩ → |b, a⟩
    Swap,
}

impl NamedGate {
    pub const ALL: [NamedGate; 10] = [
        NamedGate::Id,
        NamedGate::X,
        NamedGate::Y,
        NamedGate::Z,
        NamedGate::H,
        NamedGate::S,
        NamedGate::T,
        NamedGate::Cx,
        NamedGate::Cz,
        NamedGate::Swap,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NamedGate::Id => "id",
            NamedGate::X => "x",
            NamedGate::Y => "y",
            NamedGate::Z => "z",
            NamedGate::H => "h",
            NamedGate::S => "s",
            NamedGate::T => "t",
            NamedGate::Cx => "cx",
            NamedGate::Cz => "cz",
            NamedGate::Swap => "swap",
        }
    }

    /// Number of qudits the gate acts on
    pub fn arity(&self) -> usize {
        match self {
            NamedGate::Cx | NamedGate::Cz | NamedGate::Swap => 2,
            _ => 1,
        }
    }

    pub fn is_qubit_only(&self) -> bool {
        matches!(self, NamedGate::Y | NamedGate::S | NamedGate::T)
    }

    /// Builds the gate matrix for local dimension `d`
    pub fn matrix(&self, d: usize) -> Result<Array2<Complex64>> {
        if d < 2 {
            return Err(QuditError::InvalidRegisterSize(format!(
                "local dimension {} < 2",
                d
            )));
        }
        if self.is_qubit_only() && d != 2 {
            return Err(QuditError::DimensionMismatch {
                expected: 2,
                found: d,
            });
        }

        let one = Complex64::new(1.0, 0.0);
        let m = match self {
            NamedGate::Id => tensor::identity(d),
            NamedGate::X => {
                let mut m = Array2::zeros((d, d));
                for k in 0..d {
                    m[[(k + 1) % d, k]] = one;
                }
                m
            }
            NamedGate::Y => ndarray::array![
                [Complex64::new(0.0, 0.0), Complex64::new(0.0, -1.0)],
                [Complex64::new(0.0, 1.0), Complex64::new(0.0, 0.0)]
            ],
            NamedGate::Z => Array2::from_shape_fn((d, d), |(i, j)| {
                if i == j {
                    root_of_unity(d, i)
                } else {
                    Complex64::new(0.0, 0.0)
                }
            }),
            NamedGate::H => {
                let norm = 1.0 / (d as f64).sqrt();
                Array2::from_shape_fn((d, d), |(j, k)| root_of_unity(d, j * k) * norm)
            }
            NamedGate::S => ndarray::array![
                [one, Complex64::new(0.0, 0.0)],
                [Complex64::new(0.0, 0.0), Complex64::new(0.0, 1.0)]
            ],
            NamedGate::T => ndarray::array![
                [one, Complex64::new(0.0, 0.0)],
                [Complex64::new(0.0, 0.0), Complex64::from_polar(1.0, FRAC_PI_4)]
            ],
            NamedGate::Cx => {
                let mut m = Array2::zeros((d * d, d * d));
                for a in 0..d {
                    for b in 0..d {
                        m[[a * d + (a + b) % d, a * d + b]] = one;
                    }
                }
                m
            }
            NamedGate::Cz => Array2::from_shape_fn((d * d, d * d), |(i, j)| {
                if i == j {
                    root_of_unity(d, (i / d) * (i % d))
                } else {
                    Complex64::new(0.0, 0.0)
                }
            }),
            NamedGate::Swap => {
                let mut m = Array2::zeros((d * d, d * d));
                for a in 0..d {
                    for b in 0..d {
                        m[[b * d + a, a * d + b]] = one;
                    }
                }
                m
            }
        };
        Ok(m)
    }
}

impl fmt::Display for NamedGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for NamedGate {
    type Err = QuditError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        NamedGate::ALL
            .iter()
            .find(|g| g.name() == lower)
            .copied()
            .or(match lower.as_str() {
                "cnot" => Some(NamedGate::Cx),
                "i" => Some(NamedGate::Id),
                "fourier" => Some(NamedGate::H),
                _ => None,
            })
            .ok_or_else(|| QuditError::UnknownGate(s.to_string()))
    }
}

/// ω^k with ω = e^{2πi/d}
fn root_of_unity(d: usize, k: usize) -> Complex64 {
    Complex64::from_polar(1.0, 2.0 * PI * ((k % d) as f64) / d as f64)
}

/// How quantum control qudits select the power of the target operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlMode {
    /// Apply `U` when every control qudit is non-zero
    #[default]
    NonZero,
    /// Apply `U^m` when every control qudit holds the same value `m`
    Power,
}

impl ControlMode {
    /// Power of the target operator for the given control basis state
    pub fn exponent(&self, controls: &[usize]) -> usize {
        match self {
            ControlMode::NonZero => usize::from(controls.iter().all(|&c| c != 0)),
            ControlMode::Power => match controls.split_first() {
                Some((&m, rest)) if rest.iter().all(|&c| c == m) => m,
                _ => 0,
            },
        }
    }
}

/// Where a gate's matrix came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSource {
    Named(NamedGate),
    Custom,
    /// Product, power or adjoint of other gates
    Derived,
}

/// A dense operator tagged with the dimension it acts on
#[derive(Debug, Clone, PartialEq)]
pub struct Gate {
    label: String,
    source: GateSource,
    matrix: Array2<Complex64>,
}

impl Gate {
    /// Registry gate for local dimension `d`
    pub fn named(name: NamedGate, d: usize) -> Result<Self> {
        Ok(Gate {
            label: name.name().to_string(),
            source: GateSource::Named(name),
            matrix: name.matrix(d)?,
        })
    }

    /// Registry gate looked up by name (`"x"`, `"cnot"`, ...)
    pub fn by_name(name: &str, d: usize) -> Result<Self> {
        Gate::named(name.parse()?, d)
    }

    /// User-supplied gate; the matrix must be square and unitary
    pub fn custom(label: impl Into<String>, matrix: Array2<Complex64>) -> Result<Self> {
        let label = label.into();
        if matrix.nrows() != matrix.ncols() {
            return Err(QuditError::DimensionMismatch {
                expected: matrix.nrows(),
                found: matrix.ncols(),
            });
        }
        if !tensor::is_unitary(&matrix, UNITARY_TOLERANCE) {
            return Err(QuditError::NonUnitaryOperator(label));
        }
        Ok(Gate {
            label,
            source: GateSource::Custom,
            matrix,
        })
    }

    pub(crate) fn derived(label: String, matrix: Array2<Complex64>) -> Self {
        Gate {
            label,
            source: GateSource::Derived,
            matrix,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> GateSource {
        self.source
    }

    pub fn matrix(&self) -> &Array2<Complex64> {
        &self.matrix
    }

    /// Dimension of the space the gate acts on
    pub fn dim(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn is_identity(&self) -> bool {
        tensor::is_identity(&self.matrix, IDENTITY_TOLERANCE)
    }

    /// `self` followed by `next`, i.e. the matrix `next · self`
    pub fn then(&self, next: &Gate) -> Result<Gate> {
        if self.dim() != next.dim() {
            return Err(QuditError::DimensionMismatch {
                expected: self.dim(),
                found: next.dim(),
            });
        }
        Ok(Gate::derived(
            format!("{}*{}", next.label, self.label),
            next.matrix.dot(&self.matrix),
        ))
    }

    pub fn power(&self, k: usize) -> Gate {
        Gate::derived(
            format!("{}^{}", self.label, k),
            tensor::matrix_power(&self.matrix, k),
        )
    }

    pub fn adjoint(&self) -> Gate {
        Gate::derived(format!("{}†", self.label), tensor::adjoint(&self.matrix))
    }

    /// Block-diagonal controlled operator on `num_controls` qudits of
    /// dimension `d` followed by this gate's targets.
    ///
    /// Block `c` (control basis state, first control most significant) holds
    /// `U^mode.exponent(c)`; blocks with exponent 0 are the identity.
    ///
    /// # Cost
    ///
    /// The result is dense with `d^(c+t)` rows for `c` controls and `t`
    /// target qudits, so it takes `d^(2(c+t))` entries, built once per
    /// append. At most `d` distinct powers of `U` are computed. Applying it
    /// to an `N`-qudit state vector costs `O(d^N · d^(c+t))`.
    pub fn controlled(&self, num_controls: usize, d: usize, mode: ControlMode) -> Gate {
        let dt = self.dim();
        let dc = d.pow(num_controls as u32);
        let mut joint = Array2::zeros((dc * dt, dc * dt));
        let mut powers: Vec<Option<Array2<Complex64>>> = vec![None; d];
        let mut digits = vec![0usize; num_controls];

        for c in 0..dc {
            let mut rem = c;
            for digit in digits.iter_mut().rev() {
                *digit = rem % d;
                rem /= d;
            }
            let e = mode.exponent(&digits);
            let block =
                powers[e].get_or_insert_with(|| tensor::matrix_power(&self.matrix, e));
            joint
                .slice_mut(ndarray::s![c * dt..(c + 1) * dt, c * dt..(c + 1) * dt])
                .assign(block);
        }

        Gate::derived(format!("c{}{}", num_controls, self.label), joint)
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.label, self.dim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_all_named_gates_unitary() {
        for d in 2..=4 {
            for g in NamedGate::ALL {
                if g.is_qubit_only() && d != 2 {
                    continue;
                }
                let m = g.matrix(d).unwrap();
                assert_eq!(m.nrows(), d.pow(g.arity() as u32), "{} d={}", g, d);
                assert!(tensor::is_unitary(&m, EPSILON), "{} d={}", g, d);
            }
        }
    }

    #[test]
    fn test_qubit_gates_match_pauli() {
        let h = Gate::named(NamedGate::H, 2).unwrap();
        let v = std::f64::consts::FRAC_1_SQRT_2;
        assert!((h.matrix()[[1, 1]] - Complex64::new(-v, 0.0)).norm() < EPSILON);

        let z = Gate::named(NamedGate::Z, 2).unwrap();
        assert!((z.matrix()[[1, 1]] - Complex64::new(-1.0, 0.0)).norm() < EPSILON);

        // Y = iXZ
        let x = NamedGate::X.matrix(2).unwrap();
        let y = NamedGate::Y.matrix(2).unwrap();
        let ixz = x.dot(z.matrix()).mapv(|c| c * Complex64::new(0.0, 1.0));
        for (a, b) in y.iter().zip(ixz.iter()) {
            assert!((a - b).norm() < EPSILON);
        }
    }

    #[test]
    fn test_shift_power_is_identity() {
        let x = Gate::named(NamedGate::X, 3).unwrap();
        assert!(!x.power(2).is_identity());
        assert!(x.power(3).is_identity());
        assert!(x.then(&x.adjoint()).unwrap().is_identity());
    }

    #[test]
    fn test_controlled_shift_qutrit() {
        let cx = NamedGate::Cx.matrix(3).unwrap();
        // |1, 2⟩ (index 5) → |1, 0⟩ (index 3)
        assert!((cx[[3, 5]] - Complex64::new(1.0, 0.0)).norm() < EPSILON);
        // |0, 2⟩ unchanged
        assert!((cx[[2, 2]] - Complex64::new(1.0, 0.0)).norm() < EPSILON);
    }

    #[test]
    fn test_qubit_only_rejected() {
        let err = Gate::named(NamedGate::T, 3).unwrap_err();
        assert_eq!(
            err,
            QuditError::DimensionMismatch {
                expected: 2,
                found: 3
            }
        );
        assert!(matches!(
            Gate::named(NamedGate::X, 1),
            Err(QuditError::InvalidRegisterSize(_))
        ));
    }

    #[test]
    fn test_custom_gate_validation() {
        let ok = Gate::custom("swap", NamedGate::Swap.matrix(2).unwrap()).unwrap();
        assert_eq!(ok.dim(), 4);
        assert_eq!(ok.source(), GateSource::Custom);

        let scaled = NamedGate::X.matrix(2).unwrap().mapv(|c| c * 2.0);
        assert_eq!(
            Gate::custom("2x", scaled).unwrap_err(),
            QuditError::NonUnitaryOperator("2x".into())
        );

        let rect = Array2::<Complex64>::zeros((2, 3));
        assert!(matches!(
            Gate::custom("rect", rect),
            Err(QuditError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_control_exponent() {
        assert_eq!(ControlMode::NonZero.exponent(&[1, 2]), 1);
        assert_eq!(ControlMode::NonZero.exponent(&[1, 0]), 0);
        assert_eq!(ControlMode::Power.exponent(&[2, 2]), 2);
        assert_eq!(ControlMode::Power.exponent(&[2, 1]), 0);
        assert_eq!(ControlMode::Power.exponent(&[0]), 0);
    }

    #[test]
    fn test_controlled_x_is_cnot() {
        let x = Gate::named(NamedGate::X, 2).unwrap();
        let cx = x.controlled(1, 2, ControlMode::NonZero);
        let cnot = NamedGate::Cx.matrix(2).unwrap();
        for (a, b) in cx.matrix().iter().zip(cnot.iter()) {
            assert!((a - b).norm() < EPSILON);
        }
    }

    #[test]
    fn test_controlled_power_matches_cx() {
        // With Power mode a single control reproduces the qudit controlled shift
        let x = Gate::named(NamedGate::X, 3).unwrap();
        let joint = x.controlled(1, 3, ControlMode::Power);
        let cx = NamedGate::Cx.matrix(3).unwrap();
        for (a, b) in joint.matrix().iter().zip(cx.iter()) {
            assert!((a - b).norm() < EPSILON);
        }
        assert!(tensor::is_unitary(joint.matrix(), EPSILON));
    }

    #[test]
    fn test_controlled_block_layout() {
        // Two qutrit controls: only blocks with both controls non-zero carry Z
        let z = Gate::named(NamedGate::Z, 3).unwrap();
        let joint = z.controlled(2, 3, ControlMode::NonZero);
        assert_eq!(joint.dim(), 27);

        for c in 0..9 {
            let (c0, c1) = (c / 3, c % 3);
            let block = joint
                .matrix()
                .slice(ndarray::s![c * 3..(c + 1) * 3, c * 3..(c + 1) * 3])
                .to_owned();
            if c0 != 0 && c1 != 0 {
                for (a, b) in block.iter().zip(z.matrix().iter()) {
                    assert!((a - b).norm() < EPSILON);
                }
            } else {
                assert!(tensor::is_identity(&block, EPSILON));
            }
        }
        // Off-diagonal blocks stay empty
        assert_eq!(joint.matrix()[[0, 3]], Complex64::new(0.0, 0.0));
        assert!(tensor::is_unitary(joint.matrix(), EPSILON));
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!("CNOT".parse::<NamedGate>().unwrap(), NamedGate::Cx);
        assert_eq!("swap".parse::<NamedGate>().unwrap(), NamedGate::Swap);
        assert_eq!(
            Gate::by_name("toffoli", 2).unwrap_err(),
            QuditError::UnknownGate("toffoli".into())
        );
        assert_eq!(Gate::by_name("h", 5).unwrap().dim(), 5);
    }
}

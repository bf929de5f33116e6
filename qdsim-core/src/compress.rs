//! Circuit compression
//!
//! Operations are streamed left-to-right into an output buffer. Each incoming
//! operation looks for a merge partner already in the buffer:
//!
//! - baseline: only the immediately preceding operation is considered, and
//!   only plain gates on the same target set merge;
//! - aggressive: the partner is the last buffered operation sharing a qudit
//!   or a classical slot with the incoming one. Everything after it acts on
//!   disjoint resources and commutes, so the merged operator can sit at the
//!   partner's position. Controlled chains with identical controls and
//!   targets merge too, as do classically-controlled chains on the same slots.
//!
//! Operations whose operator is the identity are dropped in both modes.
//! Measurements are never merged or moved, and any operation sharing a qudit
//! or slot with the incoming one is a fence, so measurement-then-classical
//! control order is preserved. Passes repeat until nothing changes.

use tracing::debug;

use crate::circuit::{Circuit, ClassicalCondition, Operation};
use crate::gates::{ControlMode, Gate};
use crate::tensor;

/// Statistics reported after compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressionStats {
    pub ops_before: usize,
    pub ops_after: usize,
    /// Pairs of operations fused into one
    pub merged: usize,
    /// Identity operations removed, including fused products equal to identity
    pub dropped: usize,
    /// Passes needed to reach the fixed point
    pub passes: usize,
}

impl CompressionStats {
    /// Fraction of operations eliminated (0.0 – 1.0)
    pub fn reduction_ratio(&self) -> f64 {
        if self.ops_before == 0 {
            return 0.0;
        }
        (self.ops_before - self.ops_after) as f64 / self.ops_before as f64
    }
}

pub(crate) fn compress(circuit: &Circuit, aggressive: bool) -> (Vec<Operation>, CompressionStats) {
    let d = circuit.local_dim();
    let mut stats = CompressionStats {
        ops_before: circuit.len(),
        ..Default::default()
    };

    let mut current = circuit.operations().to_vec();
    loop {
        let (next, merged, dropped) = run_pass(&current, aggressive, d);
        stats.passes += 1;
        stats.merged += merged;
        stats.dropped += dropped;
        current = next;
        if merged + dropped == 0 {
            break;
        }
    }
    stats.ops_after = current.len();

    debug!(
        aggressive,
        ops_before = stats.ops_before,
        ops_after = stats.ops_after,
        merged = stats.merged,
        dropped = stats.dropped,
        passes = stats.passes,
        "compressed circuit"
    );
    (current, stats)
}

fn run_pass(ops: &[Operation], aggressive: bool, d: usize) -> (Vec<Operation>, usize, usize) {
    let mut out: Vec<Operation> = Vec::with_capacity(ops.len());
    let mut merged = 0usize;
    let mut dropped = 0usize;

    for op in ops {
        if op.is_identity() {
            dropped += 1;
            continue;
        }

        let partner = if aggressive {
            out.iter().rposition(|prev| prev.conflicts_with(op))
        } else {
            out.len().checked_sub(1)
        };

        if let Some(pos) = partner {
            if let Some(fused) = try_merge(&out[pos], op, aggressive, d) {
                merged += 1;
                if fused.is_identity() {
                    out.remove(pos);
                    dropped += 1;
                } else {
                    out[pos] = fused;
                }
                continue;
            }
        }

        out.push(op.clone());
    }

    (out, merged, dropped)
}

/// Fuses `next` into `prev` when both act as one operator on the same
/// resources. `prev` runs first.
fn try_merge(prev: &Operation, next: &Operation, aggressive: bool, d: usize) -> Option<Operation> {
    match (prev, next) {
        (
            Operation::Gate {
                gate: g1,
                targets: t1,
            },
            Operation::Gate {
                gate: g2,
                targets: t2,
            },
        ) => {
            let aligned = align_targets(g2, t2, t1, d)?;
            Some(Operation::Gate {
                gate: g1.then(&aligned).ok()?,
                targets: t1.clone(),
            })
        }
        (
            Operation::Controlled {
                gate: g1,
                controls: c1,
                targets: t1,
                mode: ControlMode::NonZero,
                ..
            },
            Operation::Controlled {
                gate: g2,
                controls: c2,
                targets: t2,
                mode: ControlMode::NonZero,
                ..
            },
        ) if aggressive && c1 == c2 && t1 == t2 => Some(Operation::controlled(
            g1.then(g2).ok()?,
            c1.clone(),
            t1.clone(),
            ControlMode::NonZero,
            d,
        )),
        (
            Operation::ClassicallyControlled {
                gate: g1,
                slots: s1,
                targets: t1,
                condition: cond1,
                ..
            },
            Operation::ClassicallyControlled {
                gate: g2,
                slots: s2,
                targets: t2,
                condition: cond2,
                ..
            },
        ) if aggressive
            && s1 == s2
            && t1 == t2
            && cond1 == cond2
            && *cond1 != ClassicalCondition::Power =>
        {
            Some(Operation::classically_controlled(
                g1.then(g2).ok()?,
                s1.clone(),
                t1.clone(),
                cond1.clone(),
                d,
            ))
        }
        _ => None,
    }
}

/// Re-expresses `gate` (acting on `from`) on the target order `to`.
/// `None` when the two lists are not the same set.
fn align_targets(gate: &Gate, from: &[usize], to: &[usize], d: usize) -> Option<Gate> {
    if from == to {
        return Some(gate.clone());
    }
    if from.len() != to.len() {
        return None;
    }
    // Position i of the new layout holds qudit to[i], found at from[perm[i]]
    let perm: Vec<usize> = to
        .iter()
        .map(|q| from.iter().position(|f| f == q))
        .collect::<Option<_>>()?;
    let dims = vec![d; from.len()];
    let matrix = tensor::permute_subsystems(gate.matrix(), &perm, &dims).ok()?;
    Some(Gate::derived(gate.label().to_string(), matrix))
}

//! Shot results
//!
//! [`OutcomeCounts`] is the frequency table produced by
//! [`Engine::execute`](crate::engine::Engine::execute): one entry per distinct
//! final classical register. Unset slots appear as `None`.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Final contents of the classical register after one shot
pub type Register = Vec<Option<usize>>;

/// Frequency table of final classical registers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutcomeCounts {
    counts: FxHashMap<Register, usize>,
    total_shots: usize,
    failed_shots: usize,
}

impl OutcomeCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed shot
    pub fn record(&mut self, register: Register) {
        *self.counts.entry(register).or_insert(0) += 1;
        self.total_shots += 1;
    }

    /// Records one aborted shot
    pub fn record_failure(&mut self) {
        self.total_shots += 1;
        self.failed_shots += 1;
    }

    /// Adds every entry of `other`; used to combine per-worker tables
    pub fn merge(&mut self, other: OutcomeCounts) {
        for (register, count) in other.counts {
            *self.counts.entry(register).or_insert(0) += count;
        }
        self.total_shots += other.total_shots;
        self.failed_shots += other.failed_shots;
    }

    /// Shots requested, including failed ones
    pub fn total_shots(&self) -> usize {
        self.total_shots
    }

    pub fn failed_shots(&self) -> usize {
        self.failed_shots
    }

    pub fn completed_shots(&self) -> usize {
        self.total_shots - self.failed_shots
    }

    /// Number of distinct registers observed
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count for a fully-written register
    pub fn count(&self, values: &[usize]) -> usize {
        let key: Register = values.iter().copied().map(Some).collect();
        self.count_register(&key)
    }

    /// Count for a register that may contain unset slots
    pub fn count_register(&self, register: &[Option<usize>]) -> usize {
        self.counts.get(register).copied().unwrap_or(0)
    }

    /// Relative frequency among completed shots
    pub fn probability(&self, values: &[usize]) -> f64 {
        let completed = self.completed_shots();
        if completed == 0 {
            return 0.0;
        }
        self.count(values) as f64 / completed as f64
    }

    /// Most frequent register; ties go to the smallest register
    pub fn most_frequent(&self) -> Option<(&[Option<usize>], usize)> {
        self.counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(register, &count)| (register.as_slice(), count))
    }

    /// All entries, most frequent first, ties in register order
    pub fn sorted(&self) -> Vec<(Register, usize)> {
        let mut outcomes: Vec<_> = self
            .counts
            .iter()
            .map(|(register, &count)| (register.clone(), count))
            .collect();
        outcomes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        outcomes
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Register, &usize)> {
        self.counts.iter()
    }
}

fn format_register(register: &[Option<usize>]) -> String {
    let digits: Vec<String> = register
        .iter()
        .map(|v| v.map_or_else(|| "-".to_string(), |d| d.to_string()))
        .collect();
    format!("({})", digits.join(", "))
}

impl fmt::Display for OutcomeCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "OutcomeCounts: {} shots ({} failed), {} distinct",
            self.total_shots,
            self.failed_shots,
            self.counts.len()
        )?;
        let completed = self.completed_shots().max(1) as f64;
        for (register, count) in self.sorted() {
            writeln!(
                f,
                "  {}: {} ({:.2}%)",
                format_register(&register),
                count,
                count as f64 / completed * 100.0
            )?;
        }
        Ok(())
    }
}

#[derive(serde::Serialize)]
struct OutcomeEntry<'a> {
    register: &'a [Option<usize>],
    count: usize,
}

// Register keys are sequences, so the table serializes as a sorted list
impl Serialize for OutcomeCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let sorted = self.sorted();
        let outcomes: Vec<OutcomeEntry<'_>> = sorted
            .iter()
            .map(|(register, count)| OutcomeEntry {
                register,
                count: *count,
            })
            .collect();

        let mut s = serializer.serialize_struct("OutcomeCounts", 3)?;
        s.serialize_field("total_shots", &self.total_shots)?;
        s.serialize_field("failed_shots", &self.failed_shots)?;
        s.serialize_field("outcomes", &outcomes)?;
        s.end()
    }
}

/// One measurement performed during the last shot of a run
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct MeasurementRecord {
    /// Position of the measurement in the operation sequence
    pub step: usize,
    pub qudit: usize,
    pub slot: usize,
    pub outcome: usize,
    /// Probability of `outcome` just before collapse
    pub probability: f64,
}

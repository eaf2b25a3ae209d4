//! Accumulator store.
//!
//! RULE: Only the store owns accumulator matrices.
//! Counters and trackers call store methods. They never keep matrices
//! of their own, so one `init_all` resets every measure at once.

use crate::{
    matrix::{Matrix, MeasureMatrix},
    measure_type::MeasureType,
};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct MatrixStore {
    matrices: BTreeMap<MeasureType, MeasureMatrix>,
}

impl MatrixStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the accumulator for `measure`. Sizes never change afterwards.
    pub fn create(&mut self, measure: MeasureType, rows: usize, cols: usize, sliding: bool) {
        let matrix = if sliding {
            MeasureMatrix::sliding(rows, cols, measure.op())
        } else {
            MeasureMatrix::new(rows, cols, measure.op())
        };
        self.matrices.insert(measure, matrix);
    }

    pub fn contains(&self, measure: MeasureType) -> bool {
        self.matrices.contains_key(&measure)
    }

    pub fn measures(&self) -> impl Iterator<Item = MeasureType> + '_ {
        self.matrices.keys().copied()
    }

    /// Fold `value` into a cell. Measures that were not requested are skipped.
    pub fn add(&mut self, measure: MeasureType, row: usize, col: usize, value: f64) {
        if let Some(m) = self.matrices.get_mut(&measure) {
            m.add(row, col, value);
        }
    }

    pub fn get(&self, measure: MeasureType) -> Option<&MeasureMatrix> {
        self.matrices.get(&measure)
    }

    pub fn init_all(&mut self) {
        for m in self.matrices.values_mut() {
            m.init();
        }
    }

    /// Sliding mode: discard the oldest column of every accumulator.
    pub fn roll_all(&mut self) {
        for m in self.matrices.values_mut() {
            m.roll();
        }
    }

    pub fn snapshot(&self, measure: MeasureType) -> Option<Matrix> {
        self.get(measure).map(MeasureMatrix::to_matrix)
    }
}

//! Time integrals of piecewise-constant quantities (busy agents, staffing,
//! queue sizes). Each subject holds its latest value; the value times the
//! elapsed time is folded into the active column whenever the value changes
//! or the manager closes a period.

use crate::{measure_type::MeasureType, store::MatrixStore, types::SimTime};

#[derive(Debug, Clone)]
pub struct TimeIntegral {
    measure: MeasureType,
    current: Vec<f64>,
    last_time: SimTime,
    column: Option<usize>,
}

impl TimeIntegral {
    pub fn new(measure: MeasureType, subjects: usize) -> Self {
        Self {
            measure,
            current: vec![0.0; subjects],
            last_time: 0.0,
            column: None,
        }
    }

    pub fn measure(&self) -> MeasureType {
        self.measure
    }

    pub fn current(&self, subject: usize) -> f64 {
        self.current.get(subject).copied().unwrap_or(0.0)
    }

    /// Integrate every subject's value over `[last_time, to)`.
    pub fn accumulate(&mut self, to: SimTime, store: &mut MatrixStore) {
        let dt = to - self.last_time;
        if dt <= 0.0 {
            return;
        }
        if let Some(col) = self.column {
            for (s, &v) in self.current.iter().enumerate() {
                if v != 0.0 {
                    store.add(self.measure, s, col, v * dt);
                }
            }
        }
        self.last_time = to;
    }

    /// Record a new value for `subject` at `time`.
    pub fn set(&mut self, subject: usize, value: f64, time: SimTime, store: &mut MatrixStore) {
        if subject >= self.current.len() {
            log::warn!(
                "{}: subject {subject} out of range 0..{}",
                self.measure,
                self.current.len()
            );
            return;
        }
        self.accumulate(time, store);
        self.current[subject] = value;
    }

    /// Switch to another column. The caller accumulates up to `time` first.
    pub fn start_column(&mut self, column: Option<usize>, time: SimTime) {
        self.column = column;
        self.last_time = self.last_time.max(time);
    }

    pub fn reset(&mut self, time: SimTime) {
        self.current.iter_mut().for_each(|v| *v = 0.0);
        self.column = None;
        self.last_time = time;
    }
}

//! Statistics-facing column strategies.
//!
//! A strategy extends period assignment with what the measure manager
//! needs to turn raw accumulator columns into the columns observed by the
//! statistic builders: main simulation (one column per main period, then
//! period segments and a total) and sliding window (one column, "now").

use crate::{
    matrix::{CombineOp, Matrix, MeasureMatrix},
    period::{MainPeriods, SlidingWindows, StatPeriod, SteadyStatePeriod},
    types::SimTime,
};

pub trait MeasureStrategy: StatPeriod {
    /// Period number of a time, in the strategy's own numbering.
    /// Negative before observation starts.
    fn period_at(&self, time: SimTime) -> i64;

    /// Raw column of a period number, `None` when it has no column.
    fn column_of(&self, period: i64) -> Option<usize>;

    /// Time at which a period number begins.
    fn period_start(&self, period: i64) -> SimTime;

    /// Called once per period number the simulation enters.
    fn advance_to(&mut self, _period: i64) {}

    /// Number of columns returned by `collapse`.
    fn num_stat_columns(&self) -> usize;

    /// Leading statistics columns that each stand for one period.
    fn main_columns(&self) -> usize {
        self.num_stat_columns()
    }

    /// Statistics column covering every main period, if there is one.
    fn total_column(&self) -> Option<usize> {
        None
    }

    /// Raw accumulator columns to statistics-facing columns.
    fn collapse(&self, raw: &MeasureMatrix, awt_columns: bool) -> Matrix;

    /// Length of each statistics-facing column, observed up to `now`.
    fn stat_column_durations(&self, now: SimTime) -> Vec<SimTime>;

    /// Human-readable label of a statistics-facing column.
    fn column_name(&self, column: usize) -> String;
}

/// Fold a set of raw columns into one, row by row.
fn fold_columns(raw: &MeasureMatrix, cols: &[usize], op: CombineOp) -> Vec<f64> {
    (0..raw.rows())
        .map(|r| op.fold(cols.iter().map(|&c| raw.get(r, c))))
        .collect()
}

impl MeasureStrategy for MainPeriods {
    fn period_at(&self, time: SimTime) -> i64 {
        MainPeriods::period_at(self, time)
    }

    fn column_of(&self, period: i64) -> Option<usize> {
        (period >= 0 && (period as usize) < self.num_periods()).then_some(period as usize)
    }

    fn period_start(&self, period: i64) -> SimTime {
        if period <= 0 {
            f64::NEG_INFINITY
        } else {
            self.start + self.duration * (period - 1) as f64
        }
    }

    fn num_stat_columns(&self) -> usize {
        self.num_main + self.extra_columns()
    }

    fn main_columns(&self) -> usize {
        self.num_main
    }

    fn total_column(&self) -> Option<usize> {
        self.has_total_column()
            .then(|| self.num_main + self.segments.len())
    }

    fn collapse(&self, raw: &MeasureMatrix, awt_columns: bool) -> Matrix {
        if awt_columns && self.needs_segments_for_awt() {
            // Segment and total columns were counted with their own thresholds.
            return raw.to_matrix();
        }
        let first_main = if awt_columns { 0 } else { 1 };
        let main: Vec<usize> = (first_main..first_main + self.num_main).collect();
        let op = raw.op();
        let mut columns: Vec<Vec<f64>> = main
            .iter()
            .map(|&c| (0..raw.rows()).map(|r| raw.get(r, c)).collect())
            .collect();
        for seg in &self.segments {
            let members: Vec<usize> = seg
                .members
                .iter()
                .filter(|&&p| p < self.num_main)
                .map(|&p| p + first_main)
                .collect();
            columns.push(fold_columns(raw, &members, op));
        }
        if self.has_total_column() {
            columns.push(fold_columns(raw, &main, op));
        }
        Matrix::from_fn(raw.rows(), columns.len(), |r, c| columns[c][r])
    }

    fn stat_column_durations(&self, _now: SimTime) -> Vec<SimTime> {
        let mut durations = vec![self.duration; self.num_main];
        for seg in &self.segments {
            let n = seg.members.iter().filter(|&&p| p < self.num_main).count();
            durations.push(self.duration * n as f64);
        }
        if self.has_total_column() {
            durations.push(self.duration * self.num_main as f64);
        }
        durations
    }

    fn column_name(&self, column: usize) -> String {
        if column < self.num_main {
            format!("period{column}")
        } else if column - self.num_main < self.segments.len() {
            self.segments[column - self.num_main].name.clone()
        } else {
            "total".to_string()
        }
    }
}

impl MeasureStrategy for SteadyStatePeriod {
    fn period_at(&self, time: SimTime) -> i64 {
        if time >= self.warmup {
            0
        } else {
            -1
        }
    }

    fn column_of(&self, period: i64) -> Option<usize> {
        (period == 0).then_some(0)
    }

    fn period_start(&self, period: i64) -> SimTime {
        if period == 0 {
            self.warmup
        } else {
            f64::NEG_INFINITY
        }
    }

    fn num_stat_columns(&self) -> usize {
        1
    }

    fn collapse(&self, raw: &MeasureMatrix, _awt_columns: bool) -> Matrix {
        raw.to_matrix()
    }

    fn stat_column_durations(&self, now: SimTime) -> Vec<SimTime> {
        vec![(now - self.warmup).max(0.0)]
    }

    fn column_name(&self, _column: usize) -> String {
        "steady_state".to_string()
    }
}

impl MeasureStrategy for SlidingWindows {
    fn period_at(&self, time: SimTime) -> i64 {
        self.window_at(time)
    }

    fn column_of(&self, period: i64) -> Option<usize> {
        self.column_of_window(period)
    }

    fn period_start(&self, period: i64) -> SimTime {
        if period < 0 {
            f64::NEG_INFINITY
        } else {
            self.start + self.window_size * period as f64
        }
    }

    fn advance_to(&mut self, period: i64) {
        self.current = period;
    }

    fn num_stat_columns(&self) -> usize {
        1
    }

    fn collapse(&self, raw: &MeasureMatrix, _awt_columns: bool) -> Matrix {
        let all: Vec<usize> = (0..raw.cols()).collect();
        let column = fold_columns(raw, &all, raw.op());
        Matrix::from_fn(raw.rows(), 1, |r, _| column[r])
    }

    fn stat_column_durations(&self, now: SimTime) -> Vec<SimTime> {
        let retained = (self.current + 1).clamp(0, self.num_windows as i64) as usize;
        if retained == 0 {
            return vec![0.0];
        }
        let oldest = self.start + self.window_size * (self.current + 1 - retained as i64) as f64;
        vec![(now - oldest).clamp(0.0, self.window_size * retained as f64)]
    }

    fn column_name(&self, _column: usize) -> String {
        "now".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;

    #[test]
    fn main_collapse_drops_borders_and_adds_segments() {
        let p = MainPeriods::new(0.0, 10.0, 3, vec![Segment::new("am", vec![0, 1])], true);
        let mut raw = MeasureMatrix::new(1, p.num_periods(), CombineOp::Sum);
        for (c, v) in [100.0, 1.0, 2.0, 3.0, 100.0].into_iter().enumerate() {
            raw.add(0, c, v);
        }
        let m = p.collapse(&raw, false);
        assert_eq!(m.row(0), &[1.0, 2.0, 3.0, 3.0, 6.0]);
        assert_eq!(p.stat_column_durations(0.0), vec![10.0, 10.0, 10.0, 20.0, 30.0]);
        assert_eq!(p.period_start(2), 10.0);
    }

    #[test]
    fn main_collapse_keeps_awt_breakdown() {
        let p = MainPeriods::new(0.0, 10.0, 2, Vec::new(), true);
        let mut raw = MeasureMatrix::new(1, p.num_periods_for_awt(), CombineOp::Sum);
        raw.add(0, 0, 1.0);
        raw.add(0, 2, 7.0);
        assert_eq!(p.collapse(&raw, true).row(0), &[1.0, 0.0, 7.0]);
    }

    #[test]
    fn sliding_collapse_folds_all_windows() {
        let mut w = SlidingWindows::new(0.0, 10.0, 3);
        w.advance_to(5);
        let mut raw = MeasureMatrix::sliding(1, 3, CombineOp::Max);
        raw.add(0, 0, 4.0);
        raw.add(0, 2, 2.0);
        assert_eq!(w.collapse(&raw, false).row(0), &[4.0]);
        assert_eq!(w.stat_column_durations(55.0), vec![25.0]);
    }
}

//! Period assignment: which accumulator column a completed call lands in.
//!
//! Implementations are supplied by the simulation driver. Their sizing
//! properties (`num_periods`, `num_periods_for_awt`, the two `needs_*`
//! flags) are read once to size the accumulators and must not change.

use crate::{
    config::{CallCenterConfig, PeriodMode},
    event::CallRecord,
    segment::Segment,
    types::{PeriodIndex, SimTime},
};

pub trait StatPeriod {
    /// Column for regular counters, or a negative value to drop the call.
    fn stat_period(&self, call: &CallRecord) -> PeriodIndex;

    /// Column for AWT counters, or a negative value to drop the call.
    fn awt_period(&self, call: &CallRecord) -> PeriodIndex;

    fn num_periods(&self) -> usize;

    fn num_periods_for_awt(&self) -> usize;

    fn needs_sliding_window(&self) -> bool;

    fn needs_segments_for_awt(&self) -> bool;

    /// Every `(matrix column, threshold column)` pair an AWT observation
    /// made in `awt_period` must be compared and counted in.
    fn awt_columns(&self, awt_period: usize, out: &mut Vec<(usize, usize)>);
}

/// Build the assigner matching the configured period mode.
pub fn from_config(config: &CallCenterConfig) -> Box<dyn crate::strategy::MeasureStrategy> {
    match config.period_mode {
        PeriodMode::Main => Box::new(MainPeriods::new(
            config.period_start,
            config.period_duration,
            config.num_main_periods,
            config.period_segments.clone(),
            config.awt_segment_breakdown,
        )),
        PeriodMode::SteadyState { warmup } => Box::new(SteadyStatePeriod::new(warmup)),
        PeriodMode::SlidingWindow {
            num_windows,
            window_size,
        } => Box::new(SlidingWindows::new(
            config.period_start,
            window_size,
            num_windows,
        )),
    }
}

// ── Main periods ───────────────────────────────────────────────────

/// `P` main periods of equal length, framed by a preliminary period
/// (column 0) and a wrap-up period (column `P + 1`).
///
/// AWT columns are main-period based: column `p - 1` for regular column
/// `p`, then one column per period segment, then a whole-day column when
/// there is more than one main period.
#[derive(Debug, Clone)]
pub struct MainPeriods {
    pub(crate) start: SimTime,
    pub(crate) duration: SimTime,
    pub(crate) num_main: usize,
    pub(crate) segments: Vec<Segment>,
    awt_breakdown: bool,
}

impl MainPeriods {
    pub fn new(
        start: SimTime,
        duration: SimTime,
        num_main: usize,
        segments: Vec<Segment>,
        awt_breakdown: bool,
    ) -> Self {
        Self {
            start,
            duration,
            num_main,
            segments,
            awt_breakdown,
        }
    }

    pub fn num_main_periods(&self) -> usize {
        self.num_main
    }

    pub fn has_total_column(&self) -> bool {
        self.num_main > 1
    }

    /// Statistics columns beyond the main periods.
    pub fn extra_columns(&self) -> usize {
        self.segments.len() + usize::from(self.has_total_column())
    }

    /// Regular column of a time: 0 before start, `P + 1` after the last period.
    pub fn period_at(&self, time: SimTime) -> i64 {
        if time < self.start {
            return 0;
        }
        let idx = ((time - self.start) / self.duration).floor() as i64;
        if idx >= self.num_main as i64 {
            self.num_main as i64 + 1
        } else {
            idx + 1
        }
    }
}

impl StatPeriod for MainPeriods {
    fn stat_period(&self, call: &CallRecord) -> PeriodIndex {
        self.period_at(call.arrival_time) as PeriodIndex
    }

    fn awt_period(&self, call: &CallRecord) -> PeriodIndex {
        let p = self.stat_period(call);
        if p >= 1 && p as usize <= self.num_main {
            p - 1
        } else {
            -1
        }
    }

    fn num_periods(&self) -> usize {
        self.num_main + 2
    }

    fn num_periods_for_awt(&self) -> usize {
        if self.needs_segments_for_awt() {
            self.num_main + self.extra_columns()
        } else {
            self.num_main
        }
    }

    fn needs_sliding_window(&self) -> bool {
        false
    }

    fn needs_segments_for_awt(&self) -> bool {
        self.awt_breakdown && self.extra_columns() > 0
    }

    fn awt_columns(&self, awt_period: usize, out: &mut Vec<(usize, usize)>) {
        out.push((awt_period, awt_period));
        if !self.needs_segments_for_awt() {
            return;
        }
        for (s, seg) in self.segments.iter().enumerate() {
            if seg.contains(awt_period) {
                let col = self.num_main + s;
                out.push((col, col));
            }
        }
        if self.has_total_column() {
            let col = self.num_main + self.segments.len();
            out.push((col, col));
        }
    }
}

// ── Steady state ───────────────────────────────────────────────────

/// A single column collecting everything that arrives after `warmup`.
#[derive(Debug, Clone)]
pub struct SteadyStatePeriod {
    pub(crate) warmup: SimTime,
}

impl SteadyStatePeriod {
    pub fn new(warmup: SimTime) -> Self {
        Self { warmup }
    }
}

impl StatPeriod for SteadyStatePeriod {
    fn stat_period(&self, call: &CallRecord) -> PeriodIndex {
        if call.arrival_time >= self.warmup {
            0
        } else {
            -1
        }
    }

    fn awt_period(&self, call: &CallRecord) -> PeriodIndex {
        self.stat_period(call)
    }

    fn num_periods(&self) -> usize {
        1
    }

    fn num_periods_for_awt(&self) -> usize {
        1
    }

    fn needs_sliding_window(&self) -> bool {
        false
    }

    fn needs_segments_for_awt(&self) -> bool {
        false
    }

    fn awt_columns(&self, awt_period: usize, out: &mut Vec<(usize, usize)>) {
        out.push((awt_period, 0));
    }
}

// ── Sliding windows ────────────────────────────────────────────────

/// The `num_windows` most recent windows of `window_size` each. Column
/// `num_windows - 1` is the current window.
#[derive(Debug, Clone)]
pub struct SlidingWindows {
    pub(crate) start: SimTime,
    pub(crate) window_size: SimTime,
    pub(crate) num_windows: usize,
    pub(crate) current: i64,
}

impl SlidingWindows {
    pub fn new(start: SimTime, window_size: SimTime, num_windows: usize) -> Self {
        Self {
            start,
            window_size,
            num_windows,
            current: 0,
        }
    }

    /// Absolute window index of a time, -1 before the start.
    pub fn window_at(&self, time: SimTime) -> i64 {
        if time < self.start {
            -1
        } else {
            ((time - self.start) / self.window_size).floor() as i64
        }
    }

    /// Column of an absolute window if it is still retained.
    pub fn column_of_window(&self, window: i64) -> Option<usize> {
        let age = self.current - window;
        if window >= 0 && age >= 0 && age < self.num_windows as i64 {
            Some(self.num_windows - 1 - age as usize)
        } else {
            None
        }
    }
}

impl StatPeriod for SlidingWindows {
    fn stat_period(&self, call: &CallRecord) -> PeriodIndex {
        self.column_of_window(self.window_at(call.arrival_time))
            .map_or(-1, |c| c as PeriodIndex)
    }

    fn awt_period(&self, call: &CallRecord) -> PeriodIndex {
        self.stat_period(call)
    }

    fn num_periods(&self) -> usize {
        self.num_windows
    }

    fn num_periods_for_awt(&self) -> usize {
        self.num_windows
    }

    fn needs_sliding_window(&self) -> bool {
        true
    }

    fn needs_segments_for_awt(&self) -> bool {
        false
    }

    fn awt_columns(&self, awt_period: usize, out: &mut Vec<(usize, usize)>) {
        // Every window shares the thresholds of the first column.
        out.push((awt_period, 0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn main_periods() -> MainPeriods {
        MainPeriods::new(10.0, 5.0, 3, vec![Segment::new("first_two", vec![0, 1])], true)
    }

    #[test]
    fn main_period_borders() {
        let p = main_periods();
        assert_eq!(p.stat_period(&CallRecord::new(0, 9.9)), 0);
        assert_eq!(p.stat_period(&CallRecord::new(0, 10.0)), 1);
        assert_eq!(p.stat_period(&CallRecord::new(0, 24.9)), 3);
        assert_eq!(p.stat_period(&CallRecord::new(0, 25.0)), 4);
        assert_eq!(p.awt_period(&CallRecord::new(0, 9.9)), -1);
        assert_eq!(p.awt_period(&CallRecord::new(0, 12.0)), 0);
        assert_eq!(p.awt_period(&CallRecord::new(0, 30.0)), -1);
        assert_eq!(p.num_periods(), 5);
        // 3 main + 1 segment + total.
        assert_eq!(p.num_periods_for_awt(), 5);
    }

    #[test]
    fn main_awt_columns_include_segments_and_total() {
        let p = main_periods();
        let mut out = Vec::new();
        p.awt_columns(1, &mut out);
        assert_eq!(out, vec![(1, 1), (3, 3), (4, 4)]);
        out.clear();
        p.awt_columns(2, &mut out);
        assert_eq!(out, vec![(2, 2), (4, 4)]);
    }

    #[test]
    fn awt_breakdown_can_be_disabled() {
        let p = MainPeriods::new(0.0, 1.0, 3, Vec::new(), false);
        assert!(!p.needs_segments_for_awt());
        assert_eq!(p.num_periods_for_awt(), 3);
    }

    #[test]
    fn steady_state_drops_warmup() {
        let p = SteadyStatePeriod::new(100.0);
        assert_eq!(p.stat_period(&CallRecord::new(0, 50.0)), -1);
        assert_eq!(p.stat_period(&CallRecord::new(0, 150.0)), 0);
    }

    #[test]
    fn sliding_columns_follow_current_window() {
        let mut w = SlidingWindows::new(0.0, 10.0, 3);
        w.current = 4;
        assert_eq!(w.stat_period(&CallRecord::new(0, 45.0)), 2);
        assert_eq!(w.stat_period(&CallRecord::new(0, 25.0)), 0);
        assert_eq!(w.stat_period(&CallRecord::new(0, 15.0)), -1);
    }
}

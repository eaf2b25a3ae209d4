//! Extremum trackers for busy agents and queue sizes.
//!
//! Each tracker is idle (no active column) or tracking one column. The
//! per-subject values are ground truth taken from the latest notification;
//! every aggregate row is recomputed from them, so the order in which
//! cooperating listeners are notified does not matter.

use crate::{measure_type::MeasureType, segment::SegmentSet, store::MatrixStore};

/// Running per-period maxima of one instantaneous quantity per subject.
#[derive(Debug, Clone)]
pub struct PeakTracker {
    measure: MeasureType,
    segments: SegmentSet,
    current: Vec<f64>,
    column: Option<usize>,
}

impl PeakTracker {
    pub fn new(measure: MeasureType, segments: SegmentSet) -> Self {
        let base = segments.base();
        Self {
            measure,
            segments,
            current: vec![0.0; base],
            column: None,
        }
    }

    pub fn current(&self, subject: usize) -> f64 {
        self.current.get(subject).copied().unwrap_or(0.0)
    }

    /// Sum of the current values of an aggregate row's members.
    fn aggregate_total(&self, extra: usize) -> f64 {
        self.segments
            .members_of_extra(extra)
            .into_iter()
            .map(|m| self.current[m])
            .sum()
    }

    pub fn update(&mut self, subject: usize, value: f64, store: &mut MatrixStore) {
        if subject >= self.current.len() {
            log::warn!(
                "{}: subject {subject} out of range 0..{}",
                self.measure,
                self.current.len()
            );
            return;
        }
        self.current[subject] = value;
        let Some(col) = self.column else {
            return;
        };
        store.add(self.measure, subject, col, value);
        let base = self.segments.base();
        for row in self.segments.aggregate_rows_of(subject) {
            let total = self.aggregate_total(row - base);
            store.add(self.measure, row, col, total);
        }
    }

    /// Enter a new column (or go idle with `None`). The new column's peak is
    /// seeded with the values carried over from the previous period.
    pub fn start_period(&mut self, column: Option<usize>, store: &mut MatrixStore) {
        self.column = column;
        let Some(col) = column else {
            return;
        };
        let base = self.segments.base();
        for (s, &v) in self.current.iter().enumerate() {
            store.add(self.measure, s, col, v);
        }
        for e in 0..self.segments.extra_rows() {
            store.add(self.measure, base + e, col, self.aggregate_total(e));
        }
    }

    /// Forget the current values and go idle. Used between replications.
    pub fn reset(&mut self) {
        self.current.iter_mut().for_each(|v| *v = 0.0);
        self.column = None;
    }
}

/// Peak number of busy agents per agent group.
#[derive(Debug, Clone)]
pub struct BusyAgentsChecker {
    tracker: PeakTracker,
}

impl BusyAgentsChecker {
    pub fn new(groups: SegmentSet) -> Self {
        Self {
            tracker: PeakTracker::new(MeasureType::MaxBusyAgents, groups),
        }
    }

    pub fn busy_agents_changed(&mut self, group: usize, busy: u32, store: &mut MatrixStore) {
        self.tracker.update(group, f64::from(busy), store);
    }

    pub fn tracker(&self) -> &PeakTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut PeakTracker {
        &mut self.tracker
    }
}

/// Peak queue size per waiting queue.
#[derive(Debug, Clone)]
pub struct QueueSizeChecker {
    tracker: PeakTracker,
}

impl QueueSizeChecker {
    pub fn new(queues: SegmentSet) -> Self {
        Self {
            tracker: PeakTracker::new(MeasureType::MaxQueueSize, queues),
        }
    }

    pub fn queue_size_changed(&mut self, queue: usize, size: u32, store: &mut MatrixStore) {
        self.tracker.update(queue, f64::from(size), store);
    }

    pub fn tracker(&self) -> &PeakTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut PeakTracker {
        &mut self.tracker
    }
}

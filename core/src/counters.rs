//! Per-event counters: translate one call notification into accumulator
//! updates. Every handler does a bounded amount of work per event that
//! depends only on the model layout, never on how many performance
//! measures were requested.

use crate::{
    config::AwtDefinition,
    event::{CallRecord, DialOutcome},
    layout::ModelLayout,
    measure_type::{MeasureType, RowType},
    period::StatPeriod,
    store::MatrixStore,
};

/// Base row of a call in a subject-indexed (non type-group) accumulator.
fn subject_row(layout: &ModelLayout, row_type: RowType, call: &CallRecord) -> Option<usize> {
    let k = call.contact_type;
    match row_type {
        RowType::ContactType if k < layout.num_contact_types() => Some(k),
        RowType::InboundType if layout.is_inbound(k) => Some(k),
        RowType::OutboundType if k >= layout.num_inbound_types() && k < layout.num_contact_types() => {
            Some(k - layout.num_inbound_types())
        }
        RowType::AgentGroup => call.agent_group.filter(|&g| g < layout.num_agent_groups()),
        RowType::WaitingQueue => call.queue.filter(|&q| q < layout.num_queues()),
        _ => None,
    }
}

// ── CallCounter ────────────────────────────────────────────────────

/// Counts one event kind per call, keyed by the measure's subject.
#[derive(Debug, Clone)]
pub struct CallCounter {
    measure: MeasureType,
    row_type: RowType,
}

impl CallCounter {
    pub fn new(measure: MeasureType, layout: &ModelLayout) -> Self {
        Self {
            measure,
            row_type: layout.natural_row_type(measure),
        }
    }

    pub fn measure(&self) -> MeasureType {
        self.measure
    }

    pub fn count(
        &self,
        call: &CallRecord,
        layout: &ModelLayout,
        periods: &(impl StatPeriod + ?Sized),
        store: &mut MatrixStore,
    ) {
        let p = periods.stat_period(call);
        if p < 0 {
            return;
        }
        if let Some(row) = subject_row(layout, self.row_type, call) {
            store.add(self.measure, row, p as usize, 1.0);
        }
    }
}

// ── OutboundCallCounter ────────────────────────────────────────────

/// Dial attempts and their outcomes, per outbound type.
#[derive(Debug, Clone, Default)]
pub struct OutboundCallCounter;

impl OutboundCallCounter {
    pub fn new() -> Self {
        Self
    }

    pub fn dial_attempt(
        &self,
        call: &CallRecord,
        outcome: DialOutcome,
        layout: &ModelLayout,
        periods: &(impl StatPeriod + ?Sized),
        store: &mut MatrixStore,
    ) {
        let p = periods.stat_period(call);
        if p < 0 {
            return;
        }
        let Some(row) = subject_row(layout, RowType::OutboundType, call) else {
            log::warn!(
                "dial attempt for contact type {} which is not outbound",
                call.contact_type
            );
            return;
        };
        let col = p as usize;
        store.add(MeasureType::NumTriedDial, row, col, 1.0);
        let by_outcome = match outcome {
            DialOutcome::RightParty => MeasureType::NumRightPartyConnects,
            DialOutcome::WrongParty => MeasureType::NumWrongPartyConnects,
            DialOutcome::Failed => MeasureType::NumFailedDial,
        };
        store.add(by_outcome, row, col, 1.0);
    }
}

// ── CallByCallMeasureManager ───────────────────────────────────────

/// Served and abandoned calls: waiting-time sums and maxima, per-group
/// service counts, and AWT good/bad bucketing.
#[derive(Debug, Clone)]
pub struct CallByCallMeasureManager {
    awt: Vec<AwtDefinition>,
    type_group: bool,
    columns: Vec<(usize, usize)>,
}

impl CallByCallMeasureManager {
    pub fn new(layout: &ModelLayout, awt: Vec<AwtDefinition>) -> Self {
        Self {
            awt,
            type_group: layout.natural_row_type(MeasureType::NumServed).is_type_group(),
            columns: Vec::new(),
        }
    }

    /// Measures this component updates.
    pub const MEASURES: [MeasureType; 14] = [
        MeasureType::NumServed,
        MeasureType::NumServedBeforeAwt,
        MeasureType::NumServedAfterAwt,
        MeasureType::NumAbandonedBeforeAwt,
        MeasureType::NumAbandonedAfterAwt,
        MeasureType::SumWaitingTimes,
        MeasureType::SumWaitingTimesServed,
        MeasureType::SumWaitingTimesAbandoned,
        MeasureType::SumServiceTimes,
        MeasureType::SumExcessTimes,
        MeasureType::SumExcessTimesServed,
        MeasureType::SumExcessTimesAbandoned,
        MeasureType::MaxWaitingTimeServed,
        MeasureType::MaxWaitingTimeAbandoned,
    ];

    pub fn served(
        &mut self,
        call: &CallRecord,
        layout: &ModelLayout,
        periods: &(impl StatPeriod + ?Sized),
        store: &mut MatrixStore,
    ) {
        let p = periods.stat_period(call);
        if p >= 0 {
            let col = p as usize;
            let k = call.contact_type;
            let qt = call.queue_time;
            if k < layout.num_contact_types() {
                store.add(MeasureType::SumWaitingTimes, k, col, qt);
                store.add(MeasureType::MaxWaitingTimeServed, k, col, qt);
            }
            self.add_type_group(call, col, layout, store, &[
                (MeasureType::NumServed, 1.0),
                (MeasureType::SumWaitingTimesServed, qt),
                (MeasureType::SumServiceTimes, call.service_time),
            ]);
        }
        self.bucket_awt(
            call,
            layout,
            periods,
            store,
            MeasureType::NumServedBeforeAwt,
            MeasureType::NumServedAfterAwt,
            MeasureType::SumExcessTimesServed,
        );
    }

    pub fn abandoned(
        &mut self,
        call: &CallRecord,
        layout: &ModelLayout,
        periods: &(impl StatPeriod + ?Sized),
        store: &mut MatrixStore,
    ) {
        if !layout.is_inbound(call.contact_type) {
            return;
        }
        let p = periods.stat_period(call);
        if p >= 0 {
            let col = p as usize;
            let k = call.contact_type;
            store.add(MeasureType::SumWaitingTimes, k, col, call.queue_time);
            store.add(MeasureType::SumWaitingTimesAbandoned, k, col, call.queue_time);
            store.add(MeasureType::MaxWaitingTimeAbandoned, k, col, call.queue_time);
        }
        self.bucket_awt(
            call,
            layout,
            periods,
            store,
            MeasureType::NumAbandonedBeforeAwt,
            MeasureType::NumAbandonedAfterAwt,
            MeasureType::SumExcessTimesAbandoned,
        );
    }

    /// Per-(type, group) update, expanded to the group aggregate rows.
    fn add_type_group(
        &self,
        call: &CallRecord,
        col: usize,
        layout: &ModelLayout,
        store: &mut MatrixStore,
        values: &[(MeasureType, f64)],
    ) {
        let k = call.contact_type;
        if k >= layout.num_contact_types() {
            return;
        }
        if !self.type_group {
            for &(m, v) in values {
                store.add(m, k, col, v);
            }
            return;
        }
        let groups = &layout.agent_groups;
        let Some(g) = call.agent_group.filter(|&g| g < groups.base()) else {
            log::warn!("served call of type {k} carries no valid agent group");
            return;
        };
        let block = k * groups.full_rows();
        for &(m, v) in values {
            store.add(m, block + g, col, v);
            for agg in groups.aggregate_rows_of(g) {
                store.add(m, block + agg, col, v);
            }
        }
    }

    /// Good/bad AWT bucketing plus excess time, for every AWT definition,
    /// every type row the call belongs to and every AWT column.
    #[allow(clippy::too_many_arguments)]
    fn bucket_awt(
        &mut self,
        call: &CallRecord,
        layout: &ModelLayout,
        periods: &(impl StatPeriod + ?Sized),
        store: &mut MatrixStore,
        good: MeasureType,
        bad: MeasureType,
        excess_kind: MeasureType,
    ) {
        let k = call.contact_type;
        if !layout.is_inbound(k) {
            return;
        }
        let ap = periods.awt_period(call);
        if ap < 0 {
            return;
        }
        self.columns.clear();
        periods.awt_columns(ap as usize, &mut self.columns);

        let inbound = &layout.inbound_types;
        let rows_per_awt = inbound.full_rows();
        let qt = call.queue_time;
        for (si, def) in self.awt.iter().enumerate() {
            for r in std::iter::once(k).chain(inbound.aggregate_rows_of(k)) {
                let row = si * rows_per_awt + r;
                for &(col, tcol) in &self.columns {
                    let threshold = def.threshold(r, tcol);
                    if qt <= threshold {
                        store.add(good, row, col, 1.0);
                    } else {
                        store.add(bad, row, col, 1.0);
                        let excess = qt - threshold;
                        store.add(MeasureType::SumExcessTimes, row, col, excess);
                        store.add(excess_kind, row, col, excess);
                    }
                }
            }
        }
    }
}

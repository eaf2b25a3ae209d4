//! The measure manager: owns every accumulator of one simulation instance.
//!
//! EVENT ROUTING (fixed):
//!   - new_call / blocked / delayed  -> per-type call counters
//!   - abandoned                     -> call counter, then call-by-call manager
//!   - served                        -> call-by-call manager
//!   - dial_attempt                  -> outbound counter
//!   - busy / working / queue change -> extremum trackers, then time integrals
//!
//! RULES:
//!   - Listeners only see events while registered.
//!   - The driver calls `update_current_period(now)` before handing over
//!     events that happen at `now`. Occupancy events carry their own time
//!     and advance the period themselves.
//!   - Independent replications own independent managers, or call
//!     `init_measure_matrices` between replications.

use crate::{
    checkers::{BusyAgentsChecker, QueueSizeChecker},
    config::{AwtDefinition, CallCenterConfig},
    counters::{CallByCallMeasureManager, CallCounter, OutboundCallCounter},
    error::{StatError, StatResult},
    event::{CallCenterEvent, CallRecord},
    integral::TimeIntegral,
    layout::ModelLayout,
    matrix::Matrix,
    measure_type::{MeasureType, TimeNormalizeType},
    performance::{PerformanceMeasure, PerformanceMeasureTable},
    period,
    store::MatrixStore,
    strategy::MeasureStrategy,
    types::SimTime,
};
use std::collections::BTreeSet;

/// Components that can be attached to the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ListenerKind {
    CallCounters,
    CallByCall,
    Outbound,
    BusyAgents,
    QueueSize,
    TimeIntegrals,
}

const CALL_COUNTED: [MeasureType; 4] = [
    MeasureType::NumArrivals,
    MeasureType::NumBlocked,
    MeasureType::NumDelayed,
    MeasureType::NumAbandoned,
];

const DIAL_MEASURES: [MeasureType; 4] = [
    MeasureType::NumTriedDial,
    MeasureType::NumRightPartyConnects,
    MeasureType::NumWrongPartyConnects,
    MeasureType::NumFailedDial,
];

const INTEGRATED: [MeasureType; 3] = [
    MeasureType::SumBusyAgents,
    MeasureType::SumWorkingAgents,
    MeasureType::SumQueueSize,
];

pub struct CallCenterMeasureManager {
    config:         CallCenterConfig,
    layout:         ModelLayout,
    strategy:       Box<dyn MeasureStrategy>,
    store:          MatrixStore,
    call_counters:  Vec<CallCounter>,
    call_by_call:   Option<CallByCallMeasureManager>,
    outbound:       Option<OutboundCallCounter>,
    busy_agents:    Option<BusyAgentsChecker>,
    queue_sizes:    Option<QueueSizeChecker>,
    integrals:      Vec<TimeIntegral>,
    registered:     BTreeSet<ListenerKind>,
    current_period: Option<i64>,
    now:            SimTime,
}

impl CallCenterMeasureManager {
    /// Create the accumulators for `measures` and the components that
    /// update them. Measures not listed are never counted.
    pub fn new(config: &CallCenterConfig, measures: &[MeasureType]) -> StatResult<Self> {
        config.validate()?;
        let layout = ModelLayout::new(config);
        let strategy = period::from_config(config);
        let wanted: BTreeSet<MeasureType> = measures.iter().copied().collect();

        let mut store = MatrixStore::new();
        let sliding = strategy.needs_sliding_window();
        for &mt in &wanted {
            let cols = if mt.uses_awt_periods() {
                strategy.num_periods_for_awt()
            } else {
                strategy.num_periods()
            };
            store.create(mt, layout.raw_rows(mt), cols, sliding);
        }

        let call_counters = CALL_COUNTED
            .iter()
            .filter(|mt| wanted.contains(mt))
            .map(|&mt| CallCounter::new(mt, &layout))
            .collect();
        let call_by_call = CallByCallMeasureManager::MEASURES
            .iter()
            .any(|mt| wanted.contains(mt))
            .then(|| CallByCallMeasureManager::new(&layout, awt_definitions(config)));
        let outbound = DIAL_MEASURES
            .iter()
            .any(|mt| wanted.contains(mt))
            .then(OutboundCallCounter::new);
        let busy_agents = wanted
            .contains(&MeasureType::MaxBusyAgents)
            .then(|| BusyAgentsChecker::new(layout.agent_groups.clone()));
        let queue_sizes = wanted
            .contains(&MeasureType::MaxQueueSize)
            .then(|| QueueSizeChecker::new(layout.queues.clone()));
        let integrals = INTEGRATED
            .iter()
            .filter(|mt| wanted.contains(mt))
            .map(|&mt| TimeIntegral::new(mt, layout.raw_rows(mt)))
            .collect();

        log::info!(
            "measure manager: {} accumulators, {} raw periods, {} statistics columns",
            wanted.len(),
            strategy.num_periods(),
            strategy.num_stat_columns()
        );

        Ok(Self {
            config: config.clone(),
            layout,
            strategy,
            store,
            call_counters,
            call_by_call,
            outbound,
            busy_agents,
            queue_sizes,
            integrals,
            registered: BTreeSet::new(),
            current_period: None,
            now: 0.0,
        })
    }

    /// Create exactly the accumulators the given performance measures need.
    pub fn with_performance_measures(
        config: &CallCenterConfig,
        pms: &[PerformanceMeasure],
        table: &PerformanceMeasureTable,
    ) -> StatResult<Self> {
        let measures: Vec<MeasureType> = table.required_measures(pms).into_iter().collect();
        Self::new(config, &measures)
    }

    pub fn config(&self) -> &CallCenterConfig {
        &self.config
    }

    pub fn layout(&self) -> &ModelLayout {
        &self.layout
    }

    pub fn strategy(&self) -> &dyn MeasureStrategy {
        self.strategy.as_ref()
    }

    pub fn store(&self) -> &MatrixStore {
        &self.store
    }

    pub fn has_measure(&self, mt: MeasureType) -> bool {
        self.store.contains(mt)
    }

    pub fn measures(&self) -> impl Iterator<Item = MeasureType> + '_ {
        self.store.measures()
    }

    pub fn num_stat_columns(&self) -> usize {
        self.strategy.num_stat_columns()
    }

    /// Length of each statistics column, as observed so far.
    pub fn stat_column_durations(&self) -> Vec<SimTime> {
        self.strategy.stat_column_durations(self.now)
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    // ── Lifecycle ──────────────────────────────────

    /// Reset every accumulator and every tracker. Safe to call repeatedly.
    pub fn init_measure_matrices(&mut self) {
        self.store.init_all();
        if let Some(c) = &mut self.busy_agents {
            c.tracker_mut().reset();
        }
        if let Some(c) = &mut self.queue_sizes {
            c.tracker_mut().reset();
        }
        for integral in &mut self.integrals {
            integral.reset(0.0);
        }
        self.current_period = None;
        self.now = 0.0;
    }

    /// Attach every component that was created. Idempotent.
    pub fn register_listeners(&mut self) {
        let present = [
            (ListenerKind::CallCounters, !self.call_counters.is_empty()),
            (ListenerKind::CallByCall, self.call_by_call.is_some()),
            (ListenerKind::Outbound, self.outbound.is_some()),
            (ListenerKind::BusyAgents, self.busy_agents.is_some()),
            (ListenerKind::QueueSize, self.queue_sizes.is_some()),
            (ListenerKind::TimeIntegrals, !self.integrals.is_empty()),
        ];
        for (kind, exists) in present {
            if exists {
                self.registered.insert(kind);
            }
        }
    }

    /// Detach every component. Idempotent.
    pub fn unregister_listeners(&mut self) {
        self.registered.clear();
    }

    pub fn is_registered(&self, kind: ListenerKind) -> bool {
        self.registered.contains(&kind)
    }

    // ── Periods ────────────────────────────────────

    /// Move to the period containing `now`, closing every period passed
    /// on the way: integrals are flushed at each boundary, trackers are
    /// reseeded and, with sliding windows, accumulators are rolled.
    pub fn update_current_period(&mut self, now: SimTime) {
        self.now = self.now.max(now);
        let target = self.strategy.period_at(now);
        let Some(current) = self.current_period else {
            self.strategy.advance_to(target);
            self.enter_period(target, now);
            return;
        };
        if target <= current {
            return;
        }
        let sliding = self.strategy.needs_sliding_window();
        // Periods older than one full set of columns leave no trace.
        let first = (current + 1).max(target - self.strategy.num_periods() as i64);
        for p in first..=target {
            let boundary = self.strategy.period_start(p).min(now);
            self.flush_integrals(boundary);
            if sliding {
                self.store.roll_all();
            }
            self.strategy.advance_to(p);
            self.enter_period(p, boundary);
        }
        log::debug!("period {current} -> {target} at t={now}");
    }

    /// Record the end of observation at `now`, flushing time integrals.
    pub fn finish_current_period(&mut self, now: SimTime) {
        self.now = self.now.max(now);
        self.flush_integrals(now);
    }

    fn flush_integrals(&mut self, to: SimTime) {
        for integral in &mut self.integrals {
            integral.accumulate(to, &mut self.store);
        }
    }

    fn enter_period(&mut self, period: i64, time: SimTime) {
        self.current_period = Some(period);
        let column = self.strategy.column_of(period);
        for integral in &mut self.integrals {
            integral.start_column(column, time);
        }
        if let Some(c) = &mut self.busy_agents {
            c.tracker_mut().start_period(column, &mut self.store);
        }
        if let Some(c) = &mut self.queue_sizes {
            c.tracker_mut().start_period(column, &mut self.store);
        }
    }

    // ── Events ─────────────────────────────────────

    pub fn handle(&mut self, event: &CallCenterEvent) {
        match event {
            CallCenterEvent::NewCall { call } => self.count(MeasureType::NumArrivals, call),
            CallCenterEvent::Blocked { call } => self.count(MeasureType::NumBlocked, call),
            CallCenterEvent::Delayed { call } => self.count(MeasureType::NumDelayed, call),
            CallCenterEvent::Abandoned { call } => {
                self.count(MeasureType::NumAbandoned, call);
                if self.is_registered(ListenerKind::CallByCall) {
                    if let Some(c) = &mut self.call_by_call {
                        c.abandoned(call, &self.layout, self.strategy.as_ref(), &mut self.store);
                    }
                }
            }
            CallCenterEvent::Served { call } => {
                if self.is_registered(ListenerKind::CallByCall) {
                    if let Some(c) = &mut self.call_by_call {
                        c.served(call, &self.layout, self.strategy.as_ref(), &mut self.store);
                    }
                }
            }
            CallCenterEvent::DialAttempt { call, outcome } => {
                if self.is_registered(ListenerKind::Outbound) {
                    if let Some(c) = &self.outbound {
                        c.dial_attempt(call, *outcome, &self.layout, self.strategy.as_ref(), &mut self.store);
                    }
                }
            }
            CallCenterEvent::BusyAgentsChanged { time, group, busy } => {
                self.update_current_period(*time);
                if self.is_registered(ListenerKind::BusyAgents) {
                    if let Some(c) = &mut self.busy_agents {
                        c.busy_agents_changed(*group, *busy, &mut self.store);
                    }
                }
                self.integrate(MeasureType::SumBusyAgents, *group, f64::from(*busy), *time);
            }
            CallCenterEvent::WorkingAgentsChanged { time, group, working } => {
                self.update_current_period(*time);
                self.integrate(MeasureType::SumWorkingAgents, *group, f64::from(*working), *time);
            }
            CallCenterEvent::QueueSizeChanged { time, queue, size } => {
                self.update_current_period(*time);
                if self.is_registered(ListenerKind::QueueSize) {
                    if let Some(c) = &mut self.queue_sizes {
                        c.queue_size_changed(*queue, *size, &mut self.store);
                    }
                }
                self.integrate(MeasureType::SumQueueSize, *queue, f64::from(*size), *time);
            }
        }
    }

    fn count(&mut self, measure: MeasureType, call: &CallRecord) {
        if !self.is_registered(ListenerKind::CallCounters) {
            return;
        }
        if let Some(counter) = self.call_counters.iter().find(|c| c.measure() == measure) {
            counter.count(call, &self.layout, self.strategy.as_ref(), &mut self.store);
        }
    }

    fn integrate(&mut self, measure: MeasureType, subject: usize, value: f64, time: SimTime) {
        if !self.is_registered(ListenerKind::TimeIntegrals) {
            return;
        }
        if let Some(integral) = self.integrals.iter_mut().find(|i| i.measure() == measure) {
            integral.set(subject, value, time, &mut self.store);
        }
    }

    // ── Values ─────────────────────────────────────

    /// Raw values of `mt`, one column per statistics-facing period.
    /// Aggregate rows are present only for event-aggregated measures.
    pub fn get_values(&self, mt: MeasureType, normalize: bool) -> StatResult<Matrix> {
        let raw = self.store.get(mt).ok_or_else(|| StatError::NotAvailable {
            measure: mt.name().to_string(),
        })?;
        let mut values = self.strategy.collapse(raw, mt.uses_awt_periods());
        if normalize {
            self.time_normalize(mt, &mut values);
        }
        Ok(values)
    }

    /// Divide duration-like values by the length of their column.
    pub fn time_normalize(&self, mt: MeasureType, values: &mut Matrix) {
        let unit = match mt.normalize() {
            TimeNormalizeType::Never => return,
            TimeNormalizeType::Always => 1.0,
            TimeNormalizeType::Conditional if self.config.normalize_to_default_unit => {
                self.config.default_unit
            }
            TimeNormalizeType::Conditional => return,
        };
        let durations = self.stat_column_durations();
        if durations.len() != values.cols() {
            log::warn!(
                "{mt}: {} columns but {} column durations, left unnormalized",
                values.cols(),
                durations.len()
            );
            return;
        }
        for (col, d) in durations.into_iter().enumerate() {
            if d > 0.0 {
                values.scale_column(col, d / unit);
            }
        }
    }
}

/// Validation guarantees a table whenever inbound types exist.
fn awt_definitions(config: &CallCenterConfig) -> Vec<AwtDefinition> {
    if config.awt.is_empty() {
        vec![AwtDefinition::uniform("awt", 0.0)]
    } else {
        config.awt.clone()
    }
}

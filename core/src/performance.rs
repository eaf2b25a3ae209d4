//! Performance measures: user-visible quantities defined as fixed formulas
//! over measure types.
//!
//! RULE: Every `PerformanceMeasure` has exactly one definition. The table
//! is checked exhaustively when it is built, never at query time.

use crate::{
    error::{StatError, StatResult},
    measure_type::{MeasureType, RowType},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceMeasure {
    // ── Expectations ───────────────────────────────
    RateOfArrivals,
    RateOfOffered,
    RateOfBlocking,
    RateOfDelay,
    RateOfAbandonment,
    RateOfServices,
    RateOfServicesBeforeAwt,
    RateOfAbandonmentAfterAwt,
    SumWaitingTimes,
    SumServiceTimes,
    MaxWaitingTimeServed,
    MaxWaitingTimeAbandoned,
    MaxQueueSize,
    MaxBusyAgents,
    AvgBusyAgents,
    AvgWorkingAgents,
    AvgQueueSize,
    RateOfTriedDial,
    RateOfRightPartyConnects,

    // ── Ratios of expectations ─────────────────────
    ServiceLevel,
    ServiceLevel2,
    AbandonmentRatio,
    AbandonmentRatioAfterAwt,
    BlockingRatio,
    DelayRatio,
    SpeedOfAnswer,
    AvgWaitingTime,
    AvgTimeToAbandon,
    AvgServiceTime,
    AvgExcessTime,
    Occupancy,
    RightPartyConnectRatio,

    // ── Expectations of ratios ─────────────────────
    ServiceLevelRep,
    AbandonmentRatioRep,
    OccupancyRep,
    SpeedOfAnswerRep,
}

use PerformanceMeasure as P;

impl PerformanceMeasure {
    pub const ALL: [PerformanceMeasure; 36] = [
        P::RateOfArrivals,
        P::RateOfOffered,
        P::RateOfBlocking,
        P::RateOfDelay,
        P::RateOfAbandonment,
        P::RateOfServices,
        P::RateOfServicesBeforeAwt,
        P::RateOfAbandonmentAfterAwt,
        P::SumWaitingTimes,
        P::SumServiceTimes,
        P::MaxWaitingTimeServed,
        P::MaxWaitingTimeAbandoned,
        P::MaxQueueSize,
        P::MaxBusyAgents,
        P::AvgBusyAgents,
        P::AvgWorkingAgents,
        P::AvgQueueSize,
        P::RateOfTriedDial,
        P::RateOfRightPartyConnects,
        P::ServiceLevel,
        P::ServiceLevel2,
        P::AbandonmentRatio,
        P::AbandonmentRatioAfterAwt,
        P::BlockingRatio,
        P::DelayRatio,
        P::SpeedOfAnswer,
        P::AvgWaitingTime,
        P::AvgTimeToAbandon,
        P::AvgServiceTime,
        P::AvgExcessTime,
        P::Occupancy,
        P::RightPartyConnectRatio,
        P::ServiceLevelRep,
        P::AbandonmentRatioRep,
        P::OccupancyRep,
        P::SpeedOfAnswerRep,
    ];

    pub fn name(self) -> &'static str {
        match self {
            P::RateOfArrivals => "rate_of_arrivals",
            P::RateOfOffered => "rate_of_offered",
            P::RateOfBlocking => "rate_of_blocking",
            P::RateOfDelay => "rate_of_delay",
            P::RateOfAbandonment => "rate_of_abandonment",
            P::RateOfServices => "rate_of_services",
            P::RateOfServicesBeforeAwt => "rate_of_services_before_awt",
            P::RateOfAbandonmentAfterAwt => "rate_of_abandonment_after_awt",
            P::SumWaitingTimes => "sum_waiting_times",
            P::SumServiceTimes => "sum_service_times",
            P::MaxWaitingTimeServed => "max_waiting_time_served",
            P::MaxWaitingTimeAbandoned => "max_waiting_time_abandoned",
            P::MaxQueueSize => "max_queue_size",
            P::MaxBusyAgents => "max_busy_agents",
            P::AvgBusyAgents => "avg_busy_agents",
            P::AvgWorkingAgents => "avg_working_agents",
            P::AvgQueueSize => "avg_queue_size",
            P::RateOfTriedDial => "rate_of_tried_dial",
            P::RateOfRightPartyConnects => "rate_of_right_party_connects",
            P::ServiceLevel => "service_level",
            P::ServiceLevel2 => "service_level2",
            P::AbandonmentRatio => "abandonment_ratio",
            P::AbandonmentRatioAfterAwt => "abandonment_ratio_after_awt",
            P::BlockingRatio => "blocking_ratio",
            P::DelayRatio => "delay_ratio",
            P::SpeedOfAnswer => "speed_of_answer",
            P::AvgWaitingTime => "avg_waiting_time",
            P::AvgTimeToAbandon => "avg_time_to_abandon",
            P::AvgServiceTime => "avg_service_time",
            P::AvgExcessTime => "avg_excess_time",
            P::Occupancy => "occupancy",
            P::RightPartyConnectRatio => "right_party_connect_ratio",
            P::ServiceLevelRep => "service_level_rep",
            P::AbandonmentRatioRep => "abandonment_ratio_rep",
            P::OccupancyRep => "occupancy_rep",
            P::SpeedOfAnswerRep => "speed_of_answer_rep",
        }
    }
}

impl fmt::Display for PerformanceMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PerformanceMeasure {
    type Err = StatError;

    fn from_str(s: &str) -> StatResult<Self> {
        PerformanceMeasure::ALL
            .into_iter()
            .find(|pm| pm.name() == s)
            .ok_or_else(|| StatError::UnknownPerformanceMeasure(s.to_string()))
    }
}

/// How observations of a performance measure become an estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationKind {
    /// Mean of a signed combination of measure matrices.
    Expectation,
    /// Ratio of two means, with the division deferred to query time.
    RatioOfExpectations,
    /// Mean of per-observation ratios.
    ExpectationOfRatio,
}

/// Signed combination of measure types: `sum(sign * values(measure))`.
pub type Formula = &'static [(MeasureType, f64)];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceMeasureDef {
    pub measure: PerformanceMeasure,
    pub kind: EstimationKind,
    /// Row type every term is reshaped to.
    pub row_type: RowType,
    pub numerator: Formula,
    /// Empty for expectations.
    pub denominator: Formula,
    /// Value reported when numerator and denominator are both zero.
    pub zero_over_zero: f64,
}

impl PerformanceMeasureDef {
    /// Every measure type either formula refers to.
    pub fn measure_types(&self) -> impl Iterator<Item = MeasureType> + '_ {
        self.numerator
            .iter()
            .chain(self.denominator.iter())
            .map(|&(mt, _)| mt)
    }
}

const fn expectation(measure: PerformanceMeasure, row_type: RowType, terms: Formula) -> PerformanceMeasureDef {
    PerformanceMeasureDef {
        measure,
        kind: EstimationKind::Expectation,
        row_type,
        numerator: terms,
        denominator: &[],
        zero_over_zero: 0.0,
    }
}

const fn ratio(
    measure: PerformanceMeasure,
    kind: EstimationKind,
    row_type: RowType,
    numerator: Formula,
    denominator: Formula,
    zero_over_zero: f64,
) -> PerformanceMeasureDef {
    PerformanceMeasureDef {
        measure,
        kind,
        row_type,
        numerator,
        denominator,
        zero_over_zero,
    }
}

use EstimationKind::{ExpectationOfRatio as EoR, RatioOfExpectations as RoE};
use MeasureType as M;
use RowType as R;

const SERVICE_LEVEL_NUM: Formula = &[(M::NumServedBeforeAwt, 1.0)];
const SERVICE_LEVEL_DEN: Formula = &[(M::NumArrivals, 1.0), (M::NumAbandonedBeforeAwt, -1.0)];
const ARRIVALS: Formula = &[(M::NumArrivals, 1.0)];
const ABANDONED: Formula = &[(M::NumAbandoned, 1.0)];
const SERVED: Formula = &[(M::NumServed, 1.0)];
const WAIT_SERVED: Formula = &[(M::SumWaitingTimesServed, 1.0)];
const BUSY: Formula = &[(M::SumBusyAgents, 1.0)];
const WORKING: Formula = &[(M::SumWorkingAgents, 1.0)];

/// The built-in catalogue, one entry per `PerformanceMeasure`.
pub const DEFINITIONS: [PerformanceMeasureDef; 36] = [
    expectation(P::RateOfArrivals, R::ContactType, ARRIVALS),
    expectation(P::RateOfOffered, R::ContactType, &[(M::NumArrivals, 1.0), (M::NumBlocked, -1.0)]),
    expectation(P::RateOfBlocking, R::ContactType, &[(M::NumBlocked, 1.0)]),
    expectation(P::RateOfDelay, R::ContactType, &[(M::NumDelayed, 1.0)]),
    expectation(P::RateOfAbandonment, R::InboundType, ABANDONED),
    expectation(P::RateOfServices, R::ContactTypeAgentGroup, SERVED),
    expectation(P::RateOfServicesBeforeAwt, R::InboundTypeAwt, SERVICE_LEVEL_NUM),
    expectation(P::RateOfAbandonmentAfterAwt, R::InboundTypeAwt, &[(M::NumAbandonedAfterAwt, 1.0)]),
    expectation(P::SumWaitingTimes, R::ContactType, &[(M::SumWaitingTimes, 1.0)]),
    expectation(P::SumServiceTimes, R::ContactTypeAgentGroup, &[(M::SumServiceTimes, 1.0)]),
    expectation(P::MaxWaitingTimeServed, R::ContactType, &[(M::MaxWaitingTimeServed, 1.0)]),
    expectation(P::MaxWaitingTimeAbandoned, R::InboundType, &[(M::MaxWaitingTimeAbandoned, 1.0)]),
    expectation(P::MaxQueueSize, R::WaitingQueue, &[(M::MaxQueueSize, 1.0)]),
    expectation(P::MaxBusyAgents, R::AgentGroup, &[(M::MaxBusyAgents, 1.0)]),
    expectation(P::AvgBusyAgents, R::AgentGroup, BUSY),
    expectation(P::AvgWorkingAgents, R::AgentGroup, WORKING),
    expectation(P::AvgQueueSize, R::WaitingQueue, &[(M::SumQueueSize, 1.0)]),
    expectation(P::RateOfTriedDial, R::OutboundType, &[(M::NumTriedDial, 1.0)]),
    expectation(P::RateOfRightPartyConnects, R::OutboundType, &[(M::NumRightPartyConnects, 1.0)]),
    ratio(P::ServiceLevel, RoE, R::InboundTypeAwt, SERVICE_LEVEL_NUM, SERVICE_LEVEL_DEN, 1.0),
    ratio(P::ServiceLevel2, RoE, R::InboundTypeAwt, SERVICE_LEVEL_NUM, ARRIVALS, 1.0),
    ratio(P::AbandonmentRatio, RoE, R::InboundType, ABANDONED, ARRIVALS, 0.0),
    ratio(
        P::AbandonmentRatioAfterAwt,
        RoE,
        R::InboundTypeAwt,
        &[(M::NumAbandonedAfterAwt, 1.0)],
        ARRIVALS,
        0.0,
    ),
    ratio(P::BlockingRatio, RoE, R::ContactType, &[(M::NumBlocked, 1.0)], ARRIVALS, 0.0),
    ratio(P::DelayRatio, RoE, R::ContactType, &[(M::NumDelayed, 1.0)], ARRIVALS, 0.0),
    ratio(P::SpeedOfAnswer, RoE, R::ContactTypeAgentGroup, WAIT_SERVED, SERVED, 0.0),
    ratio(
        P::AvgWaitingTime,
        RoE,
        R::ContactType,
        &[(M::SumWaitingTimes, 1.0)],
        &[(M::NumArrivals, 1.0), (M::NumBlocked, -1.0)],
        0.0,
    ),
    ratio(
        P::AvgTimeToAbandon,
        RoE,
        R::InboundType,
        &[(M::SumWaitingTimesAbandoned, 1.0)],
        ABANDONED,
        0.0,
    ),
    ratio(
        P::AvgServiceTime,
        RoE,
        R::ContactTypeAgentGroup,
        &[(M::SumServiceTimes, 1.0)],
        SERVED,
        0.0,
    ),
    ratio(
        P::AvgExcessTime,
        RoE,
        R::InboundTypeAwt,
        &[(M::SumExcessTimes, 1.0)],
        &[(M::NumServedAfterAwt, 1.0), (M::NumAbandonedAfterAwt, 1.0)],
        0.0,
    ),
    ratio(P::Occupancy, RoE, R::AgentGroup, BUSY, WORKING, 0.0),
    ratio(
        P::RightPartyConnectRatio,
        RoE,
        R::OutboundType,
        &[(M::NumRightPartyConnects, 1.0)],
        &[(M::NumTriedDial, 1.0)],
        0.0,
    ),
    ratio(P::ServiceLevelRep, EoR, R::InboundTypeAwt, SERVICE_LEVEL_NUM, SERVICE_LEVEL_DEN, 1.0),
    ratio(P::AbandonmentRatioRep, EoR, R::InboundType, ABANDONED, ARRIVALS, 0.0),
    ratio(P::OccupancyRep, EoR, R::AgentGroup, BUSY, WORKING, 0.0),
    ratio(P::SpeedOfAnswerRep, EoR, R::ContactTypeAgentGroup, WAIT_SERVED, SERVED, 0.0),
];

/// Validated performance-measure table.
#[derive(Debug, Clone)]
pub struct PerformanceMeasureTable {
    defs: BTreeMap<PerformanceMeasure, PerformanceMeasureDef>,
}

impl PerformanceMeasureTable {
    /// The built-in catalogue.
    pub fn new() -> StatResult<Self> {
        Self::from_definitions(DEFINITIONS)
    }

    /// Build a table, rejecting duplicates and any measure left undefined.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = PerformanceMeasureDef>,
    ) -> StatResult<Self> {
        let mut defs = BTreeMap::new();
        for def in definitions {
            let ratio_kind = def.kind != EstimationKind::Expectation;
            if def.numerator.is_empty() || ratio_kind == def.denominator.is_empty() {
                return Err(StatError::InvalidConfig(format!(
                    "malformed formula for performance measure '{}'",
                    def.measure
                )));
            }
            if defs.insert(def.measure, def).is_some() {
                return Err(StatError::InvalidConfig(format!(
                    "performance measure '{}' is defined twice",
                    def.measure
                )));
            }
        }
        if let Some(missing) = PerformanceMeasure::ALL
            .into_iter()
            .find(|pm| !defs.contains_key(pm))
        {
            return Err(StatError::UnmappedPerformanceMeasure {
                name: missing.name().to_string(),
            });
        }
        Ok(Self { defs })
    }

    pub fn get(&self, pm: PerformanceMeasure) -> &PerformanceMeasureDef {
        // Exhaustive by construction.
        &self.defs[&pm]
    }

    /// Union of the measure types the given performance measures need.
    pub fn required_measures(&self, pms: &[PerformanceMeasure]) -> BTreeSet<MeasureType> {
        pms.iter()
            .flat_map(|&pm| self.get(pm).measure_types())
            .collect()
    }
}

//! Measure schema: every raw accumulator kind and its descriptor.
//!
//! The descriptor table is the single source of truth for counter
//! creation (which matrices exist and how they are combined) and for
//! reshaping (which row type a raw matrix starts from).

use crate::matrix::CombineOp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Indexing scheme of a matrix's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowType {
    ContactType,
    InboundType,
    OutboundType,
    AgentGroup,
    WaitingQueue,
    ContactTypeAgentGroup,
    InboundTypeAgentGroup,
    OutboundTypeAgentGroup,
    /// Inbound types repeated once per AWT definition.
    InboundTypeAwt,
}

impl RowType {
    pub const ALL: [RowType; 9] = [
        RowType::ContactType,
        RowType::InboundType,
        RowType::OutboundType,
        RowType::AgentGroup,
        RowType::WaitingQueue,
        RowType::ContactTypeAgentGroup,
        RowType::InboundTypeAgentGroup,
        RowType::OutboundTypeAgentGroup,
        RowType::InboundTypeAwt,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RowType::ContactType => "contact_type",
            RowType::InboundType => "inbound_type",
            RowType::OutboundType => "outbound_type",
            RowType::AgentGroup => "agent_group",
            RowType::WaitingQueue => "waiting_queue",
            RowType::ContactTypeAgentGroup => "contact_type_agent_group",
            RowType::InboundTypeAgentGroup => "inbound_type_agent_group",
            RowType::OutboundTypeAgentGroup => "outbound_type_agent_group",
            RowType::InboundTypeAwt => "inbound_type_awt",
        }
    }

    /// Row types whose rows are (type, group) pairs.
    pub fn is_type_group(self) -> bool {
        matches!(
            self,
            RowType::ContactTypeAgentGroup
                | RowType::InboundTypeAgentGroup
                | RowType::OutboundTypeAgentGroup
        )
    }
}

impl fmt::Display for RowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// When `get_values` divides a measure by the elapsed period length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeNormalizeType {
    Never,
    Always,
    /// Only when the configuration asks for normalization to the default unit.
    Conditional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureType {
    NumArrivals,
    NumBlocked,
    NumDelayed,
    NumAbandoned,
    NumAbandonedBeforeAwt,
    NumAbandonedAfterAwt,
    NumServed,
    NumServedBeforeAwt,
    NumServedAfterAwt,
    SumWaitingTimes,
    SumWaitingTimesServed,
    SumWaitingTimesAbandoned,
    SumServiceTimes,
    SumExcessTimes,
    SumExcessTimesServed,
    SumExcessTimesAbandoned,
    MaxWaitingTimeServed,
    MaxWaitingTimeAbandoned,
    MaxBusyAgents,
    MaxQueueSize,
    SumBusyAgents,
    SumWorkingAgents,
    SumQueueSize,
    NumTriedDial,
    NumRightPartyConnects,
    NumWrongPartyConnects,
    NumFailedDial,
}

/// Immutable descriptor of one measure type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasureTypeInfo {
    pub measure: MeasureType,
    pub row_type: RowType,
    pub normalize: TimeNormalizeType,
    pub op: CombineOp,
    /// Aggregate rows are maintained by the event handlers themselves
    /// (AWT thresholds differ per segment; peaks of sums are not sums of peaks).
    pub aggregated_at_event: bool,
}

const fn info(
    measure: MeasureType,
    row_type: RowType,
    normalize: TimeNormalizeType,
    op: CombineOp,
    aggregated_at_event: bool,
) -> MeasureTypeInfo {
    MeasureTypeInfo {
        measure,
        row_type,
        normalize,
        op,
        aggregated_at_event,
    }
}

use CombineOp::{Max, Sum};
use MeasureType as M;
use RowType as R;
use TimeNormalizeType::{Always, Conditional, Never};

/// Descriptor table, in `MeasureType` declaration order.
static MEASURE_TYPES: [MeasureTypeInfo; 27] = [
    info(M::NumArrivals, R::ContactType, Conditional, Sum, false),
    info(M::NumBlocked, R::ContactType, Conditional, Sum, false),
    info(M::NumDelayed, R::ContactType, Conditional, Sum, false),
    info(M::NumAbandoned, R::InboundType, Conditional, Sum, false),
    info(M::NumAbandonedBeforeAwt, R::InboundTypeAwt, Conditional, Sum, true),
    info(M::NumAbandonedAfterAwt, R::InboundTypeAwt, Conditional, Sum, true),
    info(M::NumServed, R::ContactTypeAgentGroup, Conditional, Sum, false),
    info(M::NumServedBeforeAwt, R::InboundTypeAwt, Conditional, Sum, true),
    info(M::NumServedAfterAwt, R::InboundTypeAwt, Conditional, Sum, true),
    info(M::SumWaitingTimes, R::ContactType, Conditional, Sum, false),
    info(M::SumWaitingTimesServed, R::ContactTypeAgentGroup, Conditional, Sum, false),
    info(M::SumWaitingTimesAbandoned, R::InboundType, Conditional, Sum, false),
    info(M::SumServiceTimes, R::ContactTypeAgentGroup, Conditional, Sum, false),
    info(M::SumExcessTimes, R::InboundTypeAwt, Conditional, Sum, true),
    info(M::SumExcessTimesServed, R::InboundTypeAwt, Conditional, Sum, true),
    info(M::SumExcessTimesAbandoned, R::InboundTypeAwt, Conditional, Sum, true),
    info(M::MaxWaitingTimeServed, R::ContactType, Never, Max, false),
    info(M::MaxWaitingTimeAbandoned, R::InboundType, Never, Max, false),
    info(M::MaxBusyAgents, R::AgentGroup, Never, Max, true),
    info(M::MaxQueueSize, R::WaitingQueue, Never, Max, true),
    info(M::SumBusyAgents, R::AgentGroup, Always, Sum, false),
    info(M::SumWorkingAgents, R::AgentGroup, Always, Sum, false),
    info(M::SumQueueSize, R::WaitingQueue, Always, Sum, false),
    info(M::NumTriedDial, R::OutboundType, Conditional, Sum, false),
    info(M::NumRightPartyConnects, R::OutboundType, Conditional, Sum, false),
    info(M::NumWrongPartyConnects, R::OutboundType, Conditional, Sum, false),
    info(M::NumFailedDial, R::OutboundType, Conditional, Sum, false),
];

impl MeasureType {
    pub const ALL: [MeasureType; 27] = [
        M::NumArrivals,
        M::NumBlocked,
        M::NumDelayed,
        M::NumAbandoned,
        M::NumAbandonedBeforeAwt,
        M::NumAbandonedAfterAwt,
        M::NumServed,
        M::NumServedBeforeAwt,
        M::NumServedAfterAwt,
        M::SumWaitingTimes,
        M::SumWaitingTimesServed,
        M::SumWaitingTimesAbandoned,
        M::SumServiceTimes,
        M::SumExcessTimes,
        M::SumExcessTimesServed,
        M::SumExcessTimesAbandoned,
        M::MaxWaitingTimeServed,
        M::MaxWaitingTimeAbandoned,
        M::MaxBusyAgents,
        M::MaxQueueSize,
        M::SumBusyAgents,
        M::SumWorkingAgents,
        M::SumQueueSize,
        M::NumTriedDial,
        M::NumRightPartyConnects,
        M::NumWrongPartyConnects,
        M::NumFailedDial,
    ];

    pub fn info(self) -> &'static MeasureTypeInfo {
        &MEASURE_TYPES[self as usize]
    }

    pub fn row_type(self) -> RowType {
        self.info().row_type
    }

    pub fn op(self) -> CombineOp {
        self.info().op
    }

    pub fn normalize(self) -> TimeNormalizeType {
        self.info().normalize
    }

    /// Matrices indexed by AWT period rather than regular period.
    pub fn uses_awt_periods(self) -> bool {
        self.row_type() == RowType::InboundTypeAwt
    }

    pub fn name(self) -> &'static str {
        match self {
            M::NumArrivals => "num_arrivals",
            M::NumBlocked => "num_blocked",
            M::NumDelayed => "num_delayed",
            M::NumAbandoned => "num_abandoned",
            M::NumAbandonedBeforeAwt => "num_abandoned_before_awt",
            M::NumAbandonedAfterAwt => "num_abandoned_after_awt",
            M::NumServed => "num_served",
            M::NumServedBeforeAwt => "num_served_before_awt",
            M::NumServedAfterAwt => "num_served_after_awt",
            M::SumWaitingTimes => "sum_waiting_times",
            M::SumWaitingTimesServed => "sum_waiting_times_served",
            M::SumWaitingTimesAbandoned => "sum_waiting_times_abandoned",
            M::SumServiceTimes => "sum_service_times",
            M::SumExcessTimes => "sum_excess_times",
            M::SumExcessTimesServed => "sum_excess_times_served",
            M::SumExcessTimesAbandoned => "sum_excess_times_abandoned",
            M::MaxWaitingTimeServed => "max_waiting_time_served",
            M::MaxWaitingTimeAbandoned => "max_waiting_time_abandoned",
            M::MaxBusyAgents => "max_busy_agents",
            M::MaxQueueSize => "max_queue_size",
            M::SumBusyAgents => "sum_busy_agents",
            M::SumWorkingAgents => "sum_working_agents",
            M::SumQueueSize => "sum_queue_size",
            M::NumTriedDial => "num_tried_dial",
            M::NumRightPartyConnects => "num_right_party_connects",
            M::NumWrongPartyConnects => "num_wrong_party_connects",
            M::NumFailedDial => "num_failed_dial",
        }
    }
}

impl fmt::Display for MeasureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

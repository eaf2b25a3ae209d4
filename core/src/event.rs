//! Notifications the simulation core sends to the statistics engine.
//!
//! RULE: Counters and trackers learn about the model ONLY through these
//! events. They never inspect agents, queues or routers directly.

use crate::types::{GroupIndex, QueueIndex, SimTime, TypeIndex};
use serde::{Deserialize, Serialize};

/// What a counter needs to know about one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub contact_type: TypeIndex,
    pub arrival_time: SimTime,
    /// Time spent waiting in queue (patience for abandoned calls).
    #[serde(default)]
    pub queue_time: SimTime,
    #[serde(default)]
    pub service_time: SimTime,
    #[serde(default)]
    pub agent_group: Option<GroupIndex>,
    #[serde(default)]
    pub queue: Option<QueueIndex>,
}

impl CallRecord {
    pub fn new(contact_type: TypeIndex, arrival_time: SimTime) -> Self {
        Self {
            contact_type,
            arrival_time,
            queue_time: 0.0,
            service_time: 0.0,
            agent_group: None,
            queue: None,
        }
    }

    pub fn waited(mut self, queue_time: SimTime) -> Self {
        self.queue_time = queue_time;
        self
    }

    pub fn served_by(mut self, group: GroupIndex, service_time: SimTime) -> Self {
        self.agent_group = Some(group);
        self.service_time = service_time;
        self
    }

    pub fn in_queue(mut self, queue: QueueIndex) -> Self {
        self.queue = Some(queue);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialOutcome {
    RightParty,
    WrongParty,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallCenterEvent {
    // ── Call lifecycle ─────────────────────────────
    NewCall { call: CallRecord },
    Blocked { call: CallRecord },
    Delayed { call: CallRecord },
    Abandoned { call: CallRecord },
    Served { call: CallRecord },

    // ── Dialer ─────────────────────────────────────
    DialAttempt { call: CallRecord, outcome: DialOutcome },

    // ── Occupancy ──────────────────────────────────
    BusyAgentsChanged { time: SimTime, group: GroupIndex, busy: u32 },
    WorkingAgentsChanged { time: SimTime, group: GroupIndex, working: u32 },
    QueueSizeChanged { time: SimTime, queue: QueueIndex, size: u32 },
}

impl CallCenterEvent {
    /// Stable name, used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            CallCenterEvent::NewCall { .. } => "new_call",
            CallCenterEvent::Blocked { .. } => "blocked",
            CallCenterEvent::Delayed { .. } => "delayed",
            CallCenterEvent::Abandoned { .. } => "abandoned",
            CallCenterEvent::Served { .. } => "served",
            CallCenterEvent::DialAttempt { .. } => "dial_attempt",
            CallCenterEvent::BusyAgentsChanged { .. } => "busy_agents_changed",
            CallCenterEvent::WorkingAgentsChanged { .. } => "working_agents_changed",
            CallCenterEvent::QueueSizeChanged { .. } => "queue_size_changed",
        }
    }
}

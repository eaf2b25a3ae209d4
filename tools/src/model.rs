//! A small synthetic call center: Poisson arrivals, exponential service
//! and patience, one FIFO queue per agent group, plus a blind dialer for
//! outbound types. It exists only to feed events to the statistics engine.
//!
//! RULE: The model talks to the statistics engine only through
//! `CallCenterEvent`s handed to the measure manager.

use crate::rng::ReplicationRng;
use ccstat_core::{
    config::CallCenterConfig,
    event::{CallCenterEvent, CallRecord, DialOutcome},
    manager::CallCenterMeasureManager,
    types::SimTime,
};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    /// Arrival rate of each inbound type.
    pub arrival_rates: Vec<f64>,
    /// Dial rate of each outbound type.
    #[serde(default)]
    pub dial_rates: Vec<f64>,
    pub service_rate: f64,
    pub patience_rate: f64,
    /// Agents staffed in each group.
    pub agents: Vec<u32>,
    /// Waiting room per queue; arrivals beyond it are blocked.
    pub queue_capacity: usize,
    #[serde(default = "default_right_party")]
    pub right_party_probability: f64,
    #[serde(default = "default_wrong_party")]
    pub wrong_party_probability: f64,
}

fn default_right_party() -> f64 {
    0.4
}

fn default_wrong_party() -> f64 {
    0.2
}

impl ModelParams {
    /// Two inbound types, one outbound type, two groups.
    pub fn default_demo() -> Self {
        Self {
            arrival_rates: vec![0.8, 0.5],
            dial_rates: vec![0.2],
            service_rate: 0.25,
            patience_rate: 0.02,
            agents: vec![3, 3],
            queue_capacity: 20,
            right_party_probability: default_right_party(),
            wrong_party_probability: default_wrong_party(),
        }
    }

    /// The model must match the cardinalities the statistics are laid out for.
    pub fn validate(&self, config: &CallCenterConfig) -> anyhow::Result<()> {
        if self.arrival_rates.len() != config.num_inbound_types {
            anyhow::bail!(
                "{} arrival rates for {} inbound types",
                self.arrival_rates.len(),
                config.num_inbound_types
            );
        }
        if self.dial_rates.len() > config.num_outbound_types {
            anyhow::bail!(
                "{} dial rates for {} outbound types",
                self.dial_rates.len(),
                config.num_outbound_types
            );
        }
        if self.agents.len() != config.num_agent_groups || config.num_queues < self.agents.len() {
            anyhow::bail!(
                "model needs one queue per group: {} groups staffed, {} groups and {} queues configured",
                self.agents.len(),
                config.num_agent_groups,
                config.num_queues
            );
        }
        if !(self.service_rate > 0.0) {
            anyhow::bail!("service_rate must be positive");
        }
        Ok(())
    }

    /// Inbound type `k` is routed to group `k % groups`.
    fn group_of(&self, contact_type: usize) -> usize {
        contact_type % self.agents.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    Arrival { contact_type: usize },
    Dial { outbound: usize },
    ServiceEnd { group: usize },
    PatienceEnd { call: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    time: SimTime,
    seq: u64,
    action: Action,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    /// Reversed so `BinaryHeap` pops the earliest event first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone)]
struct Waiting {
    id: u64,
    record: CallRecord,
}

/// Counters of what one replication produced, for the run log.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplicationSummary {
    pub replication: u64,
    pub arrivals: u64,
    pub served: u64,
    pub abandoned: u64,
    pub blocked: u64,
    pub dials: u64,
}

struct CallCenterSim<'a> {
    params: &'a ModelParams,
    num_inbound: usize,
    rng: ReplicationRng,
    calendar: BinaryHeap<Scheduled>,
    seq: u64,
    busy: Vec<u32>,
    queues: Vec<VecDeque<Waiting>>,
    in_service: Vec<Vec<CallRecord>>,
    summary: ReplicationSummary,
}

impl<'a> CallCenterSim<'a> {
    fn schedule(&mut self, time: SimTime, action: Action) {
        if time.is_finite() {
            self.seq += 1;
            self.calendar.push(Scheduled {
                time,
                seq: self.seq,
                action,
            });
        }
    }

    fn emit(&self, manager: &mut CallCenterMeasureManager, event: CallCenterEvent) {
        log::trace!("replication {}: {}", self.summary.replication, event.name());
        manager.handle(&event);
    }

    fn start_service(
        &mut self,
        mut record: CallRecord,
        group: usize,
        now: SimTime,
        manager: &mut CallCenterMeasureManager,
    ) {
        record.queue_time = now - record.arrival_time;
        record.agent_group = Some(group);
        record.service_time = self.rng.exponential(self.params.service_rate);
        self.busy[group] += 1;
        let busy = self.busy[group];
        self.emit(manager, CallCenterEvent::BusyAgentsChanged { time: now, group, busy });
        let end = now + record.service_time;
        self.in_service[group].push(record);
        self.schedule(end, Action::ServiceEnd { group });
    }

    fn queue_changed(&self, queue: usize, now: SimTime, manager: &mut CallCenterMeasureManager) {
        let size = self.queues[queue].len() as u32;
        self.emit(manager, CallCenterEvent::QueueSizeChanged { time: now, queue, size });
    }

    fn arrival(&mut self, contact_type: usize, now: SimTime, horizon: SimTime, manager: &mut CallCenterMeasureManager) {
        let next = now + self.rng.exponential(self.params.arrival_rates[contact_type]);
        if next < horizon {
            self.schedule(next, Action::Arrival { contact_type });
        }
        self.summary.arrivals += 1;
        let group = self.params.group_of(contact_type);
        let record = CallRecord::new(contact_type, now).in_queue(group);
        self.emit(manager, CallCenterEvent::NewCall { call: record.clone() });

        if self.busy[group] < self.params.agents[group] {
            self.start_service(record, group, now, manager);
            return;
        }
        if self.queues[group].len() >= self.params.queue_capacity {
            self.summary.blocked += 1;
            self.emit(manager, CallCenterEvent::Blocked { call: record });
            return;
        }
        self.emit(manager, CallCenterEvent::Delayed { call: record.clone() });
        self.seq += 1;
        let id = self.seq;
        self.queues[group].push_back(Waiting { id, record });
        self.queue_changed(group, now, manager);
        let patience = self.rng.exponential(self.params.patience_rate);
        self.schedule(now + patience, Action::PatienceEnd { call: id });
    }

    fn service_end(&mut self, group: usize, now: SimTime, manager: &mut CallCenterMeasureManager) {
        // Exponential services: which call finishes is irrelevant to the
        // statistics as long as its own record is reported.
        let pos = self.in_service[group]
            .iter()
            .position(|r| (r.arrival_time + r.queue_time + r.service_time - now).abs() < 1e-9)
            .unwrap_or(0);
        if self.in_service[group].is_empty() {
            log::warn!("service end in idle group {group}");
            return;
        }
        let record = self.in_service[group].swap_remove(pos);
        self.summary.served += 1;
        self.emit(manager, CallCenterEvent::Served { call: record });
        self.busy[group] -= 1;
        let busy = self.busy[group];
        self.emit(manager, CallCenterEvent::BusyAgentsChanged { time: now, group, busy });

        if let Some(next) = self.queues[group].pop_front() {
            self.queue_changed(group, now, manager);
            self.start_service(next.record, group, now, manager);
        }
    }

    fn patience_end(&mut self, call: u64, now: SimTime, manager: &mut CallCenterMeasureManager) {
        for q in 0..self.queues.len() {
            if let Some(pos) = self.queues[q].iter().position(|w| w.id == call) {
                if let Some(w) = self.queues[q].remove(pos) {
                    let record = w.record.clone().waited(now - w.record.arrival_time);
                    self.summary.abandoned += 1;
                    self.emit(manager, CallCenterEvent::Abandoned { call: record });
                    self.queue_changed(q, now, manager);
                }
                return;
            }
        }
    }

    fn dial(&mut self, outbound: usize, now: SimTime, horizon: SimTime, manager: &mut CallCenterMeasureManager) {
        let next = now + self.rng.exponential(self.params.dial_rates[outbound]);
        if next < horizon {
            self.schedule(next, Action::Dial { outbound });
        }
        self.summary.dials += 1;
        let u = self.rng.next_f64();
        let outcome = if u < self.params.right_party_probability {
            DialOutcome::RightParty
        } else if u < self.params.right_party_probability + self.params.wrong_party_probability {
            DialOutcome::WrongParty
        } else {
            DialOutcome::Failed
        };
        let call = CallRecord::new(self.num_inbound + outbound, now);
        self.emit(manager, CallCenterEvent::DialAttempt { call, outcome });
    }
}

/// Run one replication over `[start, horizon)`, then drain the system.
/// The manager must be freshly initialized and registered.
pub fn run_replication(
    params: &ModelParams,
    rng: ReplicationRng,
    start: SimTime,
    horizon: SimTime,
    manager: &mut CallCenterMeasureManager,
) -> ReplicationSummary {
    let groups = params.agents.len();
    let mut sim = CallCenterSim {
        params,
        num_inbound: params.arrival_rates.len(),
        summary: ReplicationSummary {
            replication: rng.replication,
            ..ReplicationSummary::default()
        },
        rng,
        calendar: BinaryHeap::new(),
        seq: 0,
        busy: vec![0; groups],
        queues: vec![VecDeque::new(); groups],
        in_service: vec![Vec::new(); groups],
    };

    manager.update_current_period(start);
    for (group, &working) in params.agents.iter().enumerate() {
        sim.emit(manager, CallCenterEvent::WorkingAgentsChanged { time: start, group, working });
    }
    for k in 0..params.arrival_rates.len() {
        let first = start + sim.rng.exponential(params.arrival_rates[k]);
        if first < horizon {
            sim.schedule(first, Action::Arrival { contact_type: k });
        }
    }
    for j in 0..params.dial_rates.len() {
        let first = start + sim.rng.exponential(params.dial_rates[j]);
        if first < horizon {
            sim.schedule(first, Action::Dial { outbound: j });
        }
    }

    let mut now = start;
    while let Some(Scheduled { time, action, .. }) = sim.calendar.pop() {
        now = time;
        manager.update_current_period(now);
        match action {
            Action::Arrival { contact_type } => sim.arrival(contact_type, now, horizon, manager),
            Action::Dial { outbound } => sim.dial(outbound, now, horizon, manager),
            Action::ServiceEnd { group } => sim.service_end(group, now, manager),
            Action::PatienceEnd { call } => sim.patience_end(call, now, manager),
        }
    }
    manager.finish_current_period(now.max(horizon));
    sim.summary
}

//! Row layouts derived from the model cardinalities and segments.

use crate::{
    config::CallCenterConfig,
    measure_type::{MeasureType, RowType},
    segment::SegmentSet,
};

/// Cardinalities and segment sets for every row dimension.
///
/// Contact types are numbered inbound first: inbound type `k` is contact
/// type `k`, outbound type `j` is contact type `num_inbound + j`.
#[derive(Debug, Clone)]
pub struct ModelLayout {
    pub contact_types: SegmentSet,
    pub inbound_types: SegmentSet,
    pub outbound_types: SegmentSet,
    pub agent_groups: SegmentSet,
    pub queues: SegmentSet,
    awt_names: Vec<String>,
    type_group_stats: bool,
}

impl ModelLayout {
    pub fn new(config: &CallCenterConfig) -> Self {
        let ki = config.num_inbound_types;
        let outbound_excluded: Vec<usize> = config
            .excluded_types
            .iter()
            .filter(|&&t| t >= ki)
            .map(|&t| t - ki)
            .collect();
        Self {
            contact_types: SegmentSet::new(
                config.num_contact_types(),
                config.contact_type_segments.clone(),
                &config.excluded_types,
            ),
            inbound_types: SegmentSet::new(
                ki,
                config.inbound_type_segments.clone(),
                &config.excluded_types,
            ),
            outbound_types: SegmentSet::new(
                config.num_outbound_types,
                config.outbound_type_segments.clone(),
                &outbound_excluded,
            ),
            agent_groups: SegmentSet::new(
                config.num_agent_groups,
                config.agent_group_segments.clone(),
                &[],
            ),
            queues: SegmentSet::new(config.num_queues, config.queue_segments.clone(), &[]),
            awt_names: config.awt.iter().map(|a| a.name.clone()).collect(),
            type_group_stats: config.contact_type_agent_group_stats,
        }
    }

    pub fn num_inbound_types(&self) -> usize {
        self.inbound_types.base()
    }

    pub fn num_outbound_types(&self) -> usize {
        self.outbound_types.base()
    }

    pub fn num_contact_types(&self) -> usize {
        self.contact_types.base()
    }

    pub fn num_agent_groups(&self) -> usize {
        self.agent_groups.base()
    }

    pub fn num_queues(&self) -> usize {
        self.queues.base()
    }

    pub fn num_awt(&self) -> usize {
        self.awt_names.len().max(1)
    }

    pub fn is_inbound(&self, contact_type: usize) -> bool {
        contact_type < self.num_inbound_types()
    }

    /// Segment set of the subject dimension of `row_type`. For (type, group)
    /// row types this is the type dimension.
    pub fn segments(&self, row_type: RowType) -> &SegmentSet {
        match row_type {
            RowType::ContactType | RowType::ContactTypeAgentGroup => &self.contact_types,
            RowType::InboundType | RowType::InboundTypeAgentGroup | RowType::InboundTypeAwt => {
                &self.inbound_types
            }
            RowType::OutboundType | RowType::OutboundTypeAgentGroup => &self.outbound_types,
            RowType::AgentGroup => &self.agent_groups,
            RowType::WaitingQueue => &self.queues,
        }
    }

    /// Number of rows of a fully-shaped matrix, aggregates included.
    pub fn rows(&self, row_type: RowType) -> usize {
        let primary = self.segments(row_type).full_rows();
        if row_type.is_type_group() {
            primary * self.agent_groups.full_rows()
        } else if row_type == RowType::InboundTypeAwt {
            primary * self.num_awt()
        } else {
            primary
        }
    }

    /// Row type a measure's raw accumulator is indexed by.
    pub fn natural_row_type(&self, measure: MeasureType) -> RowType {
        match measure.row_type() {
            RowType::ContactTypeAgentGroup if !self.type_group_stats => RowType::ContactType,
            rt => rt,
        }
    }

    /// Row count of a measure's raw accumulator.
    ///
    /// Event-aggregated measures already carry their aggregate rows. Other
    /// measures hold base subjects only; (type, group) measures hold base
    /// types times full group rows.
    pub fn raw_rows(&self, measure: MeasureType) -> usize {
        let rt = self.natural_row_type(measure);
        if measure.info().aggregated_at_event {
            self.rows(rt)
        } else if rt.is_type_group() {
            self.segments(rt).base() * self.agent_groups.full_rows()
        } else {
            self.segments(rt).base()
        }
    }

    /// Human-readable name of a row of a fully-shaped matrix.
    pub fn row_name(&self, row_type: RowType, row: usize) -> String {
        let prefix = match row_type {
            RowType::AgentGroup => "group",
            RowType::WaitingQueue => "queue",
            RowType::OutboundType | RowType::OutboundTypeAgentGroup => "outbound",
            _ => "type",
        };
        let set = self.segments(row_type);
        if row_type.is_type_group() {
            let g = self.agent_groups.full_rows();
            format!(
                "{}/{}",
                set.row_name(row / g, prefix),
                self.agent_groups.row_name(row % g, "group")
            )
        } else if row_type == RowType::InboundTypeAwt {
            let k = set.full_rows();
            let awt = self
                .awt_names
                .get(row / k)
                .cloned()
                .unwrap_or_else(|| format!("awt{}", row / k));
            format!("{}@{awt}", set.row_name(row % k, prefix))
        } else {
            set.row_name(row, prefix)
        }
    }
}

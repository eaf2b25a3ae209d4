//! Reshaping cache: raw accumulator values to the row layout a performance
//! measure is expressed in.
//!
//! RULES:
//!   - The statistic builders clear the cache at the start of every pass.
//!   - Conversions between row types follow `TRANSITIONS`, searched
//!     breadth-first in table order, so the chosen chain never depends on
//!     which matrices happen to be cached.

use crate::{
    error::{StatError, StatResult},
    layout::ModelLayout,
    manager::CallCenterMeasureManager,
    matrix::{CombineOp, Matrix},
    measure_type::{MeasureType, RowType},
    segment::SegmentSet,
};
use std::collections::{HashMap, VecDeque};

/// One step between two row types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Contact types to inbound types; aggregates recomputed.
    NarrowToInbound,
    /// Contact types to outbound types; aggregates recomputed.
    NarrowToOutbound,
    /// (type, group) to type, keeping the "all groups" row of each block.
    SelectAllGroups,
    NarrowTypeGroupToInbound,
    NarrowTypeGroupToOutbound,
    /// Type to (type, group), replicating each row once per group row.
    WidenToTypeGroup,
    /// (type, group) to group, keeping the "all types" block.
    SelectAllTypes,
    /// Inbound types repeated once per AWT definition.
    DuplicatePerAwt,
}

use RowType as R;
use Transform as T;

/// Conversion table, in search order.
pub const TRANSITIONS: [(RowType, RowType, Transform); 12] = [
    (R::ContactType, R::InboundType, T::NarrowToInbound),
    (R::ContactType, R::OutboundType, T::NarrowToOutbound),
    (R::ContactTypeAgentGroup, R::ContactType, T::SelectAllGroups),
    (R::InboundTypeAgentGroup, R::InboundType, T::SelectAllGroups),
    (R::OutboundTypeAgentGroup, R::OutboundType, T::SelectAllGroups),
    (R::ContactTypeAgentGroup, R::InboundTypeAgentGroup, T::NarrowTypeGroupToInbound),
    (R::ContactTypeAgentGroup, R::OutboundTypeAgentGroup, T::NarrowTypeGroupToOutbound),
    (R::ContactType, R::ContactTypeAgentGroup, T::WidenToTypeGroup),
    (R::InboundType, R::InboundTypeAgentGroup, T::WidenToTypeGroup),
    (R::OutboundType, R::OutboundTypeAgentGroup, T::WidenToTypeGroup),
    (R::ContactTypeAgentGroup, R::AgentGroup, T::SelectAllTypes),
    (R::InboundType, R::InboundTypeAwt, T::DuplicatePerAwt),
];

/// Shortest transform chain from `from` to `to`.
pub fn plan(from: RowType, to: RowType) -> StatResult<Vec<(Transform, RowType)>> {
    let mut parent: HashMap<RowType, (RowType, Transform)> = HashMap::new();
    let mut queue = VecDeque::from([from]);
    while let Some(rt) = queue.pop_front() {
        if rt == to {
            break;
        }
        for &(src, dst, t) in &TRANSITIONS {
            if src == rt && dst != from && !parent.contains_key(&dst) {
                parent.insert(dst, (src, t));
                queue.push_back(dst);
            }
        }
    }
    if from != to && !parent.contains_key(&to) {
        return Err(StatError::NoReshapePath {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    let mut steps = Vec::new();
    let mut at = to;
    while at != from {
        let (prev, t) = parent[&at];
        steps.push((t, at));
        at = prev;
    }
    steps.reverse();
    Ok(steps)
}

impl Transform {
    /// Apply to a fully-shaped matrix of the source row type.
    pub fn apply(self, m: &Matrix, layout: &ModelLayout, op: CombineOp) -> Matrix {
        let groups = layout.agent_groups.full_rows();
        let ki = layout.num_inbound_types();
        let k = layout.num_contact_types();
        match self {
            T::NarrowToInbound => {
                let rows: Vec<usize> = (0..ki).collect();
                layout.inbound_types.with_aggregates(&m.select_rows(&rows), op)
            }
            T::NarrowToOutbound => {
                let rows: Vec<usize> = (ki..k).collect();
                layout.outbound_types.with_aggregates(&m.select_rows(&rows), op)
            }
            T::NarrowTypeGroupToInbound => {
                let rows: Vec<usize> = (0..ki * groups).collect();
                layout
                    .inbound_types
                    .with_aggregate_blocks(&m.select_rows(&rows), groups, op)
            }
            T::NarrowTypeGroupToOutbound => {
                let rows: Vec<usize> = (ki * groups..k * groups).collect();
                layout
                    .outbound_types
                    .with_aggregate_blocks(&m.select_rows(&rows), groups, op)
            }
            T::SelectAllGroups => {
                let g = layout.agent_groups.total_row();
                let rows: Vec<usize> = (0..m.rows() / groups).map(|t| t * groups + g).collect();
                m.select_rows(&rows)
            }
            T::WidenToTypeGroup => {
                let rows: Vec<usize> = (0..m.rows())
                    .flat_map(|r| std::iter::repeat(r).take(groups))
                    .collect();
                m.select_rows(&rows)
            }
            T::SelectAllTypes => {
                let t = layout.contact_types.total_row();
                let rows: Vec<usize> = (t * groups..(t + 1) * groups).collect();
                m.select_rows(&rows)
            }
            T::DuplicatePerAwt => {
                let rows: Vec<usize> = (0..layout.num_awt()).flat_map(|_| 0..m.rows()).collect();
                m.select_rows(&rows)
            }
        }
    }
}

/// Per-pass memo of reshaped matrices, keyed by (measure, row type).
#[derive(Debug, Default)]
pub struct MatrixCache {
    entries: HashMap<(MeasureType, RowType), Matrix>,
}

impl MatrixCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Values of `mt` shaped for `target`, aggregate rows included.
    pub fn get_matrix(
        &mut self,
        manager: &CallCenterMeasureManager,
        mt: MeasureType,
        target: RowType,
    ) -> StatResult<&Matrix> {
        if !self.entries.contains_key(&(mt, target)) {
            self.fill(manager, mt, target)?;
        }
        Ok(&self.entries[&(mt, target)])
    }

    fn fill(
        &mut self,
        manager: &CallCenterMeasureManager,
        mt: MeasureType,
        target: RowType,
    ) -> StatResult<()> {
        let layout = manager.layout();
        let natural = layout.natural_row_type(mt);
        // Plan first: an unreachable target fails before any work.
        let steps = plan(natural, target)?;
        log::debug!("cache miss: {mt} as {target} ({} steps)", steps.len());

        if !self.entries.contains_key(&(mt, natural)) {
            let raw = manager.get_values(mt, true)?;
            let shaped = augment(layout, mt, natural, &raw);
            self.entries.insert((mt, natural), shaped);
        }
        let mut at = natural;
        for (t, next) in steps {
            if !self.entries.contains_key(&(mt, next)) {
                let converted = t.apply(&self.entries[&(mt, at)], layout, mt.op());
                self.entries.insert((mt, next), converted);
            }
            at = next;
        }
        Ok(())
    }

    /// Diagnostic pass over cached matrices: every aggregate row must be
    /// the fold of its members, and no value may be negative beyond
    /// `tolerance`. Returns one message per violation.
    pub fn check_consistency(&self, layout: &ModelLayout, tolerance: f64) -> Vec<String> {
        let mut issues = Vec::new();
        for (&(mt, rt), m) in &self.entries {
            if let Some(v) = m.values().iter().find(|&&v| v < -tolerance) {
                issues.push(format!("{mt} as {rt}: negative value {v}"));
            }
            // Event-maintained aggregates (AWT thresholds, peaks of sums)
            // are not folds of their members.
            if mt.info().aggregated_at_event || rt == RowType::InboundTypeAwt {
                continue;
            }
            let op = mt.op();
            if rt.is_type_group() {
                let groups = layout.agent_groups.full_rows();
                check_blocks(m, layout.segments(rt), groups, op, tolerance, &mut |row: usize, msg: String| {
                    issues.push(format!("{mt} as {rt}, row {row}: {msg}"))
                });
                // Widened rows repeat one value per group; nothing to fold.
                if !layout.natural_row_type(mt).is_type_group() {
                    continue;
                }
                for t in 0..m.rows() / groups {
                    let block = m.select_rows(&(t * groups..(t + 1) * groups).collect::<Vec<_>>());
                    check_blocks(&block, &layout.agent_groups, 1, op, tolerance, &mut |row: usize, msg: String| {
                        issues.push(format!("{mt} as {rt}, row {}: {msg}", t * groups + row))
                    });
                }
            } else {
                check_blocks(m, layout.segments(rt), 1, op, tolerance, &mut |row: usize, msg: String| {
                    issues.push(format!("{mt} as {rt}, row {row}: {msg}"))
                });
            }
        }
        for issue in &issues {
            log::warn!("consistency: {issue}");
        }
        issues
    }
}

/// Add the aggregate rows a raw matrix lacks.
fn augment(layout: &ModelLayout, mt: MeasureType, natural: RowType, raw: &Matrix) -> Matrix {
    if mt.info().aggregated_at_event {
        return raw.clone();
    }
    let set = layout.segments(natural);
    if natural.is_type_group() {
        set.with_aggregate_blocks(raw, layout.agent_groups.full_rows(), mt.op())
    } else {
        set.with_aggregates(raw, mt.op())
    }
}

fn check_blocks(
    m: &Matrix,
    set: &SegmentSet,
    block: usize,
    op: CombineOp,
    tolerance: f64,
    report: &mut dyn FnMut(usize, String),
) {
    if m.rows() != set.full_rows() * block {
        report(0, format!("{} rows, expected {}", m.rows(), set.full_rows() * block));
        return;
    }
    let base_rows = set.base() * block;
    let base = m.select_rows(&(0..base_rows).collect::<Vec<_>>());
    let expected = set.aggregate_blocks(&base, block, op);
    for r in 0..expected.rows() {
        for c in 0..m.cols() {
            let (got, want) = (m.get(base_rows + r, c), expected.get(r, c));
            if (got - want).abs() > tolerance * want.abs().max(1.0) {
                report(base_rows + r, format!("column {c} holds {got}, members give {want}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_follow_table_order() {
        assert!(plan(R::ContactType, R::ContactType).unwrap().is_empty());
        let steps: Vec<Transform> = plan(R::ContactType, R::InboundTypeAwt)
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        assert_eq!(steps, vec![T::NarrowToInbound, T::DuplicatePerAwt]);
        let steps: Vec<RowType> = plan(R::ContactTypeAgentGroup, R::InboundType)
            .unwrap()
            .into_iter()
            .map(|(_, rt)| rt)
            .collect();
        assert_eq!(steps, vec![R::ContactType, R::InboundType]);
    }

    #[test]
    fn unreachable_row_type_is_an_error() {
        let err = plan(R::AgentGroup, R::ContactType).unwrap_err();
        assert!(matches!(err, StatError::NoReshapePath { .. }));
        assert!(plan(R::InboundTypeAwt, R::InboundType).is_err());
    }

    #[test]
    fn transforms_reshape_default_model() {
        use crate::config::CallCenterConfig;
        let layout = ModelLayout::new(&CallCenterConfig::default_test());
        // 3 contact types + all, one column.
        let ct = Matrix::from_rows(vec![vec![1.0], vec![2.0], vec![4.0], vec![7.0]]).unwrap();
        let inbound = T::NarrowToInbound.apply(&ct, &layout, CombineOp::Sum);
        assert_eq!(inbound.column(0), vec![1.0, 2.0, 3.0]);
        let outbound = T::NarrowToOutbound.apply(&ct, &layout, CombineOp::Sum);
        assert_eq!(outbound.column(0), vec![4.0]);
        let wide = T::WidenToTypeGroup.apply(&ct, &layout, CombineOp::Sum);
        assert_eq!(wide.rows(), 12);
        assert_eq!(wide.get(5, 0), 2.0);
        let back = T::SelectAllGroups.apply(&wide, &layout, CombineOp::Sum);
        assert_eq!(back, ct);
        let per_group = T::SelectAllTypes.apply(&wide, &layout, CombineOp::Sum);
        assert_eq!(per_group.column(0), vec![7.0, 7.0, 7.0]);
    }
}

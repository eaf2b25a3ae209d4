use crate::{
    error::{StatError, StatResult},
    performance::PerformanceMeasure,
    segment::Segment,
    types::SimTime,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One acceptable-waiting-time threshold table.
///
/// Rows follow the inbound-type layout (types, user segments, all);
/// columns follow the statistics-facing period layout. Cells without an
/// override use `default`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwtDefinition {
    pub name: String,
    pub default: f64,
    #[serde(default)]
    pub overrides: Vec<AwtOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwtOverride {
    pub row: usize,
    pub column: usize,
    pub value: f64,
}

impl AwtDefinition {
    pub fn uniform(name: impl Into<String>, threshold: f64) -> Self {
        Self {
            name: name.into(),
            default: threshold,
            overrides: Vec::new(),
        }
    }

    pub fn with_override(mut self, row: usize, column: usize, value: f64) -> Self {
        self.overrides.push(AwtOverride { row, column, value });
        self
    }

    pub fn threshold(&self, row: usize, column: usize) -> f64 {
        self.overrides
            .iter()
            .rev()
            .find(|o| o.row == row && o.column == column)
            .map_or(self.default, |o| o.value)
    }
}

/// How completed calls are mapped to statistical periods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeriodMode {
    /// Independent replications over `num_main_periods` main periods.
    #[default]
    Main,
    /// One long run observed after `warmup`.
    SteadyState { warmup: SimTime },
    /// Only the `num_windows` most recent windows are retained.
    SlidingWindow { num_windows: usize, window_size: SimTime },
}

fn default_unit() -> f64 {
    1.0
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallCenterConfig {
    pub num_inbound_types: usize,
    #[serde(default)]
    pub num_outbound_types: usize,
    pub num_agent_groups: usize,
    #[serde(default)]
    pub num_queues: usize,

    pub period_start: SimTime,
    pub period_duration: SimTime,
    pub num_main_periods: usize,
    #[serde(default)]
    pub period_mode: PeriodMode,
    #[serde(default)]
    pub period_segments: Vec<Segment>,

    #[serde(default)]
    pub contact_type_segments: Vec<Segment>,
    #[serde(default)]
    pub inbound_type_segments: Vec<Segment>,
    #[serde(default)]
    pub outbound_type_segments: Vec<Segment>,
    #[serde(default)]
    pub agent_group_segments: Vec<Segment>,
    #[serde(default)]
    pub queue_segments: Vec<Segment>,
    /// Contact types left out of every "all types" aggregate row.
    #[serde(default)]
    pub excluded_types: Vec<usize>,

    #[serde(default)]
    pub awt: Vec<AwtDefinition>,
    /// Count AWT measures per period segment with the segment's own thresholds.
    #[serde(default = "yes")]
    pub awt_segment_breakdown: bool,

    /// Divide conditionally-normalized measures by period length.
    #[serde(default)]
    pub normalize_to_default_unit: bool,
    #[serde(default = "default_unit")]
    pub default_unit: SimTime,

    /// Keep served-call measures per (type, group) instead of per type.
    #[serde(default = "yes")]
    pub contact_type_agent_group_stats: bool,

    /// Per-measure value reported for 0/0 ratios.
    #[serde(default)]
    pub zero_over_zero: BTreeMap<PerformanceMeasure, f64>,
}

impl CallCenterConfig {
    /// Load a model description from a JSON file.
    /// In tests, use CallCenterConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: CallCenterConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn num_contact_types(&self) -> usize {
        self.num_inbound_types + self.num_outbound_types
    }

    pub fn is_inbound(&self, contact_type: usize) -> bool {
        contact_type < self.num_inbound_types
    }

    pub fn validate(&self) -> StatResult<()> {
        let invalid = |msg: String| Err(StatError::InvalidConfig(msg));
        if self.num_contact_types() == 0 {
            return invalid("at least one contact type is required".into());
        }
        if self.num_agent_groups == 0 {
            return invalid("at least one agent group is required".into());
        }
        if self.num_main_periods == 0 {
            return invalid("num_main_periods must be positive".into());
        }
        if !(self.period_duration > 0.0) {
            return invalid(format!(
                "period_duration must be positive, got {}",
                self.period_duration
            ));
        }
        if !(self.default_unit > 0.0) {
            return invalid(format!("default_unit must be positive, got {}", self.default_unit));
        }
        if let PeriodMode::SlidingWindow {
            num_windows,
            window_size,
        } = self.period_mode
        {
            if num_windows == 0 || !(window_size > 0.0) {
                return invalid("sliding windows need num_windows > 0 and window_size > 0".into());
            }
        }
        if self.num_inbound_types > 0 && self.awt.is_empty() {
            return invalid("inbound contact types need at least one AWT definition".into());
        }
        for def in &self.awt {
            if def.default < 0.0 || def.overrides.iter().any(|o| o.value < 0.0) {
                return invalid(format!("AWT definition '{}' has a negative threshold", def.name));
            }
        }

        let checks: [(&str, &[Segment], usize); 6] = [
            ("period", self.period_segments.as_slice(), self.num_main_periods),
            ("contact type", self.contact_type_segments.as_slice(), self.num_contact_types()),
            ("inbound type", self.inbound_type_segments.as_slice(), self.num_inbound_types),
            ("outbound type", self.outbound_type_segments.as_slice(), self.num_outbound_types),
            ("agent group", self.agent_group_segments.as_slice(), self.num_agent_groups),
            ("queue", self.queue_segments.as_slice(), self.num_queues),
        ];
        for (kind, segments, universe) in checks {
            for seg in segments {
                if let Some(bad) = seg.members.iter().find(|&&m| m >= universe) {
                    return invalid(format!(
                        "{kind} segment '{}' references index {bad} outside 0..{universe}",
                        seg.name
                    ));
                }
            }
        }
        if let Some(bad) = self
            .excluded_types
            .iter()
            .find(|&&t| t >= self.num_contact_types())
        {
            return invalid(format!("excluded type {bad} does not exist"));
        }
        Ok(())
    }

    /// Two inbound types, one outbound type, two groups and three periods.
    /// Hardcoded values for tests.
    pub fn default_test() -> Self {
        Self {
            num_inbound_types: 2,
            num_outbound_types: 1,
            num_agent_groups: 2,
            num_queues: 2,
            period_start: 0.0,
            period_duration: 60.0,
            num_main_periods: 3,
            period_mode: PeriodMode::Main,
            period_segments: vec![Segment::new("morning", vec![0, 1])],
            contact_type_segments: Vec::new(),
            inbound_type_segments: Vec::new(),
            outbound_type_segments: Vec::new(),
            agent_group_segments: Vec::new(),
            queue_segments: Vec::new(),
            excluded_types: Vec::new(),
            awt: vec![AwtDefinition::uniform("awt20", 20.0)],
            awt_segment_breakdown: true,
            normalize_to_default_unit: false,
            default_unit: 1.0,
            contact_type_agent_group_stats: true,
            zero_over_zero: BTreeMap::new(),
        }
    }

    /// One type, one group, one period. The smallest meaningful model.
    pub fn single_queue(awt: f64) -> Self {
        Self {
            num_inbound_types: 1,
            num_outbound_types: 0,
            num_agent_groups: 1,
            num_queues: 1,
            num_main_periods: 1,
            period_segments: Vec::new(),
            awt: vec![AwtDefinition::uniform("awt", awt)],
            ..Self::default_test()
        }
    }
}

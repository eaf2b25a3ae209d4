//! stat-runner: runs independent replications of a synthetic call center
//! and reports performance-measure estimates with confidence intervals.
//!
//! Usage:
//!   stat-runner --seed 12345 --replications 30
//!   stat-runner --config data/model.json --level 0.9 --json
//!   stat-runner --measures service_level,abandonment_ratio

mod model;
mod rng;

use anyhow::Result;
use ccstat_core::{
    cache::MatrixCache,
    callcenter_stat::{CallCenterStatProbes, SimCallCenterStat},
    config::{CallCenterConfig, PeriodMode},
    manager::CallCenterMeasureManager,
    matrix::Matrix,
    performance::{PerformanceMeasure, PerformanceMeasureTable},
    types::SimTime,
};
use model::{ModelParams, ReplicationSummary};
use rng::ReplicationRng;
use serde::{Deserialize, Serialize};
use std::env;

/// Contents of a `--config` file.
#[derive(Debug, Deserialize)]
struct RunConfig {
    stats: CallCenterConfig,
    model: ModelParams,
    /// End of arrivals; derived from the period layout when absent.
    #[serde(default)]
    horizon: Option<SimTime>,
}

impl RunConfig {
    fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let run: RunConfig = serde_json::from_str(&content)?;
        run.stats.validate()?;
        run.model.validate(&run.stats)?;
        Ok(run)
    }

    fn demo() -> Self {
        Self {
            stats: CallCenterConfig::default_test(),
            model: ModelParams::default_demo(),
            horizon: None,
        }
    }

    fn horizon(&self) -> SimTime {
        if let Some(h) = self.horizon {
            return h;
        }
        let cfg = &self.stats;
        let observed = cfg.period_duration * cfg.num_main_periods as f64;
        match cfg.period_mode {
            PeriodMode::Main => cfg.period_start + observed,
            PeriodMode::SteadyState { warmup } => warmup + observed,
            PeriodMode::SlidingWindow { num_windows, window_size } => {
                cfg.period_start + window_size * num_windows as f64
            }
        }
    }
}

#[derive(Serialize)]
struct MeasureReport {
    measure: PerformanceMeasure,
    observations: u64,
    rows: Vec<String>,
    columns: Vec<String>,
    average: Vec<Vec<f64>>,
    lower: Vec<Vec<f64>>,
    upper: Vec<Vec<f64>>,
}

#[derive(Serialize)]
struct RunReport {
    seed: u64,
    replications: u64,
    level: f64,
    last_replication: ReplicationSummary,
    measures: Vec<MeasureReport>,
    not_available: Vec<PerformanceMeasure>,
}

const DEFAULT_MEASURES: [PerformanceMeasure; 8] = [
    PerformanceMeasure::RateOfArrivals,
    PerformanceMeasure::ServiceLevel,
    PerformanceMeasure::AbandonmentRatio,
    PerformanceMeasure::SpeedOfAnswer,
    PerformanceMeasure::Occupancy,
    PerformanceMeasure::AvgQueueSize,
    PerformanceMeasure::MaxQueueSize,
    PerformanceMeasure::RightPartyConnectRatio,
];

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let replications = parse_arg(&args, "--replications", 20u64);
    let level = parse_arg(&args, "--level", 0.95f64);
    let json = args.iter().any(|a| a == "--json");
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| w[1].as_str());
    let measures = match args.windows(2).find(|w| w[0] == "--measures") {
        Some(w) if w[1] == "all" => PerformanceMeasure::ALL.to_vec(),
        Some(w) => w[1]
            .split(',')
            .map(|name| name.trim().parse())
            .collect::<Result<Vec<PerformanceMeasure>, _>>()?,
        None => DEFAULT_MEASURES.to_vec(),
    };
    if replications < 2 {
        anyhow::bail!("--replications must be at least 2 for confidence intervals");
    }
    if !(level > 0.0 && level < 1.0) {
        anyhow::bail!("--level must lie in (0, 1), got {level}");
    }

    let run = match config_path {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::demo(),
    };
    let horizon = run.horizon();

    if !json {
        println!("Call center statistics: stat-runner");
        println!("  seed:          {seed}");
        println!("  replications:  {replications}");
        println!("  config:        {}", config_path.unwrap_or("(built-in demo)"));
        println!("  horizon:       {horizon}");
        println!("  level:         {level}");
        println!();
    }

    let table = PerformanceMeasureTable::new()?;
    let mut manager = CallCenterMeasureManager::with_performance_measures(&run.stats, &measures, &table)?;
    let mut stat = SimCallCenterStat::new(&manager, &table, &measures);
    let mut cache = MatrixCache::new();

    let mut summaries = Vec::with_capacity(replications as usize);
    for r in 0..replications {
        manager.init_measure_matrices();
        manager.register_listeners();
        let rng = ReplicationRng::new(seed, r);
        let last = model::run_replication(&run.model, rng, run.stats.period_start, horizon, &mut manager);
        stat.add_observations(&manager, &mut cache)?;
        log::info!(
            "replication {r}: {} arrivals, {} served, {} abandoned, {} blocked",
            last.arrivals,
            last.served,
            last.abandoned,
            last.blocked
        );
        summaries.push(last);
    }
    let last = summaries.pop().unwrap_or_default();

    let report = build_report(&manager, &stat, &table, &measures, seed, replications, level, last)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_report(
    manager: &CallCenterMeasureManager,
    stat: &SimCallCenterStat,
    table: &PerformanceMeasureTable,
    measures: &[PerformanceMeasure],
    seed: u64,
    replications: u64,
    level: f64,
    last_replication: ReplicationSummary,
) -> Result<RunReport> {
    let strategy = manager.strategy();
    let columns: Vec<String> = (0..manager.num_stat_columns())
        .map(|c| strategy.column_name(c))
        .collect();
    let rows_of = |m: &Matrix| -> Vec<Vec<f64>> {
        (0..m.rows()).map(|r| m.row(r).to_vec()).collect()
    };

    let mut reports = Vec::new();
    let mut not_available = Vec::new();
    for &pm in measures {
        if stat.is_not_available(pm) {
            not_available.push(pm);
            continue;
        }
        let row_type = table.get(pm).row_type;
        let average = stat.average_with_total(manager, pm)?;
        let (lower, upper) = stat.confidence_interval(pm, level)?;
        reports.push(MeasureReport {
            measure: pm,
            observations: stat.num_observations(pm)?,
            rows: (0..average.rows())
                .map(|r| manager.layout().row_name(row_type, r))
                .collect(),
            columns: columns.clone(),
            average: rows_of(&average),
            lower: rows_of(&lower),
            upper: rows_of(&upper),
        });
    }
    Ok(RunReport {
        seed,
        replications,
        level,
        last_replication,
        measures: reports,
        not_available,
    })
}

fn print_summary(report: &RunReport) {
    println!("=== LAST REPLICATION ===");
    let last = &report.last_replication;
    println!("  arrivals:   {}", last.arrivals);
    println!("  served:     {}", last.served);
    println!("  abandoned:  {}", last.abandoned);
    println!("  blocked:    {}", last.blocked);
    println!("  dials:      {}", last.dials);

    for m in &report.measures {
        println!();
        println!(
            "=== {} ({} observations, {:.0}% CI) ===",
            m.measure,
            m.observations,
            report.level * 100.0
        );
        let Some(total) = m.columns.len().checked_sub(1) else {
            continue;
        };
        for (r, name) in m.rows.iter().enumerate() {
            println!(
                "  {name:<24} {:>10}: {:>10.4}  [{:.4}, {:.4}]",
                m.columns[total], m.average[r][total], m.lower[r][total], m.upper[r][total]
            );
        }
    }
    if !report.not_available.is_empty() {
        println!();
        let names: Vec<&str> = report.not_available.iter().map(|pm| pm.name()).collect();
        println!("  not available: {}", names.join(", "));
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

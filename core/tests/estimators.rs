//! Statistic builders: ratio fallbacks, availability, estimation kinds,
//! sources of sources and cross-measure covariances.

use ccstat_core::{
    cache::MatrixCache,
    callcenter_stat::{
        CallCenterStatProbes, ChainCallCenterStat, CovFMMCallCenterStat, SimCallCenterStat,
        StatCallCenterStat,
    },
    config::CallCenterConfig,
    error::StatError,
    event::{CallCenterEvent, CallRecord},
    manager::CallCenterMeasureManager,
    measure_type::MeasureType,
    performance::{PerformanceMeasure as PM, PerformanceMeasureTable},
    tally::{RatioTally, RatioTallyMatrix},
    matrix::Matrix,
};

fn build_table() -> PerformanceMeasureTable {
    PerformanceMeasureTable::new().expect("built-in table")
}

fn build_manager(cfg: &CallCenterConfig, pms: &[PM], table: &PerformanceMeasureTable) -> CallCenterMeasureManager {
    let mut manager =
        CallCenterMeasureManager::with_performance_measures(cfg, pms, table).expect("manager");
    manager.init_measure_matrices();
    manager.register_listeners();
    manager
}

/// One replication of the single-queue model: `arrivals` calls, the first
/// `abandoned` abandon, the next `blocked` are blocked, the rest are served.
fn replicate(manager: &mut CallCenterMeasureManager, arrivals: usize, abandoned: usize, blocked: usize) {
    manager.init_measure_matrices();
    manager.update_current_period(0.0);
    for i in 0..arrivals {
        let t = i as f64 * 0.5;
        manager.update_current_period(t);
        let call = CallRecord::new(0, t).in_queue(0);
        manager.handle(&CallCenterEvent::NewCall { call: call.clone() });
        if i < abandoned {
            manager.handle(&CallCenterEvent::Abandoned { call: call.waited(1.0) });
        } else if i < abandoned + blocked {
            manager.handle(&CallCenterEvent::Blocked { call });
        } else {
            manager.handle(&CallCenterEvent::Served { call: call.waited(0.5).served_by(0, 2.0) });
        }
    }
    manager.finish_current_period(60.0);
}

#[test]
fn zero_over_zero_uses_the_fallback_not_nan() {
    let mut t = RatioTally::new(0.25);
    t.add(0.0, 0.0);
    assert_eq!(t.average(), 0.25);
    assert_eq!(t.min(), 0.25);

    let mut m = RatioTallyMatrix::new(1, 2, 0.75);
    let zeros = Matrix::zeros(1, 2);
    m.add(&zeros, &zeros).unwrap();
    assert_eq!(m.average().row(0), &[0.75, 0.75]);
}

#[test]
fn empty_replication_reports_configured_fallbacks() {
    let mut cfg = CallCenterConfig::single_queue(2.0);
    cfg.zero_over_zero.insert(PM::AbandonmentRatio, 0.5);
    let table = build_table();
    let pms = [PM::ServiceLevel, PM::AbandonmentRatio, PM::ServiceLevelRep, PM::SpeedOfAnswer];
    let mut manager = build_manager(&cfg, &pms, &table);
    let mut stat = SimCallCenterStat::new(&manager, &table, &pms);
    replicate(&mut manager, 0, 0, 0);
    stat.add_observations(&manager, &mut MatrixCache::new()).unwrap();

    assert_eq!(stat.average(PM::ServiceLevel).unwrap().get(0, 0), 1.0, "built-in fallback");
    assert_eq!(stat.average(PM::AbandonmentRatio).unwrap().get(0, 0), 0.5, "config override");
    assert_eq!(stat.average(PM::ServiceLevelRep).unwrap().get(0, 0), 1.0);
    assert_eq!(stat.average(PM::SpeedOfAnswer).unwrap().get(0, 0), 0.0);
}

#[test]
fn missing_counters_mean_not_available() {
    let cfg = CallCenterConfig::single_queue(2.0);
    let table = build_table();
    let manager =
        CallCenterMeasureManager::new(&cfg, &[MeasureType::NumArrivals]).expect("manager");
    let stat = SimCallCenterStat::new(&manager, &table, &[PM::RateOfArrivals, PM::AbandonmentRatio]);

    assert!(stat.has_performance_measure(PM::RateOfArrivals));
    assert!(!stat.has_performance_measure(PM::AbandonmentRatio));
    assert!(stat.is_not_available(PM::AbandonmentRatio));
    let err = stat.average(PM::AbandonmentRatio).unwrap_err();
    assert!(err.is_not_available(), "got {err}");
    let err = stat.average(PM::Occupancy).unwrap_err();
    assert!(err.is_not_available(), "never requested is also not available");

    let mut cache = MatrixCache::new();
    let err = cache
        .get_matrix(&manager, MeasureType::NumServed, ccstat_core::measure_type::RowType::ContactType)
        .unwrap_err();
    assert!(err.is_not_available());
}

#[test]
fn ratio_of_means_differs_from_mean_of_ratios() {
    let cfg = CallCenterConfig::single_queue(2.0);
    let table = build_table();
    let pms = [PM::AbandonmentRatio, PM::AbandonmentRatioRep];
    let mut manager = build_manager(&cfg, &pms, &table);
    let mut stat = SimCallCenterStat::new(&manager, &table, &pms);
    let mut cache = MatrixCache::new();
    for (arrivals, abandoned) in [(2, 1), (8, 0)] {
        replicate(&mut manager, arrivals, abandoned, 0);
        cache.clear();
        stat.add_observations(&manager, &mut cache).unwrap();
    }
    let roe = stat.average(PM::AbandonmentRatio).unwrap().get(0, 0);
    let eor = stat.average(PM::AbandonmentRatioRep).unwrap().get(0, 0);
    assert!((roe - 0.1).abs() < 1e-12, "0.5 / 5, got {roe}");
    assert!((eor - 0.25).abs() < 1e-12, "(0.5 + 0) / 2, got {eor}");
    assert_eq!(stat.min(PM::AbandonmentRatio).unwrap().get(0, 0), 0.0);
    assert_eq!(stat.max(PM::AbandonmentRatio).unwrap().get(0, 0), 0.5);

    let (lo, hi) = stat.confidence_interval(PM::AbandonmentRatioRep, 0.95).unwrap();
    assert!(lo.get(0, 0) < eor && eor < hi.get(0, 0), "interval brackets the mean");
}

#[test]
fn stat_of_sources_and_chain_lookup() {
    let cfg = CallCenterConfig::single_queue(2.0);
    let table = build_table();
    let pms = [PM::RateOfArrivals, PM::AbandonmentRatio];
    let mut manager = build_manager(&cfg, &pms, &table);

    let mut sources = Vec::new();
    for arrivals in [4, 10] {
        let mut sim = SimCallCenterStat::new(&manager, &table, &pms);
        replicate(&mut manager, arrivals, 1, 0);
        sim.add_observations(&manager, &mut MatrixCache::new()).unwrap();
        sources.push(sim);
    }
    let mut stat = StatCallCenterStat::new(&pms);
    for source in &sources {
        stat.add_source(source).unwrap();
    }
    assert_eq!(stat.num_observations(PM::RateOfArrivals).unwrap(), 2);
    assert_eq!(stat.average(PM::RateOfArrivals).unwrap().get(0, 0), 7.0);
    let ar = stat.average(PM::AbandonmentRatio).unwrap().get(0, 0);
    assert!((ar - (0.25 + 0.1) / 2.0).abs() < 1e-12, "mean of per-source ratios, got {ar}");
    assert_eq!(stat.variance(PM::RateOfArrivals).unwrap().get(0, 0), 18.0);

    let only_arrivals = {
        let m = CallCenterMeasureManager::new(&cfg, &[MeasureType::NumArrivals]).unwrap();
        SimCallCenterStat::new(&m, &table, &[PM::RateOfArrivals])
    };
    let chain = ChainCallCenterStat::new(vec![&only_arrivals, &stat]);
    assert_eq!(chain.performance_measures(), vec![PM::RateOfArrivals, PM::AbandonmentRatio]);
    assert_eq!(
        chain.num_observations(PM::RateOfArrivals).unwrap(),
        0,
        "first source holding the measure wins"
    );
    assert_eq!(chain.average(PM::AbandonmentRatio).unwrap().get(0, 0), ar);
    assert!(chain.average(PM::Occupancy).unwrap_err().is_not_available());
}

#[test]
fn covariance_of_expectations_is_the_sample_covariance() {
    let cfg = CallCenterConfig::single_queue(2.0);
    let table = build_table();
    let pms = [PM::RateOfArrivals, PM::RateOfBlocking];
    let mut manager = build_manager(&cfg, &pms, &table);
    let mut cov = CovFMMCallCenterStat::new(&manager, &table, &pms);
    let mut cache = MatrixCache::new();
    for (arrivals, blocked) in [(10, 1), (12, 2), (14, 3)] {
        replicate(&mut manager, arrivals, 0, blocked);
        cache.clear();
        cov.add_observations(&manager, &mut cache).unwrap();
    }
    assert_eq!(cov.num_observations(), 3);
    let c = cov.covariance(PM::RateOfArrivals, PM::RateOfBlocking).unwrap();
    assert!((c.get(0, 0) - 2.0).abs() < 1e-9, "got {}", c.get(0, 0));
    let swapped = cov.covariance(PM::RateOfBlocking, PM::RateOfArrivals).unwrap();
    assert!((swapped.get(0, 0) - 2.0).abs() < 1e-9, "covariance is symmetric");
    let v = cov.covariance(PM::RateOfArrivals, PM::RateOfArrivals).unwrap();
    assert!((v.get(0, 0) - 4.0).abs() < 1e-9);
    let r = cov.correlation(PM::RateOfArrivals, PM::RateOfBlocking).unwrap();
    assert!((r.get(0, 0) - 1.0).abs() < 1e-9, "perfectly linear data");
}

#[test]
fn covariance_needs_matching_shapes_and_known_measures() {
    let cfg = CallCenterConfig::default_test();
    let table = build_table();
    let pms = [PM::RateOfArrivals, PM::RateOfAbandonment];
    let manager = build_manager(&cfg, &pms, &table);
    let cov = CovFMMCallCenterStat::new(&manager, &table, &pms);
    assert!(cov.has_performance_measure(PM::RateOfAbandonment));
    let err = cov.covariance(PM::RateOfArrivals, PM::RateOfAbandonment).unwrap_err();
    assert!(
        matches!(err, StatError::DimensionMismatch { .. }),
        "contact-type rows against inbound-type rows: {err}"
    );
    let err = cov.covariance(PM::RateOfArrivals, PM::Occupancy).unwrap_err();
    assert!(err.is_not_available());
}

#[test]
fn total_column_is_rebuilt_from_period_means() {
    let cfg = CallCenterConfig::default_test();
    let table = build_table();
    let pms = [PM::AvgBusyAgents, PM::RateOfArrivals];
    let mut manager = build_manager(&cfg, &pms, &table);
    let mut stat = SimCallCenterStat::new(&manager, &table, &pms);
    manager.update_current_period(0.0);
    for (time, busy) in [(0.0, 2), (60.0, 4), (120.0, 0)] {
        manager.handle(&CallCenterEvent::BusyAgentsChanged { time, group: 0, busy });
        manager.update_current_period(time + 1.0);
        manager.handle(&CallCenterEvent::NewCall { call: CallRecord::new(0, time + 1.0) });
    }
    manager.finish_current_period(180.0);
    stat.add_observations(&manager, &mut MatrixCache::new()).unwrap();

    let total = manager.strategy().total_column().unwrap();
    let busy = stat.average_with_total(&manager, PM::AvgBusyAgents).unwrap();
    assert_eq!(&busy.row(0)[..3], &[2.0, 4.0, 0.0]);
    assert_eq!(busy.get(0, 3), 3.0, "morning covers periods 0 and 1");
    assert_eq!(busy.get(0, total), 2.0, "duration-weighted mean of 2, 4 and 0");
    let arrivals = stat.average_with_total(&manager, PM::RateOfArrivals).unwrap();
    assert_eq!(arrivals.get(0, total), 3.0, "plain sum for unnormalized counts");
}

/// One replication on the default model. Each call is `(arrival, abandons)`;
/// the others are served.
fn replicate_calls(manager: &mut CallCenterMeasureManager, calls: &[(f64, bool)]) {
    manager.init_measure_matrices();
    manager.update_current_period(0.0);
    for &(t, abandons) in calls {
        manager.update_current_period(t);
        let call = CallRecord::new(0, t).in_queue(0);
        manager.handle(&CallCenterEvent::NewCall { call: call.clone() });
        if abandons {
            manager.handle(&CallCenterEvent::Abandoned { call: call.waited(1.0) });
        } else {
            manager.handle(&CallCenterEvent::Served { call: call.waited(1.0).served_by(0, 2.0) });
        }
    }
    manager.finish_current_period(180.0);
}

#[test]
fn partial_range_feeds_only_its_columns() {
    let cfg = CallCenterConfig::default_test();
    let table = build_table();
    let pms = [PM::RateOfArrivals, PM::AbandonmentRatio];
    let mut manager = build_manager(&cfg, &pms, &table);
    let mut stat = SimCallCenterStat::new(&manager, &table, &pms);
    let mut cache = MatrixCache::new();
    replicate_calls(&mut manager, &[(65.0, true), (70.0, false), (80.0, false), (90.0, false)]);
    stat.add_observations_range(&manager, &mut cache, 1, 2).unwrap();

    assert_eq!(stat.num_observations(PM::RateOfArrivals).unwrap(), 1);
    let arrivals = stat.average(PM::RateOfArrivals).unwrap();
    let ar = stat.average(PM::AbandonmentRatio).unwrap();
    assert_eq!(arrivals.get(0, 1), 4.0);
    assert_eq!(ar.get(0, 1), 0.25);
    for c in [0, 2, 3, 4] {
        assert!(arrivals.get(0, c).is_nan(), "column {c} was never fed");
        assert!(ar.get(0, c).is_nan(), "column {c} was never fed");
    }

    let cols = manager.num_stat_columns();
    assert!(stat.add_observations_range(&manager, &mut cache, 2, 2).is_err(), "empty range");
    assert!(stat.add_observations_range(&manager, &mut cache, 0, cols + 1).is_err(), "past the last column");
    assert_eq!(stat.num_observations(PM::RateOfArrivals).unwrap(), 1, "rejected ranges add nothing");
}

#[test]
fn uneven_period_counts_rebuild_the_total_from_period_means() {
    let cfg = CallCenterConfig::default_test();
    let table = build_table();
    let pms = [PM::RateOfArrivals, PM::AbandonmentRatio];
    let mut manager = build_manager(&cfg, &pms, &table);
    let mut stat = SimCallCenterStat::new(&manager, &table, &pms);
    let mut cache = MatrixCache::new();

    replicate_calls(&mut manager, &[(10.0, false), (70.0, false)]);
    stat.add_observations(&manager, &mut cache).unwrap();
    replicate_calls(&mut manager, &[(65.0, true), (70.0, false), (75.0, false)]);
    stat.add_observations_range(&manager, &mut cache, 1, 2).unwrap();

    let total = manager.strategy().total_column().unwrap();
    let avg = stat.average(PM::RateOfArrivals).unwrap();
    assert_eq!(&avg.row(0)[..3], &[1.0, 2.0, 0.0], "period 1 saw two observations, the rest one");
    assert_eq!(avg.get(0, total), 2.0, "the observed total comes from the first replication only");
    let rebuilt = stat.average_with_total(&manager, PM::RateOfArrivals).unwrap();
    assert_eq!(rebuilt.get(0, total), 3.0, "sum of the period means");

    let ar = stat.average_with_total(&manager, PM::AbandonmentRatio).unwrap();
    assert_eq!(ar.get(0, 1), 0.25, "(0 + 1) / (1 + 3)");
    assert!(
        (ar.get(0, total) - 0.5 / 3.0).abs() < 1e-12,
        "mean abandoned 0 + 0.5 + 0 over mean arrivals 1 + 2 + 0, got {}",
        ar.get(0, total)
    );
}

#[test]
fn each_pass_starts_from_a_clean_cache() {
    let cfg = CallCenterConfig::single_queue(2.0);
    let table = build_table();
    let pms = [PM::RateOfArrivals];
    let mut manager = build_manager(&cfg, &pms, &table);
    let mut stat = SimCallCenterStat::new(&manager, &table, &pms);
    let mut cov = CovFMMCallCenterStat::new(&manager, &table, &pms);
    let mut cache = MatrixCache::new();
    for arrivals in [2, 8] {
        replicate(&mut manager, arrivals, 0, 0);
        stat.add_observations(&manager, &mut cache).unwrap();
        cov.add_observations(&manager, &mut cache).unwrap();
    }
    assert_eq!(stat.average(PM::RateOfArrivals).unwrap().get(0, 0), 5.0, "second pass saw 8 arrivals");
    let v = cov.covariance(PM::RateOfArrivals, PM::RateOfArrivals).unwrap();
    assert!((v.get(0, 0) - 18.0).abs() < 1e-9, "got {}", v.get(0, 0));
}

//! Period strategies seen through the manager: main periods with borders,
//! steady state after warm-up, sliding windows.

use ccstat_core::{
    config::{CallCenterConfig, PeriodMode},
    event::{CallCenterEvent, CallRecord},
    manager::CallCenterMeasureManager,
    measure_type::MeasureType,
};

fn build_manager(cfg: &CallCenterConfig, measures: &[MeasureType]) -> CallCenterMeasureManager {
    let mut manager = CallCenterMeasureManager::new(cfg, measures).expect("manager");
    manager.init_measure_matrices();
    manager.register_listeners();
    manager
}

fn arrive(manager: &mut CallCenterMeasureManager, t: f64) {
    manager.update_current_period(t);
    manager.handle(&CallCenterEvent::NewCall { call: CallRecord::new(0, t) });
}

#[test]
fn main_columns_are_named_and_sized() {
    let cfg = CallCenterConfig::default_test();
    let manager = build_manager(&cfg, &[MeasureType::NumArrivals]);
    let strategy = manager.strategy();
    let names: Vec<String> = (0..manager.num_stat_columns())
        .map(|c| strategy.column_name(c))
        .collect();
    assert_eq!(names, vec!["period0", "period1", "period2", "morning", "total"]);
    assert_eq!(
        manager.stat_column_durations(),
        vec![60.0, 60.0, 60.0, 120.0, 180.0],
        "segment and total columns span their member periods"
    );
}

#[test]
fn preliminary_and_wrap_up_arrivals_are_dropped() {
    let mut cfg = CallCenterConfig::default_test();
    cfg.period_start = 100.0;
    let mut manager = build_manager(&cfg, &[MeasureType::NumArrivals]);
    for t in [50.0, 100.0, 150.0, 279.0, 280.0, 400.0] {
        arrive(&mut manager, t);
    }
    let v = manager.get_values(MeasureType::NumArrivals, false).unwrap();
    assert_eq!(&v.row(0)[..3], &[2.0, 0.0, 1.0]);
    let total = manager.strategy().total_column().unwrap();
    assert_eq!(v.get(0, total), 3.0, "only main-period arrivals reach the total");
}

#[test]
fn steady_state_integrates_after_warmup_only() {
    let mut cfg = CallCenterConfig::single_queue(2.0);
    cfg.period_mode = PeriodMode::SteadyState { warmup: 100.0 };
    let mut manager = build_manager(&cfg, &[MeasureType::SumQueueSize]);
    manager.update_current_period(0.0);
    manager.handle(&CallCenterEvent::QueueSizeChanged { time: 50.0, queue: 0, size: 2 });
    manager.update_current_period(150.0);
    manager.finish_current_period(300.0);

    let raw = manager.get_values(MeasureType::SumQueueSize, false).unwrap();
    assert_eq!(raw.get(0, 0), 400.0, "2 waiting over [100, 300)");
    let avg = manager.get_values(MeasureType::SumQueueSize, true).unwrap();
    assert_eq!(avg.get(0, 0), 2.0, "normalized by the observed 200 time units");
}

#[test]
fn sliding_windows_keep_the_most_recent_only() {
    let mut cfg = CallCenterConfig::single_queue(2.0);
    cfg.period_mode = PeriodMode::SlidingWindow { num_windows: 3, window_size: 10.0 };
    let mut manager = build_manager(&cfg, &[MeasureType::NumArrivals]);
    assert_eq!(manager.num_stat_columns(), 1);

    for t in [1.0, 5.0, 12.0, 25.0, 33.0, 34.0] {
        arrive(&mut manager, t);
    }
    let v = manager.get_values(MeasureType::NumArrivals, false).unwrap();
    assert_eq!(v.get(0, 0), 4.0, "windows 1..=3 hold 1 + 1 + 2 arrivals");
    assert_eq!(manager.stat_column_durations(), vec![24.0], "from t=10 to now");

    // A long gap discards every retained window.
    arrive(&mut manager, 100.0);
    let v = manager.get_values(MeasureType::NumArrivals, false).unwrap();
    assert_eq!(v.get(0, 0), 1.0);
}

#[test]
fn sliding_window_integrals_follow_the_ring() {
    let mut cfg = CallCenterConfig::single_queue(2.0);
    cfg.period_mode = PeriodMode::SlidingWindow { num_windows: 2, window_size: 10.0 };
    let mut manager = build_manager(&cfg, &[MeasureType::SumBusyAgents]);
    manager.update_current_period(0.0);
    manager.handle(&CallCenterEvent::BusyAgentsChanged { time: 0.0, group: 0, busy: 1 });
    manager.handle(&CallCenterEvent::BusyAgentsChanged { time: 15.0, group: 0, busy: 3 });
    manager.handle(&CallCenterEvent::BusyAgentsChanged { time: 25.0, group: 0, busy: 0 });
    manager.finish_current_period(30.0);

    // Retained windows are [10, 20) and [20, 30): 1*5 + 3*5 + 3*5.
    let raw = manager.get_values(MeasureType::SumBusyAgents, false).unwrap();
    assert_eq!(raw.get(0, 0), 35.0);
    let avg = manager.get_values(MeasureType::SumBusyAgents, true).unwrap();
    assert_eq!(avg.get(0, 0), 1.75);
}

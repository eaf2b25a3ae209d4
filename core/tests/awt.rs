//! Acceptable-waiting-time bucketing: before/after complementarity and
//! per-(row, column) thresholds.

use ccstat_core::{
    cache::MatrixCache,
    config::{AwtDefinition, CallCenterConfig},
    event::{CallCenterEvent, CallRecord},
    manager::CallCenterMeasureManager,
    matrix::Matrix,
    measure_type::{MeasureType, RowType},
};

const MEASURES: [MeasureType; 6] = [
    MeasureType::NumServed,
    MeasureType::NumServedBeforeAwt,
    MeasureType::NumServedAfterAwt,
    MeasureType::NumAbandonedBeforeAwt,
    MeasureType::NumAbandonedAfterAwt,
    MeasureType::SumExcessTimes,
];

fn build_manager(cfg: &CallCenterConfig) -> CallCenterMeasureManager {
    let mut manager = CallCenterMeasureManager::new(cfg, &MEASURES).expect("manager");
    manager.init_measure_matrices();
    manager.register_listeners();
    manager
}

fn serve(manager: &mut CallCenterMeasureManager, k: usize, t: f64, wait: f64) {
    manager.update_current_period(t);
    let call = CallRecord::new(k, t).in_queue(k);
    manager.handle(&CallCenterEvent::NewCall { call: call.clone() });
    manager.handle(&CallCenterEvent::Served {
        call: call.waited(wait).served_by(k, 4.0),
    });
}

/// Waits cycle through 0..40 so both sides of a 20-unit AWT are hit.
fn feed_served(manager: &mut CallCenterMeasureManager) {
    for i in 0..90 {
        let t = i as f64 * 2.0;
        serve(manager, i % 2, t, (i * 7 % 40) as f64);
    }
    manager.finish_current_period(180.0);
}

fn get(cache: &mut MatrixCache, manager: &CallCenterMeasureManager, mt: MeasureType) -> Matrix {
    cache
        .get_matrix(manager, mt, RowType::InboundTypeAwt)
        .expect("AWT-shaped matrix")
        .clone()
}

fn assert_complementary(manager: &CallCenterMeasureManager) {
    let mut cache = MatrixCache::new();
    let before = get(&mut cache, manager, MeasureType::NumServedBeforeAwt);
    let after = get(&mut cache, manager, MeasureType::NumServedAfterAwt);
    let served = get(&mut cache, manager, MeasureType::NumServed);
    assert_eq!(before.rows(), served.rows());
    assert_eq!(before.cols(), served.cols());
    for r in 0..served.rows() {
        for c in 0..served.cols() {
            assert_eq!(
                before.get(r, c) + after.get(r, c),
                served.get(r, c),
                "row {r}, column {c}: each served call is either before or after AWT"
            );
        }
    }
}

#[test]
fn good_plus_bad_equals_served_without_segment_breakdown() {
    let mut cfg = CallCenterConfig::default_test();
    cfg.awt_segment_breakdown = false;
    let mut manager = build_manager(&cfg);
    feed_served(&mut manager);
    assert_complementary(&manager);
}

#[test]
fn good_plus_bad_equals_served_for_every_awt_definition() {
    let mut cfg = CallCenterConfig::default_test();
    cfg.awt = vec![AwtDefinition::uniform("short", 10.0), AwtDefinition::uniform("long", 30.0)];
    let mut manager = build_manager(&cfg);
    feed_served(&mut manager);
    assert_complementary(&manager);

    let mut cache = MatrixCache::new();
    let before = get(&mut cache, &manager, MeasureType::NumServedBeforeAwt);
    // Rows: type0, type1, all under "short", then the same under "long".
    assert_eq!(before.rows(), 6);
    let total = manager.strategy().total_column().unwrap();
    assert!(
        before.get(2, total) < before.get(5, total),
        "a longer threshold classifies more calls as answered in time"
    );
}

#[test]
fn thresholds_follow_row_and_column_overrides() {
    let mut cfg = CallCenterConfig::default_test();
    cfg.awt = vec![AwtDefinition::uniform("awt", 20.0).with_override(0, 1, 100.0)];
    let mut manager = build_manager(&cfg);
    serve(&mut manager, 0, 70.0, 50.0);
    manager.finish_current_period(180.0);

    let mut cache = MatrixCache::new();
    let before = get(&mut cache, &manager, MeasureType::NumServedBeforeAwt);
    let after = get(&mut cache, &manager, MeasureType::NumServedAfterAwt);
    let excess = get(&mut cache, &manager, MeasureType::SumExcessTimes);
    let total = manager.strategy().total_column().unwrap();

    assert_eq!(before.get(0, 1), 1.0, "type 0 in period 1 uses the 100 override");
    assert_eq!(after.get(2, 1), 1.0, "the all row of period 1 keeps the default 20");
    assert_eq!(after.get(0, 3), 1.0, "the morning segment column keeps the default");
    assert_eq!(after.get(0, total), 1.0);
    assert_eq!(excess.get(0, 1), 0.0);
    assert_eq!(excess.get(0, 3), 30.0, "excess over the default threshold");
}

#[test]
fn abandoned_calls_are_bucketed_too() {
    let cfg = CallCenterConfig::default_test();
    let mut manager = build_manager(&cfg);
    for (t, wait) in [(5.0, 3.0), (6.0, 25.0), (7.0, 40.0)] {
        manager.update_current_period(t);
        manager.handle(&CallCenterEvent::Abandoned {
            call: CallRecord::new(1, t).waited(wait),
        });
    }
    manager.finish_current_period(180.0);
    let mut cache = MatrixCache::new();
    let before = get(&mut cache, &manager, MeasureType::NumAbandonedBeforeAwt);
    let after = get(&mut cache, &manager, MeasureType::NumAbandonedAfterAwt);
    assert_eq!(before.get(1, 0), 1.0);
    assert_eq!(after.get(1, 0), 2.0);
    assert_eq!(after.get(0, 0), 0.0, "type 0 saw no abandonment");
}

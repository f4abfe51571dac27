//! Whole-run behaviour through SimEngine.

use misscore_core::{
    config::{Method, RunConfig},
    engine::SimEngine,
    estimate::CompletionCode,
    event::SimEvent,
    strategy::StrategyKind,
};

#[test]
fn complete_case_run_produces_finite_estimates() {
    let config = RunConfig::from_codes(1, 1, 0, "cc", 0, 1, 3).unwrap();
    assert_eq!(config.sample_size, 1000);
    let engine = SimEngine::build_test("e2e-cc".into(), config).unwrap();
    let summary = engine.run().unwrap();

    assert_eq!(summary.datasets, 3);
    assert_eq!(summary.completed, 3);
    assert_eq!(engine.store.estimate_count("e2e-cc").unwrap(), 3);

    let records = engine.store.estimates_for_run("e2e-cc").unwrap();
    assert_eq!(records.iter().map(|r| r.simno).collect::<Vec<_>>(), vec![1, 2, 3]);
    for record in &records {
        assert_eq!(record.code, CompletionCode::Ok);
        for e in [&record.regression, &record.mean, &record.median] {
            assert!(e.is_finite(), "non-finite estimate in {record:?}");
            assert!(e.lower < e.estimate && e.estimate < e.upper);
        }
        // Reverse-scored items live on 0..=100.
        assert!((0.0..=100.0).contains(&record.mean.estimate));
    }
}

#[test]
fn row_count_equals_requested_range() {
    let config = RunConfig { simno_start: 4, simno_end: 9, ..RunConfig::default_test() };
    let engine = SimEngine::build_test("e2e-range".into(), config).unwrap();
    engine.run().unwrap();
    assert_eq!(engine.store.estimate_count("e2e-range").unwrap(), 6);
    assert_eq!(engine.store.failure_count("e2e-range").unwrap(), 0);
}

#[test]
fn run_records_events_per_dataset() {
    let engine = SimEngine::build_test("e2e-events".into(), RunConfig::default_test()).unwrap();
    engine.run().unwrap();

    assert_eq!(engine.store.event_count("e2e-events", "run_initialized").unwrap(), 1);
    assert_eq!(engine.store.event_count("e2e-events", "dataset_generated").unwrap(), 2);
    assert_eq!(engine.store.event_count("e2e-events", "estimate_recorded").unwrap(), 2);

    let events = engine.store.events_for_dataset("e2e-events", 1).unwrap();
    let generated = events
        .iter()
        .find(|e| e.event_type == "dataset_generated")
        .expect("dataset_generated event");
    match generated.event().unwrap() {
        SimEvent::DatasetGenerated { simno, case_missing_rate, item_missing_rate } => {
            assert_eq!(simno, 1);
            assert!(case_missing_rate > 0.0 && case_missing_rate < 1.0);
            assert!(item_missing_rate > 0.0 && item_missing_rate < 1.0);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn imputation_failure_is_recorded_without_aborting_the_run() {
    // 60 subjects cannot support a joint model over 92 variables.
    let config = RunConfig {
        strategy: StrategyKind::ItemLevel,
        method: Method::Mvn,
        sample_size: 60,
        ..RunConfig::default_test()
    };
    let engine = SimEngine::build_test("e2e-fail".into(), config).unwrap();
    let summary = engine.run().unwrap();

    assert_eq!(summary.datasets, 2);
    assert_eq!(summary.imputation_failures, 2);
    assert_eq!(engine.store.estimate_count("e2e-fail").unwrap(), 2);
    assert_eq!(engine.store.failure_count("e2e-fail").unwrap(), 2);

    let records = engine.store.estimates_for_run("e2e-fail").unwrap();
    for record in &records {
        assert_eq!(record.code, CompletionCode::ImputationFailed);
        assert!(record.regression.estimate.is_nan());
    }
    assert_eq!(engine.store.event_count("e2e-fail", "imputation_failed").unwrap(), 2);
    let events = engine.store.events_for_dataset("e2e-fail", 2).unwrap();
    assert!(events.iter().any(|e| e.event_type == "imputation_failed"));
}

#[test]
fn invalid_codes_are_rejected_at_entry() {
    assert!(RunConfig::from_codes(1, 4, 0, "cc", 0, 1, 1).is_err());
    assert!(RunConfig::from_codes(1, 1, 6, "fcs", 0, 1, 1).is_err());
    assert!(RunConfig::from_codes(1, 1, 1, "cc", 0, 1, 1).is_err());
    assert!(RunConfig::from_codes(1, 1, 0, "fcs", 0, 1, 1).is_err());
    assert!(RunConfig::from_codes(1, 1, 1, "pmm", 0, 1, 1).is_err());
    assert!(RunConfig::from_codes(1, 1, 1, "fcs", 3, 1, 1).is_err());
    assert!(RunConfig::from_codes(1, 1, 1, "fcs", 0, 5, 4).is_err());
    assert!(RunConfig::from_codes(1, 1, 1, "MVN", 2, 1, 1).is_ok());
}

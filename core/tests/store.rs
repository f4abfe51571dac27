//! Result store persistence.

use misscore_core::{
    config::RunConfig,
    engine::SimEngine,
    estimate::{CompletionCode, Estimate, EstimateRecord},
    event::{EventLogEntry, SimEvent},
    missingness::Scenario,
    store::ResultStore,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn store_with_run(run_id: &str) -> ResultStore {
    let store = ResultStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store.insert_run(run_id, &RunConfig::default_test(), "0.1.0-test").expect("insert run");
    store
}

fn estimate(v: f64) -> Estimate {
    Estimate { estimate: v, se: 0.5, lower: v - 1.0, upper: v + 1.0, df: 40.0 }
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn migrations_are_idempotent() {
    let store = store_with_run("mig");
    store.migrate().unwrap();
    assert_eq!(store.run_seed("mig").unwrap(), Some(1));
    assert_eq!(store.run_seed("missing").unwrap(), None);
}

#[test]
fn run_row_keeps_dataset_count_apart_from_imputation_count() {
    let store = store_with_run("shape");
    let config = RunConfig::default_test();
    assert_eq!(
        store.run_shape("shape").unwrap(),
        Some((config.replicate_count() as u64, config.imputation.m))
    );
    assert_eq!(store.run_shape("shape").unwrap(), Some((2, 3)));
    assert_eq!(store.run_shape("missing").unwrap(), None);
}

#[test]
fn estimates_round_trip_and_non_finite_values_become_null() {
    let store = store_with_run("est");
    let ok = EstimateRecord {
        simno: 2,
        code: CompletionCode::Ok,
        regression: estimate(0.3),
        mean: estimate(55.0),
        median: Estimate { df: f64::INFINITY, ..estimate(50.0) },
    };
    let failed = EstimateRecord::failed(1, CompletionCode::ImputationFailed);
    store.append_estimate("est", &ok).unwrap();
    store.append_estimate("est", &failed).unwrap();

    let rows = store.estimates_for_run("est").unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].simno, 1);
    assert_eq!(rows[0].code, CompletionCode::ImputationFailed);
    assert!(rows[0].mean.estimate.is_nan());
    assert_eq!(rows[1].regression, ok.regression);
    assert_eq!(rows[1].mean, ok.mean);
    assert!(rows[1].median.df.is_nan());
    assert_eq!(rows[1].median.estimate, 50.0);
    assert_eq!(store.failure_count("est").unwrap(), 1);
}

#[test]
fn estimate_rows_are_append_only() {
    let store = store_with_run("dup");
    let record = EstimateRecord::failed(1, CompletionCode::EstimationFailed);
    store.append_estimate("dup", &record).unwrap();
    assert!(store.append_estimate("dup", &record).is_err());
}

#[test]
fn events_are_keyed_by_dataset() {
    let store = store_with_run("ev");
    let event = SimEvent::ImputationFailed { simno: 3, reason: "w4_q01: singular".into() };
    store.append_event(&EventLogEntry::new("ev", "strategy", &event).unwrap()).unwrap();

    assert!(store.events_for_dataset("ev", 1).unwrap().is_empty());
    let entries = store.events_for_dataset("ev", 3).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_type, "imputation_failed");
    assert!(entries[0].payload.contains("\"type\":\"imputation_failed\""));
}

#[test]
fn persisted_datasets_load_back() {
    let config = RunConfig { persist_datasets: true, ..RunConfig::default_test() };
    let engine = SimEngine::build_test("persist".into(), config).unwrap();
    engine.run().unwrap();

    let loaded = engine
        .store
        .load_dataset("persist", Scenario::Baseline, 2)
        .unwrap()
        .expect("dataset 2 persisted");
    let regenerated = engine.simulation().generate(2);
    assert_eq!(loaded.simno, 2);
    assert_eq!(loaded.len(), regenerated.len());
    assert_eq!(loaded.item_column(30), regenerated.item_column(30));
    assert!(loaded.is_consistent());

    assert!(engine.store.load_dataset("persist", Scenario::Extreme, 2).unwrap().is_none());
}

#[test]
fn datasets_are_not_persisted_by_default() {
    let engine = SimEngine::build_test("no-persist".into(), RunConfig::default_test()).unwrap();
    engine.run().unwrap();
    assert!(engine.store.load_dataset("no-persist", Scenario::Baseline, 1).unwrap().is_none());
}

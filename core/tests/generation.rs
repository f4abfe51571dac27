//! Cohort generation: correlated sampling, discretization, missingness.

use misscore_core::{
    config::{ReferenceParams, RunConfig},
    discretize::{Discretizer, CUT_PROBABILITIES},
    engine::Simulation,
    linalg::correlation,
    missingness::{MissingnessInjector, Scenario},
    rng::{DatasetRng, RngBank, StreamSlot},
    sampler::CorrelatedSampler,
    types::{N_ITEMS, N_LATENT},
};

// ── Helpers ─────────────────────────────────────────────────────────

fn simulation(scenario: Scenario, sample_size: usize) -> Simulation {
    let config = RunConfig { scenario, sample_size, ..RunConfig::default_test() };
    Simulation::new(config, &ReferenceParams::synthetic()).unwrap()
}

// ── Sampler ─────────────────────────────────────────────────────────

#[test]
fn sample_correlation_converges_to_reference() {
    let reference = ReferenceParams::synthetic();
    let sampler = CorrelatedSampler::new(&reference).unwrap();
    let mut rng = RngBank::new(7).for_dataset(StreamSlot::Sampler, 1);
    let draw = sampler.draw(20_000, &mut rng);
    assert_eq!(draw.ncols(), N_LATENT);

    let sample = correlation(&draw);
    let max_diff = (&sample - &reference.correlation).abs().max();
    assert!(max_diff < 0.05, "max |r_sample - r_ref| = {max_diff}");
}

#[test]
fn correlation_error_shrinks_with_sample_size() {
    let reference = ReferenceParams::synthetic();
    let sampler = CorrelatedSampler::new(&reference).unwrap();
    let err = |n: usize| {
        let mut rng = RngBank::new(11).for_dataset(StreamSlot::Sampler, 1);
        let sample = correlation(&sampler.draw(n, &mut rng));
        (&sample - &reference.correlation).abs().mean()
    };
    assert!(err(20_000) < err(500));
}

#[test]
fn same_seed_same_draw() {
    let sampler = CorrelatedSampler::new(&ReferenceParams::synthetic()).unwrap();
    let bank = RngBank::new(99);
    let a = sampler.draw(50, &mut bank.for_dataset(StreamSlot::Sampler, 3));
    let b = sampler.draw(50, &mut bank.for_dataset(StreamSlot::Sampler, 3));
    let c = sampler.draw(50, &mut bank.for_dataset(StreamSlot::Sampler, 4));
    assert_eq!(a, b);
    assert_ne!(a, c);
}

// ── Discretizer ─────────────────────────────────────────────────────

#[test]
fn category_proportions_match_cut_probabilities() {
    let disc = Discretizer::standard().unwrap();
    let mut rng = DatasetRng::new(5, 0, 1);
    let n = 200_000;
    let mut counts = [0usize; 5];
    for _ in 0..n {
        let c = disc.category(rng.normal());
        assert!((1..=5).contains(&c));
        counts[(c - 1) as usize] += 1;
    }
    let expected = [0.4, 0.3, 0.2, 0.07, 0.03];
    for (k, (&count, &p)) in counts.iter().zip(&expected).enumerate() {
        let observed = count as f64 / n as f64;
        assert!((observed - p).abs() < 0.005, "category {}: {observed} vs {p}", k + 1);
    }
    assert_eq!(CUT_PROBABILITIES.len(), 4);
}

#[test]
fn complete_dataset_has_no_missing_items() {
    let sim = simulation(Scenario::Baseline, 300);
    let dataset = sim.generate_complete(1);
    assert_eq!(dataset.len(), 300);
    assert!(dataset.is_consistent());
    assert!(dataset.subjects.iter().all(|s| s.items.len() == N_ITEMS && s.items.iter().all(Option::is_some)));
    assert_eq!(dataset.subjects[0].id, 1);
}

// ── Missingness ─────────────────────────────────────────────────────

#[test]
fn masks_are_consistent_and_covariates_untouched() {
    let sim = simulation(Scenario::Inflated, 400);
    let complete = sim.generate_complete(2);
    let masked = sim.generate(2);
    assert!(masked.is_consistent());
    assert_eq!(complete.x(), masked.x());
    assert_eq!(complete.z(), masked.z());
    for (c, m) in complete.subjects.iter().zip(&masked.subjects) {
        assert_eq!(c.id, m.id);
        for (ci, mi) in c.items.iter().zip(&m.items) {
            assert!(mi.is_none() || mi == ci);
        }
    }
}

#[test]
fn case_missing_rate_matches_mean_probability() {
    let sim = simulation(Scenario::Inflated, 5_000);
    let complete = sim.generate_complete(1);
    let injector = MissingnessInjector::new(Scenario::Inflated.coefficients());
    let probs = injector.probabilities(&complete);
    let expected = probs.iter().map(|p| p.case).sum::<f64>() / probs.len() as f64;

    let observed = sim.generate(1).case_missing_rate();
    assert!((observed - expected).abs() < 0.02, "observed {observed}, expected {expected}");
}

#[test]
fn extreme_scenario_has_less_missingness_than_baseline() {
    let baseline = simulation(Scenario::Baseline, 3_000).generate(1);
    let extreme = simulation(Scenario::Extreme, 3_000).generate(1);
    assert!(extreme.case_missing_rate() < baseline.case_missing_rate());
    assert!(extreme.item_missing_rate() < baseline.item_missing_rate());
}

#[test]
fn latent_cohort_is_shared_across_scenarios() {
    let a = simulation(Scenario::Baseline, 100).generate_complete(3);
    let b = simulation(Scenario::Extreme, 100).generate_complete(3);
    assert_eq!(a.x(), b.x());
    assert_eq!(a.item_column(0), b.item_column(0));
}

//! The simulation engine.
//!
//! PIPELINE PER DATASET (fixed, never reordered):
//!   1. Sampler        latent cohort        (Sampler stream)
//!   2. Discretizer    ordinal items
//!   3. Injector       missingness mask     (Missingness stream)
//!   4. Strategy       prepare → impute     (Imputation stream)
//!   5. Estimators     per replicate, pooled
//!
//! RULES:
//!   - Datasets share no mutable state; each draws from its own streams.
//!   - All randomness flows through the RngBank.
//!   - Per-dataset failures become completion codes, never aborts.
//!   - Only SimEngine touches the store, and only after the parallel section.

use rayon::prelude::*;

use crate::{
    cohort::Dataset,
    config::{ReferenceParams, RunConfig},
    discretize::Discretizer,
    error::{SimError, SimResult},
    estimate::{CompletionCode, Estimate, EstimateRecord, Estimator},
    event::{EventLogEntry, SimEvent},
    missingness::MissingnessInjector,
    pooling,
    rng::{RngBank, StreamSlot},
    sampler::CorrelatedSampler,
    scoring::ScaleScoreCalculator,
    store::ResultStore,
    strategy::{AnalysisData, ImputationStrategy, StrategyContext},
    types::{RunId, SimNo},
};

/// Everything produced for one dataset index.
#[derive(Debug, Clone)]
pub struct DatasetOutcome {
    pub simno:             SimNo,
    pub case_missing_rate: f64,
    pub item_missing_rate: f64,
    pub record:            EstimateRecord,
    /// Reason for a non-zero completion code.
    pub failure:           Option<String>,
    /// Kept only when datasets are persisted.
    pub dataset:           Option<Dataset>,
}

/// Stateless per-run pipeline. Safe to share across worker threads.
pub struct Simulation {
    config:      RunConfig,
    sampler:     CorrelatedSampler,
    discretizer: Discretizer,
    injector:    MissingnessInjector,
    calculator:  ScaleScoreCalculator,
    strategy:    Box<dyn ImputationStrategy>,
    rng_bank:    RngBank,
}

impl Simulation {
    pub fn new(config: RunConfig, reference: &ReferenceParams) -> SimResult<Self> {
        config.validate()?;
        Ok(Self {
            sampler:     CorrelatedSampler::new(reference)?,
            discretizer: Discretizer::standard()?,
            injector:    MissingnessInjector::new(config.missingness_coefficients()),
            calculator:  ScaleScoreCalculator::new(config.rule),
            strategy:    config.strategy.build(),
            rng_bank:    RngBank::new(config.seed),
            config,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Cohort for `simno` before any missingness is applied.
    pub fn generate_complete(&self, simno: SimNo) -> Dataset {
        let mut rng = self.rng_bank.for_dataset(StreamSlot::Sampler, simno);
        let latent = self.sampler.draw(self.config.sample_size, &mut rng);
        Dataset::from_latent(simno, &latent, &self.discretizer)
    }

    /// Cohort for `simno` with the run's missingness mask applied.
    pub fn generate(&self, simno: SimNo) -> Dataset {
        let mut dataset = self.generate_complete(simno);
        let mut rng = self.rng_bank.for_dataset(StreamSlot::Missingness, simno);
        self.injector.inject(&mut dataset, &mut rng);
        dataset
    }

    /// Run the strategy and all three estimators on one dataset.
    ///
    /// Imputation model failure is returned as an error. Estimator failures
    /// leave that estimator missing and mark the record with code 2.
    pub fn analyse(&self, dataset: &Dataset) -> SimResult<EstimateRecord> {
        let mut rng = self.rng_bank.for_dataset(StreamSlot::Imputation, dataset.simno);
        let ctx = StrategyContext {
            calculator: &self.calculator,
            settings:   &self.config.imputation,
            method:     self.config.method,
        };
        let replicates = self.strategy.run(dataset, &ctx, &mut rng)?;
        self.estimate(dataset.simno, &replicates)
    }

    fn estimate(&self, simno: SimNo, replicates: &[AnalysisData]) -> SimResult<EstimateRecord> {
        let mut record = EstimateRecord::failed(simno, CompletionCode::Ok);
        for estimator in Estimator::ALL {
            let result = match pooling::analyse(replicates, estimator, self.config.imputation.small_sample_df) {
                Ok(estimate) => estimate,
                Err(SimError::EstimationFailure { estimator: name, reason }) => {
                    log::warn!("Dataset {simno}: {name} estimator failed: {reason}");
                    record.code = CompletionCode::EstimationFailed;
                    Estimate::missing()
                }
                Err(e) => return Err(e),
            };
            match estimator {
                Estimator::Regression => record.regression = result,
                Estimator::Mean       => record.mean = result,
                Estimator::Median     => record.median = result,
            }
        }
        Ok(record)
    }

    /// Generate and analyse one dataset index.
    pub fn process(&self, simno: SimNo) -> SimResult<DatasetOutcome> {
        let dataset = self.generate(simno);
        let case_missing_rate = dataset.case_missing_rate();
        let item_missing_rate = dataset.item_missing_rate();
        log::debug!(
            "Dataset {simno}: case-missing {case_missing_rate:.3}, item-missing {item_missing_rate:.3}"
        );

        let (record, failure) = match self.analyse(&dataset) {
            Ok(record) => (record, None),
            Err(SimError::ImputationModelFailure { variable, reason }) => {
                log::warn!("Dataset {simno}: imputation failed for '{variable}': {reason}");
                (
                    EstimateRecord::failed(simno, CompletionCode::ImputationFailed),
                    Some(format!("{variable}: {reason}")),
                )
            }
            Err(e) => return Err(e),
        };

        Ok(DatasetOutcome {
            simno,
            case_missing_rate,
            item_missing_rate,
            record,
            failure,
            dataset: self.config.persist_datasets.then_some(dataset),
        })
    }

    /// Process the configured range on the rayon pool, in dataset order.
    pub fn run_range(&self) -> SimResult<Vec<DatasetOutcome>> {
        self.config
            .simnos()
            .into_par_iter()
            .map(|simno| self.process(simno))
            .collect()
    }

    /// Same as `run_range`, on the calling thread.
    pub fn run_sequential(&self) -> SimResult<Vec<DatasetOutcome>> {
        self.config.simnos().map(|simno| self.process(simno)).collect()
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub datasets:            usize,
    pub completed:           usize,
    pub imputation_failures: usize,
    pub estimation_failures: usize,
    pub mean_case_missing:   f64,
    pub mean_item_missing:   f64,
}

pub struct SimEngine {
    pub run_id: RunId,
    pub store:  ResultStore,
    simulation: Simulation,
}

impl SimEngine {
    /// Build an engine and register the run in `store`.
    /// The store must already be migrated.
    pub fn build(
        run_id: RunId,
        config: RunConfig,
        reference: &ReferenceParams,
        store: ResultStore,
    ) -> SimResult<Self> {
        let simulation = Simulation::new(config, reference)?;
        store.insert_run(&run_id, simulation.config(), env!("CARGO_PKG_VERSION"))?;
        let engine = Self { run_id, simulation, store };
        engine.record(
            "engine",
            &SimEvent::RunInitialized {
                run_id: engine.run_id.clone(),
                seed:   engine.simulation.config().seed,
            },
        )?;
        Ok(engine)
    }

    /// In-memory engine over the synthetic reference parameters.
    pub fn build_test(run_id: RunId, config: RunConfig) -> SimResult<Self> {
        let store = ResultStore::in_memory()?;
        store.migrate()?;
        Self::build(run_id, config, &ReferenceParams::synthetic(), store)
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    fn record(&self, source: &str, event: &SimEvent) -> SimResult<()> {
        let entry = EventLogEntry::new(&self.run_id, source, event)?;
        self.store.append_event(&entry)
    }

    /// Process the whole range and persist every outcome.
    pub fn run(&self) -> SimResult<RunSummary> {
        let config = self.simulation.config();
        log::info!(
            "Run {}: scenario {}, strategy {}, method {}, datasets {}..={}",
            self.run_id,
            config.scenario.name(),
            config.strategy.code(),
            config.method.code(),
            config.simno_start,
            config.simno_end,
        );
        let outcomes = self.simulation.run_range()?;
        let summary = self.persist(&outcomes)?;
        log::info!(
            "Run {} complete: {}/{} datasets ok, {} imputation failures, {} estimation failures",
            self.run_id, summary.completed, summary.datasets,
            summary.imputation_failures, summary.estimation_failures,
        );
        Ok(summary)
    }

    /// Write outcomes in dataset order.
    pub fn persist(&self, outcomes: &[DatasetOutcome]) -> SimResult<RunSummary> {
        let scenario = self.simulation.config().scenario;
        let mut summary = RunSummary::default();
        for outcome in outcomes {
            let simno = outcome.simno;
            if let Some(dataset) = &outcome.dataset {
                self.store.save_dataset(&self.run_id, scenario, dataset)?;
            }
            self.record(
                "sampler",
                &SimEvent::DatasetGenerated {
                    simno,
                    case_missing_rate: outcome.case_missing_rate,
                    item_missing_rate: outcome.item_missing_rate,
                },
            )?;
            if let Some(reason) = &outcome.failure {
                self.record("strategy", &SimEvent::ImputationFailed { simno, reason: reason.clone() })?;
            }
            self.store.append_estimate(&self.run_id, &outcome.record)?;
            self.record("pooling", &SimEvent::EstimateRecorded { simno, code: outcome.record.code })?;

            summary.datasets += 1;
            match outcome.record.code {
                CompletionCode::Ok               => summary.completed += 1,
                CompletionCode::ImputationFailed => summary.imputation_failures += 1,
                CompletionCode::EstimationFailed => summary.estimation_failures += 1,
            }
            summary.mean_case_missing += outcome.case_missing_rate;
            summary.mean_item_missing += outcome.item_missing_rate;
        }
        if summary.datasets > 0 {
            summary.mean_case_missing /= summary.datasets as f64;
            summary.mean_item_missing /= summary.datasets as f64;
        }
        Ok(summary)
    }
}

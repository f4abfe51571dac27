//! mi-runner: headless driver for the missing-data simulation study.
//!
//! Usage:
//!   mi-runner --seed 1 --scenario 1 --strategy 0 --method cc --rule 0 \
//!             --simno-start 1 --simno-end 100 --db results.db
//!   mi-runner --strategy 4 --method fcs --m 40 --iterations 10 --reference ref.json

use anyhow::Result;
use misscore_core::{
    config::{ReferenceParams, RunConfig},
    engine::SimEngine,
    estimate::{EstimateRecord, Estimator},
    store::ResultStore,
};
use std::env;

#[derive(serde::Serialize)]
struct RunReport<'a> {
    run_id: &'a str,
    records: Vec<EstimateRecord>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 1u64)?;
    let scenario = parse_arg(&args, "--scenario", 1u8)?;
    let strategy = parse_arg(&args, "--strategy", 0u8)?;
    let rule = parse_arg(&args, "--rule", 0u8)?;
    let simno_start = parse_arg(&args, "--simno-start", 1u64)?;
    let simno_end = parse_arg(&args, "--simno-end", simno_start)?;
    let method = parse_str(&args, "--method").unwrap_or(if strategy == 0 { "cc" } else { "fcs" });
    let db = parse_str(&args, "--db").unwrap_or(":memory:");
    let reference_path = parse_str(&args, "--reference");
    let json = has_flag(&args, "--json");

    let mut config = RunConfig::from_codes(seed, scenario, strategy, method, rule, simno_start, simno_end)?;
    config.sample_size = parse_arg(&args, "--n", config.sample_size)?;
    config.imputation.m = parse_arg(&args, "--m", config.imputation.m)?;
    config.imputation.fcs_iterations = parse_arg(&args, "--iterations", config.imputation.fcs_iterations)?;
    config.imputation.small_sample_df = has_flag(&args, "--small-sample-df");
    config.persist_datasets = has_flag(&args, "--persist-datasets");
    config.validate()?;

    let reference = match reference_path {
        Some(path) => {
            log::info!("Loading reference parameters from {path}");
            ReferenceParams::load(path)?
        }
        None => ReferenceParams::synthetic(),
    };

    if !json {
        println!("mi-runner");
        println!("  seed:      {seed}");
        println!("  scenario:  {} ({})", config.scenario.code(), config.scenario.name());
        println!("  strategy:  {}", config.strategy.code());
        println!("  method:    {}", config.method.code());
        println!("  rule:      {}", config.rule.code());
        println!("  datasets:  {simno_start}..={simno_end}");
        println!("  n:         {}", config.sample_size);
        println!("  m:         {}", config.imputation.m);
        println!("  db:        {db}");
        println!("  reference: {}", reference_path.unwrap_or("synthetic"));
        println!();
    }

    let store = ResultStore::open(db)?;
    store.migrate()?;

    let run_id = format!("run-{seed}-{}", uuid::Uuid::new_v4());
    let engine = SimEngine::build(run_id.clone(), config, &reference, store)?;
    let summary = engine.run()?;
    let records = engine.store.estimates_for_run(&run_id)?;

    if json {
        let report = RunReport { run_id: &run_id, records };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Run {run_id}");
    println!("  datasets:            {}", summary.datasets);
    println!("  completed:           {}", summary.completed);
    println!("  imputation failures: {}", summary.imputation_failures);
    println!("  estimation failures: {}", summary.estimation_failures);
    println!("  mean case-missing:   {:.3}", summary.mean_case_missing);
    println!("  mean item-missing:   {:.3}", summary.mean_item_missing);
    println!();
    print_estimates(&records);

    Ok(())
}

fn print_estimates(records: &[EstimateRecord]) {
    println!("{:>6} {:>4}  {:<10} {:>10} {:>9} {:>10} {:>10}", "simno", "code", "estimator", "estimate", "se", "lower", "upper");
    for record in records {
        for estimator in Estimator::ALL {
            let e = record.get(estimator);
            println!(
                "{:>6} {:>4}  {:<10} {:>10.4} {:>9.4} {:>10.4} {:>10.4}",
                record.simno, record.code.code(), estimator.name(), e.estimate, e.se, e.lower, e.upper
            );
        }
    }
}

/// Value of `flag`, or `default` when the flag is absent. A present flag
/// whose value does not parse is an error.
fn parse_arg<T>(args: &[String], flag: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match parse_str(args, flag) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value '{raw}' for {flag}: {e}")),
    }
}

fn parse_str<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

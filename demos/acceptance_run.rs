//! Acceptance run demo
//!
//! Simulates an LLM-backed extraction step that succeeds ~96% of the time,
//! records a baseline for it, then tests it under the three approaches
//! inside one budgeted group.
//!
//! Run with: `RUST_LOG=trialgate=info cargo run --example acceptance_run`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;
use trialgate::baseline::{
    BaselineRecord, CovariateDeclaration, MemoryBaselineRepository, StaticCovariates,
};
use trialgate::budget::BudgetLimits;
use trialgate::config::{ConfigOverrides, ExhaustedBehavior, RunConfig, ThresholdOrigin};
use trialgate::engine::{
    ProbabilisticRun, ProcessContext, RunReport, SampleError, SampleResult, SampleScope,
    SharedCovariateSource,
};

const SPEC_ID: &str = "invoice-extraction";
const TRUE_RATE: f64 = 0.96;

/// A noisy process: passes with `TRUE_RATE`, reports a token cost.
fn extraction_sampler(seed: u64) -> impl FnMut(&mut SampleScope) -> SampleResult {
    let mut rng = StdRng::seed_from_u64(seed);
    move |scope| {
        scope.record_units(rng.gen_range(80..120));
        if rng.gen_bool(0.002) {
            return Err(anyhow::anyhow!("upstream timeout").into());
        }
        if rng.gen_bool(TRUE_RATE) {
            Ok(())
        } else {
            Err(SampleError::assertion("total_amount missing from output"))
        }
    }
}

/// Measure the process to produce a baseline record.
fn measure_baseline(samples: u64) -> BaselineRecord {
    let mut rng = StdRng::seed_from_u64(1);
    let successes = (0..samples).filter(|_| rng.gen_bool(TRUE_RATE)).count() as u64;
    BaselineRecord::builder("baseline-2026-10", SPEC_ID, samples, successes)
        .covariate("model", "extractor-large")
        .expires_in_days(30)
        .build()
        .sealed()
}

fn print_report(title: &str, report: &RunReport) {
    println!("=== {title} ===");
    println!("{}", report.verdict.message);
    if let Some(explanation) = &report.verdict.explanation {
        println!("{explanation}");
    }
    for entry in report.entries.iter().filter(|e| e.key.contains("budget")) {
        println!("  {} = {}", entry.key, entry.value);
    }
    println!();
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let baseline = measure_baseline(2000);
    let json = serde_json::to_string_pretty(&vec![baseline])?;
    let repository = MemoryBaselineRepository::from_json_str(&json)
        .context("baseline import failed")?;

    let process = Arc::new(
        ProcessContext::new()
            .with_repository(Arc::new(repository))
            .with_budget(BudgetLimits::unlimited().with_time(Duration::from_secs(60))),
    );
    let group = process.group(
        "extraction-suite",
        BudgetLimits::unlimited()
            .with_units(60_000)
            .on_exhausted(ExhaustedBehavior::EvaluatePartial),
    );
    let env = ConfigOverrides::from_env()?;
    let covariates: SharedCovariateSource =
        Arc::new(StaticCovariates::new().with("model", "extractor-large"));

    let runs = [
        (
            "sample-size-first",
            RunConfig::builder()
                .samples(200)
                .threshold_confidence(0.95)
                .transparent_stats(true),
        ),
        (
            "confidence-first",
            RunConfig::builder()
                .confidence(0.95)
                .min_detectable_effect(0.05)
                .power(0.8),
        ),
        (
            "threshold-first (SLA)",
            RunConfig::builder()
                .samples(100)
                .min_pass_rate(0.9)
                .threshold_origin(ThresholdOrigin::Sla)
                .contract_ref("SLA-INV-3"),
        ),
    ];

    for (seed, (title, builder)) in (10u64..).zip(runs) {
        let config = builder.overrides(env.clone()).build()?;
        let context = group
            .run(SPEC_ID, config)
            .with_covariates(CovariateDeclaration::new(["model"]))
            .with_covariate_source(covariates.clone());
        let run = ProbabilisticRun::prepare(context)?;
        let report = run.run_all(extraction_sampler(seed));
        print_report(title, &report);
    }

    println!(
        "group units consumed: {}, process units consumed: {}",
        group.budget().consumed_units(),
        process.budget().consumed_units()
    );
    Ok(())
}

//! End-to-end tests of the probabilistic run engine
//!
//! Each test drives `prepare -> execute_sample* -> finalize` the way a host
//! test runner would.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trialgate::baseline::{
    BaselineRecord, CovariateDeclaration, FactorSourceIdentity, MemoryBaselineRepository,
    StaticCovariates,
};
use trialgate::budget::BudgetLimits;
use trialgate::config::{ExhaustedBehavior, RunConfig, ThresholdOrigin};
use trialgate::engine::{ProbabilisticRun, ProcessContext, SampleError, SampleOutcome};
use trialgate::stats::ApproachKind;
use trialgate::trial::TerminationReason;
use trialgate::Error;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn process_with(records: Vec<BaselineRecord>) -> Arc<ProcessContext> {
    let repo = MemoryBaselineRepository::new();
    for record in records {
        repo.insert(record);
    }
    Arc::new(ProcessContext::new().with_repository(Arc::new(repo)))
}

fn baseline_951() -> BaselineRecord {
    BaselineRecord::builder("b-1", "checkout", 1000, 951).build()
}

/// Fails every `period`-th call.
fn periodic_sampler(period: u32) -> impl FnMut(&mut trialgate::engine::SampleScope) -> trialgate::engine::SampleResult {
    let mut calls = 0u32;
    move |_| {
        calls += 1;
        if calls % period == 0 {
            Err(SampleError::assertion(format!("call {calls} failed")))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Approach resolution through prepare
// ============================================================================

#[test]
fn test_sample_size_first_with_baseline_passes() {
    init_tracing();
    let process = process_with(vec![baseline_951()]);
    let config = RunConfig::builder()
        .samples(100)
        .threshold_confidence(0.95)
        .transparent_stats(true)
        .build()
        .unwrap();
    let run = ProbabilisticRun::prepare(process.run("checkout", config)).unwrap();
    assert_eq!(run.approach().kind, ApproachKind::SampleSizeFirst);
    assert!((0.88..0.93).contains(&run.approach().threshold));

    let report = run.run_all(periodic_sampler(20));
    assert!(report.passed(), "{}", report.verdict.message);
    assert_eq!(report.verdict.executed, 100);
    assert_eq!(report.entry("baseline.source"), Some("b-1"));
    assert_eq!(report.entry("confidence"), Some("0.9500"));
    assert!(report.verdict.message.contains("95.0% confidence"));
    assert!(report.verdict.explanation.as_deref().unwrap().contains("HYPOTHESIS TEST"));
}

#[test]
fn test_confidence_first_derives_sample_count() {
    let process = process_with(vec![BaselineRecord::builder("b-cf", "checkout", 1000, 950).build()]);
    let config = RunConfig::builder()
        .confidence(0.95)
        .min_detectable_effect(0.05)
        .power(0.8)
        .build()
        .unwrap();
    let run = ProbabilisticRun::prepare(process.run("checkout", config)).unwrap();
    assert_eq!(run.approach().kind, ApproachKind::ConfidenceFirst);
    assert_eq!(run.planned_slots().len(), 150);

    let report = run.run_all(|_| Ok(()));
    assert!(report.passed());
    assert!(report.entry("power.achieved").is_some());
}

#[test]
fn test_baseline_required_without_repository() {
    let process = Arc::new(ProcessContext::new());
    let config = RunConfig::builder().threshold_confidence(0.95).build().unwrap();
    let err = ProbabilisticRun::prepare(process.run("checkout", config)).unwrap_err();
    assert!(matches!(err, Error::BaselineRequired { .. }));
    assert!(err.is_configuration());
}

#[test]
fn test_over_specified_fails_before_sampling() {
    let process = process_with(vec![baseline_951()]);
    let config = RunConfig::builder()
        .min_pass_rate(0.9)
        .threshold_confidence(0.95)
        .build()
        .unwrap();
    let err = ProbabilisticRun::prepare(process.run("checkout", config)).unwrap_err();
    match err {
        Error::OverSpecifiedApproach { active } => {
            assert_eq!(active, ["sample-size-first", "threshold-first"]);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn test_explicit_threshold_conflicts_unless_normative() {
    let process = process_with(vec![baseline_951()]);
    let empirical = RunConfig::builder().min_pass_rate(0.9).build().unwrap();
    let err = ProbabilisticRun::prepare(process.run("checkout", empirical)).unwrap_err();
    assert!(matches!(err, Error::ThresholdConflict { .. }));

    let sla = RunConfig::builder()
        .min_pass_rate(0.9)
        .threshold_origin(ThresholdOrigin::Sla)
        .contract_ref("SLA-2024-7")
        .build()
        .unwrap();
    let run = ProbabilisticRun::prepare(process.run("checkout", sla)).unwrap();
    assert!(run.approach().sound);
    let report = run.run_all(|_| Ok(()));
    assert_eq!(report.entry("threshold.origin"), Some("SLA"));
    assert_eq!(report.entry("threshold.contract"), Some("SLA-2024-7"));
}

#[test]
fn test_unsound_threshold_still_runs() {
    let process = process_with(vec![baseline_951()]);
    let config = RunConfig::builder()
        .samples(1000)
        .min_pass_rate(0.96)
        .threshold_origin(ThresholdOrigin::Slo)
        .build()
        .unwrap();
    let run = ProbabilisticRun::prepare(process.run("checkout", config)).unwrap();
    assert!(!run.approach().sound);
    assert!(run.approach().confidence < 0.5);
}

// ============================================================================
// Baseline matching through prepare
// ============================================================================

#[test]
fn test_no_compatible_footprint_is_fatal() {
    let process = process_with(vec![BaselineRecord::builder("b-eu", "checkout", 500, 480)
        .covariate("region", "eu")
        .build()]);
    let config = RunConfig::builder().threshold_confidence(0.95).build().unwrap();
    let run_context = process
        .run("checkout", config)
        .with_covariates(CovariateDeclaration::new(["model"]))
        .with_covariate_source(Arc::new(StaticCovariates::new().with("model", "m1")));
    let err = ProbabilisticRun::prepare(run_context).unwrap_err();
    match err {
        Error::NoCompatibleBaseline { known, .. } => assert_eq!(known.len(), 1),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn test_non_conforming_covariates_are_reported() {
    let process = process_with(vec![BaselineRecord::builder("b-eu", "checkout", 1000, 960)
        .covariate("region", "eu")
        .factor_source(FactorSourceIdentity {
            hash: "aaa".to_string(),
            name: "prompts-v1".to_string(),
            sample_count: 1000,
        })
        .build()]);
    let config = RunConfig::builder()
        .samples(20)
        .threshold_confidence(0.9)
        .build()
        .unwrap();
    let run_context = process
        .run("checkout", config)
        .with_covariates(CovariateDeclaration::new(["region"]))
        .with_covariate_source(Arc::new(StaticCovariates::new().with("region", "us")))
        .with_factor_source(FactorSourceIdentity {
            hash: "bbb".to_string(),
            name: "prompts-v2".to_string(),
            sample_count: 20,
        });
    let report = ProbabilisticRun::prepare(run_context)
        .unwrap()
        .run_all(|_| Ok(()));
    assert_eq!(report.entry("baseline.non_conforming"), Some("region"));
    assert!(report.entry("factor_source.mismatch").unwrap().contains("prompts-v2"));
}

// ============================================================================
// Early termination and budgets
// ============================================================================

#[test]
fn test_impossibility_after_first_failure() {
    let process = Arc::new(ProcessContext::new());
    let config = RunConfig::builder().samples(10).min_pass_rate(0.95).build().unwrap();
    let report = ProbabilisticRun::prepare(process.run("strict", config))
        .unwrap()
        .run_all(|_| Err(SampleError::assertion("off by one")));
    assert!(!report.passed());
    assert_eq!(report.verdict.executed, 1);
    assert_eq!(report.entry("termination"), Some("IMPOSSIBILITY"));
    let details = report.entry("termination.details").unwrap();
    assert!(details.contains("at most 9"));
}

#[test]
fn test_static_charge_blocks_third_sample() {
    let process = Arc::new(ProcessContext::new());
    let config = RunConfig::builder()
        .samples(10)
        .min_pass_rate(0.5)
        .static_charge(5)
        .unit_budget(12)
        .build()
        .unwrap();
    let mut run = ProbabilisticRun::prepare(process.run("metered", config)).unwrap();
    assert!(run.execute_sample(0, |_| Ok(())).should_continue());
    assert!(run.execute_sample(1, |_| Ok(())).should_continue());
    let third = run.execute_sample(2, |_| panic!("third sample must not start"));
    assert!(matches!(third, SampleOutcome::Terminate(TerminationReason::Budget(_), _)));

    let report = run.finalize();
    assert_eq!(report.verdict.executed, 2);
    assert_eq!(report.entry("budget.run.units"), Some("10"));
    assert_eq!(report.entry("termination"), Some("RUN_UNITS_BUDGET_EXHAUSTED"));
    assert!(report.verdict.forced_failure);
    assert!(!report.passed());
}

#[test]
fn test_group_budget_shared_between_runs() {
    let process = Arc::new(ProcessContext::new());
    let group = process.group(
        "llm-suite",
        BudgetLimits::unlimited()
            .with_units(10)
            .on_exhausted(ExhaustedBehavior::EvaluatePartial),
    );
    let config = || RunConfig::builder().samples(2).min_pass_rate(0.5).build().unwrap();
    let token_sampler = |scope: &mut trialgate::engine::SampleScope| {
        scope.record_units(4);
        Ok(())
    };

    let first = ProbabilisticRun::prepare(group.run("summarize", config()))
        .unwrap()
        .run_all(token_sampler);
    assert_eq!(first.entry("termination"), Some("COMPLETED"));
    assert_eq!(first.entry("budget.group.units"), Some("8"));

    let second = ProbabilisticRun::prepare(group.run("translate", config()))
        .unwrap()
        .run_all(token_sampler);
    assert_eq!(second.verdict.executed, 1);
    assert_eq!(second.entry("termination"), Some("GROUP_UNITS_BUDGET_EXHAUSTED"));
    assert!(second.passed());
    assert_eq!(process.budget().consumed_units(), 12);
}

#[test]
fn test_time_budget_forces_failure() {
    let process = Arc::new(ProcessContext::new());
    let config = RunConfig::builder()
        .samples(100)
        .min_pass_rate(0.5)
        .time_budget(Duration::from_millis(30))
        .build()
        .unwrap();
    let report = ProbabilisticRun::prepare(process.run("slow", config))
        .unwrap()
        .run_all(|_| {
            std::thread::sleep(Duration::from_millis(10));
            Ok(())
        });
    assert!(report.verdict.executed < 100);
    assert_eq!(report.entry("termination"), Some("RUN_TIME_BUDGET_EXHAUSTED"));
    assert!(!report.passed());
}

#[test]
fn test_pacing_spaces_samples() {
    let process = Arc::new(ProcessContext::new());
    let config = RunConfig::builder()
        .samples(3)
        .min_pass_rate(0.5)
        .min_delay(Duration::from_millis(20))
        .build()
        .unwrap();
    let started = Instant::now();
    let report = ProbabilisticRun::prepare(process.run("paced", config))
        .unwrap()
        .run_all(|_| Ok(()));
    assert!(report.passed());
    assert!(started.elapsed() >= Duration::from_millis(40));
}

// ============================================================================
// Reporting
// ============================================================================

#[test]
fn test_stochastic_sampler_report_is_consistent() {
    let process = Arc::new(ProcessContext::new());
    let config = RunConfig::builder()
        .samples(200)
        .min_pass_rate(0.5)
        .max_example_failures(3)
        .build()
        .unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let report = ProbabilisticRun::prepare(process.run("stochastic", config))
        .unwrap()
        .run_all(|_| {
            if rng.gen_bool(0.9) {
                Ok(())
            } else {
                Err(SampleError::assertion("hallucinated field"))
            }
        });
    let verdict = &report.verdict;
    assert_eq!(verdict.executed, 200);
    assert!(verdict.passed);
    let failures: u32 = report.entry("failures").unwrap().parse().unwrap();
    assert_eq!(verdict.successes + failures, verdict.executed);
    let retained = report
        .entries
        .iter()
        .filter(|e| e.key.starts_with("trialgate.failure."))
        .count();
    assert_eq!(retained, failures.min(3) as usize);

    let json = report.to_json().unwrap();
    assert!(json.contains("\"verdict\""));
    assert!(json.contains("trialgate.samples.planned"));
}

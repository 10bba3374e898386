//! The probabilistic run: setup, per-sample state machine and finalization.

use std::cell::OnceCell;
use std::ops::Range;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::context::RunContext;
use super::outcome::{SampleError, SampleOutcome, SampleResult, SampleScope};
use super::report::{EntryList, ReportEntry, RunReport};
use crate::baseline::{
    BaselineMatcher, BaselineRecord, ExpirationStatus, FactorSourceCheck, SelectionResult,
    StandardCovariates,
};
use crate::budget::{BudgetExhaustion, BudgetLimits, BudgetMonitor, BudgetOrchestrator, BudgetScope};
use crate::config::{CostMode, ExceptionPolicy, ThresholdOrigin};
use crate::stats::{ApproachKind, ApproachResolver, ResolvedApproach, SampleSizeCalculator};
use crate::trial::{EarlyTerminationEvaluator, TerminationReason, TrialAggregate};
use crate::verdict::{VerdictDecider, VerdictInputs};
use crate::Result;

/// Baseline selection resolved at most once per run.
#[derive(Debug, Default)]
pub struct LazyBaseline {
    slot: OnceCell<Option<SelectionResult>>,
}

impl LazyBaseline {
    /// Resolve on first call; later calls return the stored result.
    ///
    /// # Errors
    ///
    /// Baseline matching errors (integrity, no compatible footprint).
    pub fn resolve(&self, context: &RunContext) -> Result<Option<&SelectionResult>> {
        if let Some(resolved) = self.slot.get() {
            return Ok(resolved.as_ref());
        }
        let selection = match context.process().repository() {
            Some(repository) => {
                let profile = match context.covariate_source() {
                    Some(source) => context.covariates().profile(&**source),
                    None => context.covariates().profile(&StandardCovariates::now()),
                };
                BaselineMatcher::new(repository.clone()).find(
                    context.spec_id(),
                    context.covariates(),
                    &profile,
                )?
            }
            None => None,
        };
        Ok(self.slot.get_or_init(|| selection).as_ref())
    }

    /// Whether resolution already happened.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Resolved selection, `None` before resolution or without a baseline.
    #[must_use]
    pub fn get(&self) -> Option<&SelectionResult> {
        self.slot.get().and_then(Option::as_ref)
    }
}

/// One probabilistic run.
///
/// Created by [`prepare`](Self::prepare), which fixes the threshold. The
/// host then executes the [`planned_slots`](Self::planned_slots) one at a
/// time and calls [`finalize`](Self::finalize).
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use trialgate::config::RunConfig;
/// use trialgate::engine::{ProbabilisticRun, ProcessContext};
///
/// let process = Arc::new(ProcessContext::new());
/// let config = RunConfig::builder().samples(20).min_pass_rate(0.9).build()?;
/// let mut run = ProbabilisticRun::prepare(process.run("always-passes", config))?;
///
/// for slot in run.planned_slots() {
///     if !run.execute_sample(slot, |_| Ok(())).should_continue() {
///         break;
///     }
/// }
/// let report = run.finalize();
/// assert!(report.passed());
/// # Ok::<(), trialgate::Error>(())
/// ```
#[derive(Debug)]
pub struct ProbabilisticRun {
    context: RunContext,
    baseline: LazyBaseline,
    approach: ResolvedApproach,
    aggregate: TrialAggregate,
    budget: BudgetOrchestrator,
    evaluator: EarlyTerminationEvaluator,
    pacing: Duration,
    last_sample_end: Option<Instant>,
    expiration: ExpirationStatus,
    factor_source: FactorSourceCheck,
}

impl ProbabilisticRun {
    /// Validate the configuration, resolve the baseline and fix the
    /// threshold. Nothing is sampled.
    ///
    /// # Errors
    ///
    /// Configuration errors, baseline integrity errors and
    /// [`Error::NoCompatibleBaseline`](crate::Error::NoCompatibleBaseline).
    pub fn prepare(context: RunContext) -> Result<Self> {
        let config = context.config();
        let params = config.approach_params();
        ApproachResolver::validate(&params)?;

        let baseline = LazyBaseline::default();
        let selection = baseline.resolve(&context)?;
        let record = selection.map(SelectionResult::selected);
        let approach = ApproachResolver::resolve(&params, record, context.spec_id())?;

        let expiration = record.map_or(ExpirationStatus::NoExpiration, |r| {
            r.expiration_status(Utc::now())
        });
        let factor_source = record.map_or(FactorSourceCheck::NotApplicable, |r| {
            r.check_factor_source(context.factor_source())
        });
        warn_about_baseline(context.spec_id(), record, expiration, &factor_source);

        let run_monitor = BudgetMonitor::new(
            BudgetScope::Run,
            BudgetLimits {
                time: config.time_budget(),
                units: config.unit_budget(),
                on_exhausted: config.on_budget_exhausted(),
            },
        );
        let budget = BudgetOrchestrator::new(
            context.process().budget(),
            context.group().map(|group| group.budget()),
            run_monitor,
            config.cost_mode(),
        );

        let planned = approach.sample_count;
        let aggregate = TrialAggregate::new(planned, config.max_example_failures());
        let evaluator = EarlyTerminationEvaluator::new(planned, approach.threshold);
        let pacing = config.pacing().delay();

        info!(
            spec_id = context.spec_id(),
            approach = %approach.kind,
            planned,
            threshold = approach.threshold,
            required = evaluator.required(),
            baseline = record.map(BaselineRecord::source_id),
            "run prepared"
        );

        Ok(Self {
            context,
            baseline,
            approach,
            aggregate,
            budget,
            evaluator,
            pacing,
            last_sample_end: None,
            expiration,
            factor_source,
        })
    }

    /// Slots the host should offer, in order.
    #[must_use]
    pub const fn planned_slots(&self) -> Range<u32> {
        0..self.approach.sample_count
    }

    /// Get the resolved approach.
    #[must_use]
    pub const fn approach(&self) -> &ResolvedApproach {
        &self.approach
    }

    /// Get the running totals.
    #[must_use]
    pub const fn aggregate(&self) -> &TrialAggregate {
        &self.aggregate
    }

    /// Get the budget orchestrator.
    #[must_use]
    pub const fn budget(&self) -> &BudgetOrchestrator {
        &self.budget
    }

    /// Get the run context.
    #[must_use]
    pub const fn context(&self) -> &RunContext {
        &self.context
    }

    /// Selected baseline, resolving it if needed (idempotent).
    ///
    /// # Errors
    ///
    /// Baseline matching errors on first resolution.
    pub fn baseline(&self) -> Result<Option<&SelectionResult>> {
        self.baseline.resolve(&self.context)
    }

    /// Execute one slot.
    ///
    /// Order: skip if terminated, pacing, budget pre-check, sample, record,
    /// cost credit, budget post-check, early termination, completion.
    /// Slots offered after termination are skipped and answered with
    /// [`SampleOutcome::Terminate`].
    pub fn execute_sample<F>(&mut self, slot: u32, sampler: F) -> SampleOutcome
    where
        F: FnOnce(&mut SampleScope) -> SampleResult,
    {
        if let Some(termination) = self.aggregate.termination() {
            debug!(slot, reason = %termination.reason, "slot skipped");
            return SampleOutcome::Terminate(termination.reason, termination.details.clone());
        }

        self.pace();

        if let Some(hit) = self.budget.check_before_sample() {
            return self.terminate_for_budget(hit);
        }

        let mut scope = SampleScope::new(slot);
        let result = sampler(&mut scope);
        self.last_sample_end = Some(Instant::now());

        let outcome = match result {
            Ok(()) => self
                .aggregate
                .record_success()
                .map(|()| SampleOutcome::Continue),
            Err(SampleError::AssertionFailed(detail)) => self.record_failure(detail),
            Err(SampleError::Unexpected(error)) => match self.context.config().on_exception() {
                ExceptionPolicy::FailSample => self.record_failure(format!("{error:#}")),
                ExceptionPolicy::AbortRun => {
                    warn!(slot, error = %error, "unexpected sample error, aborting run");
                    self.aggregate
                        .set_terminated(TerminationReason::Aborted, format!("{error:#}"));
                    self.aggregate.set_forced_failure(true);
                    Ok(SampleOutcome::Abort(error))
                }
            },
            Err(SampleError::Stop(detail)) => {
                info!(slot, detail = %detail, "sample requested stop");
                self.aggregate
                    .set_terminated(TerminationReason::Requested, detail.clone());
                Ok(SampleOutcome::Terminate(TerminationReason::Requested, detail))
            }
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(error) => return SampleOutcome::Abort(error.into()),
        };

        self.budget.record_units(scope.units());
        self.budget.credit_static_charge();
        debug!(
            slot,
            executed = self.aggregate.executed(),
            successes = self.aggregate.successes(),
            units = scope.units(),
            "sample recorded"
        );

        if !outcome.should_continue() {
            return outcome;
        }

        if let Some(hit) = self.budget.check_after_sample() {
            return self.terminate_for_budget(hit);
        }

        if let Some(decided) = self.evaluator.evaluate(&self.aggregate) {
            info!(slot, explanation = %decided.explanation, "early termination");
            self.aggregate
                .set_terminated(TerminationReason::Impossibility, decided.explanation.clone());
            return SampleOutcome::Terminate(TerminationReason::Impossibility, decided.explanation);
        }

        if self.aggregate.remaining() == 0 {
            self.aggregate.set_completed();
        }
        outcome
    }

    /// Offer every planned slot to `sampler` until the run terminates, then
    /// finalize.
    pub fn run_all<F>(mut self, mut sampler: F) -> RunReport
    where
        F: FnMut(&mut SampleScope) -> SampleResult,
    {
        for slot in self.planned_slots() {
            match self.execute_sample(slot, &mut sampler) {
                SampleOutcome::Abort(error) => {
                    warn!(slot, error = %error, "run aborted");
                    break;
                }
                outcome if !outcome.should_continue() => break,
                _ => {}
            }
        }
        self.finalize()
    }

    /// Decide the verdict and build the report.
    ///
    /// A run the host stopped without a termination signal is closed as
    /// requested and judged on the samples it executed.
    #[must_use]
    pub fn finalize(mut self) -> RunReport {
        if !self.aggregate.is_terminated() {
            let details = format!(
                "Host stopped after {} of {} samples",
                self.aggregate.executed(),
                self.aggregate.planned()
            );
            self.aggregate
                .set_terminated(TerminationReason::Requested, details);
        }

        let config = self.context.config();
        let record = self.baseline.get().map(SelectionResult::selected);
        let verdict = VerdictDecider::decide(
            &self.aggregate,
            &VerdictInputs {
                spec_id: self.context.spec_id(),
                approach: &self.approach,
                baseline: record,
                threshold_origin: config.threshold_origin(),
                contract_ref: config.contract_ref(),
                transparent_stats: config.transparent_stats(),
            },
        );
        let entries = self.report_entries();
        RunReport { verdict, entries }
    }

    fn record_failure(&mut self, detail: String) -> Result<SampleOutcome> {
        self.aggregate.record_failure(detail.clone())?;
        Ok(SampleOutcome::ContinueWithRecordedFailure(detail))
    }

    fn pace(&self) {
        if self.pacing.is_zero() {
            return;
        }
        if let Some(last) = self.last_sample_end {
            let wait = self.pacing.saturating_sub(last.elapsed());
            if !wait.is_zero() {
                debug!(wait_ms = wait.as_millis(), "pacing");
                std::thread::sleep(wait);
            }
        }
    }

    fn terminate_for_budget(&mut self, hit: BudgetExhaustion) -> SampleOutcome {
        warn!(
            spec_id = self.context.spec_id(),
            reason = %hit.reason(),
            executed = self.aggregate.executed(),
            forced_failure = hit.forces_failure(),
            "budget exhausted"
        );
        let details = format!(
            "{hit} after {} of {} samples",
            self.aggregate.executed(),
            self.aggregate.planned()
        );
        self.aggregate
            .set_terminated(TerminationReason::Budget(hit), details.clone());
        if hit.forces_failure() {
            self.aggregate.set_forced_failure(true);
        }
        SampleOutcome::Terminate(TerminationReason::Budget(hit), details)
    }

    fn report_entries(&self) -> Vec<ReportEntry> {
        let config = self.context.config();
        let agg = &self.aggregate;
        let mut entries = EntryList::default();

        entries.push("spec", self.context.spec_id());
        entries.push("approach", self.approach.kind);
        entries.push("samples.planned", agg.planned());
        entries.push("samples.executed", agg.executed());
        entries.push("successes", agg.successes());
        entries.push("failures", agg.failures());
        entries.push_rate("observed_rate", agg.observed_rate());
        entries.push_rate("threshold", self.approach.threshold);
        entries.push_rate("confidence", self.approach.confidence);
        entries.push("sound", self.approach.sound);
        if let Some(termination) = agg.termination() {
            entries.push("termination", termination.reason);
            entries.push("termination.details", &termination.details);
        }
        entries.push("forced_failure", agg.forced_failure());
        entries.push("elapsed_ms", agg.elapsed().as_millis());

        if let Some(group) = self.context.group() {
            entries.push("group", group.name());
        }
        if config.threshold_origin() != ThresholdOrigin::Unspecified {
            entries.push("threshold.origin", config.threshold_origin().name());
        }
        if let Some(reference) = config.contract_ref() {
            entries.push("threshold.contract", reference);
        }

        if let Some(selection) = self.baseline.get() {
            let record = selection.selected();
            entries.push("baseline.source", record.source_id());
            entries.push("baseline.samples", record.samples());
            entries.push_rate("baseline.rate", record.observed_rate());
            entries.push("baseline.expiration", format_args!("{:?}", self.expiration));
            if !selection.is_conforming() {
                entries.push(
                    "baseline.non_conforming",
                    selection.non_conforming_dimensions().join(","),
                );
            }
            if selection.is_ambiguous() {
                entries.push("baseline.ambiguous", selection.candidates_considered());
            }
            if let FactorSourceCheck::Mismatch { baseline, current } = &self.factor_source {
                entries.push("factor_source.mismatch", format_args!("{baseline} != {current}"));
            }
            if self.approach.kind == ApproachKind::ConfidenceFirst {
                let achieved = SampleSizeCalculator::achieved_power(
                    self.approach.baseline_rate,
                    self.approach.effect_size,
                    agg.executed(),
                    self.approach.confidence,
                );
                entries.push_rate("power.achieved", achieved);
            }
        }

        entries.push("budget.run.units", self.budget.run_monitor().consumed_units());
        if let Some(group) = self.budget.group_monitor() {
            entries.push("budget.group.units", group.consumed_units());
        }
        entries.push("budget.process.units", self.budget.process_monitor().consumed_units());
        if let CostMode::Static { charge } = config.cost_mode() {
            entries.push("budget.static_charge", charge);
        }

        for (index, example) in agg.failure_examples().iter().enumerate() {
            entries.push(&format!("failure.{index}"), example);
        }
        entries.into_inner()
    }
}

fn warn_about_baseline(
    spec_id: &str,
    record: Option<&BaselineRecord>,
    expiration: ExpirationStatus,
    factor_source: &FactorSourceCheck,
) {
    let Some(record) = record else {
        return;
    };
    if expiration.requires_warning() {
        warn!(
            spec_id,
            baseline = record.source_id(),
            status = ?expiration,
            "baseline is expiring or expired; regenerate it"
        );
    }
    if let FactorSourceCheck::Mismatch { baseline, current } = factor_source {
        warn!(
            spec_id,
            baseline = %baseline,
            current = %current,
            "factor source differs from the baseline's"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::{BaselineRepository, Footprint, MemoryBaselineRepository};
    use crate::config::{ExhaustedBehavior, RunConfig};
    use crate::engine::ProcessContext;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingRepository {
        inner: MemoryBaselineRepository,
        lookups: AtomicUsize,
    }

    impl BaselineRepository for CountingRepository {
        fn find_candidates(&self, spec_id: &str, footprint: &Footprint) -> Result<Vec<BaselineRecord>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_candidates(spec_id, footprint)
        }

        fn known_footprints(&self, spec_id: &str) -> Result<Vec<Footprint>> {
            self.inner.known_footprints(spec_id)
        }
    }

    fn threshold_first(samples: u32, rate: f64) -> RunConfig {
        RunConfig::builder()
            .samples(samples)
            .min_pass_rate(rate)
            .build()
            .unwrap()
    }

    #[test]
    fn test_baseline_resolved_once() {
        let inner = MemoryBaselineRepository::new();
        inner.insert(BaselineRecord::builder("b-1", "checkout", 1000, 951).build());
        let repo = Arc::new(CountingRepository {
            inner,
            lookups: AtomicUsize::new(0),
        });
        let process = Arc::new(ProcessContext::new().with_repository(repo.clone()));
        let config = RunConfig::builder()
            .samples(50)
            .threshold_confidence(0.95)
            .build()
            .unwrap();

        let run = ProbabilisticRun::prepare(process.run("checkout", config)).unwrap();
        let first = run.baseline().unwrap().map(|s| s.selected().source_id().to_string());
        let second = run.baseline().unwrap().map(|s| s.selected().source_id().to_string());
        assert_eq!(first.as_deref(), Some("b-1"));
        assert_eq!(first, second);
        assert_eq!(repo.lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_impossibility_stops_run() {
        let process = Arc::new(ProcessContext::new());
        let mut run = ProbabilisticRun::prepare(process.run("flaky", threshold_first(10, 0.95))).unwrap();

        let outcome = run.execute_sample(0, |_| Err(SampleError::assertion("wrong answer")));
        assert!(matches!(
            outcome,
            SampleOutcome::Terminate(TerminationReason::Impossibility, _)
        ));
        let skipped = run.execute_sample(1, |_| panic!("must not run"));
        assert!(!skipped.should_continue());
        assert_eq!(run.aggregate().executed(), 1);

        let report = run.finalize();
        assert!(!report.passed());
        assert_eq!(report.entry("termination"), Some("IMPOSSIBILITY"));
        assert_eq!(report.entry("failure.0"), Some("wrong answer"));
    }

    #[test]
    fn test_completes_after_planned_samples() {
        let process = Arc::new(ProcessContext::new());
        let run = ProbabilisticRun::prepare(process.run("stable", threshold_first(5, 0.8))).unwrap();
        let report = run.run_all(|_| Ok(()));
        assert!(report.passed());
        assert_eq!(report.verdict.executed, 5);
        assert_eq!(report.entry("termination"), Some("COMPLETED"));
    }

    #[test]
    fn test_unexpected_error_policies() {
        let process = Arc::new(ProcessContext::new());
        let lenient = ProbabilisticRun::prepare(process.run("lenient", threshold_first(4, 0.5))).unwrap();
        let mut calls = 0;
        let report = lenient.run_all(|_| {
            calls += 1;
            if calls == 1 {
                Err(anyhow::anyhow!("socket closed").into())
            } else {
                Ok(())
            }
        });
        assert!(report.passed());
        assert_eq!(report.verdict.executed, 4);
        assert_eq!(report.entry("failure.0"), Some("socket closed"));

        let strict_config = RunConfig::builder()
            .samples(4)
            .min_pass_rate(0.5)
            .on_exception(ExceptionPolicy::AbortRun)
            .build()
            .unwrap();
        let mut strict = ProbabilisticRun::prepare(process.run("strict", strict_config)).unwrap();
        let outcome = strict.execute_sample(0, |_| Err(anyhow::anyhow!("socket closed").into()));
        assert!(matches!(outcome, SampleOutcome::Abort(_)));
        let report = strict.finalize();
        assert!(!report.passed());
        assert_eq!(report.entry("termination"), Some("ABORTED"));
    }

    #[test]
    fn test_stop_request_is_not_recorded() {
        let process = Arc::new(ProcessContext::new());
        let mut run = ProbabilisticRun::prepare(process.run("stop", threshold_first(10, 0.5))).unwrap();
        assert!(run.execute_sample(0, |_| Ok(())).should_continue());
        let outcome = run.execute_sample(1, |_| Err(SampleError::Stop("quota".into())));
        assert!(matches!(outcome, SampleOutcome::Terminate(TerminationReason::Requested, _)));
        assert_eq!(run.aggregate().executed(), 1);
        assert!(run.finalize().passed());
    }

    #[test]
    fn test_dynamic_units_checked_after_sample() {
        let process = Arc::new(ProcessContext::new());
        let config = RunConfig::builder()
            .samples(10)
            .min_pass_rate(0.5)
            .unit_budget(7)
            .on_budget_exhausted(ExhaustedBehavior::EvaluatePartial)
            .build()
            .unwrap();
        let run = ProbabilisticRun::prepare(process.run("tokens", config)).unwrap();
        let report = run.run_all(|scope| {
            scope.record_units(3);
            Ok(())
        });
        assert_eq!(report.verdict.executed, 3);
        assert_eq!(report.entry("termination"), Some("RUN_UNITS_BUDGET_EXHAUSTED"));
        assert!(report.passed());
        assert_eq!(report.entry("budget.run.units"), Some("9"));
    }

    #[test]
    fn test_host_stopping_early_is_tolerated() {
        let process = Arc::new(ProcessContext::new());
        let mut run = ProbabilisticRun::prepare(process.run("partial", threshold_first(10, 0.5))).unwrap();
        run.execute_sample(0, |_| Ok(()));
        let report = run.finalize();
        assert_eq!(report.entry("termination"), Some("REQUESTED"));
        assert_eq!(report.verdict.executed, 1);
    }
}

//! Final pass/fail decision and its human-auditable justification.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::baseline::BaselineRecord;
use crate::config::ThresholdOrigin;
use crate::stats::{ApproachKind, BinomialEstimator, ResolvedApproach};
use crate::trial::{Termination, TrialAggregate};

/// Confidence used for the explanation interval when the approach has none.
const DEFAULT_INTERVAL_CONFIDENCE: f64 = 0.95;

/// Baseline facts quoted in a verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineSummary {
    /// Baseline record identifier
    pub source_id: String,
    /// Observed baseline rate
    pub rate: f64,
    /// Baseline sample count
    pub samples: u64,
}

/// Everything the decision needs besides the aggregate.
#[derive(Debug, Clone, Copy)]
pub struct VerdictInputs<'a> {
    /// Use case identifier
    pub spec_id: &'a str,
    /// Resolved approach supplying the threshold
    pub approach: &'a ResolvedApproach,
    /// Baseline the threshold was grounded in
    pub baseline: Option<&'a BaselineRecord>,
    /// Origin of an explicit threshold
    pub threshold_origin: ThresholdOrigin,
    /// Contract reference of an explicit threshold
    pub contract_ref: Option<&'a str>,
    /// Attach a multi-line statistical explanation
    pub transparent_stats: bool,
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the run passed
    pub passed: bool,
    /// Use case identifier
    pub spec_id: String,
    /// Approach that fixed the threshold
    pub approach: ApproachKind,
    /// Observed pass rate
    pub observed_rate: f64,
    /// Passing samples
    pub successes: u32,
    /// Executed samples
    pub executed: u32,
    /// Planned samples
    pub planned: u32,
    /// Threshold the rate was compared against
    pub threshold: f64,
    /// Confidence, `NaN` when unknown
    pub confidence: f64,
    /// Baseline facts, if one was used
    pub baseline: Option<BaselineSummary>,
    /// How the run stopped
    pub termination: Option<Termination>,
    /// Whether a budget or an abort forced the failure
    pub forced_failure: bool,
    /// One-paragraph justification
    pub message: String,
    /// Multi-line statistical explanation, if requested
    pub explanation: Option<String>,
}

/// Computes the verdict of a finished run.
pub struct VerdictDecider {
    _private: (),
}

impl VerdictDecider {
    /// `passed = !forced_failure && executed > 0 && observed_rate >= threshold`.
    #[must_use]
    pub fn decide(aggregate: &TrialAggregate, inputs: &VerdictInputs<'_>) -> Verdict {
        let approach = inputs.approach;
        let rate = aggregate.observed_rate();
        let passed =
            !aggregate.forced_failure() && aggregate.executed() > 0 && rate >= approach.threshold;

        let baseline = inputs.baseline.map(|record| BaselineSummary {
            source_id: record.source_id().to_string(),
            rate: record.observed_rate(),
            samples: record.samples(),
        });

        let message = build_message(passed, aggregate, inputs, baseline.as_ref());
        let explanation = inputs
            .transparent_stats
            .then(|| build_explanation(passed, aggregate, inputs, baseline.as_ref()));

        info!(
            spec_id = inputs.spec_id,
            passed,
            successes = aggregate.successes(),
            executed = aggregate.executed(),
            threshold = approach.threshold,
            "verdict"
        );

        Verdict {
            passed,
            spec_id: inputs.spec_id.to_string(),
            approach: approach.kind,
            observed_rate: rate,
            successes: aggregate.successes(),
            executed: aggregate.executed(),
            planned: aggregate.planned(),
            threshold: approach.threshold,
            confidence: approach.confidence,
            baseline,
            termination: aggregate.termination().cloned(),
            forced_failure: aggregate.forced_failure(),
            message,
            explanation,
        }
    }
}

fn build_message(
    passed: bool,
    aggregate: &TrialAggregate,
    inputs: &VerdictInputs<'_>,
    baseline: Option<&BaselineSummary>,
) -> String {
    let approach = inputs.approach;
    let comparison = if aggregate.observed_rate() >= approach.threshold {
        ">="
    } else {
        "<"
    };
    let outcome = if passed { "PASSED" } else { "FAILED" };

    let mut message = match baseline {
        Some(summary) if !approach.confidence.is_nan() => format!(
            "{spec}: {outcome} with {conf:.1}% confidence (alpha={alpha:.3}). \
             Observed pass rate: {rate:.4} ({k}/{n}) {comparison} min pass rate: {threshold:.4}. \
             Baseline: {brate:.4} ({bsamples} samples) from '{source}'.",
            spec = inputs.spec_id,
            conf = approach.confidence * 100.0,
            alpha = approach.implied_alpha(),
            rate = aggregate.observed_rate(),
            k = aggregate.successes(),
            n = aggregate.executed(),
            threshold = approach.threshold,
            brate = summary.rate,
            bsamples = summary.samples,
            source = summary.source_id,
        ),
        _ => format!(
            "{spec}: {outcome}. Observed pass rate {rate:.4} ({k}/{n}) {comparison} required min pass rate {threshold:.4}.",
            spec = inputs.spec_id,
            rate = aggregate.observed_rate(),
            k = aggregate.successes(),
            n = aggregate.executed(),
            threshold = approach.threshold,
        ),
    };

    if inputs.threshold_origin != ThresholdOrigin::Unspecified {
        let _ = write!(message, " Threshold origin: {}", inputs.threshold_origin.name());
        if let Some(reference) = inputs.contract_ref {
            let _ = write!(message, " ({reference})");
        }
        message.push('.');
    }
    if let Some(termination) = aggregate.termination().filter(|t| t.reason.is_early()) {
        let _ = write!(
            message,
            " Terminated early ({}): {}.",
            termination.reason, termination.details
        );
    }
    if aggregate.forced_failure() {
        message.push_str(" Run forced to fail.");
    }
    message
}

fn build_explanation(
    passed: bool,
    aggregate: &TrialAggregate,
    inputs: &VerdictInputs<'_>,
    baseline: Option<&BaselineSummary>,
) -> String {
    let approach = inputs.approach;
    let n = aggregate.executed();
    let rate = aggregate.observed_rate();
    let interval_confidence = if approach.confidence.is_nan() {
        DEFAULT_INTERVAL_CONFIDENCE
    } else {
        approach.confidence
    };

    let mut out = String::new();
    let _ = writeln!(out, "STATISTICAL ANALYSIS: {}", inputs.spec_id);
    let _ = writeln!(out);
    let _ = writeln!(out, "HYPOTHESIS TEST ({})", approach.kind);
    let _ = writeln!(
        out,
        "  H0: true success rate <= {:.4} (the use case does not meet its requirement)",
        approach.threshold
    );
    let _ = writeln!(out, "  H1: true success rate > {:.4}", approach.threshold);
    let _ = writeln!(out, "  Test: one-sided binomial proportion");
    let _ = writeln!(out);
    let _ = writeln!(out, "OBSERVED DATA");
    let _ = writeln!(out, "  Samples executed: {n} of {}", aggregate.planned());
    let _ = writeln!(out, "  Successes: {}", aggregate.successes());
    let _ = writeln!(out, "  Observed rate: {rate:.4}");

    if let Some(summary) = baseline {
        let _ = writeln!(out);
        let _ = writeln!(out, "BASELINE REFERENCE");
        let _ = writeln!(out, "  Source: {}", summary.source_id);
        let _ = writeln!(out, "  Baseline rate: {:.4} ({} samples)", summary.rate, summary.samples);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "STATISTICAL INFERENCE");
    if n > 0 {
        let standard_error = (rate * (1.0 - rate) / f64::from(n)).sqrt();
        let _ = writeln!(out, "  Standard error: {standard_error:.4}");
        if let Ok(estimator) = BinomialEstimator::new(interval_confidence) {
            let interval = estimator.interval(u64::from(aggregate.successes()), u64::from(n));
            let _ = writeln!(
                out,
                "  {:.0}% Wilson interval: [{:.4}, {:.4}]",
                interval_confidence * 100.0,
                interval.lower,
                interval.upper
            );
        }
    } else {
        let _ = writeln!(out, "  No samples executed");
    }
    if !approach.confidence.is_nan() {
        let _ = writeln!(out, "  Confidence: {:.1}%", approach.confidence * 100.0);
    }
    if !approach.power.is_nan() {
        let _ = writeln!(
            out,
            "  Power: {:.1}% to detect a drop of {:.4}",
            approach.power * 100.0,
            approach.effect_size
        );
    }
    if !approach.sound {
        let _ = writeln!(out, "  Warning: threshold is statistically unsound for this baseline");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "VERDICT");
    if passed {
        let _ = writeln!(out, "  PASS: insufficient evidence that the success rate is below the threshold");
    } else if aggregate.forced_failure() {
        let _ = writeln!(out, "  FAIL: run stopped before a decision was reached");
    } else {
        let _ = writeln!(out, "  FAIL: observed rate is below the threshold");
    }
    out
}

//! Property-based tests for trialgate
//!
//! - Statistical invariants (bounds, required successes, determinism)
//! - Aggregation invariants (counts, monotonicity, termination)
//! - Run with ProptestConfig::with_cases(100)

use std::sync::Arc;

use proptest::prelude::*;
use trialgate::baseline::{BaselineRecord, CovariateDeclaration, Footprint, MemoryBaselineRepository};
use trialgate::config::ThresholdOrigin;
use trialgate::stats::{
    ApproachParams, ApproachResolver, BaselineData, BinomialEstimator, ThresholdDeriver,
};
use trialgate::trial::{required_successes, EarlyTerminationEvaluator, TrialAggregate};

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Baseline (samples, successes) with successes <= samples
fn arb_baseline() -> impl Strategy<Value = (u64, u64)> {
    (10u64..5000).prop_flat_map(|samples| (Just(samples), 0..=samples))
}

/// Sequence of sample outcomes
fn arb_outcomes(max: usize) -> impl Strategy<Value = Vec<bool>> {
    proptest::collection::vec(any::<bool>(), 1..max)
}

fn params(
    threshold_confidence: Option<f64>,
    cf: Option<(f64, f64, f64)>,
    min_pass_rate: Option<f64>,
) -> ApproachParams {
    ApproachParams {
        samples: 100,
        min_pass_rate,
        threshold_confidence,
        confidence: cf.map(|(c, _, _)| c),
        min_detectable_effect: cf.map(|(_, e, _)| e),
        power: cf.map(|(_, _, p)| p),
        threshold_origin: ThresholdOrigin::Unspecified,
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: required successes is the smallest count reaching the rate
    #[test]
    fn prop_required_successes_is_minimal(planned in 1u32..2000, rate in 0.0f64..=1.0) {
        let required = required_successes(planned, rate);
        let n = f64::from(planned);
        prop_assert!(required <= planned);
        // Same comparison the verdict applies to the observed rate
        prop_assert!(f64::from(required) / n >= rate);
        // One fewer would not reach it
        if required > 0 {
            prop_assert!(f64::from(required - 1) / n < rate);
        }
    }

    /// Property: Wilson lower bound stays in [0, observed rate]
    #[test]
    fn prop_wilson_lower_bound_below_rate((samples, successes) in arb_baseline(),
                                          confidence in 0.5f64..0.999) {
        let estimator = BinomialEstimator::new(confidence).unwrap();
        let lower = estimator.lower_bound(successes, samples);
        #[allow(clippy::cast_precision_loss)]
        let rate = successes as f64 / samples as f64;
        prop_assert!(lower >= 0.0);
        prop_assert!(lower <= rate + 1e-12);
    }

    /// Property: higher confidence never raises the derived threshold
    #[test]
    fn prop_threshold_monotone_in_confidence((samples, successes) in arb_baseline(),
                                             planned in 10u32..500) {
        let data = BaselineData::new(samples, successes).unwrap();
        let low = ThresholdDeriver::sample_size_first(data, planned, 0.80).unwrap();
        let high = ThresholdDeriver::sample_size_first(data, planned, 0.99).unwrap();
        prop_assert!(high.threshold <= low.threshold + 1e-12);
    }

    /// Property: sample-size-first derivation is deterministic
    #[test]
    fn prop_sample_size_first_deterministic((samples, successes) in arb_baseline(),
                                            confidence in 0.8f64..0.99) {
        let record = BaselineRecord::builder("b", "spec", samples, successes).build();
        let p = params(Some(confidence), None, None);
        let first = ApproachResolver::resolve(&p, Some(&record), "spec").unwrap();
        let second = ApproachResolver::resolve(&p, Some(&record), "spec").unwrap();
        prop_assert_eq!(first.threshold.to_bits(), second.threshold.to_bits());
        prop_assert!(first.effect_size.is_nan());
        prop_assert!(first.power.is_nan());
    }

    /// Property: exactly one active approach validates
    #[test]
    fn prop_exactly_one_approach_validates(ssf in any::<bool>(), cf in any::<bool>(), tf in any::<bool>()) {
        let p = params(
            ssf.then_some(0.95),
            cf.then_some((0.95, 0.05, 0.8)),
            tf.then_some(0.9),
        );
        let active = [ssf, cf, tf].iter().filter(|a| **a).count();
        let result = ApproachResolver::validate(&p);
        prop_assert_eq!(result.is_ok(), active == 1);
        if let Err(error) = result {
            prop_assert!(error.is_configuration());
        }
    }

    /// Property: counts stay consistent and executed never exceeds planned
    #[test]
    fn prop_aggregate_invariants(outcomes in arb_outcomes(60), planned in 1u32..40, max_examples in 0usize..5) {
        let mut agg = TrialAggregate::new(planned, max_examples);
        let mut last_executed = 0;
        for passed in outcomes {
            let result = if passed { agg.record_success() } else { agg.record_failure("x") };
            prop_assert_eq!(result.is_ok(), last_executed < planned);
            prop_assert!(agg.executed() >= last_executed);
            prop_assert_eq!(agg.successes() + agg.failures(), agg.executed());
            prop_assert!(agg.executed() <= planned);
            prop_assert!(agg.failure_examples().len() <= max_examples);
            last_executed = agg.executed();
        }
    }

    /// Property: impossibility triggers exactly when the threshold is out of reach
    #[test]
    fn prop_impossibility_iff_unreachable(outcomes in arb_outcomes(50), rate in 0.0f64..=1.0) {
        #[allow(clippy::cast_possible_truncation)]
        let planned = outcomes.len() as u32;
        let evaluator = EarlyTerminationEvaluator::new(planned, rate);
        let mut agg = TrialAggregate::new(planned, 0);
        for passed in outcomes {
            if passed { agg.record_success().unwrap(); } else { agg.record_failure("x").unwrap(); }
            let unreachable = agg.successes() + agg.remaining() < evaluator.required();
            prop_assert_eq!(evaluator.evaluate(&agg).is_some(), unreachable);
            if unreachable {
                break;
            }
        }
    }

    /// Property: footprint ignores declaration order
    #[test]
    fn prop_footprint_order_independent(mut dims in proptest::collection::vec("[a-z]{1,8}", 0..6)) {
        let forward = Footprint::compute("spec", &CovariateDeclaration::new(dims.clone()));
        dims.reverse();
        let backward = Footprint::compute("spec", &CovariateDeclaration::new(dims));
        prop_assert_eq!(forward, backward);
    }

    /// Property: sealed records survive a JSON round trip through the repository
    #[test]
    fn prop_sealed_records_verify_after_import((samples, successes) in arb_baseline()) {
        let record = BaselineRecord::builder("b", "spec", samples, successes)
            .covariate("region", "eu")
            .build()
            .sealed();
        let json = serde_json::to_string(&vec![record]).unwrap();
        let repo = Arc::new(MemoryBaselineRepository::from_json_str(&json).unwrap());
        prop_assert_eq!(repo.len(), 1);
    }
}

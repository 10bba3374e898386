//! Threshold derivation from baseline evidence.
//!
//! Two directions are supported:
//! - sample-size-first: fix (samples, confidence), derive the pass-rate threshold
//! - threshold-first: fix (samples, threshold), derive the implied confidence

use serde::{Deserialize, Serialize};

use super::binomial::{normal_cdf, BinomialEstimator};
use crate::{Error, Result};

/// Empirical (samples, successes) pair from a baseline measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineData {
    samples: u64,
    successes: u64,
}

impl BaselineData {
    /// Create baseline evidence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBaseline`] if `samples` is zero or
    /// `successes > samples`.
    pub fn new(samples: u64, successes: u64) -> Result<Self> {
        if samples == 0 {
            return Err(Error::InvalidBaseline(
                "baseline has zero samples".to_string(),
            ));
        }
        if successes > samples {
            return Err(Error::InvalidBaseline(format!(
                "baseline successes {successes} exceed samples {samples}"
            )));
        }
        Ok(Self { samples, successes })
    }

    /// Number of baseline samples.
    #[must_use]
    pub const fn samples(&self) -> u64 {
        self.samples
    }

    /// Number of baseline successes.
    #[must_use]
    pub const fn successes(&self) -> u64 {
        self.successes
    }

    /// Observed baseline success rate.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self) -> f64 {
        self.successes as f64 / self.samples as f64
    }
}

/// Result of a threshold derivation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedThreshold {
    /// Minimum pass rate the test run must reach
    pub threshold: f64,
    /// Confidence level (configured or implied)
    pub confidence: f64,
    /// Observed baseline rate the derivation started from
    pub baseline_rate: f64,
    /// Test sample count the derivation assumed
    pub sample_count: u32,
    /// False when the derivation is statistically questionable
    pub sound: bool,
}

impl DerivedThreshold {
    /// Implied false-positive rate (1 - confidence).
    #[must_use]
    pub fn implied_alpha(&self) -> f64 {
        1.0 - self.confidence
    }
}

/// Turns baseline evidence plus a strategy into a threshold or a confidence.
pub struct ThresholdDeriver {
    _private: (),
}

impl ThresholdDeriver {
    /// Sample-size-first derivation.
    ///
    /// The threshold is the one-sided Wilson lower bound of the baseline rate
    /// evaluated over `samples` test trials: a process still performing at
    /// its baseline rate stays at or above it with probability `confidence`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for zero samples or a confidence
    /// outside `(0, 1)`.
    pub fn sample_size_first(
        baseline: BaselineData,
        samples: u32,
        confidence: f64,
    ) -> Result<DerivedThreshold> {
        if samples == 0 {
            return Err(Error::InvalidConfig(
                "sample-size-first needs at least one sample".to_string(),
            ));
        }
        let estimator = BinomialEstimator::new(confidence)?;
        let baseline_rate = baseline.rate();
        let threshold = estimator.lower_bound_for_rate(baseline_rate, u64::from(samples));

        let sound = threshold > 0.0
            && threshold < baseline_rate
            && baseline.samples() >= u64::from(samples);

        Ok(DerivedThreshold {
            threshold,
            confidence,
            baseline_rate,
            sample_count: samples,
            sound,
        })
    }

    /// Threshold-first derivation: the confidence the baseline implies for an
    /// explicit threshold.
    ///
    /// A threshold at or above the baseline rate implies a false-positive
    /// rate of 50% or worse and is flagged unsound.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for zero samples or a threshold
    /// outside `[0, 1]`.
    pub fn threshold_first(
        baseline: BaselineData,
        samples: u32,
        threshold: f64,
    ) -> Result<DerivedThreshold> {
        if samples == 0 {
            return Err(Error::InvalidConfig(
                "threshold-first needs at least one sample".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidConfig(format!(
                "min_pass_rate must be in [0, 1], got {threshold}"
            )));
        }
        let baseline_rate = baseline.rate();
        let confidence = Self::implied_confidence(baseline_rate, samples, threshold);

        Ok(DerivedThreshold {
            threshold,
            confidence,
            baseline_rate,
            sample_count: samples,
            sound: threshold < baseline_rate,
        })
    }

    /// Probability that a process at `baseline_rate` observes a rate at or
    /// above `threshold` over `samples` trials (normal approximation).
    #[must_use]
    pub fn implied_confidence(baseline_rate: f64, samples: u32, threshold: f64) -> f64 {
        let variance = baseline_rate * (1.0 - baseline_rate) / f64::from(samples.max(1));
        if variance <= 0.0 {
            return if threshold < baseline_rate {
                1.0
            } else if (threshold - baseline_rate).abs() < f64::EPSILON {
                0.5
            } else {
                0.0
            };
        }
        normal_cdf((baseline_rate - threshold) / variance.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(samples: u64, successes: u64) -> BaselineData {
        BaselineData::new(samples, successes).unwrap()
    }

    #[test]
    fn test_baseline_data_validation() {
        assert!(BaselineData::new(0, 0).is_err());
        assert!(BaselineData::new(10, 11).is_err());
        assert!((baseline(1000, 951).rate() - 0.951).abs() < 1e-12);
    }

    #[test]
    fn test_sample_size_first_below_baseline_rate() {
        let derived = ThresholdDeriver::sample_size_first(baseline(1000, 951), 100, 0.95).unwrap();
        assert!(derived.threshold < 0.951);
        assert!(derived.threshold > 0.85);
        assert!(derived.sound);
        assert!((derived.implied_alpha() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_sample_size_first_is_deterministic() {
        let first = ThresholdDeriver::sample_size_first(baseline(500, 470), 200, 0.9).unwrap();
        let second = ThresholdDeriver::sample_size_first(baseline(500, 470), 200, 0.9).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sample_size_first_small_baseline_unsound() {
        let derived = ThresholdDeriver::sample_size_first(baseline(50, 48), 100, 0.95).unwrap();
        assert!(!derived.sound);
    }

    #[test]
    fn test_more_samples_tighten_threshold() {
        let small = ThresholdDeriver::sample_size_first(baseline(5000, 4750), 50, 0.95).unwrap();
        let large = ThresholdDeriver::sample_size_first(baseline(5000, 4750), 1000, 0.95).unwrap();
        assert!(large.threshold > small.threshold);
    }

    #[test]
    fn test_threshold_first_above_baseline_is_unsound() {
        let derived = ThresholdDeriver::threshold_first(baseline(1000, 951), 100, 0.96).unwrap();
        assert!(!derived.sound);
        assert!(derived.confidence < 0.5);
    }

    #[test]
    fn test_threshold_first_below_baseline_is_sound() {
        let derived = ThresholdDeriver::threshold_first(baseline(1000, 951), 100, 0.90).unwrap();
        assert!(derived.sound);
        assert!(derived.confidence > 0.95);
    }

    #[test]
    fn test_threshold_first_rejects_bad_input() {
        assert!(ThresholdDeriver::threshold_first(baseline(10, 9), 0, 0.5).is_err());
        assert!(ThresholdDeriver::threshold_first(baseline(10, 9), 10, 1.5).is_err());
    }

    #[test]
    fn test_implied_confidence_degenerate_variance() {
        assert_eq!(ThresholdDeriver::implied_confidence(1.0, 100, 0.99), 1.0);
        assert_eq!(ThresholdDeriver::implied_confidence(1.0, 100, 1.0), 0.5);
    }

    #[test]
    fn test_threshold_first_inverts_sample_size_first() {
        let ssf = ThresholdDeriver::sample_size_first(baseline(20_000, 18_000), 400, 0.95).unwrap();
        let implied = ThresholdDeriver::implied_confidence(0.9, 400, ssf.threshold);
        // Wilson is the more conservative of the two, so the implied confidence
        // lands at or slightly above the requested one.
        assert!((0.95..0.98).contains(&implied), "implied={implied}");
    }
}

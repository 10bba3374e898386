//! Early termination when the outcome is already settled.

use super::aggregate::TrialAggregate;

/// Guards `ceil` against products like `100 * 0.95 = 95.00000000000001`.
const CEIL_EPSILON: f64 = 1e-9;

/// Smallest success count out of `planned` whose rate reaches `min_pass_rate`.
///
/// "Reaches" is the verdict's comparison, `k / planned >= min_pass_rate`,
/// so the guarded `ceil` is corrected against that division.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn required_successes(planned: u32, min_pass_rate: f64) -> u32 {
    let raw = (f64::from(planned) * min_pass_rate - CEIL_EPSILON).ceil();
    let mut required = raw.clamp(0.0, f64::from(planned)) as u32;
    let reaches = |k: u32| f64::from(k) / f64::from(planned) >= min_pass_rate;
    while required < planned && !reaches(required) {
        required += 1;
    }
    while required > 0 && reaches(required - 1) {
        required -= 1;
    }
    required
}

/// A decision to stop before every planned sample has executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarlyTermination {
    /// Human-readable explanation citing the counts
    pub explanation: String,
}

/// Decides after each sample whether failing is already certain.
///
/// Only impossibility is detected: a run whose success is already
/// guaranteed keeps sampling.
#[derive(Debug, Clone, Copy)]
pub struct EarlyTerminationEvaluator {
    planned: u32,
    required: u32,
}

impl EarlyTerminationEvaluator {
    /// Precompute the required success count.
    #[must_use]
    pub fn new(planned: u32, min_pass_rate: f64) -> Self {
        Self {
            planned,
            required: required_successes(planned, min_pass_rate),
        }
    }

    /// Required success count.
    #[must_use]
    pub const fn required(&self) -> u32 {
        self.required
    }

    /// Planned sample count.
    #[must_use]
    pub const fn planned(&self) -> u32 {
        self.planned
    }

    /// `Some` when the remaining samples cannot lift the run to the
    /// required success count.
    #[must_use]
    pub fn evaluate(&self, aggregate: &TrialAggregate) -> Option<EarlyTermination> {
        let remaining = self.planned.saturating_sub(aggregate.executed());
        let max_possible = aggregate.successes().saturating_add(remaining);
        (max_possible < self.required).then(|| EarlyTermination {
            explanation: format!(
                "Cannot reach the required pass rate: {} successes so far + {remaining} remaining samples = \
                 at most {max_possible}, but {} of {} are required",
                aggregate.successes(),
                self.required,
                self.planned
            ),
        })
    }
}

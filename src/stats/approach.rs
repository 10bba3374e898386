//! Operational approach selection.
//!
//! Exactly one of three approaches fixes two of {sample count, confidence,
//! threshold} and derives the third:
//!
//! | Approach | Configured | Derived |
//! |---|---|---|
//! | sample-size-first | samples, threshold_confidence | threshold |
//! | confidence-first | confidence, min_detectable_effect, power | samples, threshold |
//! | threshold-first | samples, min_pass_rate | implied confidence |

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::sample_size::SampleSizeCalculator;
use super::threshold::ThresholdDeriver;
use crate::baseline::BaselineRecord;
use crate::config::ThresholdOrigin;
use crate::{Error, Result};

/// Tolerance when comparing an explicit threshold to a baseline's stored one.
const THRESHOLD_MATCH_TOLERANCE: f64 = 1e-6;

/// The active operational approach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApproachKind {
    /// Fixed sample count and confidence; threshold derived from baseline
    SampleSizeFirst,
    /// Fixed confidence, effect and power; sample count and threshold derived
    ConfidenceFirst,
    /// Fixed sample count and threshold; confidence implied by baseline
    ThresholdFirst,
}

impl ApproachKind {
    /// Stable kebab-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SampleSizeFirst => "sample-size-first",
            Self::ConfidenceFirst => "confidence-first",
            Self::ThresholdFirst => "threshold-first",
        }
    }
}

impl fmt::Display for ApproachKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Statistical parameters as configured for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApproachParams {
    /// Planned samples (after the multiplier)
    pub samples: u32,
    /// Explicit threshold (threshold-first)
    pub min_pass_rate: Option<f64>,
    /// Confidence for the derived threshold (sample-size-first)
    pub threshold_confidence: Option<f64>,
    /// Confidence (confidence-first)
    pub confidence: Option<f64>,
    /// Smallest drop worth detecting (confidence-first)
    pub min_detectable_effect: Option<f64>,
    /// Desired power (confidence-first)
    pub power: Option<f64>,
    /// Where an explicit threshold comes from
    pub threshold_origin: ThresholdOrigin,
}

/// Outcome of approach resolution. Fields that do not apply to the active
/// approach are `NaN`, never zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedApproach {
    /// Active approach
    pub kind: ApproachKind,
    /// Samples the run executes
    pub sample_count: u32,
    /// Minimum pass rate the run must reach
    pub threshold: f64,
    /// Configured or implied confidence
    pub confidence: f64,
    /// Minimum detectable effect (confidence-first only)
    pub effect_size: f64,
    /// Power (confidence-first only)
    pub power: f64,
    /// Observed baseline rate, `NaN` without a baseline
    pub baseline_rate: f64,
    /// False when the threshold is statistically questionable
    pub sound: bool,
}

impl ResolvedApproach {
    /// Whether the threshold was grounded in baseline data.
    #[must_use]
    pub fn has_baseline(&self) -> bool {
        !self.baseline_rate.is_nan()
    }

    /// Implied false-positive rate, `NaN` when no confidence is known.
    #[must_use]
    pub fn implied_alpha(&self) -> f64 {
        1.0 - self.confidence
    }
}

/// Validates approach configuration and dispatches to the derivations.
pub struct ApproachResolver {
    _private: (),
}

impl ApproachResolver {
    /// Determine which single approach is configured.
    ///
    /// # Errors
    ///
    /// Configuration error when zero or several approaches are active, or
    /// when confidence-first parameters are incomplete.
    pub fn validate(params: &ApproachParams) -> Result<ApproachKind> {
        let cf_fields = [
            ("confidence", params.confidence),
            ("min_detectable_effect", params.min_detectable_effect),
            ("power", params.power),
        ];
        let cf_active = cf_fields.iter().any(|(_, v)| v.is_some());

        let mut active = Vec::new();
        if params.threshold_confidence.is_some() {
            active.push(ApproachKind::SampleSizeFirst);
        }
        if cf_active {
            active.push(ApproachKind::ConfidenceFirst);
        }
        if params.min_pass_rate.is_some() {
            active.push(ApproachKind::ThresholdFirst);
        }

        match active.as_slice() {
            [] => Err(Error::NoApproach),
            [ApproachKind::ConfidenceFirst] => {
                let missing: Vec<&'static str> = cf_fields
                    .iter()
                    .filter(|(_, v)| v.is_none())
                    .map(|(name, _)| *name)
                    .collect();
                if missing.is_empty() {
                    Ok(ApproachKind::ConfidenceFirst)
                } else {
                    Err(Error::IncompleteConfidenceFirst { missing })
                }
            }
            [kind] => Ok(*kind),
            _ => Err(Error::OverSpecifiedApproach {
                active: active.iter().map(|k| k.name()).collect(),
            }),
        }
    }

    /// Resolve the configured approach against optional baseline evidence.
    ///
    /// # Errors
    ///
    /// Any configuration error from [`validate`](Self::validate),
    /// [`Error::BaselineRequired`] when a baseline-driven approach has no
    /// baseline, [`Error::ThresholdConflict`] when an explicit,
    /// non-normative threshold disagrees with the baseline, and
    /// [`Error::InvalidConfig`] / [`Error::InvalidBaseline`] for bad values.
    pub fn resolve(
        params: &ApproachParams,
        baseline: Option<&BaselineRecord>,
        spec_id: &str,
    ) -> Result<ResolvedApproach> {
        let kind = Self::validate(params)?;
        debug!(approach = %kind, has_baseline = baseline.is_some(), "resolving approach");

        let resolved = match kind {
            ApproachKind::SampleSizeFirst => {
                let record = require_baseline(kind, baseline, spec_id)?;
                let confidence = params.threshold_confidence.unwrap_or(f64::NAN);
                let derived =
                    ThresholdDeriver::sample_size_first(record.data()?, params.samples, confidence)?;
                ResolvedApproach {
                    kind,
                    sample_count: params.samples,
                    threshold: derived.threshold,
                    confidence,
                    effect_size: f64::NAN,
                    power: f64::NAN,
                    baseline_rate: derived.baseline_rate,
                    sound: derived.sound,
                }
            }
            ApproachKind::ConfidenceFirst => {
                let record = require_baseline(kind, baseline, spec_id)?;
                let data = record.data()?;
                let confidence = params.confidence.unwrap_or(f64::NAN);
                let effect = params.min_detectable_effect.unwrap_or(f64::NAN);
                let power = params.power.unwrap_or(f64::NAN);
                let samples =
                    SampleSizeCalculator::required_samples(data.rate(), effect, confidence, power)?;
                let derived = ThresholdDeriver::sample_size_first(data, samples, confidence)?;
                ResolvedApproach {
                    kind,
                    sample_count: samples,
                    threshold: derived.threshold,
                    confidence,
                    effect_size: effect,
                    power,
                    baseline_rate: derived.baseline_rate,
                    sound: derived.sound,
                }
            }
            ApproachKind::ThresholdFirst => {
                let threshold = params.min_pass_rate.unwrap_or(f64::NAN);
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(Error::InvalidConfig(format!(
                        "min_pass_rate must be in [0, 1], got {threshold}"
                    )));
                }
                match baseline {
                    Some(record) => {
                        check_threshold_conflict(threshold, params.threshold_origin, record)?;
                        let derived =
                            ThresholdDeriver::threshold_first(record.data()?, params.samples, threshold)?;
                        ResolvedApproach {
                            kind,
                            sample_count: params.samples,
                            threshold,
                            confidence: derived.confidence,
                            effect_size: f64::NAN,
                            power: f64::NAN,
                            baseline_rate: derived.baseline_rate,
                            sound: derived.sound,
                        }
                    }
                    None => ResolvedApproach {
                        kind,
                        sample_count: params.samples,
                        threshold,
                        confidence: f64::NAN,
                        effect_size: f64::NAN,
                        power: f64::NAN,
                        baseline_rate: f64::NAN,
                        sound: true,
                    },
                }
            }
        };

        if !resolved.sound {
            warn!(
                approach = %kind,
                threshold = resolved.threshold,
                baseline_rate = resolved.baseline_rate,
                confidence = resolved.confidence,
                "threshold is statistically unsound"
            );
        }
        Ok(resolved)
    }
}

fn require_baseline<'a>(
    kind: ApproachKind,
    baseline: Option<&'a BaselineRecord>,
    spec_id: &str,
) -> Result<&'a BaselineRecord> {
    baseline.ok_or_else(|| Error::BaselineRequired {
        approach: kind.name(),
        spec_id: spec_id.to_string(),
    })
}

fn check_threshold_conflict(
    threshold: f64,
    origin: ThresholdOrigin,
    record: &BaselineRecord,
) -> Result<()> {
    if origin.is_normative() {
        return Ok(());
    }
    if (threshold - record.min_pass_rate()).abs() > THRESHOLD_MATCH_TOLERANCE {
        return Err(Error::ThresholdConflict {
            threshold,
            baseline_threshold: record.min_pass_rate(),
            source_id: record.source_id().to_string(),
        });
    }
    Ok(())
}

//! Run configuration.
//!
//! A [`RunConfig`] is built through [`RunConfigBuilder`], which validates
//! every knob once. Values configured in code can be overridden from more
//! specific sources through [`ConfigOverrides`]:
//!
//! ```text
//! declared (builder) < environment (TRIALGATE_*) < explicit overrides
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stats::ApproachParams;
use crate::{Error, Result};

/// Default planned sample count.
pub const DEFAULT_SAMPLES: u32 = 100;

/// Default number of failure examples retained per run.
pub const DEFAULT_MAX_EXAMPLE_FAILURES: usize = 10;

/// What happens when a budget runs out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExhaustedBehavior {
    /// Fail the run regardless of the observed pass rate
    #[default]
    Fail,
    /// Judge the samples executed so far on their own merits
    EvaluatePartial,
}

/// How a non-assertion error raised by a sample is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceptionPolicy {
    /// Record it as an ordinary failed sample
    #[default]
    FailSample,
    /// Abort the whole run immediately
    AbortRun,
}

/// Where an explicit threshold comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdOrigin {
    /// Not declared
    #[default]
    Unspecified,
    /// Service level agreement
    Sla,
    /// Service level objective
    Slo,
    /// Organizational policy
    Policy,
    /// Copied from empirical measurement
    Empirical,
}

impl ThresholdOrigin {
    /// Normative thresholds are contractual and may disagree with a baseline.
    #[must_use]
    pub const fn is_normative(self) -> bool {
        matches!(self, Self::Sla | Self::Slo | Self::Policy)
    }

    /// Upper-case name used in reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Sla => "SLA",
            Self::Slo => "SLO",
            Self::Policy => "POLICY",
            Self::Empirical => "EMPIRICAL",
        }
    }
}

/// How cost units are charged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostMode {
    /// A fixed charge credited after every sample
    Static {
        /// Units per sample
        charge: u64,
    },
    /// Each sample reports its own consumption
    #[default]
    Dynamic,
}

/// Cooperative pacing between samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pacing {
    /// Upper bound on sample throughput
    pub max_samples_per_second: Option<f64>,
    /// Minimum pause between samples
    pub min_delay: Option<Duration>,
}

impl Pacing {
    /// Effective pause between two samples; the stricter constraint wins.
    #[must_use]
    pub fn delay(&self) -> Duration {
        let from_rate = self
            .max_samples_per_second
            .filter(|rate| *rate > 0.0)
            .map_or(Duration::ZERO, |rate| Duration::from_secs_f64(1.0 / rate));
        from_rate.max(self.min_delay.unwrap_or(Duration::ZERO))
    }

    /// Whether any pacing is configured.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.delay().is_zero()
    }
}

/// Validated configuration of one probabilistic run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    samples: u32,
    samples_multiplier: f64,
    min_pass_rate: Option<f64>,
    threshold_confidence: Option<f64>,
    confidence: Option<f64>,
    min_detectable_effect: Option<f64>,
    power: Option<f64>,
    threshold_origin: ThresholdOrigin,
    contract_ref: Option<String>,
    time_budget: Option<Duration>,
    unit_budget: Option<u64>,
    cost_mode: CostMode,
    on_budget_exhausted: ExhaustedBehavior,
    on_exception: ExceptionPolicy,
    max_example_failures: usize,
    pacing: Pacing,
    transparent_stats: bool,
}

impl RunConfig {
    /// Create a builder with defaults.
    #[must_use]
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// Configured sample count before the multiplier.
    #[must_use]
    pub const fn samples(&self) -> u32 {
        self.samples
    }

    /// Sample count multiplier.
    #[must_use]
    pub const fn samples_multiplier(&self) -> f64 {
        self.samples_multiplier
    }

    /// Sample count after the multiplier (at least 1).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn effective_samples(&self) -> u32 {
        let scaled = (f64::from(self.samples) * self.samples_multiplier).ceil();
        scaled.clamp(1.0, f64::from(u32::MAX)) as u32
    }

    /// Explicit threshold, if any.
    #[must_use]
    pub const fn min_pass_rate(&self) -> Option<f64> {
        self.min_pass_rate
    }

    /// Threshold origin.
    #[must_use]
    pub const fn threshold_origin(&self) -> ThresholdOrigin {
        self.threshold_origin
    }

    /// Reference to the contract an explicit threshold comes from.
    #[must_use]
    pub fn contract_ref(&self) -> Option<&str> {
        self.contract_ref.as_deref()
    }

    /// Run-scope wall-clock budget.
    #[must_use]
    pub const fn time_budget(&self) -> Option<Duration> {
        self.time_budget
    }

    /// Run-scope unit budget.
    #[must_use]
    pub const fn unit_budget(&self) -> Option<u64> {
        self.unit_budget
    }

    /// Cost accounting mode.
    #[must_use]
    pub const fn cost_mode(&self) -> CostMode {
        self.cost_mode
    }

    /// Behavior when the run-scope budget is exhausted.
    #[must_use]
    pub const fn on_budget_exhausted(&self) -> ExhaustedBehavior {
        self.on_budget_exhausted
    }

    /// Policy for non-assertion sample errors.
    #[must_use]
    pub const fn on_exception(&self) -> ExceptionPolicy {
        self.on_exception
    }

    /// Number of failure details retained.
    #[must_use]
    pub const fn max_example_failures(&self) -> usize {
        self.max_example_failures
    }

    /// Pacing between samples.
    #[must_use]
    pub const fn pacing(&self) -> Pacing {
        self.pacing
    }

    /// Whether a statistical explanation is attached to the report.
    #[must_use]
    pub const fn transparent_stats(&self) -> bool {
        self.transparent_stats
    }

    /// Statistical parameters for approach resolution.
    #[must_use]
    pub fn approach_params(&self) -> ApproachParams {
        ApproachParams {
            samples: self.effective_samples(),
            min_pass_rate: self.min_pass_rate,
            threshold_confidence: self.threshold_confidence,
            confidence: self.confidence,
            min_detectable_effect: self.min_detectable_effect,
            power: self.power,
            threshold_origin: self.threshold_origin,
        }
    }
}

/// Builder for `RunConfig`.
#[derive(Debug, Clone, Default)]
pub struct RunConfigBuilder {
    samples: Option<u32>,
    samples_multiplier: Option<f64>,
    min_pass_rate: Option<f64>,
    threshold_confidence: Option<f64>,
    confidence: Option<f64>,
    min_detectable_effect: Option<f64>,
    power: Option<f64>,
    threshold_origin: ThresholdOrigin,
    contract_ref: Option<String>,
    time_budget: Option<Duration>,
    unit_budget: Option<u64>,
    cost_mode: CostMode,
    on_budget_exhausted: ExhaustedBehavior,
    on_exception: ExceptionPolicy,
    max_example_failures: Option<usize>,
    pacing: Pacing,
    transparent_stats: bool,
    overrides: ConfigOverrides,
}

impl RunConfigBuilder {
    /// Planned sample count.
    #[must_use]
    pub const fn samples(mut self, samples: u32) -> Self {
        self.samples = Some(samples);
        self
    }

    /// Multiplier applied to the sample count.
    #[must_use]
    pub const fn samples_multiplier(mut self, multiplier: f64) -> Self {
        self.samples_multiplier = Some(multiplier);
        self
    }

    /// Explicit threshold (threshold-first).
    #[must_use]
    pub const fn min_pass_rate(mut self, rate: f64) -> Self {
        self.min_pass_rate = Some(rate);
        self
    }

    /// Confidence of the derived threshold (sample-size-first).
    #[must_use]
    pub const fn threshold_confidence(mut self, confidence: f64) -> Self {
        self.threshold_confidence = Some(confidence);
        self
    }

    /// Confidence (confidence-first).
    #[must_use]
    pub const fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Minimum detectable effect (confidence-first).
    #[must_use]
    pub const fn min_detectable_effect(mut self, effect: f64) -> Self {
        self.min_detectable_effect = Some(effect);
        self
    }

    /// Power (confidence-first).
    #[must_use]
    pub const fn power(mut self, power: f64) -> Self {
        self.power = Some(power);
        self
    }

    /// Origin of an explicit threshold.
    #[must_use]
    pub const fn threshold_origin(mut self, origin: ThresholdOrigin) -> Self {
        self.threshold_origin = origin;
        self
    }

    /// Contract an explicit threshold comes from (e.g. an SLA document id).
    #[must_use]
    pub fn contract_ref(mut self, reference: impl Into<String>) -> Self {
        self.contract_ref = Some(reference.into());
        self
    }

    /// Run-scope wall-clock budget.
    #[must_use]
    pub const fn time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    /// Run-scope unit budget.
    #[must_use]
    pub const fn unit_budget(mut self, units: u64) -> Self {
        self.unit_budget = Some(units);
        self
    }

    /// Charge a fixed number of units per sample.
    #[must_use]
    pub const fn static_charge(mut self, charge: u64) -> Self {
        self.cost_mode = CostMode::Static { charge };
        self
    }

    /// Behavior when the run-scope budget is exhausted.
    #[must_use]
    pub const fn on_budget_exhausted(mut self, behavior: ExhaustedBehavior) -> Self {
        self.on_budget_exhausted = behavior;
        self
    }

    /// Policy for non-assertion sample errors.
    #[must_use]
    pub const fn on_exception(mut self, policy: ExceptionPolicy) -> Self {
        self.on_exception = policy;
        self
    }

    /// Number of failure details retained.
    #[must_use]
    pub const fn max_example_failures(mut self, max: usize) -> Self {
        self.max_example_failures = Some(max);
        self
    }

    /// Upper bound on sample throughput.
    #[must_use]
    pub const fn max_samples_per_second(mut self, rate: f64) -> Self {
        self.pacing.max_samples_per_second = Some(rate);
        self
    }

    /// Minimum pause between samples.
    #[must_use]
    pub const fn min_delay(mut self, delay: Duration) -> Self {
        self.pacing.min_delay = Some(delay);
        self
    }

    /// Attach a statistical explanation to the report.
    #[must_use]
    pub const fn transparent_stats(mut self, enabled: bool) -> Self {
        self.transparent_stats = enabled;
        self
    }

    /// Layer more specific overrides on top of the declared values.
    #[must_use]
    pub fn overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = self.overrides.merge(overrides);
        self
    }

    /// Build the `RunConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for any out-of-range value.
    pub fn build(self) -> Result<RunConfig> {
        let o = &self.overrides;
        let time_budget = match o.time_budget_ms {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => self.time_budget,
        };
        let unit_budget = match o.unit_budget {
            Some(0) => None,
            Some(units) => Some(units),
            None => self.unit_budget,
        };

        let config = RunConfig {
            samples: o.samples.or(self.samples).unwrap_or(DEFAULT_SAMPLES),
            samples_multiplier: o
                .samples_multiplier
                .or(self.samples_multiplier)
                .unwrap_or(1.0),
            min_pass_rate: o.min_pass_rate.or(self.min_pass_rate),
            threshold_confidence: self.threshold_confidence,
            confidence: self.confidence,
            min_detectable_effect: self.min_detectable_effect,
            power: self.power,
            threshold_origin: self.threshold_origin,
            contract_ref: self.contract_ref,
            time_budget,
            unit_budget,
            cost_mode: self.cost_mode,
            on_budget_exhausted: o.on_budget_exhausted.unwrap_or(self.on_budget_exhausted),
            on_exception: self.on_exception,
            max_example_failures: self
                .max_example_failures
                .unwrap_or(DEFAULT_MAX_EXAMPLE_FAILURES),
            pacing: self.pacing,
            transparent_stats: o.transparent_stats.unwrap_or(self.transparent_stats),
        };
        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &RunConfig) -> Result<()> {
    if config.samples == 0 {
        return Err(Error::InvalidConfig("samples must be at least 1".to_string()));
    }
    if !(config.samples_multiplier.is_finite() && config.samples_multiplier > 0.0) {
        return Err(Error::InvalidConfig(format!(
            "samples_multiplier must be a positive number, got {}",
            config.samples_multiplier
        )));
    }
    if let Some(rate) = config.min_pass_rate {
        if !(0.0..=1.0).contains(&rate) {
            return Err(Error::InvalidConfig(format!(
                "min_pass_rate must be in [0, 1], got {rate}"
            )));
        }
    }
    for (name, value) in [
        ("threshold_confidence", config.threshold_confidence),
        ("confidence", config.confidence),
        ("power", config.power),
        ("min_detectable_effect", config.min_detectable_effect),
    ] {
        if let Some(value) = value {
            if !(value > 0.0 && value < 1.0) {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be in (0, 1), got {value}"
                )));
            }
        }
    }
    if config.time_budget.is_some_and(|budget| budget.is_zero()) {
        return Err(Error::InvalidConfig(
            "time_budget must be positive; leave it unset for no limit".to_string(),
        ));
    }
    if let Some(rate) = config.pacing.max_samples_per_second {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "max_samples_per_second must be positive, got {rate}"
            )));
        }
    }
    Ok(())
}

/// Values supplied by one override source. Unset fields defer to less
/// specific sources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    /// Planned sample count
    pub samples: Option<u32>,
    /// Sample count multiplier
    pub samples_multiplier: Option<f64>,
    /// Explicit threshold
    pub min_pass_rate: Option<f64>,
    /// Run time budget in milliseconds (0 = unlimited)
    pub time_budget_ms: Option<u64>,
    /// Run unit budget (0 = unlimited)
    pub unit_budget: Option<u64>,
    /// Budget exhaustion behavior
    pub on_budget_exhausted: Option<ExhaustedBehavior>,
    /// Statistical explanation toggle
    pub transparent_stats: Option<bool>,
}

impl ConfigOverrides {
    /// Environment variable prefix.
    pub const ENV_PREFIX: &'static str = "TRIALGATE_";

    /// Read overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a `TRIALGATE_*` value does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Read overrides from `(name, value)` pairs. Unknown names are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a recognized value does not parse.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut overrides = Self::default();
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(Self::ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match name {
                "SAMPLES" => overrides.samples = Some(parse(name, value)?),
                "SAMPLES_MULTIPLIER" => overrides.samples_multiplier = Some(parse(name, value)?),
                "MIN_PASS_RATE" => overrides.min_pass_rate = Some(parse(name, value)?),
                "TIME_BUDGET_MS" => overrides.time_budget_ms = Some(parse(name, value)?),
                "UNIT_BUDGET" => overrides.unit_budget = Some(parse(name, value)?),
                "TRANSPARENT_STATS" => overrides.transparent_stats = Some(parse(name, value)?),
                "ON_BUDGET_EXHAUSTED" => {
                    overrides.on_budget_exhausted = Some(match value.to_ascii_uppercase().as_str() {
                        "FAIL" => ExhaustedBehavior::Fail,
                        "EVALUATE_PARTIAL" => ExhaustedBehavior::EvaluatePartial,
                        other => {
                            return Err(Error::InvalidConfig(format!(
                                "{}{name}: expected FAIL or EVALUATE_PARTIAL, got {other}",
                                Self::ENV_PREFIX
                            )))
                        }
                    });
                }
                _ => {}
            }
        }
        Ok(overrides)
    }

    /// Layer `more_specific` over `self`; its set fields win.
    #[must_use]
    pub fn merge(self, more_specific: Self) -> Self {
        Self {
            samples: more_specific.samples.or(self.samples),
            samples_multiplier: more_specific.samples_multiplier.or(self.samples_multiplier),
            min_pass_rate: more_specific.min_pass_rate.or(self.min_pass_rate),
            time_budget_ms: more_specific.time_budget_ms.or(self.time_budget_ms),
            unit_budget: more_specific.unit_budget.or(self.unit_budget),
            on_budget_exhausted: more_specific.on_budget_exhausted.or(self.on_budget_exhausted),
            transparent_stats: more_specific.transparent_stats.or(self.transparent_stats),
        }
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        Error::InvalidConfig(format!(
            "{}{name}: cannot parse '{value}'",
            ConfigOverrides::ENV_PREFIX
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::builder().min_pass_rate(0.9).build().unwrap();
        assert_eq!(config.samples(), DEFAULT_SAMPLES);
        assert_eq!(config.effective_samples(), DEFAULT_SAMPLES);
        assert_eq!(config.cost_mode(), CostMode::Dynamic);
        assert_eq!(config.on_budget_exhausted(), ExhaustedBehavior::Fail);
        assert_eq!(config.on_exception(), ExceptionPolicy::FailSample);
        assert_eq!(config.max_example_failures(), DEFAULT_MAX_EXAMPLE_FAILURES);
        assert!(!config.pacing().is_active());
    }

    #[test]
    fn test_multiplier_rounds_up() {
        let config = RunConfig::builder()
            .samples(10)
            .samples_multiplier(0.25)
            .build()
            .unwrap();
        assert_eq!(config.effective_samples(), 3);

        let tiny = RunConfig::builder()
            .samples(1)
            .samples_multiplier(0.01)
            .build()
            .unwrap();
        assert_eq!(tiny.effective_samples(), 1);
    }

    #[test]
    fn test_validation() {
        assert!(RunConfig::builder().samples(0).build().is_err());
        assert!(RunConfig::builder().min_pass_rate(1.5).build().is_err());
        assert!(RunConfig::builder().power(1.0).build().is_err());
        assert!(RunConfig::builder().samples_multiplier(0.0).build().is_err());
        assert!(RunConfig::builder()
            .time_budget(Duration::ZERO)
            .build()
            .is_err());
        assert!(RunConfig::builder()
            .max_samples_per_second(-1.0)
            .build()
            .is_err());
        assert!(RunConfig::builder().min_pass_rate(0.0).build().is_ok());
    }

    #[test]
    fn test_pacing_stricter_constraint_wins() {
        let pacing = Pacing {
            max_samples_per_second: Some(10.0),
            min_delay: Some(Duration::from_millis(50)),
        };
        assert_eq!(pacing.delay(), Duration::from_millis(100));

        let pacing = Pacing {
            max_samples_per_second: Some(100.0),
            min_delay: Some(Duration::from_millis(50)),
        };
        assert_eq!(pacing.delay(), Duration::from_millis(50));
    }

    #[test]
    fn test_overrides_from_vars() {
        let overrides = ConfigOverrides::from_vars([
            ("TRIALGATE_SAMPLES", "250"),
            ("TRIALGATE_MIN_PASS_RATE", "0.8"),
            ("TRIALGATE_ON_BUDGET_EXHAUSTED", "evaluate_partial"),
            ("PATH", "/usr/bin"),
        ])
        .unwrap();
        assert_eq!(overrides.samples, Some(250));
        assert_eq!(overrides.min_pass_rate, Some(0.8));
        assert_eq!(
            overrides.on_budget_exhausted,
            Some(ExhaustedBehavior::EvaluatePartial)
        );

        assert!(ConfigOverrides::from_vars([("TRIALGATE_SAMPLES", "many")]).is_err());
    }

    #[test]
    fn test_more_specific_source_wins() {
        let env = ConfigOverrides {
            samples: Some(200),
            min_pass_rate: Some(0.7),
            ..ConfigOverrides::default()
        };
        let explicit = ConfigOverrides {
            samples: Some(300),
            ..ConfigOverrides::default()
        };
        let config = RunConfig::builder()
            .samples(50)
            .min_pass_rate(0.9)
            .overrides(env)
            .overrides(explicit)
            .build()
            .unwrap();
        assert_eq!(config.samples(), 300);
        assert_eq!(config.min_pass_rate(), Some(0.7));
    }

    #[test]
    fn test_zero_budget_override_means_unlimited() {
        let config = RunConfig::builder()
            .min_pass_rate(0.9)
            .time_budget(Duration::from_secs(5))
            .unit_budget(100)
            .overrides(ConfigOverrides {
                time_budget_ms: Some(0),
                unit_budget: Some(0),
                ..ConfigOverrides::default()
            })
            .build()
            .unwrap();
        assert_eq!(config.time_budget(), None);
        assert_eq!(config.unit_budget(), None);
    }
}

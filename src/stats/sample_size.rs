//! Power analysis for a one-proportion test.
//!
//! H0: the process still performs at the baseline rate `p0`.
//! H1: the process degraded to `p1 = p0 - effect`.
//!
//! ```text
//! n = ((z_conf * sqrt(p0(1-p0)) + z_power * sqrt(p1(1-p1))) / effect)^2
//! ```

use super::binomial::{normal_cdf, normal_quantile};
use crate::{Error, Result};

/// Minimum sample count calculator.
pub struct SampleSizeCalculator {
    _private: (),
}

impl SampleSizeCalculator {
    /// Smallest sample count that detects a drop of `effect` below
    /// `baseline_rate` with the given confidence and power.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a parameter is out of range or
    /// the required count does not fit in `u32`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn required_samples(
        baseline_rate: f64,
        effect: f64,
        confidence: f64,
        power: f64,
    ) -> Result<u32> {
        validate(baseline_rate, effect, confidence, power)?;

        let p0 = baseline_rate;
        let p1 = baseline_rate - effect;
        let z_conf = normal_quantile(confidence);
        let z_power = normal_quantile(power);

        let numerator = z_conf * (p0 * (1.0 - p0)).sqrt() + z_power * (p1 * (1.0 - p1)).sqrt();
        let n = (numerator / effect).powi(2).ceil().max(1.0);

        if n > f64::from(u32::MAX) {
            return Err(Error::InvalidConfig(format!(
                "detecting an effect of {effect} needs {n} samples, which exceeds the supported maximum"
            )));
        }
        Ok(n as u32)
    }

    /// Power achieved by `samples` trials against a drop of `effect`.
    #[must_use]
    pub fn achieved_power(baseline_rate: f64, effect: f64, samples: u32, confidence: f64) -> f64 {
        let p0 = baseline_rate;
        let p1 = baseline_rate - effect;
        let sd1 = (p1 * (1.0 - p1)).sqrt();
        if samples == 0 || sd1 <= 0.0 {
            return 0.0;
        }
        let z_conf = normal_quantile(confidence);
        let n_sqrt = f64::from(samples).sqrt();
        normal_cdf((effect * n_sqrt - z_conf * (p0 * (1.0 - p0)).sqrt()) / sd1)
    }
}

fn validate(baseline_rate: f64, effect: f64, confidence: f64, power: f64) -> Result<()> {
    if !(baseline_rate > 0.0 && baseline_rate <= 1.0) {
        return Err(Error::InvalidConfig(format!(
            "baseline rate must be in (0, 1] for power analysis, got {baseline_rate}"
        )));
    }
    if !(effect > 0.0 && effect < baseline_rate) {
        return Err(Error::InvalidConfig(format!(
            "min_detectable_effect must be in (0, {baseline_rate}), got {effect}"
        )));
    }
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(Error::InvalidConfig(format!(
            "confidence must be in (0, 1), got {confidence}"
        )));
    }
    if !(power > 0.0 && power < 1.0) {
        return Err(Error::InvalidConfig(format!(
            "power must be in (0, 1), got {power}"
        )));
    }
    Ok(())
}

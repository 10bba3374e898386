//! Wilson score interval arithmetic over (successes, trials, confidence).
//!
//! References:
//! - Wilson (1927): Probable inference, the law of succession, and statistical inference
//! - Acklam (2003): An algorithm for computing the inverse normal cumulative distribution function

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Standard normal CDF: Φ(x) = erfc(-x/√2) / 2
#[must_use]
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * libm::erfc(-x * std::f64::consts::FRAC_1_SQRT_2)
}

/// Inverse standard normal CDF (probit).
///
/// Acklam's rational approximation refined by one Halley step, accurate to
/// full double precision on `(0, 1)`.
#[must_use]
#[allow(clippy::unreadable_literal)]
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    let x = if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    };

    // Halley refinement
    let e = normal_cdf(x) - p;
    let u = e * (2.0 * std::f64::consts::PI).sqrt() * (x * x / 2.0).exp();
    x - u / (1.0 + x * u / 2.0)
}

/// Two-sided confidence interval on a binomial proportion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProportionInterval {
    /// Observed proportion (successes / trials)
    pub point: f64,
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
    /// Confidence level of the interval
    pub confidence: f64,
}

/// Wilson score estimator at a fixed confidence level.
///
/// Bounds from [`lower_bound`](Self::lower_bound) are one-sided
/// (`z = Φ⁻¹(confidence)`); [`interval`](Self::interval) is two-sided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinomialEstimator {
    confidence: f64,
    z: f64,
}

impl BinomialEstimator {
    /// Create an estimator for the given confidence level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] unless `0 < confidence < 1`.
    pub fn new(confidence: f64) -> Result<Self> {
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "confidence must be in (0, 1), got {confidence}"
            )));
        }
        Ok(Self {
            confidence,
            z: normal_quantile(confidence),
        })
    }

    /// Confidence level.
    #[must_use]
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    /// One-sided z score for the confidence level.
    #[must_use]
    pub const fn z(&self) -> f64 {
        self.z
    }

    /// One-sided Wilson lower bound for `successes` out of `trials`.
    ///
    /// Zero trials carry no evidence, so the bound is 0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn lower_bound(&self, successes: u64, trials: u64) -> f64 {
        if trials == 0 {
            return 0.0;
        }
        self.lower_bound_for_rate(successes as f64 / trials as f64, trials)
    }

    /// One-sided Wilson lower bound for an observed `rate` over `trials`.
    #[must_use]
    pub fn lower_bound_for_rate(&self, rate: f64, trials: u64) -> f64 {
        wilson_bounds(rate, trials, self.z).0
    }

    /// One-sided Wilson upper bound for an observed `rate` over `trials`.
    #[must_use]
    pub fn upper_bound_for_rate(&self, rate: f64, trials: u64) -> f64 {
        wilson_bounds(rate, trials, self.z).1
    }

    /// Two-sided Wilson interval at this estimator's confidence.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn interval(&self, successes: u64, trials: u64) -> ProportionInterval {
        if trials == 0 {
            return ProportionInterval {
                point: 0.0,
                lower: 0.0,
                upper: 1.0,
                confidence: self.confidence,
            };
        }
        let rate = successes as f64 / trials as f64;
        let z = normal_quantile((1.0 + self.confidence) / 2.0);
        let (lower, upper) = wilson_bounds(rate, trials, z);
        ProportionInterval {
            point: rate,
            lower,
            upper,
            confidence: self.confidence,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn wilson_bounds(rate: f64, trials: u64, z: f64) -> (f64, f64) {
    if trials == 0 {
        return (0.0, 1.0);
    }
    let n = trials as f64;
    let p = rate.clamp(0.0, 1.0);
    let z2 = z * z;
    let denominator = 1.0 + z2 / n;
    let center = p + z2 / (2.0 * n);
    let spread = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt();

    let lower = ((center - spread) / denominator).clamp(0.0, 1.0);
    let upper = ((center + spread) / denominator).clamp(0.0, 1.0);
    (lower, upper)
}

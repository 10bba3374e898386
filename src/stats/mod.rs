//! Statistical core: Wilson bounds, threshold derivation, power analysis and
//! approach resolution.
//!
//! ## Example
//!
//! ```rust
//! use trialgate::stats::{BaselineData, ThresholdDeriver};
//!
//! let baseline = BaselineData::new(1000, 951)?;
//! let derived = ThresholdDeriver::sample_size_first(baseline, 100, 0.95)?;
//! assert!(derived.threshold < baseline.rate());
//! # Ok::<(), trialgate::Error>(())
//! ```

mod approach;
mod binomial;
mod sample_size;
mod threshold;

pub use approach::{ApproachKind, ApproachParams, ApproachResolver, ResolvedApproach};
pub use binomial::{normal_cdf, normal_quantile, BinomialEstimator, ProportionInterval};
pub use sample_size::SampleSizeCalculator;
pub use threshold::{BaselineData, DerivedThreshold, ThresholdDeriver};

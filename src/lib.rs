//! # trialgate: Probabilistic Acceptance Testing
//!
//! **Version**: 0.1.0
//!
//! trialgate decides whether a non-deterministic process succeeds often
//! enough. It runs the process repeatedly, aggregates pass/fail samples, and
//! compares the observed rate against a statistically justified threshold,
//! stopping as soon as the outcome is settled or a budget runs out.
//!
//! ## Components
//!
//! - **Statistics** ([`stats`]): Wilson bounds, threshold derivation under
//!   three mutually exclusive approaches, power analysis
//! - **Baselines** ([`baseline`]): footprint matching and covariate-aware
//!   selection of historical measurements
//! - **Budgets** ([`budget`]): time and cost ceilings at process, group and
//!   run scope, shared lock-free across concurrent runs
//! - **Trials** ([`trial`]): sequential aggregation and early termination
//! - **Engine** ([`engine`]): the per-sample state machine and its report
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trialgate::config::RunConfig;
//! use trialgate::engine::{ProbabilisticRun, ProcessContext, SampleError};
//!
//! let process = Arc::new(ProcessContext::new());
//! let config = RunConfig::builder().samples(50).min_pass_rate(0.8).build()?;
//! let run = ProbabilisticRun::prepare(process.run("json-extraction", config))?;
//!
//! let mut calls = 0u32;
//! let report = run.run_all(|_| {
//!     calls += 1;
//!     if calls % 10 == 0 {
//!         Err(SampleError::assertion("malformed JSON"))
//!     } else {
//!         Ok(())
//!     }
//! });
//! assert!(report.passed());
//! # Ok::<(), trialgate::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod baseline;
pub mod budget;
pub mod config;
pub mod engine;
pub mod error;
pub mod stats;
pub mod trial;
pub mod verdict;

pub use error::{Error, Result};

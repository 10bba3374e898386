//! Sequential trial aggregation for one run.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::budget::BudgetExhaustion;
use crate::{Error, Result};

/// One sample's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trial {
    passed: bool,
    failure_detail: Option<String>,
}

impl Trial {
    /// A passing trial.
    #[must_use]
    pub const fn success() -> Self {
        Self {
            passed: true,
            failure_detail: None,
        }
    }

    /// A failing trial with its detail.
    #[must_use]
    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            failure_detail: Some(detail.into()),
        }
    }

    /// Whether the trial passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.passed
    }

    /// Failure detail, if the trial failed.
    #[must_use]
    pub fn failure_detail(&self) -> Option<&str> {
        self.failure_detail.as_deref()
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// Every planned sample executed
    Completed,
    /// The threshold can no longer be reached
    Impossibility,
    /// A budget ceiling was hit
    Budget(BudgetExhaustion),
    /// A sample asked to stop the run
    Requested,
    /// An unexpected sample error aborted the run
    Aborted,
}

impl TerminationReason {
    /// Stable reason code for reports.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::Completed => "COMPLETED".to_string(),
            Self::Impossibility => "IMPOSSIBILITY".to_string(),
            Self::Budget(exhaustion) => exhaustion.reason(),
            Self::Requested => "REQUESTED".to_string(),
            Self::Aborted => "ABORTED".to_string(),
        }
    }

    /// Whether the run stopped before executing every planned sample.
    #[must_use]
    pub const fn is_early(&self) -> bool {
        !matches!(self, Self::Completed)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// Recorded termination: reason plus a human-readable explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Termination {
    /// Reason
    pub reason: TerminationReason,
    /// Explanation
    pub details: String,
}

/// Running totals of one run.
///
/// Single writer: the run that owns it records samples one at a time.
/// `successes + failures == executed <= planned` always holds, and nothing
/// is recorded once a termination is set.
#[derive(Debug, Clone)]
pub struct TrialAggregate {
    planned: u32,
    executed: u32,
    successes: u32,
    failures: u32,
    max_examples: usize,
    examples: Vec<String>,
    termination: Option<Termination>,
    forced_failure: bool,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl TrialAggregate {
    /// Start an aggregate retaining at most `max_examples` failure details.
    #[must_use]
    pub fn new(planned: u32, max_examples: usize) -> Self {
        Self {
            planned,
            executed: 0,
            successes: 0,
            failures: 0,
            max_examples,
            examples: Vec::with_capacity(max_examples.min(64)),
            termination: None,
            forced_failure: false,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    fn accept(&self) -> Result<()> {
        if let Some(termination) = &self.termination {
            return Err(Error::RunTerminated {
                reason: termination.reason.code(),
            });
        }
        if self.executed >= self.planned {
            return Err(Error::PlannedCountExceeded {
                planned: self.planned,
            });
        }
        Ok(())
    }

    /// Record a trial.
    ///
    /// # Errors
    ///
    /// [`Error::RunTerminated`] after termination and
    /// [`Error::PlannedCountExceeded`] once every planned sample executed.
    pub fn record(&mut self, trial: Trial) -> Result<()> {
        if trial.passed {
            self.record_success()
        } else {
            self.record_failure(trial.failure_detail.unwrap_or_default())
        }
    }

    /// Record a passing sample.
    ///
    /// # Errors
    ///
    /// See [`record`](Self::record).
    pub fn record_success(&mut self) -> Result<()> {
        self.accept()?;
        self.executed += 1;
        self.successes += 1;
        Ok(())
    }

    /// Record a failing sample. The detail is kept only while fewer than
    /// the configured maximum are retained.
    ///
    /// # Errors
    ///
    /// See [`record`](Self::record).
    pub fn record_failure(&mut self, detail: impl Into<String>) -> Result<()> {
        self.accept()?;
        self.executed += 1;
        self.failures += 1;
        if self.examples.len() < self.max_examples {
            self.examples.push(detail.into());
        }
        Ok(())
    }

    /// Set the termination. The first termination sticks; returns whether
    /// this call set it.
    pub fn set_terminated(&mut self, reason: TerminationReason, details: impl Into<String>) -> bool {
        if self.termination.is_some() {
            return false;
        }
        self.termination = Some(Termination {
            reason,
            details: details.into(),
        });
        true
    }

    /// Mark the run complete.
    pub fn set_completed(&mut self) -> bool {
        let details = format!("All {} planned samples executed", self.planned);
        self.set_terminated(TerminationReason::Completed, details)
    }

    /// Force the verdict to fail regardless of the pass rate.
    pub fn set_forced_failure(&mut self, forced: bool) {
        self.forced_failure = forced;
    }

    /// Planned sample count.
    #[must_use]
    pub const fn planned(&self) -> u32 {
        self.planned
    }

    /// Executed sample count.
    #[must_use]
    pub const fn executed(&self) -> u32 {
        self.executed
    }

    /// Passing samples.
    #[must_use]
    pub const fn successes(&self) -> u32 {
        self.successes
    }

    /// Failing samples, including those whose detail was not retained.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Samples not yet executed.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.planned - self.executed
    }

    /// Retained failure details, oldest first.
    #[must_use]
    pub fn failure_examples(&self) -> &[String] {
        &self.examples
    }

    /// Termination, `None` while running.
    #[must_use]
    pub const fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    /// Whether a termination is set.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }

    /// Whether the verdict is forced to fail.
    #[must_use]
    pub const fn forced_failure(&self) -> bool {
        self.forced_failure
    }

    /// `successes / executed`; `0.0` before any sample.
    #[must_use]
    pub fn observed_rate(&self) -> f64 {
        if self.executed == 0 {
            return 0.0;
        }
        f64::from(self.successes) / f64::from(self.executed)
    }

    /// Wall-clock start.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time since the aggregate was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

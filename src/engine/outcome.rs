//! Sample results and the outcomes the run state machine reports back.

use crate::trial::TerminationReason;

/// Why a sample did not pass.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    /// The sample's assertion did not hold; recorded as a failed sample
    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    /// Anything else went wrong; handled per the run's exception policy
    #[error("unexpected error: {0}")]
    Unexpected(anyhow::Error),

    /// The sample asks to stop the run; the sample itself is not recorded
    #[error("run stop requested: {0}")]
    Stop(String),
}

impl SampleError {
    /// Shorthand for an assertion failure.
    #[must_use]
    pub fn assertion(detail: impl Into<String>) -> Self {
        Self::AssertionFailed(detail.into())
    }
}

impl From<anyhow::Error> for SampleError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unexpected(error)
    }
}

/// Result returned by a sampler closure.
pub type SampleResult = std::result::Result<(), SampleError>;

/// What happened to one sample slot.
#[derive(Debug)]
pub enum SampleOutcome {
    /// Sample passed; keep going
    Continue,
    /// Sample failed and was recorded; keep going
    ContinueWithRecordedFailure(String),
    /// The run is over; skip every remaining slot
    Terminate(TerminationReason, String),
    /// An unexpected error aborted the run
    Abort(anyhow::Error),
}

impl SampleOutcome {
    /// Whether the host should execute the next slot.
    #[must_use]
    pub const fn should_continue(&self) -> bool {
        matches!(self, Self::Continue | Self::ContinueWithRecordedFailure(_))
    }
}

/// Per-sample handle given to the sampler closure.
#[derive(Debug)]
pub struct SampleScope {
    slot: u32,
    units: u64,
}

impl SampleScope {
    pub(crate) const fn new(slot: u32) -> Self {
        Self { slot, units: 0 }
    }

    /// Zero-based slot index.
    #[must_use]
    pub const fn slot(&self) -> u32 {
        self.slot
    }

    /// Report cost units consumed by this sample.
    pub fn record_units(&mut self, units: u64) {
        self.units = self.units.saturating_add(units);
    }

    /// Units reported so far.
    #[must_use]
    pub const fn units(&self) -> u64 {
        self.units
    }
}

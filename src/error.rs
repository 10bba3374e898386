//! Error types for trialgate
//!
//! Every configuration error carries its cause on the first line and the
//! remediation on the following line(s).

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// trialgate error types
#[derive(Error, Debug)]
pub enum Error {
    /// More than one statistical approach is configured
    #[error(
        "Over-specified statistical approach: {active:?} are all configured\n\
         Configure exactly one of: threshold_confidence (sample-size-first), \
         confidence + min_detectable_effect + power (confidence-first), \
         min_pass_rate (threshold-first)"
    )]
    OverSpecifiedApproach {
        /// Names of the approaches found active
        active: Vec<&'static str>,
    },

    /// No statistical approach is configured
    #[error(
        "No statistical approach configured\n\
         Set min_pass_rate (threshold-first), threshold_confidence (sample-size-first), \
         or confidence + min_detectable_effect + power (confidence-first)"
    )]
    NoApproach,

    /// Some but not all confidence-first parameters are set
    #[error(
        "Incomplete confidence-first configuration: missing {missing:?}\n\
         Confidence-first needs confidence, min_detectable_effect and power together"
    )]
    IncompleteConfidenceFirst {
        /// Names of the missing parameters
        missing: Vec<&'static str>,
    },

    /// A baseline-driven approach was selected but no baseline exists
    #[error(
        "{approach} requires baseline data, but no baseline was found for '{spec_id}'\n\
         Generate a baseline for this use case first, or use threshold-first with an explicit min_pass_rate"
    )]
    BaselineRequired {
        /// Approach that needs the baseline
        approach: &'static str,
        /// Use case identifier
        spec_id: String,
    },

    /// Explicit threshold disagrees with an existing empirical baseline
    #[error(
        "Explicit min_pass_rate {threshold} conflicts with baseline '{source_id}' (derived {baseline_threshold})\n\
         Remove min_pass_rate to use the baseline threshold, or declare a normative threshold origin (SLA, SLO, POLICY)"
    )]
    ThresholdConflict {
        /// Explicitly configured threshold
        threshold: f64,
        /// Threshold stored with the baseline
        baseline_threshold: f64,
        /// Baseline record identifier
        source_id: String,
    },

    /// A configuration value is out of range or malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Baseline record failed tamper/corruption verification
    #[error(
        "Baseline integrity check failed for '{source_id}': expected digest {expected}, computed {actual}\n\
         The baseline record was modified or corrupted; regenerate it"
    )]
    BaselineIntegrity {
        /// Baseline record identifier
        source_id: String,
        /// Digest stored in the record
        expected: String,
        /// Digest computed from the record content
        actual: String,
    },

    /// Baselines exist for the use case, but none share the run's footprint
    #[error(
        "No compatible baseline for '{spec_id}' (footprint {footprint})\n\
         Known footprints: {known:?}\n\
         The covariate declaration changed since the baselines were generated; regenerate them"
    )]
    NoCompatibleBaseline {
        /// Use case identifier
        spec_id: String,
        /// Footprint of the current run
        footprint: String,
        /// Every footprint the repository knows for this use case
        known: Vec<String>,
    },

    /// Baseline record content is unusable
    #[error("Invalid baseline: {0}")]
    InvalidBaseline(String),

    /// A trial was offered to a run that already terminated
    #[error("Run already terminated ({reason}); trial not recorded")]
    RunTerminated {
        /// Termination reason already recorded
        reason: String,
    },

    /// A trial was offered after every planned sample executed
    #[error("All {planned} planned samples already executed; trial not recorded")]
    PlannedCountExceeded {
        /// Planned sample count of the run
        planned: u32,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is a configuration error (fatal, never retried).
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::OverSpecifiedApproach { .. }
                | Self::NoApproach
                | Self::IncompleteConfidenceFirst { .. }
                | Self::BaselineRequired { .. }
                | Self::ThresholdConflict { .. }
                | Self::InvalidConfig(_)
        )
    }
}

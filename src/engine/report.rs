//! Run report handed back to the host.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::verdict::Verdict;
use crate::Result;

/// Key prefix of every report entry.
pub const ENTRY_PREFIX: &str = "trialgate.";

/// One key/value pair the host may publish (e.g. as test report properties).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Key, prefixed with [`ENTRY_PREFIX`]
    pub key: String,
    /// Rendered value
    pub value: String,
}

/// Verdict plus report entries of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Final verdict
    pub verdict: Verdict,
    /// Report entries in insertion order
    pub entries: Vec<ReportEntry>,
}

impl RunReport {
    /// Whether the run passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.verdict.passed
    }

    /// Value of `key`, with or without the prefix.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<&str> {
        let key = key.strip_prefix(ENTRY_PREFIX).unwrap_or(key);
        self.entries
            .iter()
            .find(|entry| entry.key.strip_prefix(ENTRY_PREFIX) == Some(key))
            .map(|entry| entry.value.as_str())
    }

    /// Pretty JSON rendering. `NaN` statistics render as `null`.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Accumulates entries under [`ENTRY_PREFIX`].
#[derive(Debug, Default)]
pub(crate) struct EntryList(Vec<ReportEntry>);

impl EntryList {
    pub(crate) fn push(&mut self, key: &str, value: impl Display) {
        self.0.push(ReportEntry {
            key: format!("{ENTRY_PREFIX}{key}"),
            value: value.to_string(),
        });
    }

    pub(crate) fn push_rate(&mut self, key: &str, value: f64) {
        if !value.is_nan() {
            self.push(key, format_args!("{value:.4}"));
        }
    }

    pub(crate) fn into_inner(self) -> Vec<ReportEntry> {
        self.0
    }
}

//! Covariate declarations (schema) and profiles (values for one run).

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, FixedOffset, Local, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// Value recorded for a declared dimension no source could resolve.
pub const UNRESOLVED: &str = "UNDEFINED";

/// Weekday vs weekend.
pub const DAY_OF_WEEK: &str = "day_of_week";
/// Coarse period of the local day.
pub const TIME_OF_DAY: &str = "time_of_day";
/// Local UTC offset.
pub const TIMEZONE: &str = "timezone";
/// Deployment region (environment-provided).
pub const REGION: &str = "region";

/// Named environmental dimensions a use case exposes.
///
/// Declaration order is kept for reporting; duplicates are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CovariateDeclaration {
    dimensions: Vec<String>,
}

impl CovariateDeclaration {
    /// Declare the given dimensions.
    pub fn new<I, S>(dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut declared: Vec<String> = Vec::new();
        for dimension in dimensions {
            let dimension = dimension.into();
            if !declared.contains(&dimension) {
                declared.push(dimension);
            }
        }
        Self {
            dimensions: declared,
        }
    }

    /// A declaration without dimensions.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Dimensions in declaration order.
    #[must_use]
    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    /// Dimensions in lexical order.
    #[must_use]
    pub fn sorted_dimensions(&self) -> Vec<&str> {
        let mut sorted: Vec<&str> = self.dimensions.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted
    }

    /// Number of declared dimensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    /// Whether nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Resolve every declared dimension through `source`.
    ///
    /// Dimensions the source cannot resolve are recorded as [`UNRESOLVED`].
    #[must_use]
    pub fn profile(&self, source: &dyn CovariateSource) -> CovariateProfile {
        let values = self
            .dimensions
            .iter()
            .map(|dimension| {
                let value = source
                    .resolve(dimension)
                    .unwrap_or_else(|| UNRESOLVED.to_string());
                (dimension.clone(), value)
            })
            .collect();
        CovariateProfile { values }
    }
}

/// Concrete covariate values observed for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CovariateProfile {
    values: BTreeMap<String, String>,
}

impl CovariateProfile {
    /// Empty profile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a value.
    #[must_use]
    pub fn with(mut self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(dimension.into(), value.into());
        self
    }

    /// Value of one dimension.
    #[must_use]
    pub fn get(&self, dimension: &str) -> Option<&str> {
        self.values.get(dimension).map(String::as_str)
    }

    /// All values, ordered by dimension name.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Declared dimensions whose value differs from `snapshot`.
    ///
    /// A dimension missing on either side counts as a mismatch.
    #[must_use]
    pub fn mismatches(
        &self,
        declaration: &CovariateDeclaration,
        snapshot: &BTreeMap<String, String>,
    ) -> Vec<String> {
        declaration
            .dimensions()
            .iter()
            .filter(|dimension| match (self.get(dimension), snapshot.get(*dimension)) {
                (Some(current), Some(recorded)) => current != recorded,
                _ => true,
            })
            .cloned()
            .collect()
    }
}

/// Resolves a covariate dimension to its current value.
pub trait CovariateSource {
    /// Current value of `dimension`, if known.
    fn resolve(&self, dimension: &str) -> Option<String>;
}

/// Fixed dimension values, typically supplied by the host.
#[derive(Debug, Clone, Default)]
pub struct StaticCovariates {
    values: BTreeMap<String, String>,
}

impl StaticCovariates {
    /// Empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fixed value.
    #[must_use]
    pub fn with(mut self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(dimension.into(), value.into());
        self
    }
}

impl CovariateSource for StaticCovariates {
    fn resolve(&self, dimension: &str) -> Option<String> {
        self.values.get(dimension).cloned()
    }
}

/// Built-in dimensions derived from the clock and the environment.
///
/// Any dimension can be pinned with `TRIALGATE_COVARIATE_<NAME>`
/// (upper-cased); [`REGION`] is only available that way.
#[derive(Debug, Clone)]
pub struct StandardCovariates {
    at: DateTime<FixedOffset>,
}

impl StandardCovariates {
    /// Resolve against the current local time.
    #[must_use]
    pub fn now() -> Self {
        Self {
            at: Local::now().into(),
        }
    }

    /// Resolve against a fixed instant.
    #[must_use]
    pub const fn at(at: DateTime<FixedOffset>) -> Self {
        Self { at }
    }

    fn env_key(dimension: &str) -> String {
        format!("TRIALGATE_COVARIATE_{}", dimension.to_ascii_uppercase())
    }
}

impl CovariateSource for StandardCovariates {
    fn resolve(&self, dimension: &str) -> Option<String> {
        if let Ok(pinned) = std::env::var(Self::env_key(dimension)) {
            return Some(pinned);
        }
        match dimension {
            DAY_OF_WEEK => Some(
                match self.at.weekday() {
                    Weekday::Sat | Weekday::Sun => "WEEKEND",
                    _ => "WEEKDAY",
                }
                .to_string(),
            ),
            TIME_OF_DAY => Some(
                match self.at.hour() {
                    0..=5 => "NIGHT",
                    6..=11 => "MORNING",
                    12..=17 => "AFTERNOON",
                    _ => "EVENING",
                }
                .to_string(),
            ),
            TIMEZONE => Some(self.at.offset().to_string()),
            _ => None,
        }
    }
}

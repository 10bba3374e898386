//! Per-scope budget tracking.
//!
//! A monitor tracks two independent ceilings: elapsed wall-clock time on a
//! monotonic clock, and consumed cost units. Unit accumulation is a single
//! `fetch_add`, so one monitor can be shared by every run of a group or
//! process without a lock.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::ExhaustedBehavior;

/// Organizational scope of a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BudgetScope {
    /// Shared by every run of the process
    Process,
    /// Shared by every run of one group
    Group,
    /// Exclusive to one run
    Run,
}

impl BudgetScope {
    /// Upper-case name used in termination reasons.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Process => "PROCESS",
            Self::Group => "GROUP",
            Self::Run => "RUN",
        }
    }
}

impl fmt::Display for BudgetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Budget dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BudgetDimension {
    /// Wall-clock time
    Time,
    /// Cost units
    Units,
}

impl BudgetDimension {
    /// Upper-case name used in termination reasons.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Time => "TIME",
            Self::Units => "UNITS",
        }
    }
}

/// Ceilings of one scope. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLimits {
    /// Wall-clock ceiling
    pub time: Option<Duration>,
    /// Cost unit ceiling
    pub units: Option<u64>,
    /// Behavior when this scope triggers exhaustion
    pub on_exhausted: ExhaustedBehavior,
}

impl BudgetLimits {
    /// No ceilings at all.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Set the time ceiling.
    #[must_use]
    pub const fn with_time(mut self, limit: Duration) -> Self {
        self.time = Some(limit);
        self
    }

    /// Set the unit ceiling.
    #[must_use]
    pub const fn with_units(mut self, limit: u64) -> Self {
        self.units = Some(limit);
        self
    }

    /// Set the exhausted behavior.
    #[must_use]
    pub const fn on_exhausted(mut self, behavior: ExhaustedBehavior) -> Self {
        self.on_exhausted = behavior;
        self
    }

    /// Whether any ceiling is configured.
    #[must_use]
    pub const fn is_limited(&self) -> bool {
        self.time.is_some() || self.units.is_some()
    }
}

/// Time and unit consumption of one scope.
///
/// # Example
///
/// ```rust
/// use trialgate::budget::{BudgetLimits, BudgetMonitor, BudgetScope};
///
/// let monitor = BudgetMonitor::new(BudgetScope::Group, BudgetLimits::unlimited().with_units(12));
/// monitor.record_units(5);
/// monitor.record_units(5);
/// assert!(monitor.would_exceed_units(5));
/// assert!(!monitor.units_exhausted());
/// ```
#[derive(Debug)]
pub struct BudgetMonitor {
    scope: BudgetScope,
    limits: BudgetLimits,
    consumed: AtomicU64,
    started: Instant,
}

impl BudgetMonitor {
    /// Start tracking now.
    #[must_use]
    pub fn new(scope: BudgetScope, limits: BudgetLimits) -> Self {
        Self {
            scope,
            limits,
            consumed: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Get the scope.
    #[must_use]
    pub const fn scope(&self) -> BudgetScope {
        self.scope
    }

    /// Get the ceilings.
    #[must_use]
    pub const fn limits(&self) -> &BudgetLimits {
        &self.limits
    }

    /// Units consumed so far.
    #[must_use]
    pub fn consumed_units(&self) -> u64 {
        self.consumed.load(Ordering::Acquire)
    }

    /// Time since the monitor was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Add consumed units. Returns the new total.
    pub fn record_units(&self, units: u64) -> u64 {
        self.consumed
            .fetch_add(units, Ordering::AcqRel)
            .saturating_add(units)
    }

    /// Whether the time ceiling has been reached.
    #[must_use]
    pub fn time_exhausted(&self) -> bool {
        self.limits
            .time
            .is_some_and(|limit| self.elapsed() >= limit)
    }

    /// Whether the unit ceiling has been reached.
    #[must_use]
    pub fn units_exhausted(&self) -> bool {
        self.limits
            .units
            .is_some_and(|limit| self.consumed_units() >= limit)
    }

    /// Whether charging `charge` more units would go past the ceiling.
    #[must_use]
    pub fn would_exceed_units(&self, charge: u64) -> bool {
        self.limits
            .units
            .is_some_and(|limit| self.consumed_units().saturating_add(charge) > limit)
    }

    /// Units left before the ceiling, `None` when unlimited.
    #[must_use]
    pub fn remaining_units(&self) -> Option<u64> {
        self.limits
            .units
            .map(|limit| limit.saturating_sub(self.consumed_units()))
    }

    /// Time left before the ceiling, `None` when unlimited.
    #[must_use]
    pub fn remaining_time(&self) -> Option<Duration> {
        self.limits
            .time
            .map(|limit| limit.saturating_sub(self.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_never_exhausts() {
        let monitor = BudgetMonitor::new(BudgetScope::Run, BudgetLimits::unlimited());
        monitor.record_units(u64::MAX / 2);
        assert!(!monitor.units_exhausted());
        assert!(!monitor.time_exhausted());
        assert!(!monitor.would_exceed_units(1));
        assert_eq!(monitor.remaining_units(), None);
    }

    #[test]
    fn test_units_ceiling() {
        let monitor = BudgetMonitor::new(BudgetScope::Run, BudgetLimits::unlimited().with_units(10));
        assert_eq!(monitor.record_units(4), 4);
        assert_eq!(monitor.record_units(6), 10);
        assert!(monitor.units_exhausted());
        assert_eq!(monitor.remaining_units(), Some(0));
    }

    #[test]
    fn test_static_charge_prediction() {
        let monitor = BudgetMonitor::new(BudgetScope::Run, BudgetLimits::unlimited().with_units(12));
        assert!(!monitor.would_exceed_units(5));
        monitor.record_units(5);
        assert!(!monitor.would_exceed_units(5));
        monitor.record_units(5);
        assert!(monitor.would_exceed_units(5));
        assert!(!monitor.would_exceed_units(2));
    }

    #[test]
    fn test_time_ceiling() {
        let monitor = BudgetMonitor::new(
            BudgetScope::Run,
            BudgetLimits::unlimited().with_time(Duration::from_millis(1)),
        );
        std::thread::sleep(Duration::from_millis(5));
        assert!(monitor.time_exhausted());
        assert_eq!(monitor.remaining_time(), Some(Duration::ZERO));
    }

    #[test]
    fn test_scope_names() {
        assert_eq!(BudgetScope::Process.to_string(), "PROCESS");
        assert_eq!(BudgetDimension::Units.name(), "UNITS");
    }
}

//! Ordered budget checks across process, group and run scopes.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::monitor::{BudgetDimension, BudgetMonitor, BudgetScope};
use crate::config::{CostMode, ExhaustedBehavior};

/// A budget ceiling that stopped a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetExhaustion {
    /// Scope whose ceiling was hit
    pub scope: BudgetScope,
    /// Dimension that was hit
    pub dimension: BudgetDimension,
    /// Behavior configured on the triggering scope
    pub behavior: ExhaustedBehavior,
}

impl BudgetExhaustion {
    /// Reason code, e.g. `GROUP_UNITS_BUDGET_EXHAUSTED`.
    #[must_use]
    pub fn reason(&self) -> String {
        format!(
            "{}_{}_BUDGET_EXHAUSTED",
            self.scope.name(),
            self.dimension.name()
        )
    }

    /// Whether the run must fail regardless of its pass rate.
    #[must_use]
    pub fn forces_failure(&self) -> bool {
        self.behavior == ExhaustedBehavior::Fail
    }
}

impl fmt::Display for BudgetExhaustion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dimension = match self.dimension {
            BudgetDimension::Time => "time",
            BudgetDimension::Units => "unit",
        };
        write!(
            f,
            "{} {dimension} budget exhausted",
            match self.scope {
                BudgetScope::Process => "Process",
                BudgetScope::Group => "Group",
                BudgetScope::Run => "Run",
            }
        )
    }
}

/// Composes the three scopes of one run into ordered checks.
///
/// The process and group monitors are shared with concurrently executing
/// runs; the run monitor is exclusive.
#[derive(Debug)]
pub struct BudgetOrchestrator {
    process: Arc<BudgetMonitor>,
    group: Option<Arc<BudgetMonitor>>,
    run: BudgetMonitor,
    cost_mode: CostMode,
}

impl BudgetOrchestrator {
    /// Create an orchestrator for one run.
    #[must_use]
    pub fn new(
        process: Arc<BudgetMonitor>,
        group: Option<Arc<BudgetMonitor>>,
        run: BudgetMonitor,
        cost_mode: CostMode,
    ) -> Self {
        Self {
            process,
            group,
            run,
            cost_mode,
        }
    }

    /// Get the run-scope monitor.
    #[must_use]
    pub const fn run_monitor(&self) -> &BudgetMonitor {
        &self.run
    }

    /// Get the process-scope monitor.
    #[must_use]
    pub fn process_monitor(&self) -> &BudgetMonitor {
        &self.process
    }

    /// Get the group-scope monitor, if the run belongs to a group.
    #[must_use]
    pub fn group_monitor(&self) -> Option<&BudgetMonitor> {
        self.group.as_deref()
    }

    /// Cost accounting mode.
    #[must_use]
    pub const fn cost_mode(&self) -> CostMode {
        self.cost_mode
    }

    fn monitors(&self) -> impl Iterator<Item = &BudgetMonitor> {
        std::iter::once(self.process.as_ref())
            .chain(self.group.as_deref())
            .chain(std::iter::once(&self.run))
    }

    /// Check before a sample starts. First hit wins, in the order
    /// process-time, process-units, group-time, group-units, run-time,
    /// run-units.
    ///
    /// Under a static charge a unit ceiling is hit when the next charge would
    /// exceed it; otherwise when consumption has reached it.
    #[must_use]
    pub fn check_before_sample(&self) -> Option<BudgetExhaustion> {
        let exhaustion = self.monitors().find_map(|monitor| {
            if monitor.time_exhausted() {
                return Some(exhaustion_of(monitor, BudgetDimension::Time));
            }
            let units_hit = match self.cost_mode {
                CostMode::Static { charge } => monitor.would_exceed_units(charge),
                CostMode::Dynamic => monitor.units_exhausted(),
            };
            units_hit.then(|| exhaustion_of(monitor, BudgetDimension::Units))
        });
        match &exhaustion {
            Some(hit) => info!(reason = %hit.reason(), "budget exhausted before sample"),
            None => debug!(
                run_units = self.run.consumed_units(),
                process_units = self.process.consumed_units(),
                "budget pre-check passed"
            ),
        }
        exhaustion
    }

    /// Check after a sample reported its consumption. Dynamic mode only; in
    /// static mode the next pre-check covers it.
    #[must_use]
    pub fn check_after_sample(&self) -> Option<BudgetExhaustion> {
        if !matches!(self.cost_mode, CostMode::Dynamic) {
            return None;
        }
        let exhaustion = self
            .monitors()
            .find(|monitor| monitor.units_exhausted())
            .map(|monitor| exhaustion_of(monitor, BudgetDimension::Units));
        if let Some(hit) = &exhaustion {
            info!(reason = %hit.reason(), "budget exhausted after sample");
        }
        exhaustion
    }

    /// Credit `units` to every scope.
    pub fn record_units(&self, units: u64) {
        if units == 0 {
            return;
        }
        for monitor in self.monitors() {
            monitor.record_units(units);
        }
    }

    /// Credit the static per-sample charge, if configured.
    pub fn credit_static_charge(&self) {
        if let CostMode::Static { charge } = self.cost_mode {
            self.record_units(charge);
        }
    }
}

fn exhaustion_of(monitor: &BudgetMonitor, dimension: BudgetDimension) -> BudgetExhaustion {
    BudgetExhaustion {
        scope: monitor.scope(),
        dimension,
        behavior: monitor.limits().on_exhausted,
    }
}

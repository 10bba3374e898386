//! Layered execution contexts: process, group, run.
//!
//! The host creates one [`ProcessContext`] at its entry point and passes it
//! down. Each layer exposes its ancestors directly, so a run reads the
//! shared budgets and the baseline repository without any lookup chain.

use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::debug;

use crate::baseline::{BaselineRepository, CovariateDeclaration, CovariateSource, FactorSourceIdentity};
use crate::budget::{BudgetLimits, BudgetMonitor, BudgetScope};
use crate::config::RunConfig;

/// Shared covariate source.
pub type SharedCovariateSource = Arc<dyn CovariateSource + Send + Sync>;

/// Process-wide state shared by every run.
///
/// The process budget monitor is created on first access, exactly once even
/// under concurrent first access.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use trialgate::budget::BudgetLimits;
/// use trialgate::engine::ProcessContext;
///
/// let process = Arc::new(ProcessContext::new().with_budget(BudgetLimits::unlimited().with_units(1000)));
/// let a = process.budget();
/// let b = process.budget();
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
#[derive(Default)]
pub struct ProcessContext {
    budget_limits: BudgetLimits,
    budget: OnceLock<Arc<BudgetMonitor>>,
    group_budgets: DashMap<String, Arc<BudgetMonitor>>,
    repository: Option<Arc<dyn BaselineRepository>>,
}

impl ProcessContext {
    /// Create a context with no budget and no baseline repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the process budget ceilings.
    #[must_use]
    pub fn with_budget(mut self, limits: BudgetLimits) -> Self {
        self.budget_limits = limits;
        self
    }

    /// Set the baseline repository.
    #[must_use]
    pub fn with_repository(mut self, repository: Arc<dyn BaselineRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Process budget monitor, created on first access.
    #[must_use]
    pub fn budget(&self) -> Arc<BudgetMonitor> {
        Arc::clone(self.budget.get_or_init(|| {
            debug!(limits = ?self.budget_limits, "process budget initialized");
            Arc::new(BudgetMonitor::new(BudgetScope::Process, self.budget_limits))
        }))
    }

    /// Baseline repository, if configured.
    #[must_use]
    pub fn repository(&self) -> Option<&Arc<dyn BaselineRepository>> {
        self.repository.as_ref()
    }

    /// Open the group `name`. The first call registers its budget; later
    /// calls share that budget and ignore `limits`.
    #[must_use]
    pub fn group(self: &Arc<Self>, name: impl Into<String>, limits: BudgetLimits) -> GroupContext {
        let name = name.into();
        let budget = self
            .group_budgets
            .entry(name.clone())
            .or_insert_with(|| Arc::new(BudgetMonitor::new(BudgetScope::Group, limits)))
            .clone();
        GroupContext {
            process: Arc::clone(self),
            name,
            budget,
        }
    }

    /// Start a run outside any group.
    #[must_use]
    pub fn run(self: &Arc<Self>, spec_id: impl Into<String>, config: RunConfig) -> RunContext {
        RunContext::new(Arc::clone(self), None, spec_id.into(), config)
    }
}

impl fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessContext")
            .field("budget_limits", &self.budget_limits)
            .field("groups", &self.group_budgets.len())
            .field("has_repository", &self.repository.is_some())
            .finish_non_exhaustive()
    }
}

/// A group of runs sharing one budget (e.g. one test class).
#[derive(Debug, Clone)]
pub struct GroupContext {
    process: Arc<ProcessContext>,
    name: String,
    budget: Arc<BudgetMonitor>,
}

impl GroupContext {
    /// Get the enclosing process.
    #[must_use]
    pub const fn process(&self) -> &Arc<ProcessContext> {
        &self.process
    }

    /// Get the group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group budget monitor.
    #[must_use]
    pub fn budget(&self) -> Arc<BudgetMonitor> {
        Arc::clone(&self.budget)
    }

    /// Start a run in this group.
    #[must_use]
    pub fn run(&self, spec_id: impl Into<String>, config: RunConfig) -> RunContext {
        RunContext::new(Arc::clone(&self.process), Some(self.clone()), spec_id.into(), config)
    }
}

/// Everything one run needs before it is prepared.
pub struct RunContext {
    process: Arc<ProcessContext>,
    group: Option<GroupContext>,
    spec_id: String,
    config: RunConfig,
    covariates: CovariateDeclaration,
    covariate_source: Option<SharedCovariateSource>,
    factor_source: Option<FactorSourceIdentity>,
}

impl RunContext {
    fn new(
        process: Arc<ProcessContext>,
        group: Option<GroupContext>,
        spec_id: String,
        config: RunConfig,
    ) -> Self {
        Self {
            process,
            group,
            spec_id,
            config,
            covariates: CovariateDeclaration::empty(),
            covariate_source: None,
            factor_source: None,
        }
    }

    /// Declare the covariate dimensions of the use case.
    #[must_use]
    pub fn with_covariates(mut self, declaration: CovariateDeclaration) -> Self {
        self.covariates = declaration;
        self
    }

    /// Resolve covariates through `source` instead of the clock and
    /// environment.
    #[must_use]
    pub fn with_covariate_source(mut self, source: SharedCovariateSource) -> Self {
        self.covariate_source = Some(source);
        self
    }

    /// Identify the factor source feeding this run's samples.
    #[must_use]
    pub fn with_factor_source(mut self, identity: FactorSourceIdentity) -> Self {
        self.factor_source = Some(identity);
        self
    }

    /// Get the enclosing process.
    #[must_use]
    pub const fn process(&self) -> &Arc<ProcessContext> {
        &self.process
    }

    /// Get the enclosing group, if any.
    #[must_use]
    pub const fn group(&self) -> Option<&GroupContext> {
        self.group.as_ref()
    }

    /// Get the use case identifier.
    #[must_use]
    pub fn spec_id(&self) -> &str {
        &self.spec_id
    }

    /// Get the run configuration.
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Get the covariate declaration.
    #[must_use]
    pub const fn covariates(&self) -> &CovariateDeclaration {
        &self.covariates
    }

    /// Get the covariate source override.
    #[must_use]
    pub const fn covariate_source(&self) -> Option<&SharedCovariateSource> {
        self.covariate_source.as_ref()
    }

    /// Get the current factor source identity.
    #[must_use]
    pub const fn factor_source(&self) -> Option<&FactorSourceIdentity> {
        self.factor_source.as_ref()
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("spec_id", &self.spec_id)
            .field("group", &self.group.as_ref().map(GroupContext::name))
            .field("config", &self.config)
            .field("covariates", &self.covariates)
            .finish_non_exhaustive()
    }
}

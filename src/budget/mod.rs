//! Hierarchical budgets (process, group, run)
//!
//! ```text
//! ProcessContext ── Arc<BudgetMonitor> (lazy, exactly once)
//!   GroupContext ── Arc<BudgetMonitor> (one per group name)
//!     RunContext ── BudgetMonitor (exclusive)
//! ```
//!
//! [`BudgetOrchestrator`] checks the three scopes in precedence order
//! before and after every sample.

mod monitor;
mod orchestrator;

pub use monitor::{BudgetDimension, BudgetLimits, BudgetMonitor, BudgetScope};
pub use orchestrator::{BudgetExhaustion, BudgetOrchestrator};

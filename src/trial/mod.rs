//! Trial aggregation and early termination.

mod aggregate;
mod early_termination;

pub use aggregate::{Termination, TerminationReason, Trial, TrialAggregate};
pub use early_termination::{required_successes, EarlyTermination, EarlyTerminationEvaluator};

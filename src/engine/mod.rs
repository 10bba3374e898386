//! Run execution engine
//!
//! ```text
//! prepare ──> ApproachResolver + BaselineMatcher (once)
//!   for each slot:
//!     pacing ─> budget pre-check ─> sampler ─> record ─> budget post-check
//!            ─> early termination ─> continue | terminate
//! finalize ──> VerdictDecider ──> RunReport
//! ```

mod context;
mod outcome;
mod report;
mod run;

pub use context::{GroupContext, ProcessContext, RunContext, SharedCovariateSource};
pub use outcome::{SampleError, SampleOutcome, SampleResult, SampleScope};
pub use report::{ReportEntry, RunReport, ENTRY_PREFIX};
pub use run::{LazyBaseline, ProbabilisticRun};

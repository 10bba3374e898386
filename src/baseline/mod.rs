//! Baseline matching (Footprint + Selection)
//!
//! ## Overview
//!
//! ```text
//! CovariateDeclaration ──> Footprint ──> BaselineRepository::find_candidates
//!                                              │
//! CovariateProfile ───────────────────> BaselineSelector ──> SelectionResult
//! ```
//!
//! A footprint identifies structurally compatible baselines (same use case,
//! same covariate dimension names). The selector then ranks those candidates
//! by how many declared dimension values agree with the current run.

mod covariate;
mod footprint;
mod matcher;
mod record;
mod repository;
mod selector;

pub use covariate::{
    CovariateDeclaration, CovariateProfile, CovariateSource, StandardCovariates,
    StaticCovariates, DAY_OF_WEEK, REGION, TIMEZONE, TIME_OF_DAY, UNRESOLVED,
};
pub use footprint::Footprint;
pub use matcher::BaselineMatcher;
pub use record::{
    BaselineRecord, BaselineRecordBuilder, ExpirationStatus, FactorSourceCheck,
    FactorSourceIdentity,
};
pub use repository::{BaselineRepository, MemoryBaselineRepository};
pub use selector::{BaselineSelector, SelectionResult};

//! Locates the most applicable baseline for a run.

use std::sync::Arc;

use tracing::{debug, warn};

use super::covariate::{CovariateDeclaration, CovariateProfile};
use super::footprint::Footprint;
use super::repository::BaselineRepository;
use super::selector::{BaselineSelector, SelectionResult};
use crate::{Error, Result};

/// Footprint computation, candidate lookup and selection in one step.
#[derive(Clone)]
pub struct BaselineMatcher {
    repository: Arc<dyn BaselineRepository>,
}

impl BaselineMatcher {
    /// Match against the given repository.
    #[must_use]
    pub fn new(repository: Arc<dyn BaselineRepository>) -> Self {
        Self { repository }
    }

    /// Find the baseline for a run.
    ///
    /// Returns `Ok(None)` when the repository knows nothing about `spec_id`
    /// (the run falls back to no-baseline mode).
    ///
    /// # Errors
    ///
    /// [`Error::NoCompatibleBaseline`] when baselines exist for `spec_id`
    /// but none shares the run's footprint, [`Error::BaselineIntegrity`] when
    /// any candidate fails verification, and repository errors.
    pub fn find(
        &self,
        spec_id: &str,
        declaration: &CovariateDeclaration,
        profile: &CovariateProfile,
    ) -> Result<Option<SelectionResult>> {
        let footprint = Footprint::compute(spec_id, declaration);
        let candidates = self.repository.find_candidates(spec_id, &footprint)?;
        debug!(spec_id, %footprint, candidates = candidates.len(), "baseline candidates");

        if candidates.is_empty() {
            let known = self.repository.known_footprints(spec_id)?;
            if known.is_empty() {
                debug!(spec_id, "no baseline recorded, running without one");
                return Ok(None);
            }
            return Err(Error::NoCompatibleBaseline {
                spec_id: spec_id.to_string(),
                footprint: footprint.to_string(),
                known: known.iter().map(ToString::to_string).collect(),
            });
        }

        for candidate in &candidates {
            candidate.verify_integrity()?;
        }
        let Some(result) = BaselineSelector::select(candidates, declaration, profile) else {
            return Ok(None);
        };

        if !result.is_conforming() {
            warn!(
                spec_id,
                baseline = result.selected().source_id(),
                dimensions = ?result.non_conforming_dimensions(),
                "covariates differ from the selected baseline"
            );
        }
        if result.is_ambiguous() {
            warn!(
                spec_id,
                baseline = result.selected().source_id(),
                candidates = result.candidates_considered(),
                "several baselines tied; picked the newest"
            );
        }
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::{BaselineRecord, MemoryBaselineRepository};

    fn matcher_with(records: Vec<BaselineRecord>) -> BaselineMatcher {
        let repo = MemoryBaselineRepository::new();
        for record in records {
            repo.insert(record);
        }
        BaselineMatcher::new(Arc::new(repo))
    }

    #[test]
    fn test_absent_baseline_is_not_an_error() {
        let matcher = matcher_with(vec![]);
        let found = matcher
            .find("checkout", &CovariateDeclaration::empty(), &CovariateProfile::new())
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_incompatible_footprint_lists_known() {
        let matcher = matcher_with(vec![BaselineRecord::builder("b-1", "checkout", 100, 95)
            .covariate("region", "eu")
            .build()]);
        let err = matcher
            .find(
                "checkout",
                &CovariateDeclaration::new(["model"]),
                &CovariateProfile::new().with("model", "m1"),
            )
            .unwrap_err();
        match err {
            Error::NoCompatibleBaseline { known, .. } => assert_eq!(known.len(), 1),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_finds_matching_baseline() {
        let matcher = matcher_with(vec![BaselineRecord::builder("b-1", "checkout", 100, 95)
            .covariate("region", "eu")
            .build()]);
        let found = matcher
            .find(
                "checkout",
                &CovariateDeclaration::new(["region"]),
                &CovariateProfile::new().with("region", "us"),
            )
            .unwrap()
            .unwrap();
        assert_eq!(found.selected().source_id(), "b-1");
        assert_eq!(found.non_conforming_dimensions(), ["region"]);
    }
}

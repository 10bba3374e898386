//! Ranking of footprint-compatible baselines against a run's covariates.

use serde::{Deserialize, Serialize};

use super::covariate::{CovariateDeclaration, CovariateProfile};
use super::record::BaselineRecord;

/// Outcome of baseline selection for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    selected: BaselineRecord,
    non_conforming_dimensions: Vec<String>,
    ambiguous: bool,
    candidates_considered: usize,
}

impl SelectionResult {
    /// Get the selected baseline.
    #[must_use]
    pub const fn selected(&self) -> &BaselineRecord {
        &self.selected
    }

    /// Declared dimensions whose values differ from the selected baseline.
    #[must_use]
    pub fn non_conforming_dimensions(&self) -> &[String] {
        &self.non_conforming_dimensions
    }

    /// Whether every declared dimension matched.
    #[must_use]
    pub fn is_conforming(&self) -> bool {
        self.non_conforming_dimensions.is_empty()
    }

    /// Whether several candidates tied at the winning rank.
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        self.ambiguous
    }

    /// Number of candidates ranked.
    #[must_use]
    pub const fn candidates_considered(&self) -> usize {
        self.candidates_considered
    }
}

/// Ranks candidates: conforming first, then by fewest mismatching
/// dimensions.
///
/// Ties at the winning rank are broken by newest `generated_at`, then by
/// lexical `source_id`, and flagged ambiguous.
pub struct BaselineSelector {
    _private: (),
}

impl BaselineSelector {
    /// Select the best candidate. `None` only when `candidates` is empty.
    #[must_use]
    pub fn select(
        candidates: Vec<BaselineRecord>,
        declaration: &CovariateDeclaration,
        profile: &CovariateProfile,
    ) -> Option<SelectionResult> {
        let candidates_considered = candidates.len();
        let mut ranked: Vec<(Vec<String>, BaselineRecord)> = candidates
            .into_iter()
            .map(|record| {
                let mismatches = record.covariates().map_or_else(
                    || declaration.dimensions().to_vec(),
                    |snapshot| profile.mismatches(declaration, snapshot),
                );
                (mismatches, record)
            })
            .collect();

        ranked.sort_by(|(a_miss, a), (b_miss, b)| {
            a_miss
                .len()
                .cmp(&b_miss.len())
                .then_with(|| b.generated_at().cmp(&a.generated_at()))
                .then_with(|| a.source_id().cmp(b.source_id()))
        });

        let best_rank = ranked.first()?.0.len();
        let tied = ranked
            .iter()
            .take_while(|(mismatches, _)| mismatches.len() == best_rank)
            .count();

        let (non_conforming_dimensions, selected) = ranked.into_iter().next()?;
        Some(SelectionResult {
            selected,
            non_conforming_dimensions,
            ambiguous: tied > 1,
            candidates_considered,
        })
    }
}

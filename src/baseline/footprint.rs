//! Structural fingerprint of a use case's covariate schema.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::covariate::CovariateDeclaration;

/// Hex characters kept from the SHA-256 digest.
const FOOTPRINT_HEX_LEN: usize = 16;

/// Deterministic fingerprint of `(spec_id, dimension names)`.
///
/// Independent of dimension values and of declaration order, so two runs
/// of the same use case share a footprint whenever their schemas agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Footprint(String);

impl Footprint {
    /// Compute the footprint for a use case and its declaration.
    #[must_use]
    pub fn compute(spec_id: &str, declaration: &CovariateDeclaration) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(spec_id.as_bytes());
        for dimension in declaration.sorted_dimensions() {
            hasher.update([0u8]);
            hasher.update(dimension.as_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        Self(digest[..FOOTPRINT_HEX_LEN].to_string())
    }

    /// Wrap a previously computed footprint (e.g. read from storage).
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Footprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

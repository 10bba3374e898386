//! Baseline Record - historical empirical evidence for one use case

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::covariate::CovariateDeclaration;
use super::footprint::Footprint;
use crate::stats::{BaselineData, BinomialEstimator};
use crate::{Error, Result};

/// Confidence used to derive a stored threshold when none is supplied.
const DEFAULT_DERIVATION_CONFIDENCE: f64 = 0.95;

/// Identity of the process that generated the factors a baseline was
/// measured with (e.g. a prompt corpus or input generator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorSourceIdentity {
    /// Content hash of the factor source
    pub hash: String,
    /// Human-readable name
    pub name: String,
    /// Number of factor values drawn
    pub sample_count: u64,
}

/// Outcome of comparing a baseline's factor source to the current run's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactorSourceCheck {
    /// One side has no identity, so nothing can be compared
    NotApplicable,
    /// Same factor source hash
    Match,
    /// Different factor source; the baseline may not be representative
    Mismatch {
        /// Baseline's factor source name and hash
        baseline: String,
        /// Current run's factor source name and hash
        current: String,
    },
}

/// Freshness of a baseline with an expiration window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpirationStatus {
    /// No expiration policy recorded
    NoExpiration,
    /// More than 25% of the validity window remains
    Valid,
    /// At most 25% of the validity window remains
    ExpiringSoon,
    /// At most 10% of the validity window remains
    ExpiringImminently,
    /// The validity window has elapsed
    Expired,
}

impl ExpirationStatus {
    /// Whether this status deserves a warning.
    #[must_use]
    pub const fn requires_warning(self) -> bool {
        !matches!(self, Self::NoExpiration | Self::Valid)
    }
}

/// Baseline Record holds the empirical outcome of a baseline measurement.
///
/// Records are read-only once built; the optional digest detects any later
/// modification of the empirical content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    source_id: String,
    spec_id: String,
    footprint: Footprint,
    samples: u64,
    successes: u64,
    min_pass_rate: f64,
    generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    covariates: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    factor_source: Option<FactorSourceIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
}

impl BaselineRecord {
    /// Create a builder with the required empirical fields.
    #[must_use]
    pub fn builder(
        source_id: impl Into<String>,
        spec_id: impl Into<String>,
        samples: u64,
        successes: u64,
    ) -> BaselineRecordBuilder {
        BaselineRecordBuilder::new(source_id, spec_id, samples, successes)
    }

    /// Get the record identifier.
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Get the use case identifier.
    #[must_use]
    pub fn spec_id(&self) -> &str {
        &self.spec_id
    }

    /// Get the structural footprint.
    #[must_use]
    pub const fn footprint(&self) -> &Footprint {
        &self.footprint
    }

    /// Get the empirical sample count.
    #[must_use]
    pub const fn samples(&self) -> u64 {
        self.samples
    }

    /// Get the empirical success count.
    #[must_use]
    pub const fn successes(&self) -> u64 {
        self.successes
    }

    /// Get the stored (derived) minimum pass rate.
    #[must_use]
    pub const fn min_pass_rate(&self) -> f64 {
        self.min_pass_rate
    }

    /// Get the generation timestamp.
    #[must_use]
    pub const fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Get the covariate snapshot, if recorded.
    #[must_use]
    pub const fn covariates(&self) -> Option<&BTreeMap<String, String>> {
        self.covariates.as_ref()
    }

    /// Get the factor source identity, if recorded.
    #[must_use]
    pub const fn factor_source(&self) -> Option<&FactorSourceIdentity> {
        self.factor_source.as_ref()
    }

    /// Get the integrity digest, if sealed.
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Observed success rate, 0 for an empty record.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn observed_rate(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.successes as f64 / self.samples as f64
        }
    }

    /// Empirical evidence for the statistical derivations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBaseline`] for an empty or inconsistent record.
    pub fn data(&self) -> Result<BaselineData> {
        BaselineData::new(self.samples, self.successes)
    }

    /// Seal the record with a digest over its empirical content.
    #[must_use]
    pub fn sealed(mut self) -> Self {
        self.digest = Some(self.compute_digest());
        self
    }

    /// Verify the stored digest. Unsealed records pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BaselineIntegrity`] when the content no longer
    /// matches the digest.
    pub fn verify_integrity(&self) -> Result<()> {
        let Some(expected) = &self.digest else {
            return Ok(());
        };
        let actual = self.compute_digest();
        if *expected == actual {
            Ok(())
        } else {
            Err(Error::BaselineIntegrity {
                source_id: self.source_id.clone(),
                expected: expected.clone(),
                actual,
            })
        }
    }

    /// Freshness relative to `now`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn expiration_status(&self, now: DateTime<Utc>) -> ExpirationStatus {
        let Some(days) = self.expires_in_days else {
            return ExpirationStatus::NoExpiration;
        };
        let window = Duration::days(i64::from(days));
        let remaining = self.generated_at + window - now;
        if remaining <= Duration::zero() {
            return ExpirationStatus::Expired;
        }
        let fraction =
            remaining.num_seconds() as f64 / window.num_seconds().max(1) as f64;
        if fraction <= 0.10 {
            ExpirationStatus::ExpiringImminently
        } else if fraction <= 0.25 {
            ExpirationStatus::ExpiringSoon
        } else {
            ExpirationStatus::Valid
        }
    }

    /// Compare the recorded factor source with the current run's.
    #[must_use]
    pub fn check_factor_source(&self, current: Option<&FactorSourceIdentity>) -> FactorSourceCheck {
        match (&self.factor_source, current) {
            (Some(recorded), Some(current)) if recorded.hash == current.hash => {
                FactorSourceCheck::Match
            }
            (Some(recorded), Some(current)) => FactorSourceCheck::Mismatch {
                baseline: format!("{} ({})", recorded.name, recorded.hash),
                current: format!("{} ({})", current.name, current.hash),
            },
            _ => FactorSourceCheck::NotApplicable,
        }
    }

    fn compute_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.spec_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.footprint.as_str().as_bytes());
        hasher.update(self.samples.to_le_bytes());
        hasher.update(self.successes.to_le_bytes());
        hasher.update(self.min_pass_rate.to_bits().to_le_bytes());
        hasher.update(self.generated_at.timestamp_millis().to_le_bytes());
        if let Some(covariates) = &self.covariates {
            for (name, value) in covariates {
                hasher.update(name.as_bytes());
                hasher.update([b'=']);
                hasher.update(value.as_bytes());
                hasher.update([0u8]);
            }
        }
        hasher.update([0x1e]);
        match self.expires_in_days {
            Some(days) => {
                hasher.update([1u8]);
                hasher.update(days.to_le_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update([0x1e]);
        match &self.factor_source {
            Some(identity) => {
                hasher.update([1u8]);
                hasher.update(identity.hash.as_bytes());
                hasher.update([0u8]);
                hasher.update(identity.name.as_bytes());
                hasher.update([0u8]);
                hasher.update(identity.sample_count.to_le_bytes());
            }
            None => hasher.update([0u8]),
        }
        hex::encode(hasher.finalize())
    }
}

/// Builder for `BaselineRecord`.
#[derive(Debug)]
pub struct BaselineRecordBuilder {
    source_id: String,
    spec_id: String,
    samples: u64,
    successes: u64,
    footprint: Option<Footprint>,
    min_pass_rate: Option<f64>,
    generated_at: Option<DateTime<Utc>>,
    covariates: Option<BTreeMap<String, String>>,
    expires_in_days: Option<u32>,
    factor_source: Option<FactorSourceIdentity>,
}

impl BaselineRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(
        source_id: impl Into<String>,
        spec_id: impl Into<String>,
        samples: u64,
        successes: u64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            spec_id: spec_id.into(),
            samples,
            successes,
            footprint: None,
            min_pass_rate: None,
            generated_at: None,
            covariates: None,
            expires_in_days: None,
            factor_source: None,
        }
    }

    /// Set the footprint explicitly. Defaults to the footprint of the
    /// covariate snapshot's dimension names.
    #[must_use]
    pub fn footprint(mut self, footprint: Footprint) -> Self {
        self.footprint = Some(footprint);
        self
    }

    /// Set the stored minimum pass rate. Defaults to the 95% Wilson lower
    /// bound of the observed rate.
    #[must_use]
    pub fn min_pass_rate(mut self, min_pass_rate: f64) -> Self {
        self.min_pass_rate = Some(min_pass_rate);
        self
    }

    /// Set the generation timestamp. Defaults to now.
    #[must_use]
    pub fn generated_at(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = Some(generated_at);
        self
    }

    /// Record one covariate value in the snapshot.
    #[must_use]
    pub fn covariate(mut self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        self.covariates
            .get_or_insert_with(BTreeMap::new)
            .insert(dimension.into(), value.into());
        self
    }

    /// Set the validity window in days.
    #[must_use]
    pub fn expires_in_days(mut self, days: u32) -> Self {
        self.expires_in_days = Some(days);
        self
    }

    /// Set the factor source identity.
    #[must_use]
    pub fn factor_source(mut self, identity: FactorSourceIdentity) -> Self {
        self.factor_source = Some(identity);
        self
    }

    /// Build the `BaselineRecord`.
    #[must_use]
    pub fn build(self) -> BaselineRecord {
        let footprint = self.footprint.unwrap_or_else(|| {
            let dimensions = self
                .covariates
                .as_ref()
                .map(|snapshot| CovariateDeclaration::new(snapshot.keys().cloned()))
                .unwrap_or_default();
            Footprint::compute(&self.spec_id, &dimensions)
        });
        let min_pass_rate = self.min_pass_rate.unwrap_or_else(|| {
            BinomialEstimator::new(DEFAULT_DERIVATION_CONFIDENCE)
                .map(|estimator| estimator.lower_bound(self.successes, self.samples))
                .unwrap_or(0.0)
        });

        BaselineRecord {
            source_id: self.source_id,
            spec_id: self.spec_id,
            footprint,
            samples: self.samples,
            successes: self.successes,
            min_pass_rate,
            generated_at: self.generated_at.unwrap_or_else(Utc::now),
            covariates: self.covariates,
            expires_in_days: self.expires_in_days,
            factor_source: self.factor_source,
            digest: None,
        }
    }
}

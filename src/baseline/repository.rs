//! Baseline repository contract and an in-memory implementation.

use std::path::Path;

use dashmap::DashMap;

use super::footprint::Footprint;
use super::record::BaselineRecord;
use crate::Result;

/// Source of persisted baseline records.
///
/// Implementations must be shareable across concurrently executing runs.
pub trait BaselineRepository: Send + Sync {
    /// All records for `spec_id` sharing `footprint`.
    ///
    /// # Errors
    ///
    /// Storage-specific failures.
    fn find_candidates(&self, spec_id: &str, footprint: &Footprint) -> Result<Vec<BaselineRecord>>;

    /// Every footprint known for `spec_id`, sorted and deduplicated.
    ///
    /// # Errors
    ///
    /// Storage-specific failures.
    fn known_footprints(&self, spec_id: &str) -> Result<Vec<Footprint>>;
}

/// In-memory baseline repository keyed by use case.
///
/// Thread-safe via `DashMap`; records are immutable once inserted.
///
/// # Example
///
/// ```rust
/// use trialgate::baseline::{BaselineRecord, BaselineRepository, MemoryBaselineRepository};
///
/// let repo = MemoryBaselineRepository::new();
/// let record = BaselineRecord::builder("b-1", "checkout", 1000, 951).build();
/// let footprint = record.footprint().clone();
/// repo.insert(record);
///
/// assert_eq!(repo.find_candidates("checkout", &footprint)?.len(), 1);
/// # Ok::<(), trialgate::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct MemoryBaselineRepository {
    records: DashMap<String, Vec<BaselineRecord>>,
}

impl MemoryBaselineRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of records, verifying every sealed record.
    ///
    /// # Errors
    ///
    /// Returns a JSON error for malformed input and
    /// [`Error::BaselineIntegrity`](crate::Error::BaselineIntegrity) for a
    /// tampered record.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let records: Vec<BaselineRecord> = serde_json::from_str(json)?;
        let repo = Self::new();
        for record in records {
            record.verify_integrity()?;
            repo.insert(record);
        }
        Ok(repo)
    }

    /// Load a JSON file, see [`from_json_str`](Self::from_json_str).
    ///
    /// # Errors
    ///
    /// IO, JSON and integrity errors.
    pub fn load_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Add a record.
    pub fn insert(&self, record: BaselineRecord) {
        self.records
            .entry(record.spec_id().to_string())
            .or_default()
            .push(record);
    }

    /// Total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }

    /// Whether no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BaselineRepository for MemoryBaselineRepository {
    fn find_candidates(&self, spec_id: &str, footprint: &Footprint) -> Result<Vec<BaselineRecord>> {
        Ok(self
            .records
            .get(spec_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| record.footprint() == footprint)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn known_footprints(&self, spec_id: &str) -> Result<Vec<Footprint>> {
        let mut footprints: Vec<Footprint> = self
            .records
            .get(spec_id)
            .map(|records| records.iter().map(|r| r.footprint().clone()).collect())
            .unwrap_or_default();
        footprints.sort();
        footprints.dedup();
        Ok(footprints)
    }
}

//! The parsed registry held in memory, and the cache that keeps it fresh.
//!
//! - [`Dataset`] is immutable once built; the cache swaps whole datasets.
//! - [`DatasetCache`] rebuilds when the raw file is missing or older than
//!   the freshness window, through a [`SnapshotSource`].

pub mod cache;
pub mod fingerprint;
pub mod source;

pub use cache::{CacheState, DatasetCache};
pub use source::SnapshotSource;

use std::collections::HashSet;
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::{ParsedRows, Record};

/// Ordered registry rows plus provenance metadata.
#[derive(Debug)]
pub struct Dataset {
    records: Vec<Record>,
    fingerprint: String,
    dropped_rows: usize,
    source_modified: DateTime<Utc>,
    loaded_at: DateTime<Utc>,
}

impl Dataset {
    pub fn from_parsed(parsed: ParsedRows, source_modified: SystemTime) -> Self {
        Self {
            records: parsed.records,
            fingerprint: parsed.fingerprint,
            dropped_rows: parsed.dropped,
            source_modified: source_modified.into(),
            loaded_at: Utc::now(),
        }
    }

    /// Records in source-file order (chronological per identifier).
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn info(&self) -> DatasetInfo {
        let distinct_codes = self
            .records
            .iter()
            .filter_map(Record::code)
            .collect::<HashSet<_>>()
            .len();

        DatasetInfo {
            record_count: self.records.len(),
            distinct_codes,
            dropped_rows: self.dropped_rows,
            fingerprint: self.fingerprint.clone(),
            source_modified: self.source_modified.to_rfc3339_opts(SecondsFormat::Secs, true),
            loaded_at: self.loaded_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Summary of the loaded dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DatasetInfo {
    pub record_count: usize,
    pub distinct_codes: usize,
    /// Rows dropped to the error ledger during the last parse.
    pub dropped_rows: usize,
    /// SHA-256 of the raw registry file.
    pub fingerprint: String,
    /// ISO8601 last-modified time of the raw file.
    pub source_modified: String,
    /// ISO8601 time the dataset was parsed.
    pub loaded_at: String,
}

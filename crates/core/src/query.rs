//! Lookups over a loaded dataset.
//!
//! Dataset order is chronological per identifier, so the last matching row is
//! the current one. Not-found is `None`, never an empty collection.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::dataset::Dataset;
use crate::registry::Record;

/// Outcome of a batch lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// Current record per normalized code, in normalized input order.
    pub matched: Vec<Record>,
    /// Normalized codes without any match, in input order.
    pub missing: Vec<String>,
}

impl BatchResult {
    /// A batch only succeeds when every requested code matched.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Trim, drop empties, and dedupe keeping first-seen order.
pub fn normalize_codes<S: AsRef<str>>(codes: &[S]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(codes.len());
    let mut normalized: Vec<String> = Vec::with_capacity(codes.len());
    for code in codes {
        let code = code.as_ref().trim();
        if !code.is_empty() && seen.insert(code) {
            normalized.push(code.to_string());
        }
    }
    normalized
}

/// Every record for `code`, in dataset order.
pub fn updates_for(dataset: &Dataset, code: &str) -> Option<Vec<Record>> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }

    let updates: Vec<Record> = dataset
        .records()
        .iter()
        .filter(|r| r.code() == Some(code))
        .cloned()
        .collect();

    if updates.is_empty() { None } else { Some(updates) }
}

/// The most recent record for `code`.
pub fn current_for(dataset: &Dataset, code: &str) -> Option<Record> {
    updates_for(dataset, code).and_then(|mut updates| updates.pop())
}

/// Whether the current record for `code` has status `VÁLIDO`.
pub fn is_valid(dataset: &Dataset, code: &str) -> Option<bool> {
    current_for(dataset, code).map(|r| r.is_valid())
}

/// Resolve many codes in one dataset scan; later rows override earlier ones.
pub fn filter_many<S: AsRef<str>>(dataset: &Dataset, codes: &[S]) -> BatchResult {
    let normalized = normalize_codes(codes);
    if normalized.is_empty() {
        return BatchResult::default();
    }

    let mut slots: HashMap<&str, Option<&Record>> = normalized.iter().map(|c| (c.as_str(), None)).collect();
    for record in dataset.records() {
        if let Some(code) = record.code()
            && let Some(slot) = slots.get_mut(code)
        {
            *slot = Some(record);
        }
    }

    let mut result = BatchResult::default();
    for code in &normalized {
        match slots.get(code.as_str()).copied().flatten() {
            Some(record) => result.matched.push(record.clone()),
            None => result.missing.push(code.clone()),
        }
    }

    tracing::debug!(requested = normalized.len(), missing = result.missing.len(), "batch lookup");
    result
}

//! Matching batch responses back to catalog records.

use crate::hosting::{ErrorKind, ErrorLog, RepoId, RepoMetadata, RepoUpdate};
use std::collections::{HashMap, HashSet};

/// Immutable lookup from repository identifier to the records that reference it
///
/// Records are addressed by their position in the snapshot the index was built from.
#[derive(Debug, Clone, Default)]
pub struct RecordIndex {
    by_id: HashMap<RepoId, Vec<usize>>,
    urls: HashMap<RepoId, String>,
}

impl RecordIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register that record `index` refers to `id` through `url`
    ///
    /// The first URL seen for an identifier is the one used in reports.
    pub fn insert(&mut self, id: RepoId, index: usize, url: &str) {
        let _ = self.urls.entry(id.clone()).or_insert_with(|| url.to_string());
        self.by_id.entry(id).or_default().push(index);
    }

    /// Records referring to `id`, in insertion order
    #[must_use]
    pub fn records_for(&self, id: &RepoId) -> &[usize] {
        self.by_id.get(id).map_or(&[], Vec::as_slice)
    }

    /// The source URL a record used for `id`
    #[must_use]
    pub fn url_for(&self, id: &RepoId) -> Option<&str> {
        self.urls.get(id).map(String::as_str)
    }

    /// Number of distinct identifiers
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Outcome of matching one response against the records
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Metadata to apply, keyed by record position
    pub matched: Vec<(usize, RepoMetadata)>,

    /// Requested identifiers present in the response, in request order
    pub found: Vec<RepoId>,

    /// Requested identifiers absent from the response, in request order
    pub missing: Vec<RepoId>,

    /// Response entries naming a repository no record refers to
    pub orphans: Vec<String>,

    /// Response entries whose identifier could not be parsed
    pub unidentified: Vec<String>,
}

impl Reconciliation {
    /// Record every mismatch as a run error
    pub fn record_errors(&self, index: &RecordIndex, errors: &mut ErrorLog) {
        for source in &self.unidentified {
            errors.record(ErrorKind::Extraction, format!("could not extract repo identifier from {source}"));
        }

        for source in &self.orphans {
            errors.record(ErrorKind::DataConsistency, format!("could not find catalog record for {source}"));
        }

        for id in &self.missing {
            let url = index.url_for(id).map_or_else(|| id.to_string(), str::to_string);
            errors.record(ErrorKind::DataConsistency, format!("repository not found in search results: {url}"));
        }
    }
}

/// Match `updates` against the records in `index`
///
/// `found` and `missing` partition `requested`. An update for a repository referenced by several
/// records is matched to each of them.
#[must_use]
pub fn reconcile(index: &RecordIndex, requested: &[RepoId], updates: Vec<RepoUpdate>) -> Reconciliation {
    let mut result = Reconciliation::default();
    let mut seen = HashSet::new();

    for update in updates {
        let Some(id) = update.id else {
            result.unidentified.push(update.source);
            continue;
        };

        let records = index.records_for(&id);
        if records.is_empty() {
            result.orphans.push(update.source);
            continue;
        }

        for &record in records {
            result.matched.push((record, update.metadata.clone()));
        }
        let _ = seen.insert(id);
    }

    let (found, missing) = requested.iter().cloned().partition(|id| seen.contains(id));
    result.found = found;
    result.missing = missing;
    result
}

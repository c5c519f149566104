use crate::catalog::{DATE_FORMAT, Record};
use crate::hosting::{CommitHistory, YearMonth};
use chrono::{DateTime, NaiveDate};
use serde_yaml::{Mapping, Value};

/// Most recent published release of a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub tag: String,
    pub published_at: NaiveDate,
}

/// Metadata fetched for one repository
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepoMetadata {
    pub stargazers_count: u64,

    /// Date of the last commit on the default branch, when the repository has one
    pub updated_at: Option<NaiveDate>,

    pub archived: bool,
    pub current_release: Option<Release>,

    /// Freshly fetched monthly commit counts (GitHub only)
    pub commit_history: Option<CommitHistory>,
}

impl RepoMetadata {
    /// Write this metadata into a record
    ///
    /// Fetched commit counts are merged into the stored history, which is then pruned to the
    /// trailing `retain_months` window ending at `current`. An empty history is not written.
    pub fn apply_to(&self, record: &mut Record, current: YearMonth, retain_months: u32) {
        record.set("stargazers_count", self.stargazers_count);

        if let Some(updated_at) = self.updated_at {
            record.set("updated_at", updated_at.format(DATE_FORMAT).to_string());
        }

        record.set("archived", self.archived);

        if let Some(release) = &self.current_release {
            let mut mapping = Mapping::new();
            let _ = mapping.insert(Value::from("tag"), Value::from(release.tag.as_str()));
            let _ = mapping.insert(Value::from("published_at"), Value::from(release.published_at.format(DATE_FORMAT).to_string()));
            record.set("current_release", mapping);
        }

        if let Some(fetched) = &self.commit_history {
            let mut history = record.get("commit_history").map(CommitHistory::from_yaml).unwrap_or_default();
            history.merge(fetched);
            history.prune(current, retain_months);

            if history.is_empty() {
                let _ = record.remove("commit_history");
            } else {
                record.set("commit_history", history.to_yaml());
            }
        }
    }
}

/// Reduce an ISO-8601 timestamp (`Z` or `+HH:MM` offset) to its calendar date
#[must_use]
pub fn parse_iso_date(timestamp: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| NaiveDate::parse_from_str(timestamp.get(..10)?, DATE_FORMAT).ok())
}

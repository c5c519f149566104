use crate::hosting::YearMonth;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

const LOG_TARGET: &str = "   history";

/// Per-month commit counts, kept in chronological order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitHistory(BTreeMap<YearMonth, u64>);

impl CommitHistory {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Read a stored `commit_history` mapping
    ///
    /// Entries with an unparsable month or a non-integer count are dropped with a warning.
    #[must_use]
    pub fn from_yaml(value: &Value) -> Self {
        let mut history = Self::new();
        let Value::Mapping(mapping) = value else {
            if !value.is_null() {
                log::warn!(target: LOG_TARGET, "Ignoring commit_history that is not a mapping");
            }
            return history;
        };

        for (key, count) in mapping {
            let month = key.as_str().and_then(|k| k.parse::<YearMonth>().ok());
            match (month, count.as_u64()) {
                (Some(month), Some(count)) => history.insert(month, count),
                _ => log::warn!(target: LOG_TARGET, "Ignoring malformed commit_history entry {key:?}: {count:?}"),
            }
        }

        history
    }

    /// Render as a YAML mapping with ascending `YYYY-MM` keys
    #[must_use]
    pub fn to_yaml(&self) -> Value {
        let mapping: Mapping = self
            .0
            .iter()
            .map(|(month, count)| (Value::String(month.to_string()), Value::from(*count)))
            .collect();
        Value::Mapping(mapping)
    }

    pub fn insert(&mut self, month: YearMonth, count: u64) {
        let _ = self.0.insert(month, count);
    }

    #[must_use]
    pub fn get(&self, month: YearMonth) -> Option<u64> {
        self.0.get(&month).copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (YearMonth, u64)> + '_ {
        self.0.iter().map(|(m, c)| (*m, *c))
    }

    /// Fold freshly fetched counts in, overwriting any month present in both
    pub fn merge(&mut self, fetched: &Self) {
        self.0.extend(fetched.iter());
    }

    /// Drop months outside the trailing window of `retain_months` months ending at `current`
    ///
    /// A window of zero months clears the history.
    pub fn prune(&mut self, current: YearMonth, retain_months: u32) {
        let Some(span) = retain_months.checked_sub(1) else {
            self.0.clear();
            return;
        };

        if let Some(cutoff) = current.minus_months(span) {
            self.0.retain(|month, _| *month >= cutoff);
        }
    }
}

impl FromIterator<(YearMonth, u64)> for CommitHistory {
    fn from_iter<I: IntoIterator<Item = (YearMonth, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

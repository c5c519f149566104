use crate::catalog::Record;
use crate::config::Config;
use chrono::NaiveDate;

/// How long ago a record's repository last saw a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Staleness {
    Fresh,
    Aging { days: i64 },
    Stale { days: i64 },
    Abandoned { days: i64 },
}

/// Ages, in days since the last commit, past which a record moves to the next [`Staleness`] tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessThresholds {
    pub aging_days: i64,
    pub stale_days: i64,
    pub abandoned_days: i64,
}

impl Default for StalenessThresholds {
    fn default() -> Self {
        Self {
            aging_days: 186,
            stale_days: 365,
            abandoned_days: 3650,
        }
    }
}

impl StalenessThresholds {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            aging_days: i64::from(config.last_updated_info_days),
            stale_days: i64::from(config.last_updated_warning_days),
            abandoned_days: i64::from(config.last_updated_error_days),
        }
    }

    #[must_use]
    pub fn classify(&self, updated_at: NaiveDate, today: NaiveDate) -> Staleness {
        let days = today.signed_duration_since(updated_at).num_days();
        if days > self.abandoned_days {
            Staleness::Abandoned { days }
        } else if days > self.stale_days {
            Staleness::Stale { days }
        } else if days > self.aging_days {
            Staleness::Aging { days }
        } else {
            Staleness::Fresh
        }
    }
}

/// A record that is no longer fresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleEntry {
    pub name: String,
    pub source_code_url: Option<String>,
    pub updated_at: NaiveDate,
    pub staleness: Staleness,
}

/// List every record that is not fresh, most stale first
///
/// Records without an `updated_at` date are skipped.
#[must_use]
pub fn staleness_report<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    today: NaiveDate,
    thresholds: &StalenessThresholds,
) -> Vec<StaleEntry> {
    let mut entries: Vec<_> = records
        .into_iter()
        .filter_map(|record| {
            let updated_at = record.updated_at()?;
            let staleness = thresholds.classify(updated_at, today);
            (staleness != Staleness::Fresh).then(|| StaleEntry {
                name: record.name().to_string(),
                source_code_url: record.source_code_url().map(str::to_string),
                updated_at,
                staleness,
            })
        })
        .collect();

    entries.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.name.cmp(&b.name)));
    entries
}

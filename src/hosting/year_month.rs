use chrono::{Datelike, Months, NaiveDate};
use core::fmt::{Display, Formatter};
use core::str::FromStr;
use ohno::{AppError, app_err};

/// A calendar month, ordered chronologically and written as `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    /// Always the first day of the month
    first: NaiveDate,
}

impl YearMonth {
    #[must_use]
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first| Self { first })
    }

    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            first: date.with_day(1).unwrap_or(date),
        }
    }

    /// The month `n` months before this one, if the calendar reaches that far back
    #[must_use]
    pub fn minus_months(self, n: u32) -> Option<Self> {
        self.first.checked_sub_months(Months::new(n)).map(|first| Self { first })
    }

    /// Last day of the month
    #[must_use]
    pub fn last_day(self) -> NaiveDate {
        self.first
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    /// First instant of the month as an ISO-8601 UTC timestamp
    #[must_use]
    pub fn start_timestamp(self) -> String {
        format!("{}T00:00:00Z", self.first.format("%Y-%m-%d"))
    }

    /// Last second of the month as an ISO-8601 UTC timestamp
    #[must_use]
    pub fn end_timestamp(self) -> String {
        format!("{}T23:59:59Z", self.last_day().format("%Y-%m-%d"))
    }

    /// GraphQL alias used to request this month's commit count
    #[must_use]
    pub fn alias(self) -> String {
        self.first.format("month_%Y_%m").to_string()
    }
}

impl Display for YearMonth {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.first.format("%Y-%m"))
    }
}

impl FromStr for YearMonth {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s.split_once('-').ok_or_else(|| app_err!("'{s}' is not a YYYY-MM month"))?;
        if year.len() != 4 || month.len() != 2 {
            return Err(app_err!("'{s}' is not a YYYY-MM month"));
        }

        let year = year.parse().map_err(|e| app_err!("invalid year in '{s}': {e}"))?;
        let month = month.parse().map_err(|e| app_err!("invalid month in '{s}': {e}"))?;
        Self::new(year, month).ok_or_else(|| app_err!("month out of range in '{s}'"))
    }
}

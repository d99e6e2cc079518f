//! Reporting window: the calendar month a batch of financial data covers.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive date range covering exactly one calendar month.
///
/// Always built from a reference date via [`ReportingWindow::for_reference_date`],
/// which each job calls at the start of every invocation. Nothing caches a
/// window across invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportingWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl ReportingWindow {
    /// The full calendar month preceding the month of `reference`.
    ///
    /// Any day in March 2024 yields 2024-02-01..=2024-02-29.
    pub fn for_reference_date(reference: NaiveDate) -> Self {
        let first_of_month = reference - Duration::days(i64::from(reference.day0()));
        let end_date = first_of_month - Duration::days(1);
        let start_date = end_date - Duration::days(i64::from(end_date.day0()));
        Self {
            start_date,
            end_date,
        }
    }

    /// `{start:YYYYMMDD}_{end:YYYYMMDD}`, the suffix used in every blob name.
    pub fn tag(&self) -> String {
        format!(
            "{}_{}",
            self.start_date.format("%Y%m%d"),
            self.end_date.format("%Y%m%d")
        )
    }

    /// Parse a tag produced by [`ReportingWindow::tag`].
    ///
    /// Returns `None` for malformed tags or when start is after end.
    pub fn parse_tag(tag: &str) -> Option<Self> {
        let (start, end) = tag.split_once('_')?;
        if start.len() != 8 || end.len() != 8 {
            return None;
        }
        let start_date = NaiveDate::parse_from_str(start, "%Y%m%d").ok()?;
        let end_date = NaiveDate::parse_from_str(end, "%Y%m%d").ok()?;
        if start_date > end_date {
            return None;
        }
        Some(Self {
            start_date,
            end_date,
        })
    }

    /// Number of days in the window, both ends included.
    pub fn len_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

impl fmt::Display for ReportingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start_date, self.end_date)
    }
}

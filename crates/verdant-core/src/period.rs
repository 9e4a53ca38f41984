//! Ranking periods and their UTC time windows.
//!
//! A period identifies one leaderboard bucket: a calendar month, quarter,
//! year, or the all-time cumulative bucket. Windows are half-open
//! `[start, end)` in UTC. Display keys are stable strings (`2026-08`,
//! `2026-Q3`, `2026`, `all`) used to address snapshots.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RankingError;

/// One leaderboard bucket.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// A calendar month. `month` is 1-based.
    Monthly { year: i32, month: u32 },
    /// A calendar quarter. `quarter` is 1–4.
    Quarterly { year: i32, quarter: u32 },
    /// A calendar year.
    Yearly { year: i32 },
    /// Cumulative over the entire ledger.
    AllTime,
}

/// Start of the given month, if the month number is valid.
fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

/// Start of the month after the given one (rolls the year over).
fn next_month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    if month == 12 {
        month_start(year + 1, 1)
    } else {
        month_start(year, month + 1)
    }
}

impl Period {
    /// The month containing the given instant.
    pub fn month_of(at: DateTime<Utc>) -> Self {
        use chrono::Datelike;
        Period::Monthly { year: at.year(), month: at.month() }
    }

    /// Validated monthly period.
    pub fn monthly(year: i32, month: u32) -> Result<Self, RankingError> {
        if !(1..=12).contains(&month) {
            return Err(RankingError::InvalidPeriod(format!("{year}-{month:02}")));
        }
        Ok(Period::Monthly { year, month })
    }

    /// Validated quarterly period.
    pub fn quarterly(year: i32, quarter: u32) -> Result<Self, RankingError> {
        if !(1..=4).contains(&quarter) {
            return Err(RankingError::InvalidPeriod(format!("{year}-Q{quarter}")));
        }
        Ok(Period::Quarterly { year, quarter })
    }

    /// Half-open `[start, end)` bounds in UTC. `None` means unbounded on
    /// that side (only `AllTime`, or a malformed month/quarter number on a
    /// hand-built value).
    pub fn bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        match *self {
            Period::Monthly { year, month } => {
                (month_start(year, month), next_month_start(year, month))
            }
            Period::Quarterly { year, quarter } => {
                if !(1..=4).contains(&quarter) {
                    return (None, None);
                }
                let first = (quarter - 1) * 3 + 1;
                let start = month_start(year, first);
                let end = if quarter == 4 {
                    month_start(year + 1, 1)
                } else {
                    month_start(year, first + 3)
                };
                (start, end)
            }
            Period::Yearly { year } => (month_start(year, 1), month_start(year + 1, 1)),
            Period::AllTime => (None, None),
        }
    }

    /// Whether the instant falls inside this period's window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let (start, end) = self.bounds();
        if let Some(start) = start {
            if at < start {
                return false;
            }
        }
        if let Some(end) = end {
            if at >= end {
                return false;
            }
        }
        true
    }

    /// Stable string key addressing this period.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Period::Monthly { year, month } => write!(f, "{year:04}-{month:02}"),
            Period::Quarterly { year, quarter } => write!(f, "{year:04}-Q{quarter}"),
            Period::Yearly { year } => write!(f, "{year:04}"),
            Period::AllTime => f.write_str("all"),
        }
    }
}

impl FromStr for Period {
    type Err = RankingError;

    /// Parses `YYYY-MM`, `YYYY-Qn`, `YYYY`, or `all`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RankingError::InvalidPeriod(s.to_string());
        if s.eq_ignore_ascii_case("all") {
            return Ok(Period::AllTime);
        }
        match s.split_once('-') {
            None => {
                let year: i32 = s.parse().map_err(|_| invalid())?;
                Ok(Period::Yearly { year })
            }
            Some((year, rest)) => {
                let year: i32 = year.parse().map_err(|_| invalid())?;
                if let Some(q) = rest.strip_prefix('Q').or_else(|| rest.strip_prefix('q')) {
                    let quarter: u32 = q.parse().map_err(|_| invalid())?;
                    Period::quarterly(year, quarter).map_err(|_| invalid())
                } else {
                    let month: u32 = rest.parse().map_err(|_| invalid())?;
                    Period::monthly(year, month).map_err(|_| invalid())
                }
            }
        }
    }
}

//! Weekly calendar bucketing for a ranking period
//!
//! Game weeks run Thursday through Wednesday. The first and last weeks of a
//! period may be partial; together the weeks cover every day of the period
//! exactly once. Buckets drive the weekly game listing and the iterative
//! engine's batched updates; the regression engine never looks at them.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// One Thursday-to-Wednesday bucket within a ranking period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Week {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Indices into the period's game arena, in ingest order
    pub game_ids: Vec<usize>,
}

impl Week {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            game_ids: Vec::new(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Split a period into consecutive Thursday-to-Wednesday weeks
pub fn build_weeks(start: NaiveDate, end: NaiveDate) -> Vec<Week> {
    if start > end {
        return Vec::new();
    }

    // num_days_from_monday: 0 = Monday, 2 = Wednesday
    let weekday = i64::from(start.weekday().num_days_from_monday());
    let first_close = start + Duration::days((2 + 7 - weekday) % 7);
    if first_close >= end {
        return vec![Week::new(start, end)];
    }

    let mut weeks = vec![Week::new(start, first_close)];
    let mut close = first_close + Duration::days(7);
    while close <= end {
        weeks.push(Week::new(close - Duration::days(6), close));
        close = close + Duration::days(7);
    }

    // partial tail, unless the last full week already closed on the end date
    let tail_start = close - Duration::days(6);
    if tail_start <= end {
        weeks.push(Week::new(tail_start, end));
    }
    weeks
}

/// Index of the week containing the given date, if any
pub fn week_index(weeks: &[Week], date: NaiveDate) -> Option<usize> {
    weeks.iter().position(|week| week.contains(date))
}

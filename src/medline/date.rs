use anyhow::{Context, Result};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use regex::Regex;

const MILLIS_PER_DAY: i64 = 86_400_000;

const SEASONS: [(&str, u32); 4] = [("Spring", 3), ("Summer", 6), ("Fall", 9), ("Winter", 12)];

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A publication date reduced to calendar-day precision (UTC, no time of day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NormalizedDate {
    date: NaiveDate,
}

impl NormalizedDate {
    /// The value produced for input without a recognizable year.
    pub fn cleared() -> Self {
        Self {
            date: DateTime::<Utc>::UNIX_EPOCH.date_naive(),
        }
    }

    pub fn epoch_millis(&self) -> i64 {
        self.date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
    }

    /// Epoch milliseconds rounded down to day resolution.
    pub fn epoch_day_millis(&self) -> i64 {
        self.epoch_millis().div_euclid(MILLIS_PER_DAY) * MILLIS_PER_DAY
    }
}

#[derive(Debug)]
pub struct DateParser {
    pattern: Regex,
}

impl DateParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(r"([0-9]{4})(?: ([a-zA-Z-]+)(?: ([0-9]{1,2}))?)?")
                .context("failed to compile publication date regex")?,
        })
    }

    /// Parses a MEDLINE `DP` value such as `2004 Mar-Apr` or `1998 Winter`.
    ///
    /// Never fails: input without a four digit year yields
    /// [`NormalizedDate::cleared`], an unrecognized month token yields January
    /// and a missing day yields the first of the month. Out-of-range days roll
    /// over into the neighbouring month.
    pub fn parse(&self, input: &str) -> NormalizedDate {
        let Some(captures) = self.pattern.captures(input) else {
            return NormalizedDate::cleared();
        };

        let Some(year) = captures
            .get(1)
            .and_then(|m| m.as_str().parse::<i32>().ok())
        else {
            return NormalizedDate::cleared();
        };
        let month = captures
            .get(2)
            .map(|m| resolve_month(m.as_str()))
            .unwrap_or(1);
        let day = captures
            .get(3)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(1);

        lenient_date(year, month, day)
            .map(|date| NormalizedDate { date })
            .unwrap_or_else(NormalizedDate::cleared)
    }
}

fn resolve_month(token: &str) -> u32 {
    if let Some((_, month)) = SEASONS.iter().find(|(season, _)| *season == token) {
        return *month;
    }

    MONTHS
        .iter()
        .zip(1..)
        .filter_map(|(abbrev, month)| token.find(abbrev).map(|offset| (offset, month)))
        .min()
        .map(|(_, month)| month)
        .unwrap_or(1)
}

fn lenient_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    match day {
        0 => first.checked_sub_days(Days::new(1)),
        day => first.checked_add_days(Days::new(u64::from(day - 1))),
    }
}

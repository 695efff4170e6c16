//! Monday-anchored week numbering and the clock it is read from.
//!
//! Week 1 of a year starts on the first Monday on or after January 1; every
//! later week follows at 7-day intervals. Days before that Monday belong to
//! the last week of the previous year. This is not ISO-8601 numbering and
//! must not be swapped for it: stored volume buckets are keyed by it.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveTime, Utc};

/// Source of "now" for progression filtering and volume bucketing
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar day the user is training on
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock; "today" follows the local timezone
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock pinned to a single instant
#[derive(Clone, Copy, Debug)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Midday UTC on `date`
    pub fn on(date: NaiveDate) -> Self {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default();
        Self::new(date.and_time(noon).and_utc())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

/// First Monday on or after January 1 of `day`'s year
fn first_monday(day: NaiveDate) -> NaiveDate {
    let jan1 = day.with_ordinal(1).unwrap_or(day);
    let offset = (7 - jan1.weekday().num_days_from_monday()) % 7;
    jan1 + Duration::days(i64::from(offset))
}

/// Week key (`YYYY-Www`) for a calendar day
pub fn week_key(date: NaiveDate) -> String {
    let mut anchor = first_monday(date);
    if date < anchor {
        anchor = first_monday(anchor - Duration::days(7));
    }

    let week = (date - anchor).num_days() / 7 + 1;
    format!("{}-W{:02}", anchor.year(), week)
}

/// Week key for the clock's current day
pub fn current_week_key(clock: &dyn Clock) -> String {
    week_key(clock.today())
}

/// Monday and Sunday of the week containing `date`
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    (monday, monday + Duration::days(6))
}

/// True when `date` falls in the same Monday-to-Sunday week as `today`
pub fn in_same_week(date: NaiveDate, today: NaiveDate) -> bool {
    let (monday, sunday) = week_bounds(today);
    date >= monday && date <= sunday
}

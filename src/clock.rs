//! Where "today" comes from when deciding whether a payment is recent.
//!
//! QuickBooks stores `TxnDate` as a calendar date in the company's own time
//! zone, so the recency cutoff is computed against the company-local date
//! rather than the UTC one.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveTime, Utc};

/// Source of the current instant and of the calendar date payments are
/// compared against.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date the 30-day window counts back from.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Calendar date of `now` as seen at `offset`.
pub fn date_at(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Wall clock. Dates follow the configured company offset, or the host's
/// local zone when none is set.
#[derive(Debug, Clone, Default)]
pub struct SystemClock {
    offset: Option<FixedOffset>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offset(offset: FixedOffset) -> Self {
        Self {
            offset: Some(offset),
        }
    }

    pub fn offset(&self) -> Option<FixedOffset> {
        self.offset
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        match self.offset {
            Some(offset) => date_at(self.now(), offset),
            None => Local::now().date_naive(),
        }
    }
}

/// Pinned instant for tests; its date is the UTC date.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Midday UTC on `date`.
    pub fn on(date: NaiveDate) -> Self {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
        Self::new(date.and_time(noon).and_utc())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

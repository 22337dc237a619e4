use chrono::{DateTime, FixedOffset, Local, NaiveDate, Offset, Utc};

/// Source of "today" and of the local day boundary used by eligibility checks.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;

    /// Calendar day an instant falls on in the clock's local time.
    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate;
}

/// Wall clock in the host's local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&Local).date_naive()
    }
}

/// Pinned clock for demos, reports and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    today: NaiveDate,
    offset: FixedOffset,
}

impl FixedClock {
    /// A clock frozen on `today`, with UTC as its local timezone.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            offset: Utc.fix(),
        }
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }
}

//! Cancellation cutoff rules.
//!
//! A class can be cancelled only while more than `cutoff_days` calendar days
//! remain before it starts. The cutoff depends on the training type.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::clock::Clock;
use super::domain::WorkflowRecord;
use super::wire_date;

/// Cutoff for training types "1" and "2".
pub const SHORT_CUTOFF_DAYS: i64 = 5;
/// Cutoff for every other training type.
pub const DEFAULT_CUTOFF_DAYS: i64 = 10;

const KNOWN_TRAINING_TYPES: [&str; 3] = ["1", "2", "3"];
const DISPLAY_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    AlreadyStarted,
    CutoffExpired,
    Eligible,
}

impl CancelReason {
    pub const fn label(self) -> &'static str {
        match self {
            CancelReason::AlreadyStarted => "Class Already Started",
            CancelReason::CutoffExpired => "Cancellation Period Expired",
            CancelReason::Eligible => "Eligible for Cancellation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub days_left: i64,
    pub cutoff_days: i64,
    pub reason: CancelReason,
    pub cancel_enabled: bool,
}

/// Whole calendar days from today until the class starts, negative once it has
/// started. Zero when the start date is unknown.
pub fn days_left(start_date: Option<DateTime<Utc>>, clock: &dyn Clock) -> i64 {
    match start_date {
        Some(start) => days_between(clock.today(), clock.local_date(start)),
        None => 0,
    }
}

pub fn days_between(today: NaiveDate, start_day: NaiveDate) -> i64 {
    start_day.signed_duration_since(today).num_days()
}

pub fn cutoff_days(training_type_id: &str) -> i64 {
    match training_type_id {
        "1" | "2" => SHORT_CUTOFF_DAYS,
        _ => DEFAULT_CUTOFF_DAYS,
    }
}

pub fn classify_eligibility(training_type_id: &str, days_left: i64) -> EligibilityResult {
    if !KNOWN_TRAINING_TYPES.contains(&training_type_id) {
        warn!(
            training_type_id,
            cutoff_days = DEFAULT_CUTOFF_DAYS,
            "unmapped training type, applying default cancellation cutoff"
        );
    }

    let cutoff_days = cutoff_days(training_type_id);
    let reason = if days_left < 0 {
        CancelReason::AlreadyStarted
    } else if days_left <= cutoff_days {
        CancelReason::CutoffExpired
    } else {
        CancelReason::Eligible
    };

    EligibilityResult {
        days_left,
        cutoff_days,
        reason,
        cancel_enabled: reason == CancelReason::Eligible,
    }
}

/// `dd/mm/yyyy` on the clock's local day, or an empty string when absent.
pub fn format_display_date(instant: Option<DateTime<Utc>>, clock: &dyn Clock) -> String {
    instant
        .map(|value| clock.local_date(value).format(DISPLAY_FORMAT).to_string())
        .unwrap_or_default()
}

/// Display form of a raw `/Date(ms)/` value. Unparseable input renders empty.
pub fn format_wire_display_date(raw: Option<&str>, clock: &dyn Clock) -> String {
    let instant = raw.and_then(|value| wire_date::parse(value).ok());
    format_display_date(instant, clock)
}

/// A workflow record with the fields a confirmation dialog shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowDetails {
    pub record: WorkflowRecord,
    pub formatted_start_date: String,
    pub formatted_end_date: String,
    pub eligibility: EligibilityResult,
}

impl WorkflowDetails {
    pub fn reason_label(&self) -> &'static str {
        self.eligibility.reason.label()
    }
}

pub fn evaluate_workflow(record: WorkflowRecord, clock: &dyn Clock) -> WorkflowDetails {
    let start_date = record.start_date();
    let remaining = days_left(start_date, clock);
    let eligibility = classify_eligibility(&record.training_type_id(), remaining);

    WorkflowDetails {
        formatted_start_date: format_display_date(start_date, clock),
        formatted_end_date: format_display_date(record.end_date(), clock),
        eligibility,
        record,
    }
}

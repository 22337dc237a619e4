use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::wire_date;

/// Reason submitted when the operator leaves the reason picker empty.
pub const DEFAULT_CANCEL_REASON: &str = "Work Commitments";

/// Numeric employee identifier with leading zeros removed, as the backend keys
/// expect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmployeeId(String);

impl EmployeeId {
    pub fn parse(raw: &str) -> Result<Self, InvalidEmployeeId> {
        let stripped = raw.trim().trim_start_matches('0');
        if stripped.is_empty() || !stripped.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(InvalidEmployeeId(raw.to_string()));
        }
        Ok(Self(stripped.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EmployeeId {
    type Error = InvalidEmployeeId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EmployeeId> for String {
    fn from(value: EmployeeId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("employee id '{0}' is not a non-zero numeric id")]
pub struct InvalidEmployeeId(pub String);

/// Approved, future enrollment of an employee in a training class.
///
/// Read from the same workflow-log rows as [`WorkflowRecord`], so either type
/// column and malformed dates are handled the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WorkflowRecord")]
pub struct ClassRecord {
    #[serde(rename = "CLASS_ID")]
    pub class_id: String,
    #[serde(rename = "CLASS_TITLE")]
    pub title: String,
    #[serde(rename = "CLASS_START_DATE", serialize_with = "wire_date::option::serialize")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(rename = "CLASS_END_DATE", serialize_with = "wire_date::option::serialize")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(rename = "TRAINING_TYPE_ID")]
    pub training_type_id: String,
    #[serde(rename = "EMPLOYEE_ID")]
    pub employee_id: String,
    #[serde(rename = "EMPLOYEE_NAME")]
    pub employee_name: String,
}

impl From<WorkflowRecord> for ClassRecord {
    fn from(record: WorkflowRecord) -> Self {
        record.class_record()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidWorkflowRecord {
    #[error("workflow row has no CLASS_ID column")]
    MissingClassId,
    #[error("workflow row CLASS_ID must be a non-empty string")]
    InvalidClassId,
}

const CLASS_ID: &str = "CLASS_ID";
const CLASS_TITLE: &str = "CLASS_TITLE";
const CLASS_START_DATE: &str = "CLASS_START_DATE";
const CLASS_END_DATE: &str = "CLASS_END_DATE";
const TRAINING_TYPE_ID: &str = "TRAINING_TYPE_ID";
const CLASS_TYPE: &str = "CLASS_TYPE";
const EMPLOYEE_ID: &str = "EMPLOYEE_ID";
const EMPLOYEE_NAME: &str = "EMPLOYEE_NAME";
const WORKFLOW_ID: &str = "WORKFLOW_ID";
const WORKFLOW_STATUS: &str = "WORKFLOW_STATUS";

/// Approval-workflow row joining a class enrollment to an employee.
///
/// The row keeps every column exactly as the backend sent it and serializes
/// back to the same object. Absent columns stay absent and dates keep their
/// wire text. The accessors interpret the columns this crate needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Value>",
    into = "BTreeMap<String, Value>"
)]
pub struct WorkflowRecord {
    columns: BTreeMap<String, Value>,
}

impl WorkflowRecord {
    pub fn from_columns(columns: BTreeMap<String, Value>) -> Result<Self, InvalidWorkflowRecord> {
        match columns.get(CLASS_ID) {
            None => Err(InvalidWorkflowRecord::MissingClassId),
            Some(Value::String(id)) if !id.trim().is_empty() => Ok(Self { columns }),
            Some(_) => Err(InvalidWorkflowRecord::InvalidClassId),
        }
    }

    pub fn class_id(&self) -> &str {
        self.text(CLASS_ID).unwrap_or_default()
    }

    pub fn title(&self) -> &str {
        self.text(CLASS_TITLE).unwrap_or_default()
    }

    pub fn workflow_id(&self) -> Option<&str> {
        self.text(WORKFLOW_ID)
    }

    pub fn workflow_status(&self) -> Option<&str> {
        self.text(WORKFLOW_STATUS)
    }

    pub fn employee_id(&self) -> Option<&str> {
        self.text(EMPLOYEE_ID)
    }

    pub fn employee_name(&self) -> &str {
        self.text(EMPLOYEE_NAME).unwrap_or_default()
    }

    /// `TRAINING_TYPE_ID` when present, otherwise the older `CLASS_TYPE`.
    pub fn training_type_id(&self) -> Cow<'_, str> {
        [TRAINING_TYPE_ID, CLASS_TYPE]
            .into_iter()
            .find_map(|column| match self.columns.get(column) {
                Some(Value::String(value)) => Some(Cow::Borrowed(value.as_str())),
                Some(Value::Number(value)) => Some(Cow::Owned(value.to_string())),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.date(CLASS_START_DATE)
    }

    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        self.date(CLASS_END_DATE)
    }

    pub fn column(&self, name: &str) -> Option<&Value> {
        self.columns.get(name)
    }

    pub fn columns(&self) -> &BTreeMap<String, Value> {
        &self.columns
    }

    pub fn class_record(&self) -> ClassRecord {
        ClassRecord {
            class_id: self.class_id().to_string(),
            title: self.title().to_string(),
            start_date: self.start_date(),
            end_date: self.end_date(),
            training_type_id: self.training_type_id().into_owned(),
            employee_id: self.employee_id().unwrap_or_default().to_string(),
            employee_name: self.employee_name().to_string(),
        }
    }

    fn text(&self, column: &str) -> Option<&str> {
        self.columns.get(column).and_then(Value::as_str)
    }

    fn date(&self, column: &str) -> Option<DateTime<Utc>> {
        self.text(column)
            .and_then(|raw| wire_date::parse_column(column, raw))
    }
}

impl TryFrom<BTreeMap<String, Value>> for WorkflowRecord {
    type Error = InvalidWorkflowRecord;

    fn try_from(columns: BTreeMap<String, Value>) -> Result<Self, Self::Error> {
        Self::from_columns(columns)
    }
}

impl From<WorkflowRecord> for BTreeMap<String, Value> {
    fn from(record: WorkflowRecord) -> Self {
        record.columns
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeProfile {
    pub employee_id: EmployeeId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

/// Identity reported by the user API, before any normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
}

/// Role the acting user submits a legacy cancellation under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    User,
    Admin,
}

impl UserType {
    pub const fn as_str(self) -> &'static str {
        match self {
            UserType::User => "user",
            UserType::Admin => "admin",
        }
    }
}

/// Minimal cancellation payload used by the on-behalf flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationRequest {
    pub class_id: String,
    pub employee_id: EmployeeId,
    pub acting_admin_id: EmployeeId,
    pub acting_user_type: UserType,
    pub reason_code: String,
}

impl CancellationRequest {
    pub fn new(
        class_id: impl Into<String>,
        employee_id: EmployeeId,
        acting_admin_id: EmployeeId,
        acting_user_type: UserType,
        reason_code: &str,
    ) -> Self {
        let reason_code = match reason_code.trim() {
            "" => DEFAULT_CANCEL_REASON.to_string(),
            reason => reason.to_string(),
        };

        Self {
            class_id: class_id.into(),
            employee_id,
            acting_admin_id,
            acting_user_type,
            reason_code,
        }
    }
}

/// Drop repeated enrollments of the same class, keeping the first occurrence.
pub fn dedupe_classes(records: Vec<ClassRecord>) -> Vec<ClassRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert((record.class_id.clone(), record.title.clone())))
        .collect()
}

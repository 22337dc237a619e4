use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use class_cancel::workflows::cancellation::{
    BackendGateway, ClassRecord, Clock, CurrentUser, EmployeeId, EmployeeProfile, GatewayError,
    wire_date, SubmissionAck, UserType, WorkflowRecord,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Submission captured by [`InMemoryBackendGateway`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "contract", rename_all = "snake_case")]
pub(crate) enum RecordedSubmission {
    Legacy {
        class_id: String,
        employee_id: String,
        admin_id: String,
        user_type: UserType,
        reason_code: String,
    },
    ApprovalRequest {
        workflow_id: String,
        class_id: String,
        employee_id: String,
    },
}

/// Backend stand-in for local runs: one manager, two reports and a handful of
/// workflow rows dated relative to the clock's today.
pub(crate) struct InMemoryBackendGateway {
    current_user: String,
    profiles: HashMap<String, EmployeeProfile>,
    reports: HashMap<String, Vec<String>>,
    workflows: Vec<WorkflowRecord>,
    clock: Arc<dyn Clock>,
    submissions: Mutex<Vec<RecordedSubmission>>,
}

impl InMemoryBackendGateway {
    pub(crate) fn seeded(clock: Arc<dyn Clock>) -> Result<Self, GatewayError> {
        let today = clock.today();
        let manager = employee("107119", "John Smith", "Engineering Manager")?;
        let first_report = employee("107120", "Jane Doe", "Developer")?;
        let second_report = employee("107121", "Omar Ali", "Analyst")?;

        let workflows = vec![
            workflow_row("WF-1001", "CL001", "ABAP Fundamentals", "1", today, 14, &manager, "Approved")?,
            workflow_row("WF-1002", "CL002", "Fiori Development", "3", today, 7, &manager, "Approved")?,
            workflow_row("WF-1003", "CL003", "S/4HANA Overview", "2", today, 20, &first_report, "Approved")?,
            workflow_row("WF-1004", "CL004", "Leadership Essentials", "3", today, 4, &first_report, "Approved")?,
            workflow_row("WF-1005", "CL005", "Safety Basics", "1", today, -3, &second_report, "Approved")?,
            workflow_row("WF-1006", "CL006", "Cloud Integration", "2", today, 30, &second_report, "Pending")?,
        ];

        let mut reports = HashMap::new();
        reports.insert(
            manager.employee_id.to_string(),
            vec![
                first_report.employee_id.to_string(),
                second_report.employee_id.to_string(),
            ],
        );

        let profiles = [manager, first_report, second_report]
            .into_iter()
            .map(|profile| (profile.employee_id.to_string(), profile))
            .collect();

        Ok(Self {
            current_user: "00107119".to_string(),
            profiles,
            reports,
            workflows,
            clock,
            submissions: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions
            .lock()
            .expect("submission mutex poisoned")
            .clone()
    }

    fn record(&self, submission: RecordedSubmission) {
        self.submissions
            .lock()
            .expect("submission mutex poisoned")
            .push(submission);
    }
}

#[async_trait]
impl BackendGateway for InMemoryBackendGateway {
    async fn current_user(&self) -> Result<CurrentUser, GatewayError> {
        Ok(CurrentUser {
            id: self.current_user.clone(),
        })
    }

    async fn employee(&self, id: &EmployeeId) -> Result<EmployeeProfile, GatewayError> {
        self.profiles
            .get(id.as_str())
            .cloned()
            .ok_or(GatewayError::Status {
                endpoint: "employee details",
                status: 404,
            })
    }

    async fn subordinates(
        &self,
        manager_id: &EmployeeId,
    ) -> Result<Vec<EmployeeProfile>, GatewayError> {
        let reports = self
            .reports
            .get(manager_id.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(reports
            .iter()
            .filter_map(|id| self.profiles.get(id).cloned())
            .collect())
    }

    async fn classes_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<ClassRecord>, GatewayError> {
        let today = self.clock.today();
        Ok(self
            .workflows
            .iter()
            .filter(|record| record.employee_id() == Some(employee_id.as_str()))
            .filter(|record| record.workflow_status() == Some("Approved"))
            .filter(|record| {
                record
                    .start_date()
                    .is_some_and(|start| self.clock.local_date(start) >= today)
            })
            .map(WorkflowRecord::class_record)
            .collect())
    }

    async fn workflow_records(
        &self,
        class_id: &str,
        employee_id: &EmployeeId,
    ) -> Result<Vec<WorkflowRecord>, GatewayError> {
        Ok(self
            .workflows
            .iter()
            .filter(|record| {
                record.class_id() == class_id && record.employee_id() == Some(employee_id.as_str())
            })
            .cloned()
            .collect())
    }

    async fn submit_legacy_cancellation(
        &self,
        class_id: &str,
        employee_id: &EmployeeId,
        admin_id: &EmployeeId,
        user_type: UserType,
        reason_code: &str,
    ) -> Result<SubmissionAck, GatewayError> {
        self.record(RecordedSubmission::Legacy {
            class_id: class_id.to_string(),
            employee_id: employee_id.to_string(),
            admin_id: admin_id.to_string(),
            user_type,
            reason_code: reason_code.to_string(),
        });
        Ok(SubmissionAck(json!({ "status": "Cancelled_By_Auth_End_User" })))
    }

    async fn submit_cancellation_request(
        &self,
        record: &WorkflowRecord,
    ) -> Result<SubmissionAck, GatewayError> {
        let workflow_id = record.workflow_id().unwrap_or_default().to_string();
        self.record(RecordedSubmission::ApprovalRequest {
            workflow_id: workflow_id.clone(),
            class_id: record.class_id().to_string(),
            employee_id: record.employee_id().unwrap_or_default().to_string(),
        });
        Ok(SubmissionAck(json!({ "requestId": format!("REQ-{workflow_id}") })))
    }
}

fn employee(id: &str, name: &str, position: &str) -> Result<EmployeeProfile, GatewayError> {
    let employee_id =
        EmployeeId::parse(id).map_err(|err| GatewayError::Client(err.to_string()))?;
    Ok(EmployeeProfile {
        employee_id,
        display_name: name.to_string(),
        email: Some(format!("{}@example.com", name.to_lowercase().replace(' ', "."))),
        department: Some("IT Department".to_string()),
        position: Some(position.to_string()),
    })
}

fn class_start(today: NaiveDate, offset_days: i64) -> Option<DateTime<Utc>> {
    let day = today + Duration::days(offset_days);
    day.and_hms_opt(9, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[allow(clippy::too_many_arguments)]
fn workflow_row(
    workflow_id: &str,
    class_id: &str,
    title: &str,
    training_type: &str,
    today: NaiveDate,
    start_offset_days: i64,
    employee: &EmployeeProfile,
    status: &str,
) -> Result<WorkflowRecord, GatewayError> {
    let start_date = class_start(today, start_offset_days);
    let end_date = start_date.map(|start| start + Duration::days(2));
    let columns = BTreeMap::from([
        ("WORKFLOW_ID".to_string(), json!(workflow_id)),
        ("WORKFLOW_STATUS".to_string(), json!(status)),
        ("CLASS_ID".to_string(), json!(class_id)),
        ("CLASS_TITLE".to_string(), json!(title)),
        ("CLASS_START_DATE".to_string(), json!(start_date.map(wire_date::format))),
        ("CLASS_END_DATE".to_string(), json!(end_date.map(wire_date::format))),
        ("TRAINING_TYPE_ID".to_string(), json!(training_type)),
        ("EMPLOYEE_ID".to_string(), json!(employee.employee_id.as_str())),
        ("EMPLOYEE_NAME".to_string(), json!(employee.display_name)),
        ("LOCATION".to_string(), json!("Riyadh Training Center")),
    ]);
    WorkflowRecord::from_columns(columns).map_err(|err| GatewayError::Client(err.to_string()))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

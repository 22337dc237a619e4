use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::workflows::cancellation::clock::{Clock, FixedClock};
use crate::workflows::cancellation::domain::{
    ClassRecord, CurrentUser, EmployeeId, EmployeeProfile, UserType, WorkflowRecord,
};
use crate::workflows::cancellation::gateway::{BackendGateway, GatewayError, SubmissionAck};
use crate::workflows::cancellation::orchestrator::{CancellationOrchestrator, OrchestratorSettings};
use crate::workflows::cancellation::sessions::CancellationSessions;
use crate::workflows::cancellation::wire_date;

pub(super) const MANAGER_ID: &str = "107119";
pub(super) const SUBORDINATE_ID: &str = "107120";

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 15).expect("valid date")
}

pub(super) fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::new(today()))
}

pub(super) fn start_in(days: i64) -> DateTime<Utc> {
    let day = today() + Duration::days(days);
    Utc.from_utc_datetime(&day.and_hms_opt(8, 0, 0).expect("valid time"))
}

pub(super) fn employee_id(raw: &str) -> EmployeeId {
    EmployeeId::parse(raw).expect("valid employee id")
}

pub(super) fn profile(id: &str, name: &str) -> EmployeeProfile {
    EmployeeProfile {
        employee_id: employee_id(id),
        display_name: name.to_string(),
        email: Some(format!("{}@example.com", name.to_lowercase().replace(' ', "."))),
        department: Some("Learning".to_string()),
        position: None,
    }
}

pub(super) fn class(
    class_id: &str,
    title: &str,
    training_type: &str,
    start_days: i64,
    employee: &str,
) -> ClassRecord {
    let start = start_in(start_days);
    ClassRecord {
        class_id: class_id.to_string(),
        title: title.to_string(),
        start_date: Some(start),
        end_date: Some(start + Duration::days(2)),
        training_type_id: training_type.to_string(),
        employee_id: employee.to_string(),
        employee_name: String::new(),
    }
}

pub(super) fn workflow(workflow_id: &str, class: &ClassRecord) -> WorkflowRecord {
    serde_json::from_value(json!({
        "WORKFLOW_ID": workflow_id,
        "WORKFLOW_STATUS": "Approved",
        "CLASS_ID": class.class_id,
        "CLASS_TITLE": class.title,
        "CLASS_START_DATE": class.start_date.map(wire_date::format),
        "CLASS_END_DATE": class.end_date.map(wire_date::format),
        "TRAINING_TYPE_ID": class.training_type_id,
        "EMPLOYEE_ID": class.employee_id,
        "EMPLOYEE_NAME": class.employee_name,
        "LOCATION": "Riyadh",
        "INSTRUCTOR": "A. Rahman"
    }))
    .expect("valid workflow row")
}

/// Every gateway operation the fake observed, in call order.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Call {
    CurrentUser,
    Employee(String),
    Subordinates(String),
    Classes(String),
    Workflow {
        class_id: String,
        employee_id: String,
    },
    Legacy {
        class_id: String,
        employee_id: String,
        admin_id: String,
        user_type: UserType,
        reason_code: String,
    },
    ApprovalRequest(WorkflowRecord),
}

/// Gateway fake seeded with one manager, one subordinate and their classes.
///
/// Operations listed in `failing` answer with HTTP 503.
pub(super) struct ScriptedGateway {
    pub(super) user: String,
    pub(super) profiles: HashMap<String, EmployeeProfile>,
    pub(super) subordinates: Vec<EmployeeProfile>,
    pub(super) classes: HashMap<String, Vec<ClassRecord>>,
    pub(super) workflows: Vec<WorkflowRecord>,
    failing: Mutex<HashSet<&'static str>>,
    submit_gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedGateway {
    pub(super) fn seeded() -> Self {
        let own_first = class("CL001", "ABAP Fundamentals", "2", 6, MANAGER_ID);
        let own_second = class("CL002", "Fiori Development", "3", 3, MANAGER_ID);
        let own_unmatched = class("CL003", "CDS Views", "1", 30, MANAGER_ID);
        let sub_first = class("CL010", "Safety Basics", "1", 20, SUBORDINATE_ID);
        let sub_started = class("CL011", "First Aid", "3", -2, SUBORDINATE_ID);

        let mut profiles = HashMap::new();
        profiles.insert(MANAGER_ID.to_string(), profile(MANAGER_ID, "John Smith"));
        profiles.insert(SUBORDINATE_ID.to_string(), profile(SUBORDINATE_ID, "Jane Doe"));

        let mut classes = HashMap::new();
        classes.insert(
            MANAGER_ID.to_string(),
            vec![
                own_first.clone(),
                own_second.clone(),
                own_first.clone(),
                own_unmatched,
            ],
        );
        classes.insert(
            SUBORDINATE_ID.to_string(),
            vec![sub_first.clone(), sub_started.clone()],
        );

        Self {
            user: format!("00{MANAGER_ID}"),
            profiles,
            subordinates: vec![
                profile(SUBORDINATE_ID, "Jane Doe"),
                profile("107121", "Omar Ali"),
            ],
            classes,
            workflows: vec![
                workflow("WF-1", &own_first),
                workflow("WF-2", &own_second),
                workflow("WF-10", &sub_first),
                workflow("WF-11", &sub_started),
            ],
            failing: Mutex::new(HashSet::new()),
            submit_gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Submissions wait on `gate` before answering.
    pub(super) fn with_submit_gate(mut self, gate: Arc<Notify>) -> Self {
        self.submit_gate = Some(gate);
        self
    }

    pub(super) fn fail(&self, operation: &'static str) {
        self.failing.lock().expect("failing mutex poisoned").insert(operation);
    }

    pub(super) fn recover(&self, operation: &'static str) {
        self.failing.lock().expect("failing mutex poisoned").remove(operation);
    }

    pub(super) fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    pub(super) fn submissions(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Legacy { .. } | Call::ApprovalRequest(_)))
            .collect()
    }

    fn record(&self, operation: &'static str, call: Call) -> Result<(), GatewayError> {
        self.calls.lock().expect("calls mutex poisoned").push(call);
        if self.failing.lock().expect("failing mutex poisoned").contains(operation) {
            return Err(GatewayError::Status {
                endpoint: operation,
                status: 503,
            });
        }
        Ok(())
    }

    async fn wait_for_gate(&self) {
        if let Some(gate) = &self.submit_gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl BackendGateway for ScriptedGateway {
    async fn current_user(&self) -> Result<CurrentUser, GatewayError> {
        self.record("current_user", Call::CurrentUser)?;
        Ok(CurrentUser {
            id: self.user.clone(),
        })
    }

    async fn employee(&self, id: &EmployeeId) -> Result<EmployeeProfile, GatewayError> {
        self.record("employee", Call::Employee(id.to_string()))?;
        self.profiles
            .get(id.as_str())
            .cloned()
            .ok_or(GatewayError::EmptyPayload { endpoint: "employee" })
    }

    async fn subordinates(
        &self,
        manager_id: &EmployeeId,
    ) -> Result<Vec<EmployeeProfile>, GatewayError> {
        self.record("subordinates", Call::Subordinates(manager_id.to_string()))?;
        Ok(self.subordinates.clone())
    }

    async fn classes_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<ClassRecord>, GatewayError> {
        self.record("classes", Call::Classes(employee_id.to_string()))?;
        Ok(self
            .classes
            .get(employee_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn workflow_records(
        &self,
        class_id: &str,
        employee_id: &EmployeeId,
    ) -> Result<Vec<WorkflowRecord>, GatewayError> {
        self.record(
            "workflow",
            Call::Workflow {
                class_id: class_id.to_string(),
                employee_id: employee_id.to_string(),
            },
        )?;
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
        self.wait_for_gate().await;
        self.record(
            "legacy",
            Call::Legacy {
                class_id: class_id.to_string(),
                employee_id: employee_id.to_string(),
                admin_id: admin_id.to_string(),
                user_type,
                reason_code: reason_code.to_string(),
            },
        )?;
        Ok(SubmissionAck(json!({ "status": "Cancelled_By_Auth_End_User" })))
    }

    async fn submit_cancellation_request(
        &self,
        record: &WorkflowRecord,
    ) -> Result<SubmissionAck, GatewayError> {
        self.wait_for_gate().await;
        self.record("approval", Call::ApprovalRequest(record.clone()))?;
        Ok(SubmissionAck(json!({ "requestId": "REQ-1" })))
    }
}

pub(super) fn orchestrator(
    gateway: &Arc<ScriptedGateway>,
    settings: OrchestratorSettings,
) -> CancellationOrchestrator<ScriptedGateway> {
    CancellationOrchestrator::new(Arc::clone(gateway), clock(), settings)
}

pub(super) fn sessions(gateway: &Arc<ScriptedGateway>) -> Arc<CancellationSessions<ScriptedGateway>> {
    Arc::new(CancellationSessions::new(
        Arc::clone(gateway),
        clock(),
        OrchestratorSettings::default(),
    ))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

//! reqwest implementation of [`BackendGateway`] against the CPI and OData
//! endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::clock::Clock;
use super::domain::{
    ClassRecord, CurrentUser, EmployeeId, EmployeeProfile, UserType, WorkflowRecord,
    DEFAULT_CANCEL_REASON,
};
use super::gateway::{BackendGateway, GatewayError, SubmissionAck};
use crate::config::GatewayConfig;

pub const USER_API_PATH: &str = "/services/userapi/currentUser";
pub const EMPLOYEE_DETAILS_PATH: &str = "/cpi/employee/details";
pub const SUBORDINATES_PATH: &str = "/cpi/employee/getSubordinate";
pub const LEGACY_CANCEL_PATH: &str = "/cpi/LMS/cancelComplete";
pub const APPROVAL_REQUEST_PATH: &str = "/cpi/cancellation/createApprovalRequest";
pub const DEFAULT_WORKFLOW_SERVICE_PATH: &str =
    "/lmsproject/hana/xsodata/WorkflowReportService.xsodata";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Class status written by the legacy endpoint for every acting user type.
const LEGACY_CANCELLED_STATUS: &str = "Cancelled_By_Auth_End_User";

/// Where each backend operation lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEndpoints {
    pub base_url: String,
    pub workflow_service_path: String,
}

impl GatewayEndpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            workflow_service_path: DEFAULT_WORKFLOW_SERVICE_PATH.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn workflow_log_view(&self) -> String {
        let service = self.workflow_service_path.trim_end_matches('/');
        self.url(&format!("{service}/WorkflowLogView"))
    }
}

pub struct HttpBackendGateway {
    client: reqwest::Client,
    endpoints: GatewayEndpoints,
    clock: Arc<dyn Clock>,
}

impl HttpBackendGateway {
    pub fn new(
        endpoints: GatewayEndpoints,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GatewayError::Client(err.to_string()))?;

        Ok(Self {
            client,
            endpoints,
            clock,
        })
    }

    pub fn from_config(config: &GatewayConfig, clock: Arc<dyn Clock>) -> Result<Self, GatewayError> {
        let endpoints = GatewayEndpoints {
            base_url: config.base_url.clone(),
            workflow_service_path: config.workflow_service_path.clone(),
        };
        Self::new(endpoints, config.timeout, clock)
    }

    pub fn endpoints(&self) -> &GatewayEndpoints {
        &self.endpoints
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        debug!(endpoint, "calling backend");
        let response = request
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| transport(endpoint, err))?;
        read_json(endpoint, response).await
    }

    async fn workflow_log_rows<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        filter: String,
    ) -> Result<Vec<T>, GatewayError> {
        let request = self
            .client
            .get(self.endpoints.workflow_log_view())
            .query(&[("$format", "json"), ("$filter", filter.as_str())]);
        let envelope: ODataEnvelope<T> = self.fetch(endpoint, request).await?;
        Ok(envelope.d.results)
    }
}

impl std::fmt::Debug for HttpBackendGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackendGateway")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BackendGateway for HttpBackendGateway {
    async fn current_user(&self) -> Result<CurrentUser, GatewayError> {
        let request = self.client.get(self.endpoints.url(USER_API_PATH));
        let user: CurrentUserDto = self.fetch("current user", request).await?;
        Ok(CurrentUser { id: user.name })
    }

    async fn employee(&self, id: &EmployeeId) -> Result<EmployeeProfile, GatewayError> {
        let request = self
            .client
            .get(self.endpoints.url(EMPLOYEE_DETAILS_PATH))
            .query(&[("employeeId", id.as_str())]);
        let details: EmployeeDetailsDto = self.fetch("employee details", request).await?;
        Ok(details.into_profile(id))
    }

    async fn subordinates(
        &self,
        manager_id: &EmployeeId,
    ) -> Result<Vec<EmployeeProfile>, GatewayError> {
        let request = self
            .client
            .get(self.endpoints.url(SUBORDINATES_PATH))
            .query(&[("employeeId", manager_id.as_str())]);
        let envelope: SubordinateEnvelope = self.fetch("subordinates", request).await?;

        let entries = envelope
            .set
            .and_then(|set| set.entries)
            .map(OneOrMany::into_vec)
            .unwrap_or_default();

        Ok(entries
            .into_iter()
            .filter_map(|entry| match EmployeeId::parse(&entry.pernr) {
                Ok(employee_id) => Some(EmployeeProfile {
                    display_name: entry
                        .english_name
                        .filter(|name| !name.trim().is_empty())
                        .unwrap_or_else(|| employee_id.to_string()),
                    employee_id,
                    email: entry.email,
                    department: None,
                    position: None,
                }),
                Err(err) => {
                    warn!(manager = %manager_id, error = %err, "skipping subordinate without usable id");
                    None
                }
            })
            .collect())
    }

    async fn classes_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<ClassRecord>, GatewayError> {
        let filter = class_list_filter(employee_id, self.clock.today());
        self.workflow_log_rows("class list", filter).await
    }

    async fn workflow_records(
        &self,
        class_id: &str,
        employee_id: &EmployeeId,
    ) -> Result<Vec<WorkflowRecord>, GatewayError> {
        let filter = workflow_filter(class_id, employee_id);
        self.workflow_log_rows("workflow lookup", filter).await
    }

    async fn submit_legacy_cancellation(
        &self,
        class_id: &str,
        employee_id: &EmployeeId,
        admin_id: &EmployeeId,
        user_type: UserType,
        reason_code: &str,
    ) -> Result<SubmissionAck, GatewayError> {
        let reason = match reason_code.trim() {
            "" => DEFAULT_CANCEL_REASON,
            reason => reason,
        };
        let payload = LegacyCancelPayload {
            emp_id: employee_id.as_str(),
            class_id,
            cancel_reason: reason,
            new_class_status: LEGACY_CANCELLED_STATUS,
        };

        let request = self
            .client
            .post(self.endpoints.url(LEGACY_CANCEL_PATH))
            .header("adminID", admin_id.as_str())
            .header("UserType", user_type.as_str())
            .json(&payload);
        let ack: Value = self.fetch("legacy cancellation", request).await?;
        Ok(SubmissionAck(ack))
    }

    async fn submit_cancellation_request(
        &self,
        record: &WorkflowRecord,
    ) -> Result<SubmissionAck, GatewayError> {
        let request = self
            .client
            .post(self.endpoints.url(APPROVAL_REQUEST_PATH))
            .json(record);
        let ack: Value = self.fetch("cancellation request", request).await?;
        Ok(SubmissionAck(ack))
    }
}

/// `$filter` selecting an employee's approved classes that start after `today`.
pub fn class_list_filter(employee_id: &EmployeeId, today: NaiveDate) -> String {
    format!(
        "EMPLOYEE_ID eq {} and WORKFLOW_STATUS eq 'Approved' and CLASS_START_DATE gt datetime'{}T00:00:00'",
        odata_literal(employee_id.as_str()),
        today.format("%Y-%m-%d")
    )
}

pub fn workflow_filter(class_id: &str, employee_id: &EmployeeId) -> String {
    format!(
        "CLASS_ID eq {} and EMPLOYEE_ID eq {}",
        odata_literal(class_id),
        odata_literal(employee_id.as_str())
    )
}

fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn transport(endpoint: &'static str, err: reqwest::Error) -> GatewayError {
    GatewayError::Transport {
        endpoint,
        message: err.to_string(),
    }
}

async fn read_json<T: DeserializeOwned>(
    endpoint: &'static str,
    response: Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        return Err(GatewayError::Status {
            endpoint,
            status: status.as_u16(),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|err| transport(endpoint, err))?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(GatewayError::EmptyPayload { endpoint });
    }

    let value: Value = serde_json::from_slice(&body).map_err(|err| GatewayError::Decode {
        endpoint,
        message: err.to_string(),
    })?;
    if value.is_null() {
        return Err(GatewayError::EmptyPayload { endpoint });
    }

    serde_json::from_value(value).map_err(|err| GatewayError::Decode {
        endpoint,
        message: err.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct CurrentUserDto {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmployeeDetailsDto {
    #[serde(default)]
    employee_id: Option<String>,
    #[serde(default)]
    badge_no: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    department: Option<String>,
    #[serde(default)]
    position: Option<String>,
}

impl EmployeeDetailsDto {
    fn into_profile(self, requested: &EmployeeId) -> EmployeeProfile {
        let employee_id = self
            .employee_id
            .as_deref()
            .or(self.badge_no.as_deref())
            .and_then(|raw| EmployeeId::parse(raw).ok())
            .unwrap_or_else(|| requested.clone());

        let full_name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let display_name = self
            .display_name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| (!full_name.is_empty()).then_some(full_name))
            .or(self.name)
            .unwrap_or_else(|| employee_id.to_string());

        EmployeeProfile {
            employee_id,
            display_name,
            email: self.email,
            department: self.department,
            position: self.position,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubordinateEnvelope {
    #[serde(rename = "EmployeeHierarchySet", default)]
    set: Option<HierarchySet>,
}

#[derive(Debug, Deserialize)]
struct HierarchySet {
    #[serde(rename = "EmployeeHierarchy", default)]
    entries: Option<OneOrMany<SubordinateDto>>,
}

/// XML-to-JSON bridges emit a bare object when a list has one element.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubordinateDto {
    #[serde(rename = "EmpPernr")]
    pernr: String,
    #[serde(rename = "EmpEnglishName", default)]
    english_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ODataEnvelope<T> {
    d: ODataResults<T>,
}

#[derive(Debug, Deserialize)]
struct ODataResults<T> {
    results: Vec<T>,
}

#[derive(Debug, Serialize)]
struct LegacyCancelPayload<'a> {
    #[serde(rename = "Emp_ID")]
    emp_id: &'a str,
    #[serde(rename = "Class_ID")]
    class_id: &'a str,
    #[serde(rename = "Cancel_Reason")]
    cancel_reason: &'a str,
    #[serde(rename = "New_Class_Status")]
    new_class_status: &'static str,
}

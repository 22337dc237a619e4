use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{
    ClassRecord, CurrentUser, EmployeeId, EmployeeProfile, UserType, WorkflowRecord,
};

/// Remote operations the cancellation workflows depend on.
///
/// `classes_for_employee` must only return approved enrollments starting after
/// today; callers do not re-check either condition.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    async fn current_user(&self) -> Result<CurrentUser, GatewayError>;

    async fn employee(&self, id: &EmployeeId) -> Result<EmployeeProfile, GatewayError>;

    async fn subordinates(
        &self,
        manager_id: &EmployeeId,
    ) -> Result<Vec<EmployeeProfile>, GatewayError>;

    async fn classes_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<ClassRecord>, GatewayError>;

    async fn workflow_records(
        &self,
        class_id: &str,
        employee_id: &EmployeeId,
    ) -> Result<Vec<WorkflowRecord>, GatewayError>;

    /// Legacy completion endpoint taking scalar fields only.
    async fn submit_legacy_cancellation(
        &self,
        class_id: &str,
        employee_id: &EmployeeId,
        admin_id: &EmployeeId,
        user_type: UserType,
        reason_code: &str,
    ) -> Result<SubmissionAck, GatewayError>;

    /// Approval-request endpoint taking the whole workflow record.
    async fn submit_cancellation_request(
        &self,
        record: &WorkflowRecord,
    ) -> Result<SubmissionAck, GatewayError>;
}

/// Backend acknowledgement, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionAck(pub Value);

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{endpoint} request failed: {message}")]
    Transport {
        endpoint: &'static str,
        message: String,
    },
    #[error("{endpoint} responded with HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },
    #[error("{endpoint} returned an unreadable payload: {message}")]
    Decode {
        endpoint: &'static str,
        message: String,
    },
    #[error("{endpoint} returned an empty payload")]
    EmptyPayload { endpoint: &'static str },
    #[error("unable to build backend client: {0}")]
    Client(String),
}

impl GatewayError {
    pub fn endpoint(&self) -> Option<&'static str> {
        match self {
            GatewayError::Transport { endpoint, .. }
            | GatewayError::Status { endpoint, .. }
            | GatewayError::Decode { endpoint, .. }
            | GatewayError::EmptyPayload { endpoint } => Some(endpoint),
            GatewayError::Client(_) => None,
        }
    }
}

//! Training-class cancellation: eligibility rules, the self-service and
//! on-behalf flows, and the backend gateway they talk to.

pub mod clock;
pub mod domain;
pub mod eligibility;
pub mod gateway;
pub mod http;
pub mod orchestrator;
pub mod router;
pub mod sessions;
pub mod wire_date;

#[cfg(test)]
mod tests;

pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::{
    dedupe_classes, CancellationRequest, ClassRecord, CurrentUser, EmployeeId, EmployeeProfile,
    InvalidEmployeeId, InvalidWorkflowRecord, UserType, WorkflowRecord, DEFAULT_CANCEL_REASON,
};
pub use eligibility::{
    classify_eligibility, cutoff_days, days_left, evaluate_workflow, format_display_date,
    format_wire_display_date, CancelReason, EligibilityResult, WorkflowDetails,
};
pub use gateway::{BackendGateway, GatewayError, SubmissionAck};
pub use http::{GatewayEndpoints, HttpBackendGateway};
pub use orchestrator::{
    CancellationOrchestrator, FlowContext, FlowFailure, FlowKind, FlowState, FlowStep,
    IdentitySource, OnBehalfStart, OrchestratorSettings, ResolvedIdentity, SelfServiceStart,
    Submission, SubmissionReceipt, SubmissionStatus,
};
pub use router::cancellation_router;
pub use sessions::{CancellationSessions, SessionError, SessionSnapshot, DEFAULT_IDLE_TIMEOUT};
pub use wire_date::WireDateError;

//! State machine driving one cancellation attempt.
//!
//! Two flows share the same states:
//!
//! * self-service: the current user cancels one of their own classes and the
//!   whole workflow record is sent to the approval-request endpoint;
//! * on behalf: a manager picks a subordinate, then one of the subordinate's
//!   classes, and the legacy endpoint receives the scalar fields only.
//!
//! ```text
//! Idle -> UserResolved -> TargetSelected -> WorkflowFetched -> Confirmed -> Submitted
//! ```
//!
//! Every step returns `Result<_, FlowFailure>`. A step that fails validation
//! or a backend read leaves both state and context where they were. A
//! selection with no matching workflow record still records the class and
//! lands in `TargetSelected`. A failed submission lands in `Submitted(Failed)`
//! and may be confirmed again.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::domain::{
    dedupe_classes, CancellationRequest, ClassRecord, EmployeeId, EmployeeProfile, UserType,
    WorkflowRecord,
};
use super::eligibility::{evaluate_workflow, WorkflowDetails};
use super::gateway::{BackendGateway, GatewayError, SubmissionAck};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    SelfService,
    OnBehalf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    UserResolved,
    TargetSelected,
    WorkflowFetched,
    Confirmed,
    Submitted(SubmissionStatus),
}

impl FlowState {
    pub fn label(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::UserResolved => "user_resolved",
            FlowState::TargetSelected => "target_selected",
            FlowState::WorkflowFetched => "workflow_fetched",
            FlowState::Confirmed => "confirmed",
            FlowState::Submitted(SubmissionStatus::Success) => "submitted",
            FlowState::Submitted(SubmissionStatus::Failed { .. }) => "submission_failed",
        }
    }

    fn accepts_selection(&self) -> bool {
        matches!(
            self,
            FlowState::UserResolved | FlowState::TargetSelected | FlowState::WorkflowFetched
        )
    }

    fn accepts_confirmation(&self) -> bool {
        matches!(
            self,
            FlowState::WorkflowFetched | FlowState::Submitted(SubmissionStatus::Failed { .. })
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStatus {
    Success,
    Failed { message: String },
}

/// How the acting identity was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    Resolved,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedIdentity {
    pub employee_id: EmployeeId,
    pub source: IdentitySource,
}

/// Everything one open cancellation dialog has gathered so far.
#[derive(Debug, Clone, Default)]
pub struct FlowContext {
    pub kind: Option<FlowKind>,
    pub current_user: Option<ResolvedIdentity>,
    pub profile: Option<EmployeeProfile>,
    pub subordinates: Vec<EmployeeProfile>,
    pub selected_subordinate: Option<EmployeeProfile>,
    pub classes: Vec<ClassRecord>,
    pub selected_class: Option<ClassRecord>,
    pub workflow: Option<WorkflowDetails>,
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    /// Identity used when the user API cannot resolve the current user.
    pub default_identity: Option<EmployeeId>,
}

/// Network step a transport failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    ResolveUser,
    LoadProfile,
    LoadClasses,
    LoadSubordinates,
    LookupWorkflow,
    Submit,
}

impl FlowStep {
    pub const fn failure_message(self) -> &'static str {
        match self {
            FlowStep::ResolveUser => "Failed to load current user data.",
            FlowStep::LoadProfile => "Failed to load employee data.",
            FlowStep::LoadClasses => "Failed to load classes.",
            FlowStep::LoadSubordinates => "Failed to load subordinates.",
            FlowStep::LookupWorkflow => "Failed to retrieve class.",
            FlowStep::Submit => "Failed to cancel class.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FlowFailure {
    #[error("{} ({})", .step.failure_message(), .source)]
    Transport {
        step: FlowStep,
        #[source]
        source: GatewayError,
    },
    #[error("No matching class found for class {class_id} and employee {employee_id}.")]
    NoMatch {
        class_id: String,
        employee_id: EmployeeId,
    },
    #[error("{0}")]
    Validation(String),
    #[error("current user unavailable and no default identity configured: {reason}")]
    IdentityUnavailable { reason: String },
}

impl FlowFailure {
    /// Short message suitable for a toast.
    pub fn message(&self) -> String {
        match self {
            FlowFailure::Transport { step, .. } => step.failure_message().to_string(),
            FlowFailure::NoMatch { .. } => "No matching class found.".to_string(),
            FlowFailure::Validation(message) => message.clone(),
            FlowFailure::IdentityUnavailable { .. } => {
                FlowStep::ResolveUser.failure_message().to_string()
            }
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            FlowFailure::Transport { .. } => "transport",
            FlowFailure::NoMatch { .. } => "no_match",
            FlowFailure::Validation(_) => "validation",
            FlowFailure::IdentityUnavailable { .. } => "identity_unavailable",
        }
    }

    fn transport(step: FlowStep) -> impl FnOnce(GatewayError) -> FlowFailure {
        move |source| FlowFailure::Transport { step, source }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SelfServiceStart {
    pub identity: ResolvedIdentity,
    pub profile: EmployeeProfile,
    pub classes: Vec<ClassRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnBehalfStart {
    pub identity: ResolvedIdentity,
    pub subordinates: Vec<EmployeeProfile>,
}

/// Payload that was sent, tagged by the backend contract it went to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "contract", rename_all = "snake_case")]
pub enum Submission {
    ApprovalRequest {
        record: WorkflowRecord,
        reason_code: String,
    },
    Legacy {
        request: CancellationRequest,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub submission: Submission,
    pub ack: SubmissionAck,
}

pub struct CancellationOrchestrator<G> {
    gateway: Arc<G>,
    clock: Arc<dyn Clock>,
    settings: OrchestratorSettings,
    state: FlowState,
    context: FlowContext,
}

impl<G> CancellationOrchestrator<G>
where
    G: BackendGateway,
{
    pub fn new(gateway: Arc<G>, clock: Arc<dyn Clock>, settings: OrchestratorSettings) -> Self {
        Self {
            gateway,
            clock,
            settings,
            state: FlowState::Idle,
            context: FlowContext::default(),
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn context(&self) -> &FlowContext {
        &self.context
    }

    /// Open the self-service flow: resolve the user, then load their profile
    /// and class list together.
    pub async fn begin_self_service(&mut self) -> Result<SelfServiceStart, FlowFailure> {
        self.reset(FlowKind::SelfService);
        let identity = self.resolve_identity().await?;
        let employee_id = identity.employee_id.clone();

        let (profile, classes) = tokio::join!(
            self.gateway.employee(&employee_id),
            self.gateway.classes_for_employee(&employee_id)
        );
        let profile = profile.map_err(FlowFailure::transport(FlowStep::LoadProfile))?;
        let classes = dedupe_classes(classes.map_err(FlowFailure::transport(FlowStep::LoadClasses))?);

        info!(
            employee = %employee_id,
            classes = classes.len(),
            "self-service cancellation ready for class selection"
        );

        self.context.current_user = Some(identity.clone());
        self.context.profile = Some(profile.clone());
        self.context.classes = classes.clone();
        self.state = FlowState::UserResolved;

        Ok(SelfServiceStart {
            identity,
            profile,
            classes,
        })
    }

    /// Open the on-behalf flow: resolve the manager and list their subordinates.
    pub async fn begin_on_behalf(&mut self) -> Result<OnBehalfStart, FlowFailure> {
        self.reset(FlowKind::OnBehalf);
        let identity = self.resolve_identity().await?;

        let subordinates = self
            .gateway
            .subordinates(&identity.employee_id)
            .await
            .map_err(FlowFailure::transport(FlowStep::LoadSubordinates))?;

        info!(
            manager = %identity.employee_id,
            subordinates = subordinates.len(),
            "on-behalf cancellation ready for subordinate selection"
        );

        self.context.current_user = Some(identity.clone());
        self.context.subordinates = subordinates.clone();
        self.state = FlowState::UserResolved;

        Ok(OnBehalfStart {
            identity,
            subordinates,
        })
    }

    /// Pick one of the offered subordinates and load their classes.
    pub async fn select_subordinate(
        &mut self,
        raw_employee_id: &str,
    ) -> Result<Vec<ClassRecord>, FlowFailure> {
        if self.context.kind != Some(FlowKind::OnBehalf) {
            return Err(FlowFailure::Validation(
                "Subordinates can only be selected when cancelling on behalf of someone."
                    .to_string(),
            ));
        }
        self.ensure_selectable()?;

        let employee_id = EmployeeId::parse(raw_employee_id)
            .map_err(|_| FlowFailure::Validation("Please select a subordinate.".to_string()))?;
        let subordinate = self
            .context
            .subordinates
            .iter()
            .find(|profile| profile.employee_id == employee_id)
            .cloned()
            .ok_or_else(|| {
                FlowFailure::Validation(format!(
                    "Employee {employee_id} is not one of your subordinates."
                ))
            })?;

        let classes = self
            .gateway
            .classes_for_employee(&employee_id)
            .await
            .map_err(FlowFailure::transport(FlowStep::LoadClasses))?;
        let classes = dedupe_classes(classes);

        debug!(subordinate = %employee_id, classes = classes.len(), "loaded subordinate classes");
        self.context.selected_subordinate = Some(subordinate);
        self.context.classes = classes.clone();
        self.context.selected_class = None;
        self.context.workflow = None;
        self.state = FlowState::UserResolved;
        Ok(classes)
    }

    /// Pick one of the offered classes, fetch its workflow record and evaluate
    /// eligibility. Zero matching records keep the flow in `TargetSelected`.
    pub async fn select_class(&mut self, class_id: &str) -> Result<WorkflowDetails, FlowFailure> {
        self.ensure_selectable()?;
        let target = self.target_employee()?;

        let class_id = class_id.trim();
        if class_id.is_empty() {
            return Err(self.missing_selection());
        }
        let class = self
            .context
            .classes
            .iter()
            .find(|record| record.class_id == class_id)
            .cloned()
            .ok_or_else(|| {
                FlowFailure::Validation(format!("Class {class_id} is not in the offered list."))
            })?;

        let records = self
            .gateway
            .workflow_records(class_id, &target)
            .await
            .map_err(FlowFailure::transport(FlowStep::LookupWorkflow))?;
        if records.len() > 1 {
            debug!(class_id, employee = %target, matches = records.len(), "using first workflow record");
        }

        self.context.selected_class = Some(class);
        self.context.workflow = None;
        self.state = FlowState::TargetSelected;
        let Some(record) = records.into_iter().next() else {
            info!(class_id, employee = %target, "no workflow record matches selection");
            return Err(FlowFailure::NoMatch {
                class_id: class_id.to_string(),
                employee_id: target,
            });
        };

        let details = evaluate_workflow(record, self.clock.as_ref());
        info!(
            class_id,
            employee = %target,
            days_left = details.eligibility.days_left,
            reason = details.reason_label(),
            "workflow record evaluated"
        );

        self.context.workflow = Some(details.clone());
        self.state = FlowState::WorkflowFetched;
        Ok(details)
    }

    /// Submit the cancellation through the contract that belongs to the flow.
    ///
    /// The eligibility flag is advisory and is not enforced here.
    pub async fn confirm(&mut self, reason_code: &str) -> Result<SubmissionReceipt, FlowFailure> {
        if !self.state.accepts_confirmation() {
            return Err(FlowFailure::Validation(
                "Select a class before confirming the cancellation.".to_string(),
            ));
        }
        let details = self
            .context
            .workflow
            .clone()
            .ok_or_else(|| self.missing_selection())?;
        let identity = self
            .context
            .current_user
            .clone()
            .ok_or_else(|| self.missing_selection())?;

        if !details.eligibility.cancel_enabled {
            info!(
                class_id = details.record.class_id(),
                reason = details.reason_label(),
                "confirming cancellation outside the eligibility window"
            );
        }

        let subordinate = match self.context.kind {
            Some(FlowKind::OnBehalf) => Some(
                self.context
                    .selected_subordinate
                    .clone()
                    .ok_or_else(|| self.missing_selection())?,
            ),
            _ => None,
        };

        self.state = FlowState::Confirmed;
        let (submission, result) = match subordinate {
            Some(subordinate) => {
                let request = CancellationRequest::new(
                    details.record.class_id().to_string(),
                    subordinate.employee_id,
                    identity.employee_id,
                    UserType::Admin,
                    reason_code,
                );
                let result = self
                    .gateway
                    .submit_legacy_cancellation(
                        &request.class_id,
                        &request.employee_id,
                        &request.acting_admin_id,
                        request.acting_user_type,
                        &request.reason_code,
                    )
                    .await;
                (Submission::Legacy { request }, result)
            }
            None => {
                let record = details.record;
                let result = self.gateway.submit_cancellation_request(&record).await;
                let submission = Submission::ApprovalRequest {
                    record,
                    reason_code: reason_code.trim().to_string(),
                };
                (submission, result)
            }
        };

        match result {
            Ok(ack) => {
                info!(contract = submission_contract(&submission), "class cancellation submitted");
                self.state = FlowState::Submitted(SubmissionStatus::Success);
                Ok(SubmissionReceipt { submission, ack })
            }
            Err(source) => {
                let failure = FlowFailure::Transport {
                    step: FlowStep::Submit,
                    source,
                };
                warn!(
                    contract = submission_contract(&submission),
                    error = %failure,
                    "class cancellation submission failed"
                );
                self.state = FlowState::Submitted(SubmissionStatus::Failed {
                    message: failure.message(),
                });
                Err(failure)
            }
        }
    }

    /// Close the dialog and drop everything gathered for it.
    pub fn dismiss(&mut self) {
        if self.state != FlowState::Idle {
            debug!(state = self.state.label(), "cancellation dialog dismissed");
        }
        self.state = FlowState::Idle;
        self.context = FlowContext::default();
    }

    fn reset(&mut self, kind: FlowKind) {
        if self.state != FlowState::Idle {
            debug!(state = self.state.label(), "discarding previous cancellation context");
        }
        self.state = FlowState::Idle;
        self.context = FlowContext {
            kind: Some(kind),
            ..FlowContext::default()
        };
    }

    async fn resolve_identity(&self) -> Result<ResolvedIdentity, FlowFailure> {
        let reason = match self.gateway.current_user().await {
            Ok(user) => match EmployeeId::parse(&user.id) {
                Ok(employee_id) => {
                    return Ok(ResolvedIdentity {
                        employee_id,
                        source: IdentitySource::Resolved,
                    })
                }
                Err(err) => err.to_string(),
            },
            Err(err) => err.to_string(),
        };

        match &self.settings.default_identity {
            Some(fallback) => {
                warn!(
                    fallback = %fallback,
                    reason = %reason,
                    "current user unavailable, continuing with configured default identity"
                );
                Ok(ResolvedIdentity {
                    employee_id: fallback.clone(),
                    source: IdentitySource::Fallback,
                })
            }
            None => {
                warn!(reason = %reason, "current user unavailable and no default identity configured");
                Err(FlowFailure::IdentityUnavailable { reason })
            }
        }
    }

    fn ensure_selectable(&self) -> Result<(), FlowFailure> {
        if self.state.accepts_selection() {
            Ok(())
        } else {
            Err(FlowFailure::Validation(format!(
                "Selections cannot change while the cancellation is {}.",
                self.state.label().replace('_', " ")
            )))
        }
    }

    /// Employee whose enrollment is being cancelled.
    fn target_employee(&self) -> Result<EmployeeId, FlowFailure> {
        let target = match self.context.kind {
            Some(FlowKind::OnBehalf) => self
                .context
                .selected_subordinate
                .as_ref()
                .map(|profile| profile.employee_id.clone()),
            _ => self
                .context
                .current_user
                .as_ref()
                .map(|identity| identity.employee_id.clone()),
        };
        target.ok_or_else(|| self.missing_selection())
    }

    fn missing_selection(&self) -> FlowFailure {
        let message = match self.context.kind {
            Some(FlowKind::OnBehalf) => "Please select both subordinate and class.",
            _ => "Please select a Class.",
        };
        FlowFailure::Validation(message.to_string())
    }
}

fn submission_contract(submission: &Submission) -> &'static str {
    match submission {
        Submission::ApprovalRequest { .. } => "approval_request",
        Submission::Legacy { .. } => "legacy",
    }
}

impl<G> std::fmt::Debug for CancellationOrchestrator<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationOrchestrator")
            .field("state", &self.state)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::domain::{ClassRecord, EmployeeProfile};
use super::eligibility::WorkflowDetails;
use super::gateway::BackendGateway;
use super::orchestrator::{
    CancellationOrchestrator, FlowFailure, FlowKind, FlowState, OnBehalfStart,
    OrchestratorSettings, ResolvedIdentity, SelfServiceStart, SubmissionReceipt,
    SubmissionStatus,
};

/// Sessions untouched for this long are dropped by [`CancellationSessions::sweep_idle`].
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

type SessionHandle<G> = Arc<Mutex<CancellationOrchestrator<G>>>;
type SessionMap<G> = Arc<RwLock<HashMap<String, SessionEntry<G>>>>;

struct SessionEntry<G> {
    flow: SessionHandle<G>,
    /// Milliseconds since the registry epoch.
    last_seen: AtomicU64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cancellation session {0} not found")]
    NotFound(String),
    #[error("cancellation session {0} is busy with another request")]
    Busy(String),
    #[error(transparent)]
    Flow(#[from] FlowFailure),
    #[error("submission task for session {session_id} did not complete: {message}")]
    Task { session_id: String, message: String },
}

/// Point-in-time view of one session. A busy session reports only its id.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub busy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FlowKind>,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user: Option<ResolvedIdentity>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subordinates: Vec<EmployeeProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_subordinate: Option<EmployeeProfile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<ClassRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_class: Option<ClassRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowDetails>,
}

impl SessionSnapshot {
    fn busy(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            busy: true,
            kind: None,
            state: "busy",
            failure_message: None,
            current_user: None,
            subordinates: Vec::new(),
            selected_subordinate: None,
            classes: Vec::new(),
            selected_class: None,
            workflow: None,
        }
    }
}

/// Open cancellation dialogs keyed by session id.
///
/// Each session serializes its own steps; a second request arriving while one
/// is running is rejected as busy instead of queued. A session closes when it
/// is dismissed, when its submission succeeds or when it sits idle past the
/// idle timeout.
pub struct CancellationSessions<G> {
    gateway: Arc<G>,
    clock: Arc<dyn Clock>,
    settings: OrchestratorSettings,
    sessions: SessionMap<G>,
    sequence: AtomicU64,
    epoch: Instant,
    idle_timeout: Duration,
}

impl<G> CancellationSessions<G>
where
    G: BackendGateway + 'static,
{
    pub fn new(gateway: Arc<G>, clock: Arc<dyn Clock>, settings: OrchestratorSettings) -> Self {
        Self {
            gateway,
            clock,
            settings,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            sequence: AtomicU64::new(1),
            epoch: Instant::now(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub async fn open_self_service(&self) -> Result<(String, SelfServiceStart), SessionError> {
        self.sweep_idle(Instant::now()).await;
        let mut flow = self.orchestrator();
        let start = flow.begin_self_service().await?;
        let session_id = self.register(flow).await;
        Ok((session_id, start))
    }

    pub async fn open_on_behalf(&self) -> Result<(String, OnBehalfStart), SessionError> {
        self.sweep_idle(Instant::now()).await;
        let mut flow = self.orchestrator();
        let start = flow.begin_on_behalf().await?;
        let session_id = self.register(flow).await;
        Ok((session_id, start))
    }

    pub async fn select_subordinate(
        &self,
        session_id: &str,
        employee_id: &str,
    ) -> Result<Vec<ClassRecord>, SessionError> {
        let handle = self.handle(session_id).await?;
        let mut flow = handle
            .try_lock()
            .map_err(|_| SessionError::Busy(session_id.to_string()))?;
        Ok(flow.select_subordinate(employee_id).await?)
    }

    pub async fn select_class(
        &self,
        session_id: &str,
        class_id: &str,
    ) -> Result<WorkflowDetails, SessionError> {
        let handle = self.handle(session_id).await?;
        let mut flow = handle
            .try_lock()
            .map_err(|_| SessionError::Busy(session_id.to_string()))?;
        Ok(flow.select_class(class_id).await?)
    }

    /// Submit on a detached task so the request reaches the backend even if
    /// the caller goes away or the session is dismissed mid-flight.
    ///
    /// A successful submission closes the session. A failed one keeps it open
    /// for another attempt unless it was dismissed meanwhile.
    pub async fn confirm(
        &self,
        session_id: &str,
        reason_code: &str,
    ) -> Result<SubmissionReceipt, SessionError> {
        let handle = self.handle(session_id).await?;
        let mut flow = Arc::clone(&handle)
            .try_lock_owned()
            .map_err(|_| SessionError::Busy(session_id.to_string()))?;

        let sessions = Arc::clone(&self.sessions);
        let owned_id = session_id.to_string();
        let reason_code = reason_code.to_string();
        let task = tokio::spawn(async move {
            let result = flow.confirm(&reason_code).await;
            drop(flow);
            settle_submission(&sessions, &owned_id, &handle, &result).await;
            result
        });

        match task.await {
            Ok(result) => Ok(result?),
            Err(err) => Err(SessionError::Task {
                session_id: session_id.to_string(),
                message: err.to_string(),
            }),
        }
    }

    /// Drop the session. Returns `true` when a submission was still running;
    /// that submission completes on its own and its result is discarded.
    pub async fn dismiss(&self, session_id: &str) -> Result<bool, SessionError> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let in_flight = match entry.flow.try_lock() {
            Ok(mut flow) => {
                flow.dismiss();
                false
            }
            Err(_) => {
                warn!(session_id, "session dismissed while a request is still running");
                true
            }
        };
        Ok(in_flight)
    }

    pub async fn is_busy(&self, session_id: &str) -> Result<bool, SessionError> {
        let handle = self.handle(session_id).await?;
        let busy = handle.try_lock().is_err();
        Ok(busy)
    }

    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, SessionError> {
        let handle = self.handle(session_id).await?;
        let Ok(flow) = handle.try_lock() else {
            return Ok(SessionSnapshot::busy(session_id));
        };

        let context = flow.context().clone();
        let failure_message = match flow.state() {
            FlowState::Submitted(SubmissionStatus::Failed { message }) => Some(message.clone()),
            _ => None,
        };

        Ok(SessionSnapshot {
            session_id: session_id.to_string(),
            busy: false,
            kind: context.kind,
            state: flow.state().label(),
            failure_message,
            current_user: context.current_user,
            subordinates: context.subordinates,
            selected_subordinate: context.selected_subordinate,
            classes: context.classes,
            selected_class: context.selected_class,
            workflow: context.workflow,
        })
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop every session idle for at least the idle timeout as of `now`.
    /// Sessions with a step still running are kept. Returns how many closed.
    pub async fn sweep_idle(&self, now: Instant) -> usize {
        let now_millis = self.millis_at(now);
        let timeout_millis = duration_millis(self.idle_timeout);
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| {
            let idle_for = now_millis.saturating_sub(entry.last_seen.load(Ordering::Relaxed));
            idle_for < timeout_millis || entry.flow.try_lock().is_err()
        });
        let closed = before - sessions.len();
        if closed > 0 {
            info!(closed, remaining = sessions.len(), "closed idle cancellation sessions");
        }
        closed
    }

    fn orchestrator(&self) -> CancellationOrchestrator<G> {
        CancellationOrchestrator::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.clock),
            self.settings.clone(),
        )
    }

    async fn register(&self, flow: CancellationOrchestrator<G>) -> String {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        let session_id = format!("cx-{id:06}");
        debug!(session_id = %session_id, "cancellation session opened");
        let entry = SessionEntry {
            flow: Arc::new(Mutex::new(flow)),
            last_seen: AtomicU64::new(self.millis_at(Instant::now())),
        };
        self.sessions.write().await.insert(session_id.clone(), entry);
        session_id
    }

    /// Looks up a session and marks it as used.
    async fn handle(&self, session_id: &str) -> Result<SessionHandle<G>, SessionError> {
        let now = self.millis_at(Instant::now());
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|entry| {
                entry.last_seen.fetch_max(now, Ordering::Relaxed);
                Arc::clone(&entry.flow)
            })
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    fn millis_at(&self, instant: Instant) -> u64 {
        duration_millis(instant.saturating_duration_since(self.epoch))
    }
}

async fn settle_submission<G>(
    sessions: &SessionMap<G>,
    session_id: &str,
    handle: &SessionHandle<G>,
    result: &Result<SubmissionReceipt, FlowFailure>,
) {
    let mut sessions = sessions.write().await;
    let registered = sessions
        .get(session_id)
        .is_some_and(|entry| Arc::ptr_eq(&entry.flow, handle));

    match (result, registered) {
        (Ok(_), true) => {
            sessions.remove(session_id);
            debug!(session_id, "cancellation submitted; session closed");
        }
        (Ok(_), false) => {
            info!(session_id, "submission for a dismissed session completed");
        }
        (Err(failure), false) => {
            warn!(
                session_id,
                error = %failure,
                "submission for a dismissed session failed; result discarded"
            );
        }
        (Err(_), true) => {}
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

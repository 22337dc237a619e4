use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::eligibility::{classify_eligibility, days_left, format_display_date, EligibilityResult};
use super::gateway::BackendGateway;
use super::orchestrator::FlowFailure;
use super::sessions::{CancellationSessions, SessionError};
use super::wire_date;

const SUCCESS_MESSAGE: &str = "Class cancelled successfully.";

/// Router builder exposing the cancellation dialog as session-scoped endpoints.
pub fn cancellation_router<G>(sessions: Arc<CancellationSessions<G>>) -> Router
where
    G: BackendGateway + 'static,
{
    Router::new()
        .route("/api/v1/cancellations/self", post(open_self_service_handler::<G>))
        .route("/api/v1/cancellations/on-behalf", post(open_on_behalf_handler::<G>))
        .route(
            "/api/v1/cancellations/:session_id",
            get(session_status_handler::<G>).delete(dismiss_handler::<G>),
        )
        .route(
            "/api/v1/cancellations/:session_id/subordinate",
            post(select_subordinate_handler::<G>),
        )
        .route(
            "/api/v1/cancellations/:session_id/class",
            post(select_class_handler::<G>),
        )
        .route(
            "/api/v1/cancellations/:session_id/confirm",
            post(confirm_handler::<G>),
        )
        .route("/api/v1/eligibility", post(eligibility_handler::<G>))
        .with_state(sessions)
}

#[derive(Debug, Deserialize)]
pub struct SubordinateSelection {
    pub employee_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ClassSelection {
    pub class_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Confirmation {
    #[serde(default)]
    pub reason_code: String,
}

#[derive(Debug, Deserialize)]
pub struct EligibilityQuery {
    pub training_type_id: String,
    /// `/Date(ms)/` start date; absent means zero days left.
    #[serde(default)]
    pub start_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EligibilityView {
    #[serde(flatten)]
    pub eligibility: EligibilityResult,
    pub reason_label: &'static str,
    pub formatted_start_date: String,
}

#[derive(Serialize)]
struct SessionOpened<T> {
    session_id: String,
    state: &'static str,
    #[serde(flatten)]
    start: T,
}

pub(crate) async fn open_self_service_handler<G>(
    State(sessions): State<Arc<CancellationSessions<G>>>,
) -> Response
where
    G: BackendGateway + 'static,
{
    match sessions.open_self_service().await {
        Ok((session_id, start)) => {
            let view = SessionOpened {
                session_id,
                state: "user_resolved",
                start,
            };
            (StatusCode::CREATED, Json(view)).into_response()
        }
        Err(err) => session_error_response(err),
    }
}

pub(crate) async fn open_on_behalf_handler<G>(
    State(sessions): State<Arc<CancellationSessions<G>>>,
) -> Response
where
    G: BackendGateway + 'static,
{
    match sessions.open_on_behalf().await {
        Ok((session_id, start)) => {
            let view = SessionOpened {
                session_id,
                state: "user_resolved",
                start,
            };
            (StatusCode::CREATED, Json(view)).into_response()
        }
        Err(err) => session_error_response(err),
    }
}

pub(crate) async fn session_status_handler<G>(
    State(sessions): State<Arc<CancellationSessions<G>>>,
    Path(session_id): Path<String>,
) -> Response
where
    G: BackendGateway + 'static,
{
    match sessions.snapshot(&session_id).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(err) => session_error_response(err),
    }
}

pub(crate) async fn select_subordinate_handler<G>(
    State(sessions): State<Arc<CancellationSessions<G>>>,
    Path(session_id): Path<String>,
    Json(selection): Json<SubordinateSelection>,
) -> Response
where
    G: BackendGateway + 'static,
{
    match sessions
        .select_subordinate(&session_id, &selection.employee_id)
        .await
    {
        Ok(classes) => {
            let payload = json!({
                "session_id": session_id,
                "state": "user_resolved",
                "classes": classes,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => session_error_response(err),
    }
}

pub(crate) async fn select_class_handler<G>(
    State(sessions): State<Arc<CancellationSessions<G>>>,
    Path(session_id): Path<String>,
    Json(selection): Json<ClassSelection>,
) -> Response
where
    G: BackendGateway + 'static,
{
    match sessions.select_class(&session_id, &selection.class_id).await {
        Ok(details) => {
            let payload = json!({
                "session_id": session_id,
                "state": "workflow_fetched",
                "reason_label": details.reason_label(),
                "workflow": details,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => session_error_response(err),
    }
}

pub(crate) async fn confirm_handler<G>(
    State(sessions): State<Arc<CancellationSessions<G>>>,
    Path(session_id): Path<String>,
    Json(confirmation): Json<Confirmation>,
) -> Response
where
    G: BackendGateway + 'static,
{
    match sessions
        .confirm(&session_id, &confirmation.reason_code)
        .await
    {
        Ok(receipt) => {
            let payload = json!({
                "session_id": session_id,
                "state": "submitted",
                "message": SUCCESS_MESSAGE,
                "receipt": receipt,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => session_error_response(err),
    }
}

pub(crate) async fn dismiss_handler<G>(
    State(sessions): State<Arc<CancellationSessions<G>>>,
    Path(session_id): Path<String>,
) -> Response
where
    G: BackendGateway + 'static,
{
    match sessions.dismiss(&session_id).await {
        Ok(in_flight) => {
            let payload = json!({
                "session_id": session_id,
                "dismissed": true,
                "submission_in_flight": in_flight,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => session_error_response(err),
    }
}

pub(crate) async fn eligibility_handler<G>(
    State(sessions): State<Arc<CancellationSessions<G>>>,
    Json(query): Json<EligibilityQuery>,
) -> Response
where
    G: BackendGateway + 'static,
{
    let start_date = match query.start_date.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match wire_date::parse(raw) {
            Ok(instant) => Some(instant),
            Err(err) => {
                let payload = json!({ "error": err.to_string() });
                return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response();
            }
        },
    };

    let clock = sessions.clock();
    let eligibility = classify_eligibility(&query.training_type_id, days_left(start_date, clock));
    let view = EligibilityView {
        eligibility,
        reason_label: eligibility.reason.label(),
        formatted_start_date: format_display_date(start_date, clock),
    };
    (StatusCode::OK, Json(view)).into_response()
}

fn session_error_response(err: SessionError) -> Response {
    let (status, payload) = match &err {
        SessionError::NotFound(session_id) => (
            StatusCode::NOT_FOUND,
            json!({ "error": "cancellation session not found", "session_id": session_id }),
        ),
        SessionError::Busy(session_id) => (
            StatusCode::CONFLICT,
            json!({ "error": "cancellation session is busy", "session_id": session_id }),
        ),
        SessionError::Flow(failure) => (
            flow_failure_status(failure),
            json!({
                "error": failure.message(),
                "kind": failure.kind(),
                "detail": failure.to_string(),
            }),
        ),
        SessionError::Task { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": err.to_string() }),
        ),
    };
    (status, Json(payload)).into_response()
}

pub(crate) fn flow_failure_status(failure: &FlowFailure) -> StatusCode {
    match failure {
        FlowFailure::Transport { .. } => StatusCode::BAD_GATEWAY,
        FlowFailure::NoMatch { .. } => StatusCode::NOT_FOUND,
        FlowFailure::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FlowFailure::IdentityUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

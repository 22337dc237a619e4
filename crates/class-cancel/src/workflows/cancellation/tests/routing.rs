use super::common::*;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::workflows::cancellation::cancellation_router;

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("serialize body")))
        .expect("request builds")
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

#[tokio::test]
async fn self_service_round_trip_over_http() {
    let gateway = Arc::new(ScriptedGateway::seeded());
    let router = cancellation_router(sessions(&gateway));

    let response = router
        .clone()
        .oneshot(empty_request(Method::POST, "/api/v1/cancellations/self"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let opened = read_json_body(response).await;
    let session_id = opened["session_id"].as_str().expect("session id").to_string();
    assert_eq!(opened["state"], "user_resolved");
    assert_eq!(opened["identity"]["employee_id"], MANAGER_ID);
    assert_eq!(opened["classes"].as_array().map(Vec::len), Some(3));
    assert_eq!(opened["classes"][0]["CLASS_ID"], "CL001");

    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/cancellations/{session_id}/class"),
            json!({ "class_id": "CL001" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let selected = read_json_body(response).await;
    assert_eq!(selected["reason_label"], "Eligible for Cancellation");
    assert_eq!(selected["workflow"]["eligibility"]["days_left"], 6);
    assert_eq!(selected["workflow"]["eligibility"]["cancel_enabled"], true);
    assert_eq!(selected["workflow"]["formatted_start_date"], "21/10/2026");

    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/cancellations/{session_id}/confirm"),
            json!({}),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let confirmed = read_json_body(response).await;
    assert_eq!(confirmed["message"], "Class cancelled successfully.");
    assert_eq!(confirmed["receipt"]["submission"]["contract"], "approval_request");
    assert_eq!(confirmed["receipt"]["ack"]["requestId"], "REQ-1");

    let response = router
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/v1/cancellations/{session_id}"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn on_behalf_selection_routes_return_subordinate_classes() {
    let gateway = Arc::new(ScriptedGateway::seeded());
    let router = cancellation_router(sessions(&gateway));

    let response = router
        .clone()
        .oneshot(empty_request(Method::POST, "/api/v1/cancellations/on-behalf"))
        .await
        .expect("route executes");
    let opened = read_json_body(response).await;
    let session_id = opened["session_id"].as_str().expect("session id").to_string();
    assert_eq!(opened["subordinates"][0]["display_name"], "Jane Doe");

    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/cancellations/{session_id}/subordinate"),
            json!({ "employee_id": "00107120" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["classes"][0]["CLASS_ID"], "CL010");

    let response = router
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/cancellations/{session_id}/class"),
            json!({ "class_id": "CL011" }),
        ))
        .await
        .expect("route executes");
    let payload = read_json_body(response).await;
    assert_eq!(payload["reason_label"], "Class Already Started");
}

#[tokio::test]
async fn flow_failures_map_to_status_codes() {
    let gateway = Arc::new(ScriptedGateway::seeded());
    let router = cancellation_router(sessions(&gateway));

    let response = router
        .clone()
        .oneshot(empty_request(Method::POST, "/api/v1/cancellations/self"))
        .await
        .expect("route executes");
    let opened = read_json_body(response).await;
    let session_id = opened["session_id"].as_str().expect("session id").to_string();
    let class_uri = format!("/api/v1/cancellations/{session_id}/class");

    let response = router
        .clone()
        .oneshot(json_request(Method::POST, &class_uri, json!({ "class_id": "CL003" })))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(response).await;
    assert_eq!(payload["error"], "No matching class found.");
    assert_eq!(payload["kind"], "no_match");

    let response = router
        .clone()
        .oneshot(json_request(Method::POST, &class_uri, json!({ "class_id": "" })))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    gateway.fail("workflow");
    let response = router
        .oneshot(json_request(Method::POST, &class_uri, json!({ "class_id": "CL001" })))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let payload = read_json_body(response).await;
    assert_eq!(payload["error"], "Failed to retrieve class.");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let gateway = Arc::new(ScriptedGateway::seeded());
    let router = cancellation_router(sessions(&gateway));

    let response = router
        .clone()
        .oneshot(empty_request(Method::GET, "/api/v1/cancellations/cx-999999"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .oneshot(empty_request(Method::DELETE, "/api/v1/cancellations/cx-999999"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dismiss_route_removes_session() {
    let gateway = Arc::new(ScriptedGateway::seeded());
    let sessions = sessions(&gateway);
    let router = cancellation_router(Arc::clone(&sessions));

    let (session_id, _) = sessions.open_self_service().await.expect("session opens");
    let response = router
        .oneshot(empty_request(
            Method::DELETE,
            &format!("/api/v1/cancellations/{session_id}"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["dismissed"], true);
    assert_eq!(payload["submission_in_flight"], false);
    assert!(sessions.is_empty().await);
}

#[tokio::test]
async fn identity_failure_without_fallback_is_unavailable() {
    let gateway = Arc::new(ScriptedGateway::seeded());
    gateway.fail("current_user");
    let sessions = sessions(&gateway);
    let router = cancellation_router(Arc::clone(&sessions));

    let response = router
        .oneshot(empty_request(Method::POST, "/api/v1/cancellations/self"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(sessions.is_empty().await);
}

#[tokio::test]
async fn eligibility_endpoint_evaluates_without_a_session() {
    let gateway = Arc::new(ScriptedGateway::seeded());
    let router = cancellation_router(sessions(&gateway));
    let start = start_in(3).timestamp_millis();

    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/eligibility",
            json!({ "training_type_id": "3", "start_date": format!("/Date({start})/") }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["days_left"], 3);
    assert_eq!(payload["cutoff_days"], 10);
    assert_eq!(payload["reason"], "cutoff_expired");
    assert_eq!(payload["reason_label"], "Cancellation Period Expired");
    assert_eq!(payload["formatted_start_date"], "18/10/2026");

    let response = router
        .oneshot(json_request(
            Method::POST,
            "/api/v1/eligibility",
            json!({ "training_type_id": "1", "start_date": "tomorrow" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

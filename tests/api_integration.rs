//! Integration tests for the REST API against a running coordinator.

#![cfg(feature = "api")]

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::util::ServiceExt;

use common::{Harness, test_config};
use dr_coordinator::api::{AppState, router};

async fn call(h: &Harness, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let state = AppState::from_coordinator(&h.coordinator);
    let resp = router(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_event(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/events")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn submitted_event_shows_up_in_status_and_runs() {
    let h = Harness::start(&test_config(), 700.0).await;

    let body = r#"{"event_id": "api-1", "intervals": [
        {"start": "2024-07-01T17:01:00Z", "duration_secs": 300, "payload": 1.0}
    ]}"#;
    let (status, json) = call(&h, post_event(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["decision"], "optIn");

    let (_, json) = call(&h, get("/events")).await;
    assert_eq!(json[0]["id"], "api-1");
    assert_eq!(json[0]["phase"], "pending");

    h.at(61).await;
    let (status, json) = call(&h, get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["dr_active"], true);
    assert_eq!(json["current_payload"], 1.0);
    assert_eq!(json["override_error"], false);

    h.at(91).await;
    let (status, json) = call(&h, get("/history?from=2024-07-01T17:01:00Z")).await;
    assert_eq!(status, StatusCode::OK);
    let active = json
        .as_array()
        .map(|a| a.iter().filter(|s| s["dr_active"] == true).count());
    // Reports at 70, 80 and 90; the one at 60 races the activation.
    assert!(active.is_some_and(|n| n >= 3), "{json}");

    h.coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cancel_over_http_releases_the_zone() {
    let h = Harness::start(&test_config(), 700.0).await;
    let body = r#"{"event_id": "api-1", "intervals": [
        {"start": "2024-07-01T17:01:00Z", "duration_secs": 300, "payload": 1.0}
    ]}"#;
    call(&h, post_event(body)).await;

    h.at(90).await;
    assert_eq!(h.held(&h.zone.setpoint.point).await, Some(73.5));

    let req = Request::builder()
        .method("DELETE")
        .uri("/events/api-1")
        .body(Body::empty())
        .unwrap();
    let (status, json) = call(&h, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "cancelled_active");
    assert_eq!(h.held(&h.zone.setpoint.point).await, None);

    let (_, json) = call(&h, get("/status")).await;
    assert_eq!(json["dr_active"], false);

    h.coordinator.shutdown().await;
}

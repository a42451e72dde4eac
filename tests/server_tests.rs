mod common;

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{Network, ZERO_DOC};
use serde_json::{json, Value};
use tower::ServiceExt;
use vpos_reset::server::{router, AppState};
use vpos_reset::Engine;

fn app(net: &Network) -> Router {
    router(AppState::new(Engine::new(&net.settings()).unwrap()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let req = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(v) => req
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn wait_for_state(app: &Router, want: &str) -> Value {
    for _ in 0..100 {
        let (_, body) = send(app, "GET", "/api/status", None).await;
        let status: Value = serde_json::from_slice(&body).unwrap();
        if status["state"] == want {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("server never reached state {want}");
}

#[tokio::test]
async fn starts_idle_without_results() {
    let net = Network::new();
    let app = app(&net);

    let (code, body) = send(&app, "GET", "/api/status", None).await;
    assert_eq!(code, StatusCode::OK);
    let status: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status["state"], "idle");

    let (code, _) = send(&app, "GET", "/api/results", None).await;
    assert_eq!(code, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn rejects_store_outside_range() {
    let net = Network::new();
    let app = app(&net);
    let (code, body) = send(&app, "POST", "/api/scan", Some(json!({ "group": 200 }))).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&body).contains("200"));
}

#[tokio::test]
async fn reset_needs_a_scan_first() {
    let net = Network::new();
    let app = app(&net);
    let (code, _) = send(&app, "POST", "/api/reset", Some(json!({ "value": 1 }))).await;
    assert_eq!(code, StatusCode::CONFLICT);
}

#[tokio::test]
async fn reset_rejects_malformed_targets() {
    let net = Network::new();
    let app = app(&net);
    let (code, _) = send(
        &app,
        "POST",
        "/api/reset",
        Some(json!({ "targets": ["002:031", "nope"], "value": 1 })),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn single_store_scan_reports_the_store_even_when_unreachable() {
    let net = Network::new();
    net.add_bare_share(3, 31);
    let app = app(&net);

    let (code, _) = send(&app, "POST", "/api/scan", Some(json!({ "group": 3 }))).await;
    assert_eq!(code, StatusCode::ACCEPTED);
    wait_for_state(&app, "done").await;

    let (code, body) = send(&app, "GET", "/api/results", None).await;
    assert_eq!(code, StatusCode::OK);
    let groups: Value = serde_json::from_slice(&body).unwrap();
    let groups = groups.as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["group"], 3);
    let endpoints = groups[0]["endpoints"].as_array().unwrap();
    assert_eq!(endpoints.len(), 2);
    assert!(endpoints.iter().all(|e| e["status"]["state"] == "not_accessible"));
}

#[tokio::test]
async fn scan_then_reset_round() {
    let net = Network::new();
    let doc = net.add_checkout(3, 32, ZERO_DOC);
    let app = app(&net);

    let (code, _) = send(&app, "POST", "/api/scan", Some(json!({}))).await;
    assert_eq!(code, StatusCode::ACCEPTED);
    wait_for_state(&app, "done").await;

    let (code, body) = send(&app, "GET", "/api/results", None).await;
    assert_eq!(code, StatusCode::OK);
    let groups: Value = serde_json::from_slice(&body).unwrap();
    let groups = groups.as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["group"], 3);

    // Only unit 32 of store 3 is reachable; selecting anything else yields nothing.
    let (code, _) = send(
        &app,
        "POST",
        "/api/reset",
        Some(json!({ "targets": ["002:031"], "value": 1 })),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    let (code, _) = send(&app, "POST", "/api/reset", Some(json!({ "value": 1 }))).await;
    assert_eq!(code, StatusCode::ACCEPTED);
    let status = wait_for_state(&app, "done").await;
    assert_eq!(status["last_reset"]["success"], 1);
    assert_eq!(status["last_reset"]["failure"], 0);
    assert!(std::fs::read_to_string(&doc).unwrap().contains(">1<"));

    let (_, body) = send(&app, "GET", "/api/results", None).await;
    let groups: Value = serde_json::from_slice(&body).unwrap();
    let unit = groups[0]["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["id"]["unit"] == 32)
        .unwrap()
        .clone();
    assert_eq!(unit["config"]["value"], 1);

    // The log view is fed asynchronously; give it a moment to catch up.
    for _ in 0..100 {
        let (_, body) = send(&app, "GET", "/api/log", None).await;
        let log: Value = serde_json::from_slice(&body).unwrap();
        if log
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["message"] == "Reset operation completed: 1 successful, 0 failed")
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("reset summary never reached /api/log");
}

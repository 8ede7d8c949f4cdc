//! End-to-end tests for the HTTP adapter: matching, the stateful REST
//! bridge, custom-operation invocation, and audit capture.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use mockgrid_core::audit::{AuditEntry, AuditEvent, AuditLogger};
use mockgrid_core::config::model::Collection;
use mockgrid_core::registry::Registry;
use mockgrid_core::Result;
use mockgrid_http::{build_router, AppState, AuditPipeline};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const COLLECTION: &str = r#"
version: "1.0"
mocks:
  - id: exact-user
    http:
      matcher:
        method: GET
        path: /users/42
      response:
        status: 200
        body:
          source: exact
  - id: pattern-user
    http:
      matcher:
        method: GET
        pathPattern: "^/users/(?P<id>\\d+)$"
      response:
        status: 200
        body:
          source: pattern
          user: "{{path.id}}"
  - id: tail-marker
    http:
      matcher:
        method: POST
        path: /bulk
        bodyContains: "END-MARKER"
      response:
        status: 202
statefulResources:
  - name: users
    basePath: /api/users
    maxItems: 2
    seed:
      - id: u1
        name: A
  - name: accounts
    seed:
      - id: a
        bal: 100
      - id: b
        bal: 0
customOperations:
  - name: TransferFunds
    consistency: atomic
    steps:
      - kind: read
        resource: accounts
        id: input.from
        as: source
      - kind: read
        resource: accounts
        id: input.to
        as: target
      - kind: update
        resource: accounts
        id: input.from
        set:
          bal: source.bal - input.amount
        as: debited
      - kind: update
        resource: accounts
        id: input.to
        set:
          bal: target.bal + input.amount
        as: credited
    response:
      from: debited.bal
      to: credited.bal
"#;

/// Captures every audit entry, with sink-assigned sequence numbers.
struct RecordingSink {
    entries: Mutex<Vec<AuditEntry>>,
    sequence: Mutex<u64>,
}

impl RecordingSink {
    fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sequence: Mutex::new(0),
        }
    }

    fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("lock").clone()
    }
}

impl AuditLogger for RecordingSink {
    fn log(&self, mut entry: AuditEntry) -> Result<()> {
        let mut sequence = self.sequence.lock().expect("lock");
        *sequence += 1;
        entry.sequence = *sequence;
        self.entries.lock().expect("lock").push(entry);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn registry() -> Arc<Registry> {
    let collection: Collection = serde_yaml::from_str(COLLECTION).expect("collection");
    Arc::new(Registry::from_collection(&collection).expect("registry"))
}

fn app_with_sink(preview_limit: usize) -> (axum::Router, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let audit = Arc::new(AuditPipeline::new(sink.clone(), preview_limit));
    (build_router(AppState::new(registry(), audit)), sink)
}

fn app() -> axum::Router {
    app_with_sink(1024).0
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.expect("collect").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn exact_path_wins_over_pattern() {
    let response = app()
        .oneshot(Request::get("/users/42").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["source"], json!("exact"));
}

#[tokio::test]
async fn pattern_match_interpolates_path_params() {
    let response = app()
        .oneshot(Request::get("/users/7").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let body = json_body(response).await;
    assert_eq!(body["source"], json!("pattern"));
    assert_eq!(body["user"], json!("7"));
}

#[tokio::test]
async fn unmatched_request_is_404_with_not_found_kind() {
    let response = app()
        .oneshot(Request::get("/nothing/here").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["kind"], json!("not-found"));
}

#[tokio::test]
async fn stateful_rest_crud_and_capacity() {
    let app = app();

    // Seeded list.
    let response = app
        .clone()
        .oneshot(Request::get("/api/users").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.as_array().expect("array").len(), 1);

    // Create within capacity.
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/users")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"id":"u2","name":"B"}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    // Capacity cap of two.
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/users")
                .body(Body::from(r#"{"id":"u3"}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["kind"], json!("capacity-exceeded"));

    // Merge-replace update.
    let response = app
        .clone()
        .oneshot(
            Request::put("/api/users/u1")
                .body(Body::from(r#"{"name":"A2"}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(json_body(response).await["name"], json!("A2"));

    // Delete, then the id is gone.
    let response = app
        .clone()
        .oneshot(Request::delete("/api/users/u2").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(Request::get("/api/users/u2").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Admin reset restores the seed.
    let response = app
        .clone()
        .oneshot(
            Request::post("/__mockgrid/resources/users/reset")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(Request::get("/api/users").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let list = json_body(response).await;
    assert_eq!(list.as_array().expect("array").len(), 1);
    assert_eq!(list[0]["name"], json!("A"));
}

#[tokio::test]
async fn custom_operation_invocation() {
    let app = app();

    let response = app
        .clone()
        .oneshot(
            Request::post("/__mockgrid/operations/TransferFunds")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"from":"a","to":"b","amount":30}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"from": 70, "to": 30}));

    let response = app
        .oneshot(
            Request::post("/__mockgrid/operations/NoSuchOp")
                .body(Body::from("{}"))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["kind"], json!("not-found"));
}

#[tokio::test]
async fn audit_trace_orders_request_before_response() {
    let (app, sink) = app_with_sink(1024);

    let response = app
        .oneshot(Request::get("/users/42").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let entries = sink.entries();
    let received = entries
        .iter()
        .find(|e| e.event == AuditEvent::RequestReceived)
        .expect("request.received");
    let sent = entries
        .iter()
        .find(|e| e.event == AuditEvent::ResponseSent)
        .expect("response.sent");
    let matched = entries
        .iter()
        .find(|e| e.event == AuditEvent::MockMatched)
        .expect("mock.matched");

    assert!(received.sequence < sent.sequence);
    assert_eq!(received.trace_id, sent.trace_id);
    assert_eq!(matched.trace_id, sent.trace_id);
    assert_eq!(matched.mock.as_ref().expect("mock info").id, "exact-user");
    assert_eq!(sent.response.as_ref().expect("response info").status, 200);
}

#[tokio::test]
async fn body_preview_is_bounded_and_handler_sees_full_body() {
    let (app, sink) = app_with_sink(256);

    // 10 MiB of filler with the matcher's marker at the very end: the mock
    // only matches when the downstream handler received every byte.
    let mut body = vec![b'x'; 10 * 1024 * 1024];
    body.extend_from_slice(b"END-MARKER");
    let body_size = body.len() as u64;

    let response = app
        .oneshot(Request::post("/bulk").body(Body::from(body)).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let entries = sink.entries();
    let received = entries
        .iter()
        .find(|e| e.event == AuditEvent::RequestReceived)
        .expect("request.received");
    let request = received.request.as_ref().expect("request info");
    assert_eq!(request.body_preview.len(), 256);
    assert_eq!(request.body_size, body_size);
}

#[tokio::test]
async fn oversized_body_is_rejected_when_capped() {
    let sink = Arc::new(RecordingSink::new());
    let audit = Arc::new(AuditPipeline::new(sink.clone(), 1024));
    let state = AppState::new(registry(), audit).with_max_body_size(1024);
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::post("/bulk")
                .body(Body::from(vec![b'z'; 4096]))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let entries = sink.entries();
    assert!(entries.iter().any(|e| e.event == AuditEvent::Error));
}

#[tokio::test]
async fn preview_equals_body_at_exactly_the_cap() {
    let (app, sink) = app_with_sink(64);

    let body = "y".repeat(64);
    let response = app
        .oneshot(Request::get("/users/42").body(Body::from(body.clone())).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let entries = sink.entries();
    let received = entries
        .iter()
        .find(|e| e.event == AuditEvent::RequestReceived)
        .expect("request.received");
    let request = received.request.as_ref().expect("request info");
    assert_eq!(request.body_preview, body);
    assert_eq!(request.body_size, 64);
}

//! Data-plane and administrative request handlers.
//!
//! The fallback handler dispatches in order: stateful REST bridge, then the
//! matcher, then a 404 with a `mock.not_found` audit event. Routing goes
//! through the current registry snapshot on every request, so a hot reload
//! is picked up without rebuilding the router.

use crate::middleware::parse_query;
use crate::render::render_response;
use crate::state::{AppState, TraceContext};
use axum::body::{Body, Bytes};
use axum::extract::{Path, Request, State};
use axum::http::{header, Method, Response, StatusCode};
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use mockgrid_core::audit::{AuditEntry, AuditEvent, MockInfo};
use mockgrid_core::error::Error;
use mockgrid_core::matching::RequestEnvelope;
use mockgrid_core::registry::RegistrySnapshot;
use mockgrid_core::stateful::ResourceStore;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Fallback handler serving mock traffic and the stateful REST bridge.
pub async fn handle_request(State(state): State<AppState>, req: Request) -> Response<Body> {
    let trace_id = req
        .extensions()
        .get::<TraceContext>()
        .map(|t| t.trace_id.clone())
        .unwrap_or_else(AuditEntry::new_trace_id);

    let (parts, body) = req.into_parts();
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    };

    let snapshot = state.registry.snapshot();
    let path = parts.uri.path().to_string();

    if let Some(response) = try_stateful(&snapshot, &parts.method, &path, &body_bytes) {
        return response;
    }

    let mut envelope = RequestEnvelope::new(parts.method.as_str(), path.clone())
        .with_body(body_bytes.to_vec());
    envelope.query = parse_query(parts.uri.query());
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            envelope
                .headers
                .insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }

    match snapshot.match_request(&envelope) {
        Some(outcome) => {
            let mut matched = AuditEntry::new(trace_id, AuditEvent::MockMatched);
            matched.mock = Some(MockInfo {
                id: outcome.mock.id.clone(),
                mock_type: Some(outcome.mock.resolved_type().id_prefix().to_string()),
            });
            state.audit.emit(matched);

            let http = outcome.mock.http.as_ref();
            match http {
                Some(spec) => render_response(&spec.response, &outcome.path_params).await,
                None => error_response(&Error::validation(
                    outcome.mock.id.clone(),
                    "matched mock has no http spec",
                )),
            }
        }
        None => {
            debug!(method = %parts.method, path = %path, "no mock matched");
            state
                .audit
                .emit(AuditEntry::new(trace_id, AuditEvent::MockNotFound));
            json_response(
                StatusCode::NOT_FOUND,
                &json!({"error": "no mock matched the request", "kind": "not-found"}),
            )
        }
    }
}

/// REST bridge over stateful resources with a non-empty base path:
/// `GET|POST /base` and `GET|PUT|DELETE /base/{id}`.
fn try_stateful(
    snapshot: &RegistrySnapshot,
    method: &Method,
    path: &str,
    body: &Bytes,
) -> Option<Response<Body>> {
    for store in snapshot.rest_resources() {
        let base = store.base_path();
        if path == base {
            return Some(match method.as_str() {
                "GET" => json_response(StatusCode::OK, &Value::Array(store.list())),
                "POST" => match parse_body(body) {
                    Ok(value) => match store.create(value) {
                        Ok(created) => json_response(StatusCode::CREATED, &created),
                        Err(e) => error_response(&e),
                    },
                    Err(response) => response,
                },
                _ => method_not_allowed(),
            });
        }

        if let Some(id) = path.strip_prefix(base).and_then(|rest| rest.strip_prefix('/')) {
            if id.is_empty() || id.contains('/') {
                continue;
            }
            return Some(item_response(store, method, id, body));
        }
    }
    None
}

fn item_response(store: &ResourceStore, method: &Method, id: &str, body: &Bytes) -> Response<Body> {
    match method.as_str() {
        "GET" => match store.get(id) {
            Ok(value) => json_response(StatusCode::OK, &value),
            Err(e) => error_response(&e),
        },
        "PUT" => match parse_body(body) {
            Ok(patch) => match store.update(id, patch) {
                Ok(updated) => json_response(StatusCode::OK, &updated),
                Err(e) => error_response(&e),
            },
            Err(response) => response,
        },
        "DELETE" => match store.delete(id) {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(e) => error_response(&e),
        },
        _ => method_not_allowed(),
    }
}

/// Invoke a custom operation: `POST /__mockgrid/operations/{name}` with a
/// JSON input object.
pub async fn invoke_operation(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response<Body> {
    let input = if body.is_empty() {
        json!({})
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &json!({"error": format!("invalid input JSON: {e}"), "kind": "validation"}),
                )
            }
        }
    };

    let cancel = CancellationToken::new();
    match state.registry.invoke_operation(&name, input, &cancel) {
        Ok(response) => json_response(StatusCode::OK, &response),
        Err(e) => error_response(&e),
    }
}

/// Restore a stateful resource to its seed:
/// `POST /__mockgrid/resources/{name}/reset`.
pub async fn reset_resource(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response<Body> {
    let snapshot = state.registry.snapshot();
    match snapshot.resource(&name) {
        Some(store) => {
            store.reset();
            StatusCode::NO_CONTENT.into_response()
        }
        None => error_response(&Error::UnknownResource { name }),
    }
}

fn parse_body(body: &Bytes) -> std::result::Result<Value, Response<Body>> {
    serde_json::from_slice(body).map_err(|e| {
        json_response(
            StatusCode::BAD_REQUEST,
            &json!({"error": format!("invalid JSON body: {e}"), "kind": "validation"}),
        )
    })
}

fn method_not_allowed() -> Response<Body> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &json!({"error": "method not supported on this resource", "kind": "validation"}),
    )
}

fn json_response(status: StatusCode, value: &Value) -> Response<Body> {
    let body = serde_json::to_vec(value).unwrap_or_default();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Translate core errors into the adapter's native error shape.
pub(crate) fn error_response(error: &Error) -> Response<Body> {
    let (status, kind) = match error {
        Error::NotFound { .. }
        | Error::ItemNotFound { .. }
        | Error::UnknownResource { .. }
        | Error::UnknownOperation { .. } => (StatusCode::NOT_FOUND, "not-found"),
        Error::Validation { .. } => (StatusCode::BAD_REQUEST, "validation"),
        Error::InvalidSyntax { .. } => (StatusCode::BAD_REQUEST, "invalid-syntax"),
        Error::Compilation { .. } => (StatusCode::BAD_REQUEST, "compilation-error"),
        Error::CapacityExceeded { .. } => (StatusCode::CONFLICT, "capacity-exceeded"),
        Error::DuplicateId { .. } => (StatusCode::CONFLICT, "duplicate-id"),
        Error::PartialProgress { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "partial-progress"),
        Error::Cancelled => (StatusCode::INTERNAL_SERVER_ERROR, "cancelled"),
        Error::Evaluation { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "evaluation-error"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    json_response(status, &json!({"error": error.to_string(), "kind": kind}))
}

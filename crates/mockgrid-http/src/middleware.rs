//! Audit capture middleware.
//!
//! For every request: a fresh trace id, a bounded request-body preview with
//! the body handed intact to the downstream handler, a `request.received`
//! entry before handling, and a `response.sent` entry carrying the elapsed
//! time once the response body has been captured. Sink failures never fail
//! the request.

use crate::state::{AppState, TraceContext};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use http_body_util::BodyExt;
use mockgrid_core::audit::{
    body_preview, AuditEntry, AuditEvent, ClientInfo, RequestInfo, ResponseInfo,
};
use std::collections::HashMap;
use std::time::Instant;
use tracing::info;

/// Capture one request/response exchange around the downstream handler.
pub async fn audit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let trace_id = AuditEntry::new_trace_id();

    let (parts, body) = req.into_parts();
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => bytes::Bytes::new(),
    };

    if let Some(limit) = state.max_body_size {
        if body_bytes.len() > limit {
            let mut rejected = AuditEntry::new(trace_id, AuditEvent::Error);
            rejected.metadata.insert(
                "reason".to_string(),
                format!("request body of {} bytes exceeds the {limit} byte cap", body_bytes.len()),
            );
            state.audit.emit(rejected);
            return Response::builder()
                .status(axum::http::StatusCode::PAYLOAD_TOO_LARGE)
                .body(Body::empty())
                .unwrap_or_default();
        }
    }

    let method = parts.method.to_string();
    let path = parts.uri.path().to_string();
    let query = parse_query(parts.uri.query());
    let headers = header_map(&parts.headers);
    let client = client_info(&parts.headers);

    let mut received = AuditEntry::new(trace_id.clone(), AuditEvent::RequestReceived);
    received.request = Some(RequestInfo {
        method: method.clone(),
        path: path.clone(),
        query,
        headers,
        body_preview: body_preview(&body_bytes, state.audit.preview_limit()),
        body_size: body_bytes.len() as u64,
    });
    received.client = client.clone();
    state.audit.emit(received);

    // Reassemble the request so the handler sees the body intact.
    let mut req = Request::from_parts(parts, Body::from(body_bytes));
    req.extensions_mut().insert(TraceContext {
        trace_id: trace_id.clone(),
    });

    let response = next.run(req).await;

    // Capture the response body for the preview, then rebuild the response.
    let (parts, body) = response.into_parts();
    let response_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => bytes::Bytes::new(),
    };

    let elapsed = started.elapsed();
    let status = parts.status.as_u16();
    let content_type = parts
        .headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut sent = AuditEntry::new(trace_id, AuditEvent::ResponseSent);
    sent.response = Some(ResponseInfo {
        status,
        content_type,
        body_preview: body_preview(&response_bytes, state.audit.preview_limit()),
        body_size: response_bytes.len() as u64,
        duration_ms: elapsed.as_millis() as u64,
        duration_ns: elapsed.as_nanos() as u64,
    });
    sent.client = client;
    state.audit.emit(sent);

    info!(
        method = %method,
        path = %path,
        status,
        duration_ms = elapsed.as_millis() as u64,
        "request processed"
    );

    Response::from_parts(parts, Body::from(response_bytes))
}

/// Decode query parameters from the raw query string.
pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn client_info(headers: &HeaderMap) -> Option<ClientInfo> {
    let ip = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if ip.is_none() && user_agent.is_none() {
        None
    } else {
        Some(ClientInfo { ip, user_agent })
    }
}

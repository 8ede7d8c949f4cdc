//! Trace-correlated request/response audit capture.
//!
//! Every inbound request gets a fresh trace id; the entries it produces
//! share that id and are written to one or more sinks as newline-delimited
//! JSON. Sequences are strictly increasing per sink and body previews are
//! bounded, while the full body size is always reported. Sink failures are
//! aggregated and never reach the request path.

mod logger;
pub mod registry;

pub use logger::{
    AuditLogger, FanoutError, FileAuditLogger, MultiAuditLogger, NoopAuditLogger,
    StdoutAuditLogger,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default cap on captured body previews, in bytes
pub const DEFAULT_BODY_PREVIEW_LIMIT: usize = 1024;

/// What an audit entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEvent {
    /// A request arrived and its body was captured
    #[serde(rename = "request.received")]
    RequestReceived,
    /// The response was written back to the client
    #[serde(rename = "response.sent")]
    ResponseSent,
    /// The matcher selected a mock
    #[serde(rename = "mock.matched")]
    MockMatched,
    /// No mock was eligible for the request
    #[serde(rename = "mock.not_found")]
    MockNotFound,
    /// The request was forwarded to an upstream
    #[serde(rename = "proxy.forwarded")]
    ProxyForwarded,
    /// An upstream response was relayed
    #[serde(rename = "proxy.response")]
    ProxyResponse,
    /// A WebSocket connection opened
    #[serde(rename = "websocket.open")]
    WebSocketOpen,
    /// A WebSocket connection closed
    #[serde(rename = "websocket.close")]
    WebSocketClose,
    /// A WebSocket message was exchanged
    #[serde(rename = "websocket.message")]
    WebSocketMessage,
    /// A server-sent-event stream started
    #[serde(rename = "sse.stream_start")]
    SseStreamStart,
    /// A server-sent-event stream ended
    #[serde(rename = "sse.stream_end")]
    SseStreamEnd,
    /// One server-sent event was written
    #[serde(rename = "sse.event_sent")]
    SseEventSent,
    /// Request handling failed
    #[serde(rename = "error")]
    Error,
}

/// Captured request envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Query parameters
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub query: HashMap<String, String>,
    /// Request headers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Body preview, truncated to the configured cap
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body_preview: String,
    /// True size of the body in bytes, regardless of the preview cap
    #[serde(default)]
    pub body_size: u64,
}

/// Captured response envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    /// Status code written to the client (200 when never set)
    pub status: u16,
    /// Content type of the response body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Body preview, truncated to the configured cap
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body_preview: String,
    /// True size of the body in bytes
    #[serde(default)]
    pub body_size: u64,
    /// Elapsed handling time in whole milliseconds
    #[serde(default)]
    pub duration_ms: u64,
    /// Elapsed handling time in nanoseconds
    #[serde(default)]
    pub duration_ns: u64,
}

/// The mock an entry refers to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockInfo {
    /// Mock id
    pub id: String,
    /// Protocol family of the mock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_type: Option<String>,
}

/// The client an entry refers to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Remote address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// User agent header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// One audit log line.
///
/// Consumers must tolerate unknown fields; sinks assign `sequence` at write
/// time so it is strictly increasing per sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Per-sink strictly increasing sequence number
    #[serde(default)]
    pub sequence: u64,
    /// When the entry was produced
    pub timestamp: DateTime<Utc>,
    /// Identifier shared by every entry of one inbound request
    pub trace_id: String,
    /// What happened
    pub event: AuditEvent,
    /// Captured request, on request-scoped events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestInfo>,
    /// Captured response, on response-scoped events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseInfo>,
    /// The mock involved, when one was selected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock: Option<MockInfo>,
    /// The calling client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientInfo>,
    /// Free-form extra fields
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl AuditEntry {
    /// Create an entry for a trace, stamped with the current time.
    pub fn new<T: Into<String>>(trace_id: T, event: AuditEvent) -> Self {
        Self {
            sequence: 0,
            timestamp: Utc::now(),
            trace_id: trace_id.into(),
            event,
            request: None,
            response: None,
            mock: None,
            client: None,
            metadata: HashMap::new(),
        }
    }

    /// Generate a fresh trace id for an inbound request.
    pub fn new_trace_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Truncate a body to a bounded lossy-UTF-8 preview.
///
/// The preview never exceeds `limit` bytes of input; the caller reports the
/// true size separately.
pub fn body_preview(body: &[u8], limit: usize) -> String {
    let cut = body.len().min(limit);
    String::from_utf8_lossy(&body[..cut]).into_owned()
}

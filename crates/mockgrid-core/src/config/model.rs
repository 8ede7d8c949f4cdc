//! Typed configuration entities: mocks, collections, stateful resources,
//! custom operations.
//!
//! These are the shapes users write in JSON/YAML files. Loading, schema
//! validation, and identifier auto-fill live in [`crate::config::loader`]
//! and [`crate::config::validate`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Protocol family a mock belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockType {
    /// HTTP request/response mock
    Http,
    /// WebSocket endpoint mock
    Websocket,
    /// GraphQL operation mock
    Graphql,
    /// gRPC method mock
    Grpc,
    /// SOAP envelope mock
    Soap,
    /// MQTT topic mock
    Mqtt,
    /// OAuth token endpoint mock
    Oauth,
}

impl MockType {
    /// Prefix used when auto-generating ids for mocks of this type
    pub fn id_prefix(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Websocket => "ws",
            Self::Graphql => "graphql",
            Self::Grpc => "grpc",
            Self::Soap => "soap",
            Self::Mqtt => "mqtt",
            Self::Oauth => "oauth",
        }
    }
}

/// A declared mock: a matcher paired with a canned response.
///
/// Exactly one of the per-protocol spec fields may be populated, and it must
/// agree with `mock_type` when that is set. A missing `mock_type` is inferred
/// from whichever spec is present.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Mock {
    /// Unique identifier; auto-generated with a type prefix when omitted
    #[serde(default)]
    pub id: String,
    /// Protocol family; inferred from the populated spec when absent
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mock_type: Option<MockType>,
    /// Tri-state enablement: unset means enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Workspace tag used by project configs to group mocks
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workspace: String,
    /// Selection priority; higher wins over score and specificity
    #[serde(default)]
    pub priority: i32,
    /// HTTP matcher + response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpMockSpec>,
    /// WebSocket endpoint spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub websocket: Option<WebSocketMockSpec>,
    /// GraphQL spec, interpreted by the GraphQL adapter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphql: Option<Value>,
    /// gRPC spec, interpreted by the gRPC adapter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc: Option<Value>,
    /// SOAP spec, interpreted by the SOAP adapter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soap: Option<Value>,
    /// MQTT spec, interpreted by the MQTT adapter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqtt: Option<Value>,
    /// OAuth spec, interpreted by the OAuth adapter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<Value>,
}

impl Mock {
    /// Whether this mock answers traffic (unset `enabled` means yes)
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// The mock types whose spec field is populated
    pub fn populated_specs(&self) -> Vec<MockType> {
        let mut present = Vec::new();
        if self.http.is_some() {
            present.push(MockType::Http);
        }
        if self.websocket.is_some() {
            present.push(MockType::Websocket);
        }
        if self.graphql.is_some() {
            present.push(MockType::Graphql);
        }
        if self.grpc.is_some() {
            present.push(MockType::Grpc);
        }
        if self.soap.is_some() {
            present.push(MockType::Soap);
        }
        if self.mqtt.is_some() {
            present.push(MockType::Mqtt);
        }
        if self.oauth.is_some() {
            present.push(MockType::Oauth);
        }
        present
    }

    /// Resolved mock type: the declared one, else inferred from the populated
    /// spec, defaulting to HTTP
    pub fn resolved_type(&self) -> MockType {
        self.mock_type
            .or_else(|| self.populated_specs().first().copied())
            .unwrap_or(MockType::Http)
    }

    /// Fill in a generated id and inferred type where they were omitted
    pub fn ensure_identity(&mut self) {
        let resolved = self.resolved_type();
        if self.mock_type.is_none() {
            self.mock_type = Some(resolved);
        }
        if self.id.is_empty() {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            self.id = format!("{}_{}", resolved.id_prefix(), &suffix[..8]);
        }
    }
}

/// HTTP mock: a request matcher and the response to produce
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMockSpec {
    /// Predicates a request must satisfy
    #[serde(default)]
    pub matcher: HttpMatcher,
    /// Canned response description
    #[serde(default)]
    pub response: HttpResponseSpec,
}

/// Request predicates of an HTTP mock.
///
/// Every specified predicate must hold for the mock to stay eligible;
/// unspecified predicates are ignored. `path` and `path_pattern` are
/// mutually exclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMatcher {
    /// HTTP method, compared case-insensitively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Exact request path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Regular expression over the request path; named capture groups become
    /// path parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_pattern: Option<String>,
    /// Required header values (header names are case-insensitive)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Required query parameter values
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub query: HashMap<String, String>,
    /// Substring the raw body must contain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_contains: Option<String>,
    /// Exact raw body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_equals: Option<String>,
    /// Regular expression over the raw body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_pattern: Option<String>,
    /// JSONPath predicates over the parsed body: expression to expected
    /// literal, or the sentinel `{"exists": true}` for presence
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub body_jsonpath: HashMap<String, Value>,
}

impl HttpMatcher {
    /// Number of distinct predicate kinds this matcher specifies.
    ///
    /// Used as the specificity tie-breaker during selection.
    pub fn specificity(&self) -> u32 {
        let mut kinds = 0;
        if self.method.is_some() {
            kinds += 1;
        }
        if self.path.is_some() {
            kinds += 1;
        }
        if self.path_pattern.is_some() {
            kinds += 1;
        }
        if !self.headers.is_empty() {
            kinds += 1;
        }
        if !self.query.is_empty() {
            kinds += 1;
        }
        if self.body_contains.is_some() {
            kinds += 1;
        }
        if self.body_equals.is_some() {
            kinds += 1;
        }
        if self.body_pattern.is_some() {
            kinds += 1;
        }
        if !self.body_jsonpath.is_empty() {
            kinds += 1;
        }
        kinds
    }
}

fn default_status() -> u16 {
    200
}

/// Canned HTTP response of a mock
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponseSpec {
    /// Status code, 100-599
    #[serde(default = "default_status")]
    pub status: u16,
    /// Response headers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Inline response body; mutually exclusive with `body_file`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Path of a file to serve as the body; mutually exclusive with `body`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_file: Option<String>,
    /// Artificial delay before the response is written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl Default for HttpResponseSpec {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: None,
            body_file: None,
            delay_ms: None,
        }
    }
}

/// WebSocket endpoint mock: canned replies on a path
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketMockSpec {
    /// Endpoint path clients connect to
    pub path: String,
    /// Canned message rules, evaluated in order
    #[serde(default)]
    pub messages: Vec<WsMessageRule>,
}

/// A single canned WebSocket reply rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsMessageRule {
    /// Substring the inbound message must contain; absent matches anything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,
    /// Text frame sent back when the rule matches
    pub respond: String,
    /// Delay before the reply is sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

/// Field type accepted by a stateful-resource validation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// JSON string
    String,
    /// JSON number
    Number,
    /// JSON boolean
    Boolean,
    /// JSON object
    Object,
    /// JSON array
    Array,
}

impl FieldType {
    /// Whether a JSON value is of this type
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// Per-field validation rule applied on create and update
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRule {
    /// Top-level field name the rule applies to
    pub field: String,
    /// Whether the field must be present
    #[serde(default)]
    pub required: bool,
    /// Expected JSON type when the field is present
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
}

/// Declaration of an in-memory CRUD resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatefulResourceConfig {
    /// Unique resource name
    pub name: String,
    /// REST mount point; empty means bridge-only access through adapters
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_path: String,
    /// Field holding an object's identifier
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Field linking an object to a parent resource item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_field: Option<String>,
    /// Capacity cap; zero means unbounded
    #[serde(default)]
    pub max_items: usize,
    /// Initial contents, preserved separately for reset
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seed: Vec<Value>,
    /// Field rules enforced on create and update
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation: Vec<FieldRule>,
}

fn default_id_field() -> String {
    "id".to_string()
}

/// Step kind of a custom operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Look up an object by id and bind it
    Read,
    /// Build a new object from `set` expressions and stage an insert
    Create,
    /// Overlay `set` expressions onto an existing object
    Update,
    /// Stage removal of an object by id
    Delete,
    /// Bind a plain computed value into the environment
    Set,
}

/// One step of a custom operation.
///
/// Each kind requires a subset of the fields; the compiler enforces the
/// combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStep {
    /// What the step does
    pub kind: StepKind,
    /// Target stateful resource (read/create/update/delete)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Expression producing the object id (read/update/delete)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Binding name for the object this step produces (read/create/update)
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub bind_as: Option<String>,
    /// Variable name bound by a `set` step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var: Option<String>,
    /// Expression producing the value of a `set` step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Field-name to expression map evaluated into object fields
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub set: IndexMap<String, String>,
}

/// Execution guarantee of a custom operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    /// Mutations apply incrementally; partial progress is visible on failure
    #[default]
    BestEffort,
    /// All mutations apply under combined locks, or none do
    Atomic,
}

/// A named multi-step expression pipeline over stateful resources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomOperationConfig {
    /// Unique operation name callable by adapters
    pub name: String,
    /// Execution guarantee; empty input normalizes to `best_effort`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub consistency: String,
    /// Ordered pipeline steps
    #[serde(default)]
    pub steps: Vec<OperationStep>,
    /// Response field to expression map evaluated after the last step
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub response: IndexMap<String, String>,
}

/// Free-form descriptive metadata of a collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetadata {
    /// Display name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Longer description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Audit capture settings of a server block
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    /// Whether request/response capture is on
    #[serde(default)]
    pub enabled: bool,
    /// NDJSON output file; stdout when empty and enabled
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file: String,
    /// Body preview cap in bytes
    #[serde(default = "default_body_preview")]
    pub max_body_preview: usize,
}

fn default_body_preview() -> usize {
    1024
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file: String::new(),
            max_body_preview: default_body_preview(),
        }
    }
}

/// Engine settings carried inside a collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerBlock {
    /// Listening port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Bind host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Upper bound on request body reads, in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_body_size: Option<usize>,
    /// Audit capture settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditConfig>,
}

/// Version tag every collection document must carry
pub const COLLECTION_VERSION: &str = "1.0";

/// A versioned document holding mocks plus optional server and stateful
/// configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    /// Format version; must equal [`COLLECTION_VERSION`]
    pub version: String,
    /// Descriptive metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CollectionMetadata>,
    /// Ordered mock list; order is the matcher's final tie-break
    #[serde(default)]
    pub mocks: Vec<Mock>,
    /// Engine settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerBlock>,
    /// In-memory CRUD resources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stateful_resources: Vec<StatefulResourceConfig>,
    /// Expression pipelines over the stateful resources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_operations: Vec<CustomOperationConfig>,
    /// Standalone WebSocket endpoints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub websockets: Vec<WebSocketMockSpec>,
}

impl Default for Collection {
    fn default() -> Self {
        Self {
            version: COLLECTION_VERSION.to_string(),
            metadata: None,
            mocks: Vec::new(),
            server: None,
            stateful_resources: Vec::new(),
            custom_operations: Vec::new(),
            websockets: Vec::new(),
        }
    }
}

impl Collection {
    /// Append another collection's contents, keeping this one's metadata and
    /// server block when already set
    pub fn merge(&mut self, other: Collection) {
        self.mocks.extend(other.mocks);
        self.stateful_resources.extend(other.stateful_resources);
        self.custom_operations.extend(other.custom_operations);
        self.websockets.extend(other.websockets);
        if self.metadata.is_none() {
            self.metadata = other.metadata;
        }
        if self.server.is_none() {
            self.server = other.server;
        }
    }
}

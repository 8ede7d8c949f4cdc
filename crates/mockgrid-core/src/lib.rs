//! # MockGrid Core
//!
//! Core engine for the MockGrid mock server fabric.
//!
//! This crate holds everything protocol adapters build on: configuration
//! loading with hot reload, deterministic request matching, in-memory
//! stateful resources with a custom-operation pipeline, and the audit
//! capture pipeline.
//!
//! ## Overview
//!
//! - **Configuration**: JSON/YAML collections and directory trees with
//!   environment substitution, schema validation, and id auto-fill
//! - **Hot reload**: a polling watcher over the loader's tracked files and
//!   a registry that swaps whole snapshots atomically
//! - **Matching**: specificity- and priority-ranked mock selection with
//!   header, query, and JSONPath body predicates
//! - **Stateful resources**: per-resource CRUD stores with seeds, capacity
//!   caps, and reset
//! - **Custom operations**: compiled multi-step expression pipelines with
//!   best-effort or atomic consistency
//! - **Audit**: trace-correlated, ordered, bounded request/response capture
//!   with multi-sink fan-out
//!
//! ## Quick start: matching against a loaded collection
//!
//! ```rust,no_run
//! use mockgrid_core::{load_path, Registry, RequestEnvelope, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let loaded = load_path("./mocks").await?;
//!     let registry = Registry::from_collection(&loaded.collection)?;
//!
//!     let request = RequestEnvelope::new("GET", "/users/42");
//!     let snapshot = registry.snapshot();
//!     if let Some(outcome) = snapshot.match_request(&request) {
//!         println!("matched mock {}", outcome.mock.id);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Related crates
//!
//! - `mockgrid-http`: HTTP protocol adapter (router building, response
//!   rendering, audit middleware)

pub mod audit;
pub mod config;
pub mod customop;
pub mod error;
pub mod matching;
pub mod registry;
pub mod stateful;
pub mod watcher;

pub use audit::{
    body_preview, AuditEntry, AuditEvent, AuditLogger, ClientInfo, FanoutError, FileAuditLogger,
    MockInfo, MultiAuditLogger, NoopAuditLogger, RequestInfo, ResponseInfo, StdoutAuditLogger,
    DEFAULT_BODY_PREVIEW_LIMIT,
};
pub use config::{
    load_path, load_path_with_options, save_collection, substitute_env, validate_collection,
    AuditConfig, Collection, Consistency, CustomOperationConfig, HttpMatcher, HttpMockSpec,
    HttpResponseSpec, LoadedCollection, LoaderOptions, Mock, MockType, OperationStep,
    ProjectConfig, ServerBlock, StatefulResourceConfig, StepKind, WebSocketMockSpec,
};
pub use customop::{
    compile_operation, CompileOptions, CompiledOperation, Fixtures, OperationWarning, ResourceMap,
};
pub use error::{Error, Result, ValidationFailure};
pub use matching::{match_request, CompiledHttpMock, MatchOutcome, RequestEnvelope};
pub use registry::{Registry, RegistrySnapshot};
pub use stateful::ResourceStore;
pub use watcher::{FileWatcher, WatchEvent, DEFAULT_POLL_INTERVAL};

//! Declarative configuration: typed entities, file loading, schema
//! validation, environment substitution, and the project descriptor.

pub mod env_subst;
pub mod loader;
pub mod model;
pub mod project;
pub mod validate;

pub use env_subst::{substitute_env, substitute_with};
pub use loader::{
    load_path, load_path_with_options, save_collection, FileLoadError, LoadedCollection,
    LoaderOptions,
};
pub use model::{
    AuditConfig, Collection, CollectionMetadata, Consistency, CustomOperationConfig, FieldRule,
    FieldType, HttpMatcher, HttpMockSpec, HttpResponseSpec, Mock, MockType, OperationStep,
    ServerBlock, StatefulResourceConfig, StepKind, WebSocketMockSpec, WsMessageRule,
    COLLECTION_VERSION,
};
pub use project::{
    AdminInstance, EngineInstance, MockRef, ProjectConfig, WorkspaceDef, PROJECT_VERSION,
};
pub use validate::validate_collection;

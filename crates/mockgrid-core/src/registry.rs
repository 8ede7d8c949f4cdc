//! The live registry: an atomically swappable snapshot of compiled mocks,
//! stateful stores, and custom operations.
//!
//! Reload is copy-on-write: the loader produces a collection, a full
//! snapshot is built and compiled from it, and then the current pointer is
//! swapped under a short write lock. Readers hold an `Arc` to whatever
//! snapshot was current when they started, so in-flight matches always
//! complete against a consistent view and the old snapshot is freed when
//! its last reader departs.

use crate::config::model::{Collection, ServerBlock, WebSocketMockSpec};
use crate::config::validate::validate_collection;
use crate::customop::{compile_operation, CompileOptions, CompiledOperation, ResourceMap};
use crate::error::{Error, Result};
use crate::matching::{match_request, CompiledHttpMock, MatchOutcome, RequestEnvelope};
use crate::stateful::ResourceStore;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// An immutable view of everything the engine serves at one point in time
#[derive(Debug)]
pub struct RegistrySnapshot {
    /// Compiled mocks in collection order
    pub mocks: Vec<CompiledHttpMock>,
    /// Stateful stores keyed by resource name
    pub resources: ResourceMap,
    /// Compiled custom operations keyed by name
    pub operations: HashMap<String, Arc<CompiledOperation>>,
    /// Engine settings from the collection's server block
    pub server: Option<ServerBlock>,
    /// Standalone WebSocket endpoints
    pub websockets: Vec<WebSocketMockSpec>,
}

impl RegistrySnapshot {
    /// Snapshot with nothing registered.
    pub fn empty() -> Self {
        Self {
            mocks: Vec::new(),
            resources: HashMap::new(),
            operations: HashMap::new(),
            server: None,
            websockets: Vec::new(),
        }
    }

    /// Build and compile a snapshot from a validated collection.
    ///
    /// Every mock pattern and operation expression is compiled here, and
    /// each operation's referenced resources are checked against the stores
    /// the same collection declares.
    pub fn from_collection(collection: &Collection) -> Result<Self> {
        let failures = validate_collection(collection);
        if !failures.is_empty() {
            return Err(Error::validation_all(failures));
        }

        let mut mocks = Vec::with_capacity(collection.mocks.len());
        for mock in &collection.mocks {
            mocks.push(CompiledHttpMock::compile(mock.clone())?);
        }

        let mut resources: ResourceMap = HashMap::new();
        for config in &collection.stateful_resources {
            resources.insert(
                config.name.clone(),
                Arc::new(ResourceStore::new(config.clone())),
            );
        }

        let mut operations = HashMap::new();
        for config in &collection.custom_operations {
            let (compiled, warnings) = compile_operation(config, &CompileOptions::default())?;
            for warning in warnings {
                warn!(operation = %config.name, step = ?warning.step, "{}", warning.message);
            }
            compiled.check_resources(&resources)?;
            operations.insert(config.name.clone(), Arc::new(compiled));
        }

        Ok(Self {
            mocks,
            resources,
            operations,
            server: collection.server.clone(),
            websockets: collection.websockets.clone(),
        })
    }

    /// Match a request against this snapshot's mocks.
    pub fn match_request(&self, request: &RequestEnvelope) -> Option<MatchOutcome<'_>> {
        match_request(request, &self.mocks)
    }

    /// Look up a stateful store by resource name.
    pub fn resource(&self, name: &str) -> Option<&Arc<ResourceStore>> {
        self.resources.get(name)
    }

    /// Look up a compiled operation by name.
    pub fn operation(&self, name: &str) -> Option<&Arc<CompiledOperation>> {
        self.operations.get(name)
    }

    /// Stores mounted at a REST base path, longest path first so nested
    /// mounts win prefix matching.
    pub fn rest_resources(&self) -> Vec<&Arc<ResourceStore>> {
        let mut mounted: Vec<&Arc<ResourceStore>> = self
            .resources
            .values()
            .filter(|store| !store.base_path().is_empty())
            .collect();
        mounted.sort_by_key(|store| std::cmp::Reverse(store.base_path().len()));
        mounted
    }
}

/// Holder of the current snapshot with atomic swap semantics
pub struct Registry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl Registry {
    /// Registry starting from an empty snapshot.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(RegistrySnapshot::empty())),
        }
    }

    /// Build a registry directly from a collection.
    pub fn from_collection(collection: &Collection) -> Result<Self> {
        let registry = Self::new();
        registry.reload(collection)?;
        Ok(registry)
    }

    /// The current snapshot. The returned `Arc` stays valid across swaps.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Replace the current snapshot, returning the previous one.
    pub fn swap(&self, snapshot: RegistrySnapshot) -> Arc<RegistrySnapshot> {
        let mut current = self.current.write();
        std::mem::replace(&mut *current, Arc::new(snapshot))
    }

    /// Build, compile, and swap in a fresh snapshot from a collection.
    ///
    /// The swap only happens when the whole snapshot validated and
    /// compiled; on any failure the previous snapshot keeps serving.
    pub fn reload(&self, collection: &Collection) -> Result<()> {
        let snapshot = RegistrySnapshot::from_collection(collection)?;
        info!(
            mocks = snapshot.mocks.len(),
            resources = snapshot.resources.len(),
            operations = snapshot.operations.len(),
            "registry snapshot swapped"
        );
        self.swap(snapshot);
        Ok(())
    }

    /// Invoke a custom operation by name against the current snapshot.
    pub fn invoke_operation(
        &self,
        name: &str,
        input: Value,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let snapshot = self.snapshot();
        let operation = snapshot
            .operation(name)
            .ok_or_else(|| Error::UnknownOperation {
                name: name.to_string(),
            })?;
        operation.execute(input, &snapshot.resources, cancel)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{
        CustomOperationConfig, HttpMatcher, HttpMockSpec, HttpResponseSpec, Mock, OperationStep,
        StatefulResourceConfig, StepKind,
    };
    use indexmap::IndexMap;
    use serde_json::json;

    fn collection() -> Collection {
        Collection {
            mocks: vec![Mock {
                id: "ping".to_string(),
                http: Some(HttpMockSpec {
                    matcher: HttpMatcher {
                        path: Some("/ping".to_string()),
                        ..Default::default()
                    },
                    response: HttpResponseSpec::default(),
                }),
                ..Default::default()
            }],
            stateful_resources: vec![StatefulResourceConfig {
                name: "users".to_string(),
                base_path: "/api/users".to_string(),
                id_field: "id".to_string(),
                parent_field: None,
                max_items: 0,
                seed: vec![json!({"id": "u1"})],
                validation: vec![],
            }],
            custom_operations: vec![CustomOperationConfig {
                name: "Touch".to_string(),
                consistency: String::new(),
                steps: vec![OperationStep {
                    kind: StepKind::Read,
                    resource: Some("users".to_string()),
                    id: Some("input.id".to_string()),
                    bind_as: Some("found".to_string()),
                    var: None,
                    value: None,
                    set: IndexMap::new(),
                }],
                response: IndexMap::from([("user".to_string(), "found.id".to_string())]),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_snapshot_from_collection() {
        let snapshot = RegistrySnapshot::from_collection(&collection()).expect("build");
        assert_eq!(snapshot.mocks.len(), 1);
        assert!(snapshot.resource("users").is_some());
        assert!(snapshot.operation("Touch").is_some());
        assert_eq!(snapshot.rest_resources().len(), 1);
    }

    #[test]
    fn test_operation_referencing_missing_resource_fails_build() {
        let mut c = collection();
        c.stateful_resources.clear();
        let err = RegistrySnapshot::from_collection(&c).expect_err("must fail");
        assert!(matches!(err, Error::UnknownResource { .. }));
    }

    #[test]
    fn test_swap_preserves_old_readers() {
        let registry = Registry::from_collection(&collection()).expect("build");
        let old = registry.snapshot();

        let mut updated = collection();
        updated.mocks[0].id = "pong".to_string();
        registry.reload(&updated).expect("reload");

        // The pre-swap reader still sees its consistent view.
        assert_eq!(old.mocks[0].mock.id, "ping");
        assert_eq!(registry.snapshot().mocks[0].mock.id, "pong");
    }

    #[test]
    fn test_failed_reload_keeps_previous_snapshot() {
        let registry = Registry::from_collection(&collection()).expect("build");

        let mut broken = collection();
        broken.version = "9.9".to_string();
        assert!(registry.reload(&broken).is_err());

        assert_eq!(registry.snapshot().mocks[0].mock.id, "ping");
    }

    #[test]
    fn test_invoke_operation() {
        let registry = Registry::from_collection(&collection()).expect("build");
        let response = registry
            .invoke_operation("Touch", json!({"id": "u1"}), &CancellationToken::new())
            .expect("invoke");
        assert_eq!(response, json!({"user": "u1"}));

        let err = registry
            .invoke_operation("Missing", json!({}), &CancellationToken::new())
            .expect_err("unknown");
        assert!(matches!(err, Error::UnknownOperation { .. }));
    }

    #[test]
    fn test_match_through_snapshot() {
        let registry = Registry::from_collection(&collection()).expect("build");
        let snapshot = registry.snapshot();
        let outcome = snapshot.match_request(&RequestEnvelope::new("GET", "/ping"));
        assert_eq!(outcome.expect("match").mock.id, "ping");
    }
}

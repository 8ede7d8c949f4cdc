//! The per-resource keyed collection behind stateful mocks.

use crate::config::model::StatefulResourceConfig;
use crate::error::{Error, Result, ValidationFailure};
use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockWriteGuard};
use serde_json::Value;
use tracing::debug;

/// An insertion-ordered id-to-object store for one stateful resource.
///
/// All operations are individually linearizable: readers take the shared
/// lock and return deep copies, writers take the exclusive lock. The
/// custom-operation engine reuses the `_locked` variants under its own
/// multi-resource guards.
#[derive(Debug)]
pub struct ResourceStore {
    config: StatefulResourceConfig,
    /// Seed contents normalized at construction; never mutated afterwards
    seed: IndexMap<String, Value>,
    items: RwLock<IndexMap<String, Value>>,
}

impl ResourceStore {
    /// Build a store from configuration, seeding its contents.
    ///
    /// Seed objects missing the id field get a generated id injected, the
    /// same way `create` treats new objects.
    pub fn new(config: StatefulResourceConfig) -> Self {
        let mut seed = IndexMap::new();
        for item in &config.seed {
            let mut object = item.clone();
            let id = id_from_value(&object, &config.id_field)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            set_id(&mut object, &config.id_field, &id);
            seed.insert(id, object);
        }
        let items = seed.clone();
        Self {
            config,
            seed,
            items: RwLock::new(items),
        }
    }

    /// Resource name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// REST mount point; empty means bridge-only access.
    pub fn base_path(&self) -> &str {
        &self.config.base_path
    }

    /// The resource's declared configuration.
    pub fn config(&self) -> &StatefulResourceConfig {
        &self.config
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Deep-copied snapshot of every object, in insertion order.
    pub fn list(&self) -> Vec<Value> {
        self.items.read().values().cloned().collect()
    }

    /// Deep copy of one object by id.
    pub fn get(&self, id: &str) -> Result<Value> {
        self.items.read().get(id).cloned().ok_or_else(|| Error::ItemNotFound {
            resource: self.config.name.clone(),
            id: id.to_string(),
        })
    }

    /// Insert a new object, assigning an id from the configured id field or
    /// generating one. Fails with capacity-exceeded at the configured cap
    /// and duplicate-id when the id already exists.
    pub fn create(&self, value: Value) -> Result<Value> {
        let mut items = self.items.write();
        self.create_locked(&mut items, value)
    }

    /// Merge-replace the top-level fields of an existing object.
    pub fn update(&self, id: &str, patch: Value) -> Result<Value> {
        let mut items = self.items.write();
        self.update_locked(&mut items, id, patch)
    }

    /// Remove an object by id.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut items = self.items.write();
        self.delete_locked(&mut items, id)
    }

    /// Replace the contents with a deep copy of the seed snapshot.
    pub fn reset(&self) {
        let mut items = self.items.write();
        *items = self.seed.clone();
        debug!(resource = %self.config.name, items = items.len(), "resource reset to seed");
    }

    /// Exclusive access to the underlying map, for multi-resource atomic
    /// pipelines that must hold several locks at once.
    pub(crate) fn write_guard(&self) -> RwLockWriteGuard<'_, IndexMap<String, Value>> {
        self.items.write()
    }

    pub(crate) fn create_locked(
        &self,
        items: &mut IndexMap<String, Value>,
        mut value: Value,
    ) -> Result<Value> {
        self.validate_object(&value)?;
        if self.config.max_items > 0 && items.len() >= self.config.max_items {
            return Err(Error::CapacityExceeded {
                resource: self.config.name.clone(),
                max_items: self.config.max_items,
            });
        }
        let id = id_from_value(&value, &self.config.id_field)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if items.contains_key(&id) {
            return Err(Error::DuplicateId { id });
        }
        set_id(&mut value, &self.config.id_field, &id);
        items.insert(id, value.clone());
        Ok(value)
    }

    pub(crate) fn update_locked(
        &self,
        items: &mut IndexMap<String, Value>,
        id: &str,
        patch: Value,
    ) -> Result<Value> {
        let Some(existing) = items.get_mut(id) else {
            return Err(Error::ItemNotFound {
                resource: self.config.name.clone(),
                id: id.to_string(),
            });
        };
        let Value::Object(patch_map) = patch else {
            return Err(Error::validation(
                self.config.name.clone(),
                "update patch must be a JSON object",
            ));
        };

        let mut merged = existing.clone();
        if let Value::Object(target) = &mut merged {
            for (field, value) in patch_map {
                target.insert(field, value);
            }
        }
        // The id field always reflects the key the object is stored under.
        set_id(&mut merged, &self.config.id_field, id);
        self.validate_object(&merged)?;

        *existing = merged.clone();
        Ok(merged)
    }

    pub(crate) fn delete_locked(&self, items: &mut IndexMap<String, Value>, id: &str) -> Result<()> {
        // shift_remove keeps list order stable for the remaining objects.
        items.shift_remove(id).map(|_| ()).ok_or_else(|| Error::ItemNotFound {
            resource: self.config.name.clone(),
            id: id.to_string(),
        })
    }

    pub(crate) fn get_locked(&self, items: &IndexMap<String, Value>, id: &str) -> Result<Value> {
        items.get(id).cloned().ok_or_else(|| Error::ItemNotFound {
            resource: self.config.name.clone(),
            id: id.to_string(),
        })
    }

    /// Field rules plus the parent-field soft constraint.
    fn validate_object(&self, value: &Value) -> Result<()> {
        let Value::Object(map) = value else {
            return Err(Error::validation(
                self.config.name.clone(),
                "stored objects must be JSON objects",
            ));
        };

        let mut failures = Vec::new();
        for rule in &self.config.validation {
            match map.get(&rule.field) {
                None | Some(Value::Null) => {
                    if rule.required {
                        failures.push(ValidationFailure::new(
                            rule.field.clone(),
                            "required field is missing",
                        ));
                    }
                }
                Some(present) => {
                    if let Some(expected) = rule.field_type {
                        if !expected.accepts(present) {
                            failures.push(ValidationFailure::new(
                                rule.field.clone(),
                                format!("expected {expected:?} value"),
                            ));
                        }
                    }
                }
            }
        }

        // The parent link is a soft constraint: absence is tolerated, but a
        // present value must be a scalar id.
        if let Some(parent_field) = &self.config.parent_field {
            if let Some(parent) = map.get(parent_field) {
                if !(parent.is_string() || parent.is_number()) {
                    failures.push(ValidationFailure::new(
                        parent_field.clone(),
                        "parent reference must be a string or number id",
                    ));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::validation_all(failures))
        }
    }
}

/// Extract an object's id through the configured id field.
fn id_from_value(value: &Value, id_field: &str) -> Option<String> {
    match value.get(id_field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn set_id(value: &mut Value, id_field: &str, id: &str) {
    if let Value::Object(map) = value {
        let keep_number = matches!(map.get(id_field), Some(Value::Number(_)));
        if !keep_number {
            map.insert(id_field.to_string(), Value::String(id.to_string()));
        }
    }
}

//! Custom-operation execution: best-effort and atomic pipelines, the
//! resource-existence check, and the fixture-backed dry run.

use crate::config::model::Consistency;
use crate::customop::compile::{CompiledOperation, CompiledStep, OperationWarning};
use crate::customop::expr::{eval_expr, eval_id_expr, CompiledExpr, Environment};
use crate::error::{Error, Result};
use crate::stateful::ResourceStore;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The live resource registry an operation executes against
pub type ResourceMap = HashMap<String, Arc<ResourceStore>>;

/// Seed data for dry runs: pre-bound variables and per-resource objects
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixtures {
    /// Bindings injected into the environment before the first step
    #[serde(default)]
    pub vars: HashMap<String, Value>,
    /// Resource name to id to object fixture data
    #[serde(default)]
    pub resources: HashMap<String, HashMap<String, Value>>,
}

impl CompiledOperation {
    /// Verify that every referenced resource exists in the live registry.
    pub fn check_resources(&self, resources: &ResourceMap) -> Result<()> {
        for name in &self.resources {
            if !resources.contains_key(name) {
                return Err(Error::UnknownResource { name: name.clone() });
            }
        }
        Ok(())
    }

    /// Execute the pipeline against live resources.
    ///
    /// Best-effort mode applies mutations as steps run; a failure after the
    /// first applied mutation surfaces as partial-progress. Atomic mode
    /// takes write locks on every referenced resource in lexicographic
    /// order, and a failure anywhere restores every resource to its
    /// value-of-record.
    pub fn execute(
        &self,
        input: Value,
        resources: &ResourceMap,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        debug!(operation = %self.name, consistency = ?self.consistency, "executing operation");
        match self.consistency {
            Consistency::BestEffort => self.execute_best_effort(input, resources, cancel),
            Consistency::Atomic => self.execute_atomic(input, resources, cancel),
        }
    }

    fn execute_best_effort(
        &self,
        input: Value,
        resources: &ResourceMap,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let mut env = Environment::with_input(input);
        let mut mutations_applied = 0usize;
        let mut completed_steps = 0usize;

        for (index, step) in self.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(self.interrupted(mutations_applied, completed_steps));
            }
            match self.run_step_live(index, step, &mut env, resources) {
                Ok(mutated) => {
                    if mutated {
                        mutations_applied += 1;
                    }
                    completed_steps += 1;
                }
                Err(e) => {
                    return Err(if mutations_applied > 0 {
                        warn!(
                            operation = %self.name,
                            completed_steps,
                            %e,
                            "best-effort operation failed with partial progress"
                        );
                        Error::PartialProgress {
                            operation: self.name.clone(),
                            completed_steps,
                            message: e.to_string(),
                        }
                    } else {
                        e
                    });
                }
            }
        }

        self.eval_response(&env)
    }

    /// Cancellation outcome for best-effort mode: partial-progress once any
    /// mutation landed, a plain cancellation otherwise.
    fn interrupted(&self, mutations_applied: usize, completed_steps: usize) -> Error {
        if mutations_applied > 0 {
            Error::PartialProgress {
                operation: self.name.clone(),
                completed_steps,
                message: "cancelled".to_string(),
            }
        } else {
            Error::Cancelled
        }
    }

    /// Run one step against live stores, taking each store's own lock.
    /// Returns whether the step applied a mutation.
    fn run_step_live(
        &self,
        index: usize,
        step: &CompiledStep,
        env: &mut Environment,
        resources: &ResourceMap,
    ) -> Result<bool> {
        match step {
            CompiledStep::Read {
                resource,
                id,
                bind_as,
            } => {
                let store = lookup_store(resource, resources)?;
                let id = self.eval_id(index, id, env)?;
                let object = store.get(&id)?;
                env.bind(bind_as.clone(), object);
                Ok(false)
            }
            CompiledStep::Create {
                resource,
                set,
                bind_as,
            } => {
                let store = lookup_store(resource, resources)?;
                let object = self.eval_set_map(index, set, env)?;
                let created = store.create(Value::Object(object))?;
                bind_optional(env, bind_as, created);
                Ok(true)
            }
            CompiledStep::Update {
                resource,
                id,
                set,
                bind_as,
            } => {
                let store = lookup_store(resource, resources)?;
                let id = self.eval_id(index, id, env)?;
                let patch = self.eval_set_map(index, set, env)?;
                let merged = store.update(&id, Value::Object(patch))?;
                bind_optional(env, bind_as, merged);
                Ok(true)
            }
            CompiledStep::Delete { resource, id } => {
                let store = lookup_store(resource, resources)?;
                let id = self.eval_id(index, id, env)?;
                store.delete(&id)?;
                Ok(true)
            }
            CompiledStep::Set { var, value } => {
                let value = eval_expr(
                    &format!("{}.steps.{index}.value", self.name),
                    value,
                    env,
                )?;
                env.bind(var.clone(), value);
                Ok(false)
            }
        }
    }

    fn execute_atomic(
        &self,
        input: Value,
        resources: &ResourceMap,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        // Resolve every referenced store up front; self.resources is already
        // sorted, which fixes the lock order and prevents deadlock.
        let mut stores: Vec<&Arc<ResourceStore>> = Vec::with_capacity(self.resources.len());
        for name in &self.resources {
            stores.push(lookup_store(name, resources)?);
        }
        let index_of: HashMap<&str, usize> = self
            .resources
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut guards: Vec<_> = stores.iter().map(|s| s.write_guard()).collect();
        let originals: Vec<IndexMap<String, Value>> =
            guards.iter().map(|g| (**g).clone()).collect();

        let rollback = |guards: &mut Vec<parking_lot::RwLockWriteGuard<'_, IndexMap<String, Value>>>| {
            for (guard, original) in guards.iter_mut().zip(&originals) {
                **guard = original.clone();
            }
        };

        let mut env = Environment::with_input(input);
        for (index, step) in self.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                rollback(&mut guards);
                return Err(Error::Cancelled);
            }
            if let Err(e) =
                self.run_step_locked(index, step, &mut env, &stores, &index_of, &mut guards)
            {
                warn!(operation = %self.name, step = index, %e, "atomic operation rolled back");
                rollback(&mut guards);
                return Err(e);
            }
        }

        match self.eval_response(&env) {
            Ok(response) => Ok(response),
            Err(e) => {
                rollback(&mut guards);
                Err(e)
            }
        }
    }

    /// Run one step against maps already locked by the atomic pipeline.
    #[allow(clippy::too_many_arguments)]
    fn run_step_locked(
        &self,
        index: usize,
        step: &CompiledStep,
        env: &mut Environment,
        stores: &[&Arc<ResourceStore>],
        index_of: &HashMap<&str, usize>,
        guards: &mut [parking_lot::RwLockWriteGuard<'_, IndexMap<String, Value>>],
    ) -> Result<()> {
        let slot = |resource: &str| -> Result<usize> {
            index_of.get(resource).copied().ok_or_else(|| Error::UnknownResource {
                name: resource.to_string(),
            })
        };

        match step {
            CompiledStep::Read {
                resource,
                id,
                bind_as,
            } => {
                let slot = slot(resource)?;
                let id = self.eval_id(index, id, env)?;
                let object = stores[slot].get_locked(&guards[slot], &id)?;
                env.bind(bind_as.clone(), object);
            }
            CompiledStep::Create {
                resource,
                set,
                bind_as,
            } => {
                let slot = slot(resource)?;
                let object = self.eval_set_map(index, set, env)?;
                let created = stores[slot].create_locked(&mut guards[slot], Value::Object(object))?;
                bind_optional(env, bind_as, created);
            }
            CompiledStep::Update {
                resource,
                id,
                set,
                bind_as,
            } => {
                let slot = slot(resource)?;
                let id = self.eval_id(index, id, env)?;
                let patch = self.eval_set_map(index, set, env)?;
                let merged = stores[slot].update_locked(&mut guards[slot], &id, Value::Object(patch))?;
                bind_optional(env, bind_as, merged);
            }
            CompiledStep::Delete { resource, id } => {
                let slot = slot(resource)?;
                let id = self.eval_id(index, id, env)?;
                stores[slot].delete_locked(&mut guards[slot], &id)?;
            }
            CompiledStep::Set { var, value } => {
                let value = eval_expr(
                    &format!("{}.steps.{index}.value", self.name),
                    value,
                    env,
                )?;
                env.bind(var.clone(), value);
            }
        }
        Ok(())
    }

    /// Evaluate the steps against fixture data without touching live state.
    ///
    /// Missing fixtures never fail the run: each one binds a synthetic
    /// placeholder and emits a warning.
    pub fn dry_run(&self, input: Value, fixtures: &Fixtures) -> Result<(Value, Vec<OperationWarning>)> {
        let mut env = Environment::with_input(input);
        for (name, value) in &fixtures.vars {
            env.bind(name.clone(), value.clone());
        }

        let mut overlay: HashMap<String, HashMap<String, Value>> = fixtures.resources.clone();
        let mut warnings = Vec::new();

        for (index, step) in self.steps.iter().enumerate() {
            match step {
                CompiledStep::Read {
                    resource,
                    id,
                    bind_as,
                } => {
                    let id = self.eval_id(index, id, &env)?;
                    let object = overlay
                        .get(resource.as_str())
                        .and_then(|items| items.get(&id))
                        .cloned()
                        .unwrap_or_else(|| {
                            warnings.push(placeholder_warning(index, resource, &id));
                            json!({ "id": id })
                        });
                    env.bind(bind_as.clone(), object);
                }
                CompiledStep::Create {
                    resource,
                    set,
                    bind_as,
                } => {
                    let mut object = self.eval_set_map(index, set, &env)?;
                    let id = match object.get("id").and_then(Value::as_str) {
                        Some(id) => id.to_string(),
                        None => {
                            let generated = uuid::Uuid::new_v4().to_string();
                            object.insert("id".to_string(), json!(generated.clone()));
                            generated
                        }
                    };
                    let created = Value::Object(object);
                    overlay
                        .entry(resource.clone())
                        .or_default()
                        .insert(id, created.clone());
                    bind_optional(&mut env, bind_as, created);
                }
                CompiledStep::Update {
                    resource,
                    id,
                    set,
                    bind_as,
                } => {
                    let id = self.eval_id(index, id, &env)?;
                    let patch = self.eval_set_map(index, set, &env)?;
                    let items = overlay.entry(resource.clone()).or_default();
                    let mut base = items.get(&id).cloned().unwrap_or_else(|| {
                        warnings.push(placeholder_warning(index, resource, &id));
                        json!({ "id": id })
                    });
                    if let Value::Object(target) = &mut base {
                        for (field, value) in patch {
                            target.insert(field, value);
                        }
                    }
                    items.insert(id, base.clone());
                    bind_optional(&mut env, bind_as, base);
                }
                CompiledStep::Delete { resource, id } => {
                    let id = self.eval_id(index, id, &env)?;
                    let removed = overlay
                        .get_mut(resource.as_str())
                        .and_then(|items| items.remove(&id));
                    if removed.is_none() {
                        warnings.push(OperationWarning {
                            step: Some(index),
                            message: format!("no fixture for '{resource}/{id}', delete is a no-op"),
                        });
                    }
                }
                CompiledStep::Set { var, value } => {
                    let value = eval_expr(
                        &format!("{}.steps.{index}.value", self.name),
                        value,
                        &env,
                    )?;
                    env.bind(var.clone(), value);
                }
            }
        }

        let response = self.eval_response(&env)?;
        Ok((response, warnings))
    }

    fn eval_id(&self, index: usize, id: &CompiledExpr, env: &Environment) -> Result<String> {
        eval_id_expr(&format!("{}.steps.{index}.id", self.name), id, env)
    }

    fn eval_set_map(
        &self,
        index: usize,
        set: &[(String, CompiledExpr)],
        env: &Environment,
    ) -> Result<Map<String, Value>> {
        let mut object = Map::new();
        for (field, expr) in set {
            let context = format!("{}.steps.{index}.set.{field}", self.name);
            object.insert(field.clone(), eval_expr(&context, expr, env)?);
        }
        Ok(object)
    }

    fn eval_response(&self, env: &Environment) -> Result<Value> {
        let mut object = Map::new();
        for (field, expr) in &self.response {
            let context = format!("{}.response.{field}", self.name);
            object.insert(field.clone(), eval_expr(&context, expr, env)?);
        }
        Ok(Value::Object(object))
    }
}

fn lookup_store<'r>(name: &str, resources: &'r ResourceMap) -> Result<&'r Arc<ResourceStore>> {
    resources.get(name).ok_or_else(|| Error::UnknownResource {
        name: name.to_string(),
    })
}

fn bind_optional(env: &mut Environment, bind_as: &Option<String>, object: Value) {
    if let Some(bind_as) = bind_as {
        env.bind(bind_as.clone(), object);
    }
}

fn placeholder_warning(index: usize, resource: &str, id: &str) -> OperationWarning {
    OperationWarning {
        step: Some(index),
        message: format!("no fixture for '{resource}/{id}', using a synthetic placeholder"),
    }
}

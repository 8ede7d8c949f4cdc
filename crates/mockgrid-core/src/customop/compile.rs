//! Local validation and compilation of custom-operation definitions.

use crate::config::model::{Consistency, CustomOperationConfig, StepKind};
use crate::customop::expr::{compile_expr, CompiledExpr, Environment};
use crate::error::{Error, Result};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Options for [`compile_operation`]
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Promote warnings to errors
    pub strict: bool,
    /// Sample input used to seed the compile-time environment
    pub sample_input: Option<Value>,
}

/// A non-fatal finding produced during compilation or dry runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationWarning {
    /// Index of the step the warning refers to, when step-scoped
    pub step: Option<usize>,
    /// What was found
    pub message: String,
}

/// A step with every expression compiled and its per-kind required fields
/// resolved, so execution never has to re-check shape.
#[derive(Debug, Clone)]
pub enum CompiledStep {
    /// Look up an object by id and bind it
    Read {
        /// Target stateful resource
        resource: String,
        /// Compiled id expression
        id: CompiledExpr,
        /// Binding introduced for the retrieved object
        bind_as: String,
    },
    /// Build a new object from `set` expressions and insert it
    Create {
        /// Target stateful resource
        resource: String,
        /// Compiled field expressions, in declaration order
        set: Vec<(String, CompiledExpr)>,
        /// Binding introduced for the created object
        bind_as: Option<String>,
    },
    /// Overlay `set` expressions onto an existing object
    Update {
        /// Target stateful resource
        resource: String,
        /// Compiled id expression
        id: CompiledExpr,
        /// Compiled field expressions, in declaration order
        set: Vec<(String, CompiledExpr)>,
        /// Binding introduced for the merged object
        bind_as: Option<String>,
    },
    /// Remove an object by id
    Delete {
        /// Target stateful resource
        resource: String,
        /// Compiled id expression
        id: CompiledExpr,
    },
    /// Bind a plain computed value into the environment
    Set {
        /// Variable name to bind
        var: String,
        /// Compiled value expression
        value: CompiledExpr,
    },
}

/// A fully compiled operation ready for execution
#[derive(Debug, Clone)]
pub struct CompiledOperation {
    /// Operation name callable by adapters
    pub name: String,
    /// Normalized execution guarantee
    pub consistency: Consistency,
    /// Compiled pipeline steps
    pub steps: Vec<CompiledStep>,
    /// Compiled response field expressions
    pub response: Vec<(String, CompiledExpr)>,
    /// Every resource the steps reference, sorted and deduplicated
    pub resources: Vec<String>,
}

/// Compile and locally validate an operation definition.
///
/// Walks the steps in order, enforcing the per-kind required fields and
/// compiling every expression under the environment as it evolves:
/// `input` first, then each step's `as` or `var` binding.
pub fn compile_operation(
    config: &CustomOperationConfig,
    options: &CompileOptions,
) -> Result<(CompiledOperation, Vec<OperationWarning>)> {
    if config.name.is_empty() {
        return Err(Error::compilation("name", "operation name must not be empty"));
    }
    if config.steps.is_empty() {
        return Err(Error::compilation(
            &config.name,
            "operation must have at least one step",
        ));
    }

    let consistency = match config.consistency.as_str() {
        "" | "best_effort" => Consistency::BestEffort,
        "atomic" => Consistency::Atomic,
        other => {
            return Err(Error::compilation(
                format!("{}.consistency", config.name),
                format!("unknown consistency '{other}' (expected best_effort or atomic)"),
            ))
        }
    };

    let mut env = Environment::with_input(options.sample_input.clone().unwrap_or_else(|| json!({})));
    let mut warnings = Vec::new();
    let mut resources = BTreeSet::new();
    let mut steps = Vec::with_capacity(config.steps.len());

    for (index, step) in config.steps.iter().enumerate() {
        let at = |field: &str| format!("{}.steps.{index}.{field}", config.name);
        let require = |value: &Option<String>, field: &str| -> Result<String> {
            value.clone().filter(|v| !v.is_empty()).ok_or_else(|| {
                Error::compilation(at(field), format!("{:?} step requires '{field}'", step.kind))
            })
        };

        if matches!(step.kind, StepKind::Create | StepKind::Update) && step.set.is_empty() {
            let warning = OperationWarning {
                step: Some(index),
                message: format!("{:?} step has an empty set map", step.kind),
            };
            if options.strict {
                return Err(Error::compilation(at("set"), warning.message));
            }
            warnings.push(warning);
        }

        let compile_set = || -> Result<Vec<(String, CompiledExpr)>> {
            let mut set = Vec::with_capacity(step.set.len());
            for (field, source) in &step.set {
                let compiled = compile_expr(&at(&format!("set.{field}")), source, &env)?;
                set.push((field.clone(), compiled));
            }
            Ok(set)
        };

        let compiled = match step.kind {
            StepKind::Read => {
                let resource = require(&step.resource, "resource")?;
                let id_source = require(&step.id, "id")?;
                let bind_as = require(&step.bind_as, "as")?;
                let id = compile_expr(&at("id"), &id_source, &env)?;
                CompiledStep::Read {
                    resource,
                    id,
                    bind_as,
                }
            }
            StepKind::Create => {
                let resource = require(&step.resource, "resource")?;
                let set = compile_set()?;
                CompiledStep::Create {
                    resource,
                    set,
                    bind_as: step.bind_as.clone(),
                }
            }
            StepKind::Update => {
                let resource = require(&step.resource, "resource")?;
                let id_source = require(&step.id, "id")?;
                let id = compile_expr(&at("id"), &id_source, &env)?;
                let set = compile_set()?;
                CompiledStep::Update {
                    resource,
                    id,
                    set,
                    bind_as: step.bind_as.clone(),
                }
            }
            StepKind::Delete => {
                let resource = require(&step.resource, "resource")?;
                let id_source = require(&step.id, "id")?;
                let id = compile_expr(&at("id"), &id_source, &env)?;
                CompiledStep::Delete { resource, id }
            }
            StepKind::Set => {
                let var = require(&step.var, "var")?;
                let value_source = require(&step.value, "value")?;
                let value = compile_expr(&at("value"), &value_source, &env)?;
                CompiledStep::Set { var, value }
            }
        };

        // Record the referenced resource and introduce this step's binding
        // for everything that follows.
        match &compiled {
            CompiledStep::Read {
                resource, bind_as, ..
            } => {
                resources.insert(resource.clone());
                env.bind(bind_as.clone(), json!({}));
            }
            CompiledStep::Create {
                resource, bind_as, ..
            }
            | CompiledStep::Update {
                resource, bind_as, ..
            } => {
                resources.insert(resource.clone());
                if let Some(bind_as) = bind_as {
                    env.bind(bind_as.clone(), json!({}));
                }
            }
            CompiledStep::Delete { resource, .. } => {
                resources.insert(resource.clone());
            }
            CompiledStep::Set { var, .. } => {
                env.bind(var.clone(), Value::Null);
            }
        }

        steps.push(compiled);
    }

    let mut response = Vec::with_capacity(config.response.len());
    for (field, source) in &config.response {
        response.push((
            field.clone(),
            compile_expr(&format!("{}.response.{field}", config.name), source, &env)?,
        ));
    }

    Ok((
        CompiledOperation {
            name: config.name.clone(),
            consistency,
            steps,
            response,
            resources: resources.into_iter().collect(),
        },
        warnings,
    ))
}

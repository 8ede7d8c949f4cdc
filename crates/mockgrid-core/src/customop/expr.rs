//! Sandboxed expression evaluation for custom operations.
//!
//! Expressions are a pure surface over a fixed value universe (scalars,
//! lists, maps). They are compiled once per operation and evaluated against
//! a per-call environment; the interpreter has no filesystem, module, or
//! host access, and hard caps on depth, operations, and value sizes.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};
use serde_json::Value;

static ENGINE: Lazy<Engine> = Lazy::new(|| {
    let mut engine = Engine::new();
    engine.set_max_expr_depths(64, 64);
    engine.set_max_operations(100_000);
    engine.set_max_string_size(64 * 1024);
    engine.set_max_array_size(16 * 1024);
    engine.set_max_map_size(16 * 1024);
    engine
});

/// A compiled expression plus its original source for diagnostics
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    /// Source text as written in the configuration
    pub source: String,
    ast: AST,
}

/// Ordered set of named bindings an expression evaluates against.
///
/// The environment grows as operation steps introduce `as` and `var`
/// bindings; response expressions see its final state.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: IndexMap<String, Value>,
}

impl Environment {
    /// Environment holding only the caller's `input` object.
    pub fn with_input(input: Value) -> Self {
        let mut env = Self::default();
        env.bind("input", input);
        env
    }

    /// Introduce or replace a binding.
    pub fn bind<N: Into<String>>(&mut self, name: N, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Look up a binding.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Names of every binding, in introduction order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    fn to_scope(&self, context: &str) -> Result<Scope<'static>> {
        let mut scope = Scope::new();
        for (name, value) in &self.bindings {
            let dynamic = rhai::serde::to_dynamic(value)
                .map_err(|e| Error::evaluation(context, e.to_string()))?;
            scope.push_dynamic(name.clone(), dynamic);
        }
        Ok(scope)
    }
}

/// Compile an expression, checking syntax and that every referenced
/// variable is already bound in `env`.
///
/// Reference checking runs the expression against placeholder values and
/// only treats an unresolved variable as a failure; type errors caused by
/// the placeholders are ignored.
pub fn compile_expr(context: &str, source: &str, env: &Environment) -> Result<CompiledExpr> {
    if source.trim().is_empty() {
        return Err(Error::compilation(context, "expression is empty"));
    }
    let ast = ENGINE
        .compile_expression(source)
        .map_err(|e| Error::compilation(context, e.to_string()))?;

    let compiled = CompiledExpr {
        source: source.to_string(),
        ast,
    };

    if let Ok(mut scope) = env.to_scope(context) {
        if let Err(e) = ENGINE.eval_ast_with_scope::<Dynamic>(&mut scope, &compiled.ast) {
            if let EvalAltResult::ErrorVariableNotFound(name, _) = *e {
                return Err(Error::compilation(
                    context,
                    format!("unknown variable '{name}'"),
                ));
            }
        }
    }

    Ok(compiled)
}

/// Evaluate a compiled expression under an environment into a JSON value.
pub fn eval_expr(context: &str, expr: &CompiledExpr, env: &Environment) -> Result<Value> {
    let mut scope = env.to_scope(context)?;
    let result = ENGINE
        .eval_ast_with_scope::<Dynamic>(&mut scope, &expr.ast)
        .map_err(|e| Error::evaluation(context, e.to_string()))?;
    rhai::serde::from_dynamic(&result).map_err(|e| Error::evaluation(context, e.to_string()))
}

/// Evaluate an id expression, requiring a scalar result.
pub fn eval_id_expr(context: &str, expr: &CompiledExpr, env: &Environment) -> Result<String> {
    match eval_expr(context, expr, env)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(Error::evaluation(
            context,
            format!("id expression must produce a string or number, got {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compile_and_eval_against_input() {
        let env = Environment::with_input(json!({"amount": 25, "to": "b"}));
        let expr = compile_expr("test", "input.amount * 2", &env).expect("compile");
        assert_eq!(eval_expr("test", &expr, &env).expect("eval"), json!(50));
    }

    #[test]
    fn test_syntax_error_is_compilation_error() {
        let env = Environment::default();
        let err = compile_expr("steps.0.id", "input..", &env).expect_err("must fail");
        assert!(matches!(err, Error::Compilation { .. }));
    }

    #[test]
    fn test_unknown_variable_rejected_at_compile() {
        let env = Environment::with_input(json!({}));
        let err = compile_expr("steps.0.value", "account.balance", &env).expect_err("must fail");
        match err {
            Error::Compilation { message, .. } => assert!(message.contains("account")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_binding_after_introduction_is_visible() {
        let mut env = Environment::with_input(json!({}));
        env.bind("source", json!({}));
        compile_expr("steps.1.value", "source.bal - 10", &env).expect("compile");
    }

    #[test]
    fn test_eval_id_expr_accepts_scalars_only() {
        let env = Environment::with_input(json!({"id": "u1", "n": 7, "obj": {}}));
        let string_id = compile_expr("t", "input.id", &env).expect("compile");
        assert_eq!(eval_id_expr("t", &string_id, &env).expect("eval"), "u1");

        let numeric_id = compile_expr("t", "input.n", &env).expect("compile");
        assert_eq!(eval_id_expr("t", &numeric_id, &env).expect("eval"), "7");

        let object_id = compile_expr("t", "input.obj", &env).expect("compile");
        assert!(eval_id_expr("t", &object_id, &env).is_err());
    }

    #[test]
    fn test_string_concatenation() {
        let env = Environment::with_input(json!({"name": "ada"}));
        let expr = compile_expr("t", r#""hello " + input.name"#, &env).expect("compile");
        assert_eq!(eval_expr("t", &expr, &env).expect("eval"), json!("hello ada"));
    }

    #[test]
    fn test_empty_expression_rejected() {
        let env = Environment::default();
        assert!(compile_expr("t", "   ", &env).is_err());
    }
}

//! Custom operations: compiled multi-step expression pipelines over
//! stateful resources.
//!
//! A definition is compiled once (syntax, per-kind required fields, and
//! binding references are all checked locally), optionally verified against
//! the live resource registry or fixture data, and then executed with
//! best-effort or atomic consistency.

mod compile;
mod exec;
pub mod expr;

pub use compile::{
    compile_operation, CompileOptions, CompiledOperation, CompiledStep, OperationWarning,
};
pub use exec::{Fixtures, ResourceMap};
pub use expr::{CompiledExpr, Environment};

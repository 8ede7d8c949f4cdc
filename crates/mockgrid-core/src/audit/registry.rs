//! Process-wide audit extension points: named writer factories for
//! extension sinks and one optional redactor applied to every entry
//! before it is written.
//!
//! Both registries are lock-protected and safe under concurrent readers
//! and writers. They are initialized before first use and normally live
//! for the whole process; [`reset_for_tests`] exists so test suites can
//! isolate themselves.

use crate::audit::{AuditEntry, AuditLogger};
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Builds a sink from its JSON configuration block
pub type WriterFactory = Arc<dyn Fn(&Value) -> Result<Arc<dyn AuditLogger>> + Send + Sync>;

/// Rewrites entries before they reach any sink
pub type Redactor = Arc<dyn Fn(AuditEntry) -> AuditEntry + Send + Sync>;

static WRITER_FACTORIES: Lazy<RwLock<HashMap<String, WriterFactory>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static REDACTOR: Lazy<RwLock<Option<Redactor>>> = Lazy::new(|| RwLock::new(None));

/// Register (or replace) a named writer factory.
pub fn register_writer_factory<N: Into<String>>(name: N, factory: WriterFactory) {
    let name = name.into();
    debug!(writer = %name, "audit writer factory registered");
    WRITER_FACTORIES.write().insert(name, factory);
}

/// Names of every registered writer factory.
pub fn writer_names() -> Vec<String> {
    WRITER_FACTORIES.read().keys().cloned().collect()
}

/// Build a sink through a registered factory.
pub fn create_writer(name: &str, config: &Value) -> Result<Arc<dyn AuditLogger>> {
    let factory = WRITER_FACTORIES.read().get(name).cloned();
    match factory {
        Some(factory) => factory(config),
        None => Err(Error::validation(
            name.to_string(),
            "no audit writer factory registered under this name",
        )),
    }
}

/// Install the process-wide redactor.
pub fn set_redactor(redactor: Redactor) {
    *REDACTOR.write() = Some(redactor);
}

/// Run the redactor over an entry, when one is installed.
pub fn apply_redactor(entry: AuditEntry) -> AuditEntry {
    match REDACTOR.read().as_ref() {
        Some(redactor) => redactor(entry),
        None => entry,
    }
}

/// Clear both registries. Test isolation hook only.
pub fn reset_for_tests() {
    WRITER_FACTORIES.write().clear();
    *REDACTOR.write() = None;
}

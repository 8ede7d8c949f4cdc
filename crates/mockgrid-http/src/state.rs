//! Shared router state: the live registry handle and the audit pipeline.

use mockgrid_core::audit::{
    registry as audit_registry, AuditEntry, AuditLogger, FileAuditLogger, NoopAuditLogger,
    StdoutAuditLogger, DEFAULT_BODY_PREVIEW_LIMIT,
};
use mockgrid_core::config::model::AuditConfig;
use mockgrid_core::registry::Registry;
use mockgrid_core::Result;
use std::sync::Arc;
use tracing::warn;

/// Trace identifier carried through request extensions so handlers can emit
/// entries under the same trace the middleware opened.
#[derive(Debug, Clone)]
pub struct TraceContext {
    /// The request's trace id
    pub trace_id: String,
}

/// The audit side of request handling.
///
/// Applies the process-wide redactor and swallows sink failures: capture
/// must never fail a request.
pub struct AuditPipeline {
    logger: Arc<dyn AuditLogger>,
    preview_limit: usize,
}

impl AuditPipeline {
    /// Pipeline writing to an explicit sink.
    pub fn new(logger: Arc<dyn AuditLogger>, preview_limit: usize) -> Self {
        Self {
            logger,
            preview_limit,
        }
    }

    /// Pipeline that drops every entry; the default when capture is off.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopAuditLogger), DEFAULT_BODY_PREVIEW_LIMIT)
    }

    /// Build a pipeline from a collection's audit block.
    pub fn from_config(config: &AuditConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let logger: Arc<dyn AuditLogger> = if config.file.is_empty() {
            Arc::new(StdoutAuditLogger::new())
        } else {
            Arc::new(FileAuditLogger::new(&config.file)?)
        };
        Ok(Self::new(logger, config.max_body_preview))
    }

    /// The configured body preview cap, in bytes.
    pub fn preview_limit(&self) -> usize {
        self.preview_limit
    }

    /// Redact and write one entry. Sink errors are logged and dropped.
    pub fn emit(&self, entry: AuditEntry) {
        let entry = audit_registry::apply_redactor(entry);
        if let Err(e) = self.logger.log(entry) {
            warn!(%e, "audit sink write failed");
        }
    }

    /// Close the underlying sink.
    pub fn close(&self) {
        if let Err(e) = self.logger.close() {
            warn!(%e, "audit sink close failed");
        }
    }
}

/// State shared by every route of the adapter
#[derive(Clone)]
pub struct AppState {
    /// Live mock registry
    pub registry: Arc<Registry>,
    /// Audit capture pipeline
    pub audit: Arc<AuditPipeline>,
    /// Upper bound on request body reads, in bytes; `None` is unbounded
    pub max_body_size: Option<usize>,
}

impl AppState {
    /// Bundle a registry and audit pipeline into router state.
    pub fn new(registry: Arc<Registry>, audit: Arc<AuditPipeline>) -> Self {
        Self {
            registry,
            audit,
            max_body_size: None,
        }
    }

    /// Cap request body reads at `limit` bytes; larger requests are
    /// rejected with 413.
    pub fn with_max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = Some(limit);
        self
    }
}

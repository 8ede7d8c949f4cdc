//! # MockGrid HTTP
//!
//! HTTP protocol adapter for the MockGrid engine.
//!
//! Builds an axum router around a live [`Registry`]: the audit middleware
//! captures every exchange, stateful resources with a `basePath` are served
//! as REST collections, custom operations are callable through the
//! administrative route, and everything else goes through the matcher and
//! renderer.
//!
//! ```rust,no_run
//! use mockgrid_core::{load_path, Registry};
//! use mockgrid_http::{build_router, AppState, AuditPipeline};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> mockgrid_core::Result<()> {
//!     let loaded = load_path("./mocks").await?;
//!     let registry = Arc::new(Registry::from_collection(&loaded.collection)?);
//!     let audit = Arc::new(AuditPipeline::disabled());
//!
//!     let app = build_router(AppState::new(registry, audit));
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod handlers;
pub mod middleware;
pub mod render;
pub mod state;

pub use render::render_response;
pub use state::{AppState, AuditPipeline, TraceContext};

use axum::routing::post;
use axum::Router;
use mockgrid_core::registry::Registry;

/// Mount point of the administrative routes
pub const ADMIN_PREFIX: &str = "/__mockgrid";

/// Build the adapter's router: admin routes, the stateful/matcher fallback,
/// and the audit middleware wrapped around everything.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/__mockgrid/operations/{name}",
            post(handlers::invoke_operation),
        )
        .route(
            "/__mockgrid/resources/{name}/reset",
            post(handlers::reset_resource),
        )
        .fallback(handlers::handle_request)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::audit_middleware,
        ))
        .with_state(state)
}

/// Convenience for tests and embedders: a router over a registry with audit
/// capture disabled.
pub fn router_for_registry(registry: std::sync::Arc<Registry>) -> Router {
    build_router(AppState::new(
        registry,
        std::sync::Arc::new(AuditPipeline::disabled()),
    ))
}

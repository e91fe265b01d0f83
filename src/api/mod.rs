//! HTTP boundary for the wallet front end.
//!
//! - `routes.rs`: handlers, one per endpoint
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: mapping of domain errors to `{detail}` responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::dlq::TracingDlq;
use crate::engine::TransferEngine;

pub mod dto;
pub mod errors;
pub mod routes;

pub type SharedEngine = Arc<TransferEngine<TracingDlq>>;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(engine: SharedEngine) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .merge(routes::router())
        .layer(Extension(engine))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // The browser front end is served from a different origin.
                .layer(CorsLayer::permissive()),
        )
}

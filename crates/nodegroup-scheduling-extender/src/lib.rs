pub mod cli;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod types;

use axum::{routing::post, Router};
use tower_http::trace::TraceLayer;

pub use error::{Error, Result};
use handlers::AppState;

/// Builds the extender's `axum::Router`, independent of how it is served, so tests can drive
/// it with `tower::ServiceExt::oneshot` without binding a socket.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/schedule/filter", post(handlers::filter))
        .route("/schedule/prioritize", post(handlers::prioritize))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

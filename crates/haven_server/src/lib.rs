//! # haven_server - HTTP front door for Haven
//!
//! Exposes the multi-agent chat pipeline over HTTP: a server-sent-event
//! stream, a buffered JSON endpoint and a health probe.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use config::ServerArgs;
pub use error::AppError;
pub use state::AppState;

/// Build the application router.
pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::chat::router())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

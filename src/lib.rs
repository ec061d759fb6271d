pub mod error;
pub mod http;
pub mod messages;
pub mod multipart;
pub mod participant;
pub mod path;
pub mod registry;
pub mod rendezvous;
pub mod state;
pub mod transfer;

pub use state::AppState;

use axum::Router;
use tower_http::trace::TraceLayer;

/// Build the full router: a single fallback dispatcher handles every
/// rendezvous path (spec.md §4.5), since paths are arbitrary and user-chosen
/// rather than a fixed set of routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(http::fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! HTTP routes for the exposition server.

pub mod metrics;

use crate::state::AppState;
use axum::Router;

pub use metrics::{Endpoint, Exposition};

/// Creates a router serving every endpoint in `endpoints`.
pub fn create_router(state: AppState, endpoints: &[Endpoint]) -> Router {
    endpoints
        .iter()
        .fold(Router::new(), |router, endpoint| {
            router.merge(metrics::routes(&endpoint.path, endpoint.exposition))
        })
        .with_state(state)
}

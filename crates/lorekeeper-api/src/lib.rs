//! Lorekeeper API server library.
//!
//! Exposes the router, state and collaborators so integration tests can
//! build the same application `main.rs` serves.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;

use crate::state::AppState;

/// The full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/jobs", routes::jobs::router())
        .nest("/api/v1/owners", routes::owners::router())
        .with_state(state)
}

//! Axum router for profile endpoints.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{list_profiles, record_health, register_profile, release_lease};
use crate::adapters::http::BrokerAppState;

/// Routes mounted at `/api/profiles`.
pub fn routes() -> Router<BrokerAppState> {
    Router::new()
        .route("/", get(list_profiles).post(register_profile))
        .route("/:id/health", post(record_health))
        .route("/leases/:lease_id/release", post(release_lease))
}

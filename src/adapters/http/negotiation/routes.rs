//! Axum router for negotiation intake.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{get_exchange, receive_offer, report_execution, report_verification};
use crate::adapters::http::BrokerAppState;

/// Routes merged at the `/api` root.
pub fn routes() -> Router<BrokerAppState> {
    Router::new()
        .route("/offers", post(receive_offer))
        .route("/exchanges/:id", get(get_exchange))
        .route("/exchanges/:id/execution", post(report_execution))
        .route("/exchanges/:id/verification", post(report_verification))
}

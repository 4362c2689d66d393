//! Axum router for contact endpoints.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{
    begin_execution, block_contact, flag_contact, get_contact, get_negotiation, propose_terms,
    relaunch_candidates, start_outreach, tag_contact, unblock_contact, untag_contact,
};
use crate::adapters::http::BrokerAppState;

/// Routes mounted at `/api/contacts`.
pub fn routes() -> Router<BrokerAppState> {
    Router::new()
        .route("/relaunch-candidates", get(relaunch_candidates))
        .route("/:id", get(get_contact))
        .route("/:id/negotiation", get(get_negotiation))
        .route("/:id/outreach", post(start_outreach))
        .route("/:id/proposal", post(propose_terms))
        .route("/:id/execution", post(begin_execution))
        .route("/:id/block", post(block_contact))
        .route("/:id/unblock", post(unblock_contact))
        .route("/:id/flag", post(flag_contact))
        .route("/:id/tags", post(tag_contact).delete(untag_contact))
}

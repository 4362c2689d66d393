//! HTTP adapter - REST API over the exchange broker.
//!
//! Each area has its own dto/handlers/routes split:
//! - `negotiation` - offers, execution and verification reports
//! - `contacts` - outreach, proposals, moderation and relaunch queries
//! - `profiles` - automation profile provisioning and leases

pub mod contacts;
pub mod error;
pub mod negotiation;
pub mod profiles;

use std::sync::Arc;

use axum::Router;

use crate::application::ExchangeBroker;
use crate::domain::foundation::Timestamp;

pub use error::{ApiError, ErrorResponse};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct BrokerAppState {
    pub broker: Arc<ExchangeBroker>,
}

impl BrokerAppState {
    pub fn new(broker: Arc<ExchangeBroker>) -> Self {
        Self { broker }
    }
}

/// Routes mounted under `/api`.
pub fn api_router() -> Router<BrokerAppState> {
    Router::new()
        .merge(negotiation::routes())
        .nest("/contacts", contacts::routes())
        .nest("/profiles", profiles::routes())
}

/// The complete application router with state attached.
pub fn app(broker: Arc<ExchangeBroker>) -> Router {
    Router::new()
        .nest("/api", api_router())
        .with_state(BrokerAppState::new(broker))
}

/// Event time supplied by the caller, or the time the request arrived.
pub(crate) fn at_or_now(at: Option<Timestamp>) -> Timestamp {
    at.unwrap_or_else(Timestamp::now)
}

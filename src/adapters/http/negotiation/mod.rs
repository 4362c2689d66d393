//! HTTP adapter for negotiation intake.
//!
//! - `POST /api/offers` - offer message from a chat group
//! - `GET /api/exchanges/:id` - exchange details with transcript
//! - `POST /api/exchanges/:id/execution` - our executor's report
//! - `POST /api/exchanges/:id/verification` - verification of the partner's side

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use routes::routes;

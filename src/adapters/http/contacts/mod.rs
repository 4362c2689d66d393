//! HTTP adapter for contact endpoints.
//!
//! - `GET /api/contacts/relaunch-candidates` - reliable contacts ready for a new offer
//! - `GET /api/contacts/:id` - contact details
//! - `GET /api/contacts/:id/negotiation` - live conversation and exchange
//! - `POST /api/contacts/:id/outreach` - open a negotiation with our offer
//! - `POST /api/contacts/:id/proposal` - override our proposed terms
//! - `POST /api/contacts/:id/execution` - lease a profile and start our side
//! - `POST /api/contacts/:id/block`, `/unblock`, `/flag`, `/tags`

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use routes::routes;

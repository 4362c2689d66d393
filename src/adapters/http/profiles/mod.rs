//! HTTP adapter for automation profile endpoints.
//!
//! - `GET /api/profiles` - all profiles with today's usage
//! - `POST /api/profiles` - register a profile
//! - `POST /api/profiles/:id/health` - record a health check
//! - `POST /api/profiles/leases/:lease_id/release` - return an unused lease

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use routes::routes;

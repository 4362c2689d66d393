//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, events)
//! - `reliability` - Pure reliability scoring
//! - `contact` - Counterparties, their status and history
//! - `exchange` - Negotiated reciprocal engagements
//! - `conversation` - Per-contact negotiation phase tracking
//! - `profile` - Automation profiles and daily quotas

pub mod contact;
pub mod conversation;
pub mod exchange;
pub mod foundation;
pub mod profile;
pub mod reliability;

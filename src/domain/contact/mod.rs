//! Contact domain: counterparties, their status and reliability history.

mod aggregate;
mod events;
mod identity;
mod relaunch;
mod status;

pub use aggregate::{Contact, ContactParts, LearnedPreferences, Recomputed, MAX_TAG_LENGTH};
pub use events::{ContactBlocked, ContactDiscovered, ContactUnblocked};
pub use identity::{ContactIdentity, DiscoveryInfo, Platform};
pub use relaunch::RelaunchCriteria;
pub use status::ContactStatus;

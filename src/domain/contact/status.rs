//! Contact status state machine.
//!
//! Statuses only move forward along
//! `discovered → contacted → responded → active_saved`, with two exits:
//! `unresponsive` (re-activated to `contacted` by renewed outreach) and
//! `blocked` (left only through an explicit unblock).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{StateMachine, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    #[default]
    Discovered,
    Contacted,
    Responded,
    ActiveSaved,
    Unresponsive,
    Blocked,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::Discovered => "discovered",
            ContactStatus::Contacted => "contacted",
            ContactStatus::Responded => "responded",
            ContactStatus::ActiveSaved => "active_saved",
            ContactStatus::Unresponsive => "unresponsive",
            ContactStatus::Blocked => "blocked",
        }
    }

    /// Contacts we are waiting on; these go `unresponsive` after inactivity.
    pub fn awaits_activity(&self) -> bool {
        matches!(self, ContactStatus::Contacted | ContactStatus::Responded)
    }
}

impl StateMachine for ContactStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ContactStatus::*;
        match self {
            Discovered => vec![Contacted, Responded, ActiveSaved, Unresponsive, Blocked],
            Contacted => vec![Responded, ActiveSaved, Unresponsive, Blocked],
            Responded => vec![ActiveSaved, Unresponsive, Blocked],
            ActiveSaved => vec![Unresponsive, Blocked],
            Unresponsive => vec![Contacted, Blocked],
            Blocked => vec![],
        }
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(ContactStatus::Discovered),
            "contacted" => Ok(ContactStatus::Contacted),
            "responded" => Ok(ContactStatus::Responded),
            "active_saved" => Ok(ContactStatus::ActiveSaved),
            "unresponsive" => Ok(ContactStatus::Unresponsive),
            "blocked" => Ok(ContactStatus::Blocked),
            other => Err(ValidationError::invalid_format(
                "contact_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

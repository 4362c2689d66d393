//! Negotiation phase state machine.
//!
//! A conversation's phase mirrors the status of the exchange it drives:
//!
//! | phase                  | exchange status                      |
//! |------------------------|--------------------------------------|
//! | `waiting_response`     | `initiated`                          |
//! | `negotiating_terms`    | `initiated`, `negotiating`           |
//! | `waiting_execution`    | `agreed`                             |
//! | `verifying_completion` | `my_turn_done`, `their_turn_done`    |
//!
//! Terminal exchange statuses have no phase: the conversation ends with them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::exchange::ExchangeStatus;
use crate::domain::foundation::{StateMachine, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationPhase {
    /// Waiting for the contact to reply to an offer or outreach.
    #[default]
    WaitingResponse,
    /// Proposals are going back and forth.
    NegotiatingTerms,
    /// Terms agreed; our side has not executed yet.
    WaitingExecution,
    /// Our side is done; checking theirs.
    VerifyingCompletion,
}

const ALL_PHASES: [NegotiationPhase; 4] = [
    NegotiationPhase::WaitingResponse,
    NegotiationPhase::NegotiatingTerms,
    NegotiationPhase::WaitingExecution,
    NegotiationPhase::VerifyingCompletion,
];

impl NegotiationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationPhase::WaitingResponse => "waiting_response",
            NegotiationPhase::NegotiatingTerms => "negotiating_terms",
            NegotiationPhase::WaitingExecution => "waiting_execution",
            NegotiationPhase::VerifyingCompletion => "verifying_completion",
        }
    }

    /// Exchange statuses this phase may be paired with.
    pub fn mirrored_statuses(&self) -> &'static [ExchangeStatus] {
        match self {
            NegotiationPhase::WaitingResponse => &[ExchangeStatus::Initiated],
            NegotiationPhase::NegotiatingTerms => {
                &[ExchangeStatus::Initiated, ExchangeStatus::Negotiating]
            }
            NegotiationPhase::WaitingExecution => &[ExchangeStatus::Agreed],
            NegotiationPhase::VerifyingCompletion => {
                &[ExchangeStatus::MyTurnDone, ExchangeStatus::TheirTurnDone]
            }
        }
    }

    pub fn mirrors(&self, status: ExchangeStatus) -> bool {
        self.mirrored_statuses().contains(&status)
    }

    /// Phase a conversation should be in for `status`; `None` once the exchange is closed.
    pub fn for_exchange_status(status: ExchangeStatus) -> Option<Self> {
        match status {
            ExchangeStatus::Initiated => Some(NegotiationPhase::NegotiatingTerms),
            ExchangeStatus::Negotiating => Some(NegotiationPhase::NegotiatingTerms),
            ExchangeStatus::Agreed => Some(NegotiationPhase::WaitingExecution),
            ExchangeStatus::MyTurnDone | ExchangeStatus::TheirTurnDone => {
                Some(NegotiationPhase::VerifyingCompletion)
            }
            _ => None,
        }
    }

    /// Terms may still change in this phase.
    pub fn accepts_proposals(&self) -> bool {
        matches!(
            self,
            NegotiationPhase::WaitingResponse | NegotiationPhase::NegotiatingTerms
        )
    }

    /// Expiring in this phase means the contact never answered at all.
    pub fn expiry_means_unresponsive(&self) -> bool {
        matches!(self, NegotiationPhase::WaitingResponse)
    }
}

impl StateMachine for NegotiationPhase {
    fn can_transition_to(&self, target: &Self) -> bool {
        use NegotiationPhase::*;
        matches!(
            (self, target),
            (WaitingResponse, NegotiatingTerms)
                | (NegotiatingTerms, WaitingExecution)
                | (WaitingExecution, VerifyingCompletion)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        ALL_PHASES
            .into_iter()
            .filter(|target| self.can_transition_to(target))
            .collect()
    }

    /// Conversations are deleted rather than parked in a final phase.
    fn is_terminal(&self) -> bool {
        false
    }
}

impl fmt::Display for NegotiationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NegotiationPhase {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_PHASES
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| {
                ValidationError::invalid_format("negotiation_phase", format!("unknown phase '{}'", s))
            })
    }
}

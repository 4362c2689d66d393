//! Exchange lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{StateMachine, ValidationError};

/// Lifecycle status of a single engagement exchange.
///
/// ```text
/// initiated → negotiating → agreed → my_turn_done → their_turn_done → completed
///      └──────────┴────────────┴──────────┴──────────────┴──→ failed | no_response | partner_did_not_complete
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStatus {
    #[default]
    Initiated,
    Negotiating,
    Agreed,
    MyTurnDone,
    TheirTurnDone,
    Completed,
    Failed,
    NoResponse,
    PartnerDidNotComplete,
}

const FAILURE_EXITS: [ExchangeStatus; 3] = [
    ExchangeStatus::Failed,
    ExchangeStatus::NoResponse,
    ExchangeStatus::PartnerDidNotComplete,
];

impl ExchangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeStatus::Initiated => "initiated",
            ExchangeStatus::Negotiating => "negotiating",
            ExchangeStatus::Agreed => "agreed",
            ExchangeStatus::MyTurnDone => "my_turn_done",
            ExchangeStatus::TheirTurnDone => "their_turn_done",
            ExchangeStatus::Completed => "completed",
            ExchangeStatus::Failed => "failed",
            ExchangeStatus::NoResponse => "no_response",
            ExchangeStatus::PartnerDidNotComplete => "partner_did_not_complete",
        }
    }

    /// True once terms are locked in.
    pub fn is_agreed(&self) -> bool {
        matches!(
            self,
            ExchangeStatus::Agreed
                | ExchangeStatus::MyTurnDone
                | ExchangeStatus::TheirTurnDone
                | ExchangeStatus::Completed
        )
    }

    pub fn is_failure(&self) -> bool {
        FAILURE_EXITS.contains(self)
    }

    /// Status an overdue exchange times out into.
    pub fn timeout_outcome(&self) -> ExchangeStatus {
        if self.is_agreed() {
            ExchangeStatus::PartnerDidNotComplete
        } else {
            ExchangeStatus::NoResponse
        }
    }
}

impl StateMachine for ExchangeStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ExchangeStatus::*;
        let forward = match self {
            Initiated => Negotiating,
            Negotiating => Agreed,
            Agreed => MyTurnDone,
            MyTurnDone => TheirTurnDone,
            TheirTurnDone => Completed,
            Completed | Failed | NoResponse | PartnerDidNotComplete => return vec![],
        };
        let mut targets = vec![forward];
        targets.extend(FAILURE_EXITS);
        targets
    }
}

impl fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ExchangeStatus::*;
        [
            Initiated,
            Negotiating,
            Agreed,
            MyTurnDone,
            TheirTurnDone,
            Completed,
            Failed,
            NoResponse,
            PartnerDidNotComplete,
        ]
        .into_iter()
        .find(|status| status.as_str() == s)
        .ok_or_else(|| {
            ValidationError::invalid_format("exchange_status", format!("unknown status '{}'", s))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ExchangeStatus::*;

    #[test]
    fn forward_path_is_linear() {
        let path = [Initiated, Negotiating, Agreed, MyTurnDone, TheirTurnDone, Completed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{:?}", pair);
            assert!(!pair[1].can_transition_to(&pair[0]), "{:?}", pair);
        }
    }

    #[test]
    fn cannot_skip_steps() {
        assert!(!Initiated.can_transition_to(&Agreed));
        assert!(!Agreed.can_transition_to(&Completed));
    }

    #[test]
    fn every_open_status_can_fail_any_way() {
        for status in [Initiated, Negotiating, Agreed, MyTurnDone, TheirTurnDone] {
            for exit in FAILURE_EXITS {
                assert!(status.can_transition_to(&exit), "{:?} -> {:?}", status, exit);
            }
        }
    }

    #[test]
    fn terminal_statuses_have_no_exits() {
        for status in [Completed, Failed, NoResponse, PartnerDidNotComplete] {
            assert!(status.is_terminal(), "{:?}", status);
        }
        assert!(!Agreed.is_terminal());
    }

    #[test]
    fn timeout_outcome_depends_on_agreement() {
        assert_eq!(Initiated.timeout_outcome(), NoResponse);
        assert_eq!(Negotiating.timeout_outcome(), NoResponse);
        assert_eq!(Agreed.timeout_outcome(), PartnerDidNotComplete);
        assert_eq!(MyTurnDone.timeout_outcome(), PartnerDidNotComplete);
    }

    #[test]
    fn parses_snake_case() {
        assert_eq!(
            "partner_did_not_complete".parse::<ExchangeStatus>().unwrap(),
            PartnerDidNotComplete
        );
        assert!("done".parse::<ExchangeStatus>().is_err());
    }
}

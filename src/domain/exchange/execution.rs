//! Execution and verification reports for agreed exchanges.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::terms::{ActionKind, Terms};
use crate::domain::foundation::{LeaseId, ProfileId, Timestamp};

/// Outcome of one action: either a done/not-done flag or an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionOutcome {
    Flag(bool),
    Amount(u32),
}

impl ActionOutcome {
    /// Whether this outcome meets a required quantity.
    pub fn satisfies(&self, required: u32) -> bool {
        match self {
            ActionOutcome::Flag(done) => *done,
            ActionOutcome::Amount(amount) => *amount >= required,
        }
    }
}

/// Per-action results, as reported by an executor or verifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionResults(BTreeMap<ActionKind, ActionOutcome>);

impl ActionResults {
    pub fn new(results: impl IntoIterator<Item = (ActionKind, ActionOutcome)>) -> Self {
        Self(results.into_iter().collect())
    }

    pub fn get(&self, kind: ActionKind) -> Option<ActionOutcome> {
        self.0.get(&kind).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks these results against agreed terms.
    pub fn coverage(&self, terms: &Terms) -> Coverage {
        let mut coverage = Coverage::default();
        for (kind, required) in terms.actions() {
            match self.get(kind) {
                None => coverage.missing.push(kind),
                Some(outcome) if outcome.satisfies(required) => coverage.satisfied.push(kind),
                Some(_) => coverage.unmet.push(kind),
            }
        }
        coverage
    }
}

/// How a set of results measures up to agreed terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coverage {
    pub satisfied: Vec<ActionKind>,
    /// Reported but short of the agreed quantity.
    pub unmet: Vec<ActionKind>,
    /// Not reported at all.
    pub missing: Vec<ActionKind>,
}

impl Coverage {
    pub fn is_complete(&self) -> bool {
        self.unmet.is_empty() && self.missing.is_empty()
    }

    /// Every required action has an outcome, whether or not it succeeded.
    pub fn all_attempted(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn shortfall(&self) -> Vec<ActionKind> {
        let mut kinds: Vec<_> = self.unmet.iter().chain(&self.missing).copied().collect();
        kinds.sort();
        kinds
    }
}

/// Our side of an exchange: which profile performed it and how it went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub profile_id: Option<ProfileId>,
    pub lease_id: Option<LeaseId>,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    #[serde(default)]
    pub results: ActionResults,
}

impl ExecutionRecord {
    pub fn leased(profile_id: ProfileId, lease_id: LeaseId, at: Timestamp) -> Self {
        Self {
            profile_id: Some(profile_id),
            lease_id: Some(lease_id),
            started_at: Some(at),
            finished_at: None,
            results: ActionResults::default(),
        }
    }
}

/// Latest verification of the partner's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub verified_at: Timestamp,
    pub results: ActionResults,
    pub complete: bool,
}

//! Engagement terms: which actions each side performs, and how many.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::foundation::ValidationError;

/// An engagement action one side performs on the other's video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[serde(alias = "likes")]
    Like,
    #[serde(alias = "subscribes", alias = "subscriptions")]
    Subscribe,
    #[serde(alias = "comments")]
    Comment,
    #[serde(alias = "watchSeconds")]
    WatchSeconds,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Like => "like",
            ActionKind::Subscribe => "subscribe",
            ActionKind::Comment => "comment",
            ActionKind::WatchSeconds => "watch_seconds",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated set of action quantities.
///
/// Never empty and every quantity is strictly positive. Equality is
/// structural, which is how proposals from both sides are matched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<ActionKind, i64>", into = "BTreeMap<ActionKind, i64>")]
pub struct Terms(BTreeMap<ActionKind, u32>);

impl Terms {
    /// Builds terms from `(action, quantity)` pairs.
    ///
    /// # Errors
    ///
    /// - `EmptyField` when no action is given
    /// - `OutOfRange` when any quantity is zero, negative or above `u32::MAX`
    pub fn new(
        actions: impl IntoIterator<Item = (ActionKind, i64)>,
    ) -> Result<Self, ValidationError> {
        let mut map = BTreeMap::new();
        for (kind, quantity) in actions {
            let quantity = u32::try_from(quantity)
                .ok()
                .filter(|q| *q > 0)
                .ok_or_else(|| {
                    ValidationError::out_of_range(kind.as_str(), 1, i64::from(u32::MAX), quantity)
                })?;
            map.insert(kind, quantity);
        }
        if map.is_empty() {
            return Err(ValidationError::empty_field("terms"));
        }
        Ok(Self(map))
    }

    /// Convenience constructor for a single action.
    pub fn single(kind: ActionKind, quantity: u32) -> Result<Self, ValidationError> {
        Self::new([(kind, i64::from(quantity))])
    }

    pub fn quantity(&self, kind: ActionKind) -> Option<u32> {
        self.0.get(&kind).copied()
    }

    pub fn actions(&self) -> impl Iterator<Item = (ActionKind, u32)> + '_ {
        self.0.iter().map(|(k, q)| (*k, *q))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Restricts these terms to what `limits` allows.
    ///
    /// Actions absent from `limits` are dropped; the rest are clamped to
    /// the limit. Returns `None` when nothing remains.
    pub fn capped_by(&self, limits: &Terms) -> Option<Terms> {
        let capped: BTreeMap<_, _> = self
            .0
            .iter()
            .filter_map(|(kind, quantity)| {
                limits
                    .quantity(*kind)
                    .map(|limit| (*kind, (*quantity).min(limit)))
            })
            .collect();
        if capped.is_empty() {
            None
        } else {
            Some(Terms(capped))
        }
    }
}

impl TryFrom<BTreeMap<ActionKind, i64>> for Terms {
    type Error = ValidationError;

    fn try_from(value: BTreeMap<ActionKind, i64>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Terms> for BTreeMap<ActionKind, i64> {
    fn from(terms: Terms) -> Self {
        terms
            .0
            .into_iter()
            .map(|(k, q)| (k, i64::from(q)))
            .collect()
    }
}

impl fmt::Display for Terms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(k, q)| format!("{}={}", k, q))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

//! Relaunch candidate selection.

use chrono::Duration;
use std::cmp::Ordering;

use super::aggregate::Contact;
use crate::domain::foundation::Timestamp;

/// Which contacts are worth a new exchange.
///
/// A candidate scores at least `min_score`, has at least `min_successful`
/// completed exchanges, is not blocked, and either never exchanged or last
/// exchanged before `cooldown_cutoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaunchCriteria {
    pub min_score: u8,
    pub min_successful: u32,
    pub cooldown_cutoff: Timestamp,
}

impl RelaunchCriteria {
    pub fn new(min_score: u8, min_successful: u32, cooldown: Duration, now: Timestamp) -> Self {
        Self {
            min_score,
            min_successful,
            cooldown_cutoff: now.minus(cooldown),
        }
    }

    pub fn matches(&self, contact: &Contact) -> bool {
        !contact.is_blocked()
            && contact.reliability_score().value() >= self.min_score
            && contact.tally().successful >= self.min_successful
            && contact
                .last_exchange_at()
                .map_or(true, |last| last.is_before(&self.cooldown_cutoff))
    }

    /// Candidate ordering: score descending, then successful exchanges descending.
    pub fn rank(a: &Contact, b: &Contact) -> Ordering {
        b.reliability_score()
            .cmp(&a.reliability_score())
            .then_with(|| b.tally().successful.cmp(&a.tally().successful))
    }

    /// Filters and orders `contacts`.
    pub fn select(&self, contacts: impl IntoIterator<Item = Contact>) -> Vec<Contact> {
        let mut selected: Vec<Contact> = contacts.into_iter().filter(|c| self.matches(c)).collect();
        selected.sort_by(Self::rank);
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contact::{ContactIdentity, DiscoveryInfo};
    use crate::domain::exchange::ExchangeStatus;

    fn t(days: i64) -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000).plus(Duration::days(days))
    }

    fn contact_with(name: &str, completed: u32, failed: u32, last_day: i64) -> Contact {
        let mut c = Contact::discover(
            ContactIdentity::new("telegram", name).unwrap(),
            DiscoveryInfo::default(),
            t(0),
        );
        for _ in 0..completed {
            c.record_exchange_outcome(ExchangeStatus::Completed, t(last_day));
        }
        for _ in 0..failed {
            c.record_exchange_outcome(ExchangeStatus::PartnerDidNotComplete, t(last_day));
        }
        c.recompute(t(last_day), Duration::days(14));
        c
    }

    #[test]
    fn cooldown_excludes_recent_exchanges() {
        let criteria = RelaunchCriteria::new(70, 1, Duration::days(7), t(10));
        assert!(criteria.matches(&contact_with("old", 1, 0, 2)));
        assert!(!criteria.matches(&contact_with("recent", 1, 0, 5)));
    }

    #[test]
    fn low_score_and_few_exchanges_are_excluded() {
        let criteria = RelaunchCriteria::new(70, 2, Duration::days(7), t(30));
        assert!(!criteria.matches(&contact_with("one", 1, 0, 1)));
        assert!(!criteria.matches(&contact_with("flaky", 2, 3, 1)));
        assert!(criteria.matches(&contact_with("good", 2, 0, 1)));
    }

    #[test]
    fn blocked_contacts_are_never_candidates() {
        let criteria = RelaunchCriteria::new(0, 0, Duration::days(7), t(30));
        let mut c = contact_with("blocked", 3, 0, 1);
        c.block("spam", t(2));
        assert!(!criteria.matches(&c));
    }

    #[test]
    fn candidates_ordered_by_score_then_successes() {
        let criteria = RelaunchCriteria::new(0, 0, Duration::days(7), t(30));
        let selected = criteria.select(vec![
            contact_with("a", 1, 0, 1),
            contact_with("b", 8, 0, 1),
            contact_with("c", 9, 0, 1),
        ]);
        let names: Vec<_> = selected
            .iter()
            .map(|c| c.identity().external_user_id().to_string())
            .collect();
        // b and c both clamp to 100; c has more successes
        assert_eq!(names, vec!["c", "b", "a"]);
    }
}

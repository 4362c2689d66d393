//! ContactRegistry - owns contact records and their reliability score.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};

use super::errors::BrokerError;
use super::locks::KeyedLocks;
use super::publish;
use crate::domain::contact::{
    Contact, ContactBlocked, ContactDiscovered, ContactIdentity, ContactStatus, ContactUnblocked,
    DiscoveryInfo, Recomputed, RelaunchCriteria,
};
use crate::domain::exchange::{ExchangeStatus, Terms};
use crate::domain::foundation::{ContactId, DomainError, ErrorCode, EventId, Timestamp};
use crate::ports::{AuditEntry, AuditKind, AuditLog, ContactRepository, EventPublisher};

/// Creates, reads and updates contacts.
///
/// Every mutation after discovery runs with the contact's section held by
/// the caller; the registry itself only serializes first sight of an identity.
pub struct ContactRegistry {
    repository: Arc<dyn ContactRepository>,
    event_publisher: Arc<dyn EventPublisher>,
    audit: Arc<dyn AuditLog>,
    inactivity_window: Duration,
    identities: KeyedLocks<ContactIdentity>,
}

impl ContactRegistry {
    pub fn new(
        repository: Arc<dyn ContactRepository>,
        event_publisher: Arc<dyn EventPublisher>,
        audit: Arc<dyn AuditLog>,
        inactivity_window: Duration,
    ) -> Self {
        Self {
            repository,
            event_publisher,
            audit,
            inactivity_window,
            identities: KeyedLocks::new(),
        }
    }

    /// Returns the contact for `identity`, creating it on first sight.
    ///
    /// An existing record is returned unchanged.
    pub async fn upsert(
        &self,
        identity: ContactIdentity,
        discovery: DiscoveryInfo,
        at: Timestamp,
    ) -> Result<Contact, BrokerError> {
        let _guard = self.identities.lock(identity.clone()).await;

        if let Some(existing) = self.repository.find_by_identity(&identity).await? {
            return Ok(existing);
        }

        let contact = Contact::discover(identity, discovery, at);
        match self.repository.insert(&contact).await {
            Ok(()) => {}
            // Another process inserted the same identity first.
            Err(err) if err.code == ErrorCode::ContactExists => {
                return self
                    .repository
                    .find_by_identity(contact.identity())
                    .await?
                    .ok_or_else(|| BrokerError::Infrastructure(err));
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            contact_id = %contact.id(),
            identity = %contact.identity(),
            "Contact discovered"
        );
        publish(
            self.event_publisher.as_ref(),
            &ContactDiscovered {
                event_id: EventId::new(),
                contact_id: contact.id(),
                platform: contact.identity().platform().to_string(),
                external_user_id: contact.identity().external_user_id().to_string(),
                discovered_at: at,
            },
        )
        .await?;
        Ok(contact)
    }

    pub async fn get(&self, id: ContactId) -> Result<Contact, BrokerError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| BrokerError::not_found("contact", id))
    }

    /// Records outreach. Older-than-stored timestamps are ignored.
    pub async fn mark_contacted(&self, id: ContactId, at: Timestamp) -> Result<Contact, BrokerError> {
        let mut contact = self.get(id).await?;
        let changed = contact.mark_contacted(at).map_err(|e| blocked(id, e))?;
        self.save_if(changed, &contact).await?;
        Ok(contact)
    }

    /// Records a reply. Older-than-stored timestamps are ignored.
    pub async fn mark_responded(&self, id: ContactId, at: Timestamp) -> Result<Contact, BrokerError> {
        let mut contact = self.get(id).await?;
        let changed = contact.mark_responded(at).map_err(|e| blocked(id, e))?;
        self.save_if(changed, &contact).await?;
        Ok(contact)
    }

    pub async fn mark_active_saved(
        &self,
        id: ContactId,
        at: Timestamp,
    ) -> Result<Contact, BrokerError> {
        let mut contact = self.get(id).await?;
        let changed = contact.mark_active_saved(at).map_err(|e| blocked(id, e))?;
        self.save_if(changed, &contact).await?;
        Ok(contact)
    }

    pub async fn mark_unresponsive(
        &self,
        id: ContactId,
        at: Timestamp,
    ) -> Result<Contact, BrokerError> {
        let mut contact = self.get(id).await?;
        let changed = contact.mark_unresponsive(at);
        if changed {
            debug!(contact_id = %id, "Contact marked unresponsive");
        }
        self.save_if(changed, &contact).await?;
        Ok(contact)
    }

    /// Counts a finished exchange and recomputes the score.
    pub async fn record_outcome(
        &self,
        id: ContactId,
        outcome: ExchangeStatus,
        at: Timestamp,
    ) -> Result<Recomputed, BrokerError> {
        let mut contact = self.get(id).await?;
        contact.record_exchange_outcome(outcome, at);
        self.apply_recompute(contact, at).await
    }

    /// Remembers the terms agreed with a contact.
    pub async fn learn_terms(&self, id: ContactId, terms: Terms) -> Result<(), BrokerError> {
        let mut contact = self.get(id).await?;
        contact.learn_agreed_terms(terms);
        self.repository.update(&contact).await?;
        Ok(())
    }

    /// Re-derives the reliability score and applies the inactivity and
    /// flagging rules.
    pub async fn recompute_score(
        &self,
        id: ContactId,
        now: Timestamp,
    ) -> Result<Recomputed, BrokerError> {
        let contact = self.get(id).await?;
        self.apply_recompute(contact, now).await
    }

    /// Marks a contact to be blocked at the next recompute.
    pub async fn flag(
        &self,
        id: ContactId,
        reason: impl Into<String>,
        at: Timestamp,
    ) -> Result<Contact, BrokerError> {
        let mut contact = self.get(id).await?;
        contact.flag(reason, at);
        self.repository.update(&contact).await?;
        Ok(contact)
    }

    pub async fn tag(&self, id: ContactId, tag: &str, at: Timestamp) -> Result<Contact, BrokerError> {
        let mut contact = self.get(id).await?;
        let added = contact.add_tag(tag, at)?;
        self.save_if(added, &contact).await?;
        Ok(contact)
    }

    pub async fn untag(&self, id: ContactId, tag: &str, at: Timestamp) -> Result<Contact, BrokerError> {
        let mut contact = self.get(id).await?;
        let removed = contact.remove_tag(tag, at);
        self.save_if(removed, &contact).await?;
        Ok(contact)
    }

    /// Blocks a contact. Returns `false` if it already was.
    pub async fn block(
        &self,
        id: ContactId,
        reason: impl Into<String>,
        at: Timestamp,
    ) -> Result<bool, BrokerError> {
        let mut contact = self.get(id).await?;
        let reason = reason.into();
        if !contact.block(reason.clone(), at) {
            return Ok(false);
        }
        self.repository.update(&contact).await?;
        self.announce_block(&contact, reason, at).await?;
        Ok(true)
    }

    /// Lifts a block and returns the restored status.
    pub async fn unblock(&self, id: ContactId, at: Timestamp) -> Result<ContactStatus, BrokerError> {
        let mut contact = self.get(id).await?;
        let restored = contact.unblock(at)?;
        self.repository.update(&contact).await?;

        info!(contact_id = %id, restored = %restored, "Contact unblocked");
        self.audit
            .record(AuditEntry::for_contact(
                AuditKind::Unblocked,
                id,
                format!("restored to {}", restored),
                at,
            ))
            .await?;
        publish(
            self.event_publisher.as_ref(),
            &ContactUnblocked {
                event_id: EventId::new(),
                contact_id: id,
                restored_status: restored,
                unblocked_at: at,
            },
        )
        .await?;
        Ok(restored)
    }

    /// Dormant, reliable contacts worth re-engaging, best first.
    pub async fn relaunch_candidates(
        &self,
        criteria: &RelaunchCriteria,
        limit: u32,
    ) -> Result<Vec<Contact>, BrokerError> {
        Ok(self
            .repository
            .find_relaunch_candidates(criteria, limit)
            .await?)
    }

    /// Contacts whose status the next recompute would change, quietest first.
    pub async fn recompute_due(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<ContactId>, BrokerError> {
        let idle_before = now.minus(self.inactivity_window);
        Ok(self
            .repository
            .find_recompute_due(idle_before, limit)
            .await?)
    }

    async fn apply_recompute(
        &self,
        mut contact: Contact,
        now: Timestamp,
    ) -> Result<Recomputed, BrokerError> {
        let recomputed = contact.recompute(now, self.inactivity_window);
        self.repository.update(&contact).await?;

        debug!(
            contact_id = %contact.id(),
            previous = recomputed.previous_score.value(),
            score = recomputed.score.value(),
            "Reliability score recomputed"
        );
        if let Some((_, ContactStatus::Blocked)) = recomputed.status_change {
            let reason = contact.block_reason().unwrap_or("flagged").to_string();
            self.announce_block(&contact, reason, now).await?;
        }
        Ok(recomputed)
    }

    async fn announce_block(
        &self,
        contact: &Contact,
        reason: String,
        at: Timestamp,
    ) -> Result<(), BrokerError> {
        info!(contact_id = %contact.id(), reason = %reason, "Contact blocked");
        self.audit
            .record(AuditEntry::for_contact(
                AuditKind::Blocked,
                contact.id(),
                reason.clone(),
                at,
            ))
            .await?;
        publish(
            self.event_publisher.as_ref(),
            &ContactBlocked {
                event_id: EventId::new(),
                contact_id: contact.id(),
                reason,
                blocked_at: at,
            },
        )
        .await
    }

    async fn save_if(&self, changed: bool, contact: &Contact) -> Result<(), BrokerError> {
        if changed {
            self.repository.update(contact).await?;
        }
        Ok(())
    }
}

fn blocked(id: ContactId, err: DomainError) -> BrokerError {
    if err.code == ErrorCode::ContactBlocked {
        BrokerError::ContactBlocked(id)
    } else {
        err.into()
    }
}

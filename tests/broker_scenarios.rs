//! End-to-end scenarios driven through `ExchangeBroker` over in-memory
//! adapters.

use std::sync::Arc;

use chrono::Duration;

use exchange_broker::adapters::memory::{
    InMemoryContactRepository, InMemoryConversationRepository,
};
use exchange_broker::application::{
    BrokerError, BrokerPorts, ExchangeBroker, ExecutionReport, OfferEvent, Outreach,
    VerificationReport,
};
use exchange_broker::config::AppConfig;
use exchange_broker::domain::contact::{ContactIdentity, ContactStatus};
use exchange_broker::domain::conversation::NegotiationPhase;
use exchange_broker::domain::exchange::{ActionKind, ActionOutcome, ActionResults, ExchangeStatus, Terms};
use exchange_broker::domain::foundation::{ContactId, ExchangeId, Timestamp};

// =============================================================================
// Test Infrastructure
// =============================================================================

fn t(secs: i64) -> Timestamp {
    Timestamp::from_unix_secs(1_767_225_600 + secs)
}

fn hours(h: i64) -> i64 {
    Duration::hours(h).num_seconds()
}

fn likes(n: u32) -> Terms {
    Terms::single(ActionKind::Like, n).unwrap()
}

fn offer(user: &str, terms: Option<Terms>, at: Timestamp) -> OfferEvent {
    OfferEvent {
        platform: "telegram".to_string(),
        external_user_id: user.to_string(),
        display_name: Some(format!("user {}", user)),
        group_context: Some("like4like".to_string()),
        message_text: "like for like?".to_string(),
        extracted_terms: terms,
        video_urls: vec![format!("https://videos.example/{}", user)],
        at,
    }
}

fn liked() -> ActionResults {
    ActionResults::new([(ActionKind::Like, ActionOutcome::Flag(true))])
}

struct Harness {
    broker: Arc<ExchangeBroker>,
    contacts: Arc<InMemoryContactRepository>,
    conversations: Arc<InMemoryConversationRepository>,
}

fn harness() -> Harness {
    let contacts = Arc::new(InMemoryContactRepository::new());
    let conversations = Arc::new(InMemoryConversationRepository::new());
    let ports = BrokerPorts {
        contacts: contacts.clone(),
        conversations: conversations.clone(),
        ..BrokerPorts::in_memory()
    };
    Harness {
        broker: Arc::new(ExchangeBroker::new(ports, &AppConfig::default())),
        contacts,
        conversations,
    }
}

/// Offers `likes(5)` and returns the agreed exchange.
async fn agreed_exchange(broker: &ExchangeBroker, user: &str, at: Timestamp) -> (ContactId, ExchangeId) {
    let outcome = broker.handle_offer(offer(user, Some(likes(5)), at)).await.unwrap();
    let exchange = outcome.negotiation.exchange.unwrap();
    assert_eq!(exchange.status(), ExchangeStatus::Agreed);
    (outcome.contact.id(), exchange.id())
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn offer_to_completed_exchange() {
    let h = harness();
    h.broker.register_profile("runner-1", Some(50), t(0)).await.unwrap();

    let (contact_id, exchange_id) = agreed_exchange(&h.broker, "ana", t(10)).await;
    let snapshot = h.broker.negotiation(contact_id).await.unwrap();
    assert_eq!(
        snapshot.conversation.unwrap().phase(),
        NegotiationPhase::WaitingExecution
    );

    let (_, lease) = h.broker.begin_execution(contact_id, t(20)).await.unwrap();
    assert_eq!(lease.handle, "runner-1");

    let snapshot = h
        .broker
        .handle_execution_report(ExecutionReport {
            exchange_id,
            results: liked(),
            ban_detected: false,
            at: t(30),
        })
        .await
        .unwrap();
    assert_eq!(snapshot.exchange.unwrap().status(), ExchangeStatus::MyTurnDone);
    assert_eq!(
        snapshot.conversation.unwrap().phase(),
        NegotiationPhase::VerifyingCompletion
    );

    let snapshot = h
        .broker
        .handle_verification(VerificationReport {
            exchange_id,
            results: liked(),
            impossible: false,
            at: t(40),
        })
        .await
        .unwrap();
    assert!(snapshot.conversation.is_none());
    assert_eq!(snapshot.exchange.unwrap().status(), ExchangeStatus::Completed);

    let contact = h.broker.contact(contact_id).await.unwrap();
    assert_eq!(contact.status(), ContactStatus::ActiveSaved);
    assert_eq!(contact.tally().total, 1);
    assert_eq!(contact.tally().successful, 1);
    assert_eq!(contact.reliability_score().value(), 75);
    assert_eq!(contact.preferences().preferred_terms, Some(likes(5)));
    assert_eq!(h.conversations.len().await, 0);

    let profiles = h.broker.pool().list().await.unwrap();
    assert_eq!(profiles[0].successful_uses(), 1);
}

#[tokio::test]
async fn impossible_verification_closes_as_partner_failure() {
    let h = harness();
    h.broker.register_profile("runner-1", None, t(0)).await.unwrap();
    let (contact_id, exchange_id) = agreed_exchange(&h.broker, "ana", t(10)).await;
    h.broker.begin_execution(contact_id, t(20)).await.unwrap();
    h.broker
        .handle_execution_report(ExecutionReport {
            exchange_id,
            results: liked(),
            ban_detected: false,
            at: t(30),
        })
        .await
        .unwrap();

    let snapshot = h
        .broker
        .handle_verification(VerificationReport {
            exchange_id,
            results: ActionResults::default(),
            impossible: true,
            at: t(40),
        })
        .await
        .unwrap();

    assert_eq!(
        snapshot.exchange.unwrap().status(),
        ExchangeStatus::PartnerDidNotComplete
    );
    let contact = h.broker.contact(contact_id).await.unwrap();
    assert_eq!(contact.tally().failed, 1);
    assert_eq!(contact.tally().successful, 0);
}

// =============================================================================
// Timeout sweep
// =============================================================================

#[tokio::test]
async fn unanswered_outreach_expires_exactly_once() {
    let h = harness();
    let contact = h
        .broker
        .contacts()
        .upsert(
            ContactIdentity::new("telegram", "ana").unwrap(),
            Default::default(),
            t(0),
        )
        .await
        .unwrap();
    h.broker
        .start_outreach(
            contact.id(),
            Outreach {
                terms: likes(3),
                message: Some("like for like?".to_string()),
                video_url: None,
                at: t(0),
            },
        )
        .await
        .unwrap();

    let early = h.broker.sweep(t(hours(47))).await.unwrap();
    assert!(early.is_idle());

    let first = h.broker.sweep(t(hours(49))).await.unwrap();
    assert_eq!(first.conversations_expired, 1);
    assert_eq!(first.errors, 0);

    let second = h.broker.sweep(t(hours(50))).await.unwrap();
    assert!(second.is_idle());

    let contact = h.broker.contact(contact.id()).await.unwrap();
    assert_eq!(contact.status(), ContactStatus::Unresponsive);
    assert_eq!(h.conversations.len().await, 0);
}

#[tokio::test]
async fn quiet_contact_turns_unresponsive_after_the_inactivity_window() {
    let h = harness();
    let outcome = h.broker.handle_offer(offer("ana", None, t(0))).await.unwrap();
    let contact_id = outcome.contact.id();

    let expired = h.broker.sweep(t(hours(49))).await.unwrap();
    assert_eq!(expired.conversations_expired, 1);
    assert_eq!(expired.contacts_recomputed, 0);
    let contact = h.broker.contact(contact_id).await.unwrap();
    assert_eq!(contact.status(), ContactStatus::Responded);

    let idle = h.broker.sweep(t(hours(24 * 15))).await.unwrap();
    assert_eq!(idle.contacts_recomputed, 1);
    let contact = h.broker.contact(contact_id).await.unwrap();
    assert_eq!(contact.status(), ContactStatus::Unresponsive);

    let again = h.broker.sweep(t(hours(24 * 16))).await.unwrap();
    assert!(again.is_idle());
}

#[tokio::test]
async fn flagged_contact_is_blocked_by_the_next_sweep() {
    let h = harness();
    let (contact_id, exchange_id) = agreed_exchange(&h.broker, "ana", t(0)).await;

    let contact = h.broker.flag_contact(contact_id, "spam", t(10)).await.unwrap();
    assert_eq!(contact.status(), ContactStatus::Responded);

    let report = h.broker.sweep(t(20)).await.unwrap();
    assert_eq!(report.contacts_recomputed, 1);
    assert_eq!(report.errors, 0);

    let contact = h.broker.contact(contact_id).await.unwrap();
    assert_eq!(contact.status(), ContactStatus::Blocked);
    assert_eq!(contact.block_reason(), Some("spam"));
    let exchange = h.broker.exchange(exchange_id).await.unwrap();
    assert_eq!(exchange.status(), ExchangeStatus::Failed);
    assert_eq!(exchange.failure_reason(), Some("cancelled"));
    assert_eq!(h.conversations.len().await, 0);

    let err = h
        .broker
        .handle_offer(offer("ana", Some(likes(5)), t(30)))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::ContactBlocked(_)));
}

#[tokio::test]
async fn agreed_exchange_past_its_window_times_out_once() {
    let h = harness();
    let (contact_id, exchange_id) = agreed_exchange(&h.broker, "ana", t(0)).await;

    let first = h.broker.sweep(t(hours(25))).await.unwrap();
    assert_eq!(first.conversations_expired, 1);
    let second = h.broker.sweep(t(hours(26))).await.unwrap();
    assert!(second.is_idle());

    let exchange = h.broker.exchange(exchange_id).await.unwrap();
    assert_eq!(exchange.status(), ExchangeStatus::PartnerDidNotComplete);
    let contact = h.broker.contact(contact_id).await.unwrap();
    assert_eq!(contact.tally().total, 1);
    assert_eq!(contact.tally().failed, 1);
}

#[tokio::test]
async fn late_report_after_timeout_is_rejected() {
    let h = harness();
    h.broker.register_profile("runner-1", None, t(0)).await.unwrap();
    let (contact_id, exchange_id) = agreed_exchange(&h.broker, "ana", t(0)).await;
    h.broker.begin_execution(contact_id, t(10)).await.unwrap();
    h.broker.sweep(t(hours(25))).await.unwrap();

    let err = h
        .broker
        .handle_execution_report(ExecutionReport {
            exchange_id,
            results: liked(),
            ban_detected: false,
            at: t(hours(25) + 1),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BrokerError::InvalidTransition(_)));
    let exchange = h.broker.exchange(exchange_id).await.unwrap();
    assert_eq!(exchange.status(), ExchangeStatus::PartnerDidNotComplete);
}

// =============================================================================
// Profile pool
// =============================================================================

#[tokio::test]
async fn daily_cap_limits_concurrent_executions() {
    let h = harness();
    h.broker.register_profile("runner-1", Some(2), t(0)).await.unwrap();

    let mut contacts = Vec::new();
    for (i, user) in ["ana", "bo", "cy"].iter().enumerate() {
        let (contact_id, _) = agreed_exchange(&h.broker, user, t(i as i64)).await;
        contacts.push(contact_id);
    }

    assert!(h.broker.begin_execution(contacts[0], t(10)).await.is_ok());
    assert!(h.broker.begin_execution(contacts[1], t(11)).await.is_ok());
    let err = h.broker.begin_execution(contacts[2], t(12)).await.unwrap_err();
    assert!(matches!(err, BrokerError::NoCapacityAvailable));

    let snapshot = h.broker.negotiation(contacts[2]).await.unwrap();
    assert_eq!(
        snapshot.conversation.unwrap().phase(),
        NegotiationPhase::WaitingExecution
    );
}

#[tokio::test]
async fn released_lease_frees_quota() {
    let h = harness();
    h.broker.register_profile("runner-1", Some(1), t(0)).await.unwrap();
    let (ana, _) = agreed_exchange(&h.broker, "ana", t(0)).await;
    let (bo, _) = agreed_exchange(&h.broker, "bo", t(1)).await;

    let (_, lease) = h.broker.begin_execution(ana, t(10)).await.unwrap();
    assert!(h.broker.begin_execution(bo, t(11)).await.is_err());

    assert!(h.broker.release_profile(lease.lease_id));
    assert!(!h.broker.release_profile(lease.lease_id));
    assert!(h.broker.begin_execution(bo, t(12)).await.is_ok());
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_offers_create_one_contact_and_conversation() {
    let h = harness();
    let at = t(0);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let broker = h.broker.clone();
            tokio::spawn(async move { broker.handle_offer(offer("ana", None, at)).await })
        })
        .collect();
    let results = futures::future::join_all(tasks).await;

    let ids: Vec<ContactId> = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().contact.id())
        .collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(h.contacts.len().await, 1);
    assert_eq!(h.conversations.len().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tags_are_all_kept() {
    let h = harness();
    let contact_id = h
        .broker
        .handle_offer(offer("ana", None, t(0)))
        .await
        .unwrap()
        .contact
        .id();

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let broker = h.broker.clone();
            tokio::spawn(async move {
                broker
                    .tag_contact(contact_id, &format!("tag{}", i), t(1))
                    .await
            })
        })
        .collect();
    for joined in futures::future::join_all(tasks).await {
        joined.unwrap().unwrap();
    }

    let contact = h.broker.contact(contact_id).await.unwrap();
    assert_eq!(contact.tags().len(), 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_offers_with_terms_open_one_exchange() {
    let h = harness();
    let first = h.broker.handle_offer(offer("ana", None, t(0))).await.unwrap();
    let contact_id = first.contact.id();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let broker = h.broker.clone();
            tokio::spawn(async move { broker.handle_offer(offer("ana", Some(likes(5)), t(5))).await })
        })
        .collect();
    let results = futures::future::join_all(tasks).await;

    let accepted = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert!(accepted >= 1);

    let exchanges = h.broker.ledger().for_contact(contact_id).await.unwrap();
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0].status(), ExchangeStatus::Agreed);
}

// =============================================================================
// Moderation
// =============================================================================

#[tokio::test]
async fn blocking_cancels_the_live_exchange_without_a_tally() {
    let h = harness();
    let (contact_id, exchange_id) = agreed_exchange(&h.broker, "ana", t(0)).await;

    let contact = h.broker.block_contact(contact_id, "spam", t(10)).await.unwrap();
    assert_eq!(contact.status(), ContactStatus::Blocked);
    assert_eq!(contact.tally().total, 0);

    let exchange = h.broker.exchange(exchange_id).await.unwrap();
    assert_eq!(exchange.status(), ExchangeStatus::Failed);
    assert_eq!(exchange.failure_reason(), Some("cancelled"));

    let err = h
        .broker
        .handle_offer(offer("ana", Some(likes(5)), t(20)))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::ContactBlocked(_)));

    let contact = h.broker.unblock_contact(contact_id, t(30)).await.unwrap();
    assert_eq!(contact.status(), ContactStatus::Responded);
}

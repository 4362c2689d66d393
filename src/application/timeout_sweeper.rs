//! TimeoutSweeper - periodically expires overdue conversations and exchanges,
//! then recomputes contacts that are flagged or have gone quiet.
//!
//! Each item is handled under its contact's section through the state
//! machine, so a sweep never races inbound events. A failure for one contact
//! is logged and counted; it never stops the pass or the loop.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info};

use super::conversation_machine::ConversationStateMachine;
use super::errors::BrokerError;
use crate::config::SweeperConfig;
use crate::domain::foundation::Timestamp;
use crate::ports::{ConversationRepository, ExchangeRepository};

/// Tally of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub conversations_expired: usize,
    pub exchanges_expired: usize,
    pub contacts_recomputed: usize,
    pub errors: usize,
}

impl SweepReport {
    pub fn is_idle(&self) -> bool {
        *self == SweepReport::default()
    }
}

pub struct TimeoutSweeper {
    conversations: Arc<dyn ConversationRepository>,
    exchanges: Arc<dyn ExchangeRepository>,
    machine: Arc<ConversationStateMachine>,
    interval: Duration,
    batch_size: u32,
}

impl TimeoutSweeper {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        exchanges: Arc<dyn ExchangeRepository>,
        machine: Arc<ConversationStateMachine>,
        config: &SweeperConfig,
    ) -> Self {
        Self {
            conversations,
            exchanges,
            machine,
            interval: config.interval(),
            batch_size: config.batch_size,
        }
    }

    /// Sweeps on every interval tick until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.interval);
        info!(interval_secs = self.interval.as_secs(), "Timeout sweeper started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Timeout sweeper stopped");
                        return;
                    }
                }
                _ = interval.tick() => {
                    match self.sweep_once(Timestamp::now()).await {
                        Ok(report) if report.is_idle() => {}
                        Ok(report) => info!(?report, "Sweep finished"),
                        Err(err) => error!(error = %err, "Sweep failed"),
                    }
                }
            }
        }
    }

    /// Runs one pass: expired conversations first, then exchanges whose
    /// deadline passed without a conversation to carry them, then contacts
    /// due for a status recompute.
    pub async fn sweep_once(&self, now: Timestamp) -> Result<SweepReport, BrokerError> {
        let mut report = SweepReport::default();

        let expired = self
            .conversations
            .find_expired(now, self.batch_size)
            .await?;
        let outcomes = join_all(
            expired
                .iter()
                .map(|conversation| self.machine.expire(conversation.contact_id(), now)),
        )
        .await;
        for (conversation, outcome) in expired.iter().zip(outcomes) {
            match outcome {
                Ok(Some(_)) => report.conversations_expired += 1,
                Ok(None) => {}
                Err(err) => {
                    report.errors += 1;
                    error!(
                        contact_id = %conversation.contact_id(),
                        error = %err,
                        "Failed to expire conversation"
                    );
                }
            }
        }

        let overdue = self.exchanges.find_overdue(now, self.batch_size).await?;
        let outcomes = join_all(
            overdue
                .iter()
                .map(|exchange| self.machine.expire_exchange(exchange.id(), now)),
        )
        .await;
        for (exchange, outcome) in overdue.iter().zip(outcomes) {
            match outcome {
                Ok(Some(_)) => report.exchanges_expired += 1,
                Ok(None) => {}
                Err(err) => {
                    report.errors += 1;
                    error!(
                        exchange_id = %exchange.id(),
                        error = %err,
                        "Failed to expire exchange"
                    );
                }
            }
        }

        let due = self.machine.recompute_due(now, self.batch_size).await?;
        let outcomes = join_all(
            due.iter()
                .map(|contact_id| self.machine.recompute_contact(*contact_id, now)),
        )
        .await;
        for (contact_id, outcome) in due.iter().zip(outcomes) {
            match outcome {
                Ok(recomputed) if recomputed.status_change.is_some() => {
                    report.contacts_recomputed += 1
                }
                Ok(_) => {}
                Err(err) => {
                    report.errors += 1;
                    error!(
                        contact_id = %contact_id,
                        error = %err,
                        "Failed to recompute contact"
                    );
                }
            }
        }

        debug!(?report, "Sweep pass complete");
        Ok(report)
    }
}

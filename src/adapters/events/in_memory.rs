//! In-memory event bus.
//!
//! Keeps the most recent envelopes for inspection and fans every event out
//! to live subscribers over a broadcast channel. Used by tests and by the
//! database-less runtime.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

use crate::domain::foundation::{DomainError, EventEnvelope};
use crate::ports::EventPublisher;

/// Envelopes retained by default.
pub const DEFAULT_RETENTION: usize = 10_000;

const SUBSCRIBER_BUFFER: usize = 256;

pub struct InMemoryEventBus {
    published: RwLock<VecDeque<EventEnvelope>>,
    retention: usize,
    live: broadcast::Sender<EventEnvelope>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Creates a bus that keeps at most `retention` envelopes.
    pub fn with_retention(retention: usize) -> Self {
        let (live, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self {
            published: RwLock::new(VecDeque::new()),
            retention: retention.max(1),
            live,
        }
    }

    /// Receives every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.live.subscribe()
    }

    /// Retained events, oldest first.
    pub fn published_events(&self) -> Vec<EventEnvelope> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.published_events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn events_for_aggregate(&self, aggregate_id: &str) -> Vec<EventEnvelope> {
        self.published_events()
            .into_iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .collect()
    }

    pub fn has_event(&self, event_type: &str) -> bool {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|e| e.event_type == event_type)
    }

    pub fn event_count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear(&self) {
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
        {
            let mut published = self.published.write().unwrap_or_else(PoisonError::into_inner);
            if published.len() == self.retention {
                published.pop_front();
            }
            published.push_back(event.clone());
        }
        // No receivers is fine.
        let _ = self.live.send(event);
        Ok(())
    }
}

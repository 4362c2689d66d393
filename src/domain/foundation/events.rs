//! Event infrastructure for domain event publishing.
//!
//! - `EventId` - Unique identifier for events (deduplication)
//! - `EventEnvelope` - Transport wrapper for domain events
//! - `DomainEvent` - Trait that all domain events implement
//! - `domain_event!` - Macro to simplify DomainEvent implementations

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

use super::Timestamp;

/// Trait that all domain events implement.
///
/// `event_type` carries a version suffix (e.g. `exchange.agreed.v1`) so that
/// subscribers can route and upgrade payloads explicitly.
pub trait DomainEvent: Send + Sync {
    /// Returns the routing key, including its `.vN` suffix.
    fn event_type(&self) -> &'static str;

    /// Returns the ID of the aggregate that emitted this event.
    fn aggregate_id(&self) -> String;

    /// Returns the type of aggregate (e.g., "Contact", "Exchange").
    fn aggregate_type(&self) -> &'static str;

    /// Returns when the event occurred.
    fn occurred_at(&self) -> Timestamp;

    /// Returns the unique ID for this event instance.
    fn event_id(&self) -> EventId;
}

/// Implements [`DomainEvent`] for a struct by naming its fields.
///
/// ```ignore
/// domain_event!(
///     ExchangeAgreed,
///     event_type = "exchange.agreed.v1",
///     aggregate_id = exchange_id,
///     aggregate_type = "Exchange",
///     occurred_at = agreed_at,
///     event_id = event_id
/// );
/// ```
#[macro_export]
macro_rules! domain_event {
    (
        $event_name:ident,
        event_type = $event_type:expr,
        aggregate_id = $agg_id_field:ident,
        aggregate_type = $agg_type:expr,
        occurred_at = $occurred_field:ident,
        event_id = $event_id_field:ident
    ) => {
        impl $crate::domain::foundation::DomainEvent for $event_name {
            fn event_type(&self) -> &'static str {
                $event_type
            }

            fn aggregate_id(&self) -> String {
                self.$agg_id_field.to_string()
            }

            fn aggregate_type(&self) -> &'static str {
                $agg_type
            }

            fn occurred_at(&self) -> $crate::domain::foundation::Timestamp {
                self.$occurred_field
            }

            fn event_id(&self) -> $crate::domain::foundation::EventId {
                self.$event_id_field.clone()
            }
        }
    };
}

pub use crate::domain_event;

/// Unique identifier for events (used for deduplication).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates a new random EventId using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates an EventId from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport envelope for domain events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub event_type: String,
    pub schema_version: u32,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub occurred_at: Timestamp,
    pub payload: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl EventEnvelope {
    /// Wraps a domain event, serializing it as the payload.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the event cannot be represented as JSON.
    pub fn from_event<T>(event: &T) -> Result<Self, serde_json::Error>
    where
        T: DomainEvent + Serialize,
    {
        let event_type = event.event_type().to_string();
        Ok(Self {
            event_id: event.event_id(),
            schema_version: Self::extract_version(&event_type),
            event_type,
            aggregate_id: event.aggregate_id(),
            aggregate_type: event.aggregate_type().to_string(),
            occurred_at: event.occurred_at(),
            payload: serde_json::to_value(event)?,
            correlation_id: None,
        })
    }

    /// Parses the `.vN` suffix of an event type, defaulting to 1.
    pub(crate) fn extract_version(event_type: &str) -> u32 {
        event_type
            .rsplit_once(".v")
            .and_then(|(_, version)| version.parse::<u32>().ok())
            .unwrap_or(1)
    }

    /// Links this event to a request or sweep tick.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Deserialize payload to a specific event type.
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Pinged {
        event_id: EventId,
        target: String,
        at: Timestamp,
    }

    domain_event!(
        Pinged,
        event_type = "monitor.pinged.v3",
        aggregate_id = target,
        aggregate_type = "Monitor",
        occurred_at = at,
        event_id = event_id
    );

    fn pinged() -> Pinged {
        Pinged {
            event_id: EventId::from_string("evt-1"),
            target: "monitor-7".to_string(),
            at: Timestamp::from_unix_secs(1_700_000_000),
        }
    }

    #[test]
    fn envelope_copies_routing_fields() {
        let env = EventEnvelope::from_event(&pinged()).unwrap();
        assert_eq!(env.event_type, "monitor.pinged.v3");
        assert_eq!(env.schema_version, 3);
        assert_eq!(env.aggregate_id, "monitor-7");
        assert_eq!(env.aggregate_type, "Monitor");
        assert_eq!(env.event_id.as_str(), "evt-1");
    }

    #[test]
    fn payload_round_trips_through_envelope() {
        let env = EventEnvelope::from_event(&pinged()).unwrap();
        let back: Pinged = env.payload_as().unwrap();
        assert_eq!(back, pinged());
    }

    #[test]
    fn version_defaults_to_one_without_suffix() {
        assert_eq!(EventEnvelope::extract_version("legacy.event"), 1);
        assert_eq!(EventEnvelope::extract_version("x.y.v12"), 12);
    }

    #[test]
    fn correlation_id_is_optional() {
        let env = EventEnvelope::from_event(&pinged()).unwrap();
        assert!(env.correlation_id.is_none());
        let env = env.with_correlation_id("sweep-1");
        assert_eq!(env.correlation_id.as_deref(), Some("sweep-1"));
    }
}

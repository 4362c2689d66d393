//! Broker error taxonomy.

use thiserror::Error;

use crate::domain::exchange::ExchangeError;
use crate::domain::foundation::{ContactId, DomainError, ErrorCode, Timestamp, ValidationError};

#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// Malformed input: bad terms, incomplete reports, unknown platform.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The event does not apply to the current state; nothing changed.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("no automation profile has capacity")]
    NoCapacityAvailable,

    /// The event is older than the last one applied for the contact.
    #[error("stale event for contact {contact_id}: {event_at} precedes {last_applied_at}")]
    StaleEvent {
        contact_id: ContactId,
        event_at: Timestamp,
        last_applied_at: Timestamp,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("contact {0} is blocked")]
    ContactBlocked(ContactId),

    #[error("infrastructure error: {0}")]
    Infrastructure(DomainError),
}

impl BrokerError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        BrokerError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        BrokerError::InvalidTransition(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            BrokerError::Validation(_) => ErrorCode::ValidationFailed,
            BrokerError::InvalidTransition(_) => ErrorCode::InvalidStateTransition,
            BrokerError::NoCapacityAvailable => ErrorCode::NoCapacityAvailable,
            BrokerError::StaleEvent { .. } => ErrorCode::StaleEvent,
            BrokerError::NotFound { kind, .. } => match *kind {
                "contact" => ErrorCode::ContactNotFound,
                "exchange" => ErrorCode::ExchangeNotFound,
                "profile" => ErrorCode::ProfileNotFound,
                _ => ErrorCode::ConversationNotFound,
            },
            BrokerError::ContactBlocked(_) => ErrorCode::ContactBlocked,
            BrokerError::Infrastructure(err) => err.code,
        }
    }

    /// Errors that leave a trace in the audit log.
    pub fn is_audited(&self) -> bool {
        matches!(
            self,
            BrokerError::InvalidTransition(_) | BrokerError::StaleEvent { .. }
        )
    }
}

impl From<ValidationError> for BrokerError {
    fn from(err: ValidationError) -> Self {
        BrokerError::Validation(err.to_string())
    }
}

impl From<ExchangeError> for BrokerError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::IncompleteReport { .. } => BrokerError::Validation(err.to_string()),
            _ => BrokerError::InvalidTransition(err.to_string()),
        }
    }
}

impl From<DomainError> for BrokerError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => BrokerError::Validation(err.message),
            ErrorCode::InvalidStateTransition => BrokerError::InvalidTransition(err.message),
            ErrorCode::NoCapacityAvailable => BrokerError::NoCapacityAvailable,
            ErrorCode::ContactNotFound => BrokerError::NotFound {
                kind: "contact",
                id: err.message,
            },
            ErrorCode::ExchangeNotFound => BrokerError::NotFound {
                kind: "exchange",
                id: err.message,
            },
            ErrorCode::ProfileNotFound => BrokerError::NotFound {
                kind: "profile",
                id: err.message,
            },
            ErrorCode::ConversationNotFound => BrokerError::NotFound {
                kind: "conversation",
                id: err.message,
            },
            _ => BrokerError::Infrastructure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exchange::ExchangeStatus;
    use crate::domain::foundation::ExchangeId;

    #[test]
    fn domain_codes_map_to_variants() {
        let err: BrokerError = DomainError::new(ErrorCode::ContactNotFound, "c-1").into();
        assert!(matches!(err, BrokerError::NotFound { kind: "contact", .. }));
        assert_eq!(err.code(), ErrorCode::ContactNotFound);

        let err: BrokerError = DomainError::database("connection reset").into();
        assert!(matches!(err, BrokerError::Infrastructure(_)));
        assert_eq!(err.code(), ErrorCode::DatabaseError);
    }

    #[test]
    fn exchange_errors_split_between_validation_and_transition() {
        let id = ExchangeId::new();
        let err: BrokerError = ExchangeError::IncompleteReport {
            id,
            missing: vec![],
        }
        .into();
        assert!(matches!(err, BrokerError::Validation(_)));

        let err: BrokerError = ExchangeError::AlreadyClosed {
            id,
            status: ExchangeStatus::Completed,
        }
        .into();
        assert!(err.is_audited());
    }

    #[test]
    fn only_rejected_events_are_audited() {
        assert!(!BrokerError::NoCapacityAvailable.is_audited());
        assert!(BrokerError::invalid_transition("nope").is_audited());
    }
}

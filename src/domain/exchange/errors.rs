//! Exchange-specific error types.

use thiserror::Error;

use super::status::ExchangeStatus;
use super::terms::ActionKind;
use crate::domain::foundation::{DomainError, ErrorCode, ExchangeId, StateMachine};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// The requested step is not valid from the current status.
    #[error("exchange {id}: cannot {action} while {status}")]
    InvalidTransition {
        id: ExchangeId,
        status: ExchangeStatus,
        action: &'static str,
    },

    /// The exchange already reached a terminal status.
    #[error("exchange {id} already closed as {status}")]
    AlreadyClosed { id: ExchangeId, status: ExchangeStatus },

    /// Both sides have not proposed identical terms.
    #[error("exchange {0}: proposals from both sides do not match")]
    TermsMismatch(ExchangeId),

    /// An execution report left required actions unreported.
    #[error("exchange {id}: execution report is missing {missing:?}")]
    IncompleteReport {
        id: ExchangeId,
        missing: Vec<ActionKind>,
    },
}

impl ExchangeError {
    pub fn invalid(id: ExchangeId, status: ExchangeStatus, action: &'static str) -> Self {
        if status.is_terminal() {
            ExchangeError::AlreadyClosed { id, status }
        } else {
            ExchangeError::InvalidTransition { id, status, action }
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ExchangeError::IncompleteReport { .. } => ErrorCode::ValidationFailed,
            _ => ErrorCode::InvalidStateTransition,
        }
    }
}

impl From<ExchangeError> for DomainError {
    fn from(err: ExchangeError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}

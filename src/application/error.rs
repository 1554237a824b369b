use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::client::ClientError;
use crate::domain::{AccountId, MinorUnits, TransactionError};

#[derive(Error, Debug)]
pub enum AppError {
    // Validation: rejected before any I/O.
    #[error("invalid {field}: {value:?}")]
    InvalidId { field: &'static str, value: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(MinorUnits),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(#[from] TransactionError),

    #[error("{0} must not be empty")]
    MissingField(&'static str),

    #[error("invalid date range: {start} is after {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("balance of account {account_id} would overflow")]
    BalanceOverflow { account_id: AccountId },

    // Downstream failures.
    #[error("failed to {operation}: {source:#}")]
    Retrieval {
        operation: &'static str,
        source: anyhow::Error,
    },

    #[error("failed to {operation}: {source:#}")]
    Write {
        operation: &'static str,
        source: anyhow::Error,
    },

    #[error("{service} service failed: {source}")]
    Downstream {
        service: &'static str,
        source: ClientError,
    },

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl AppError {
    pub(crate) fn retrieval(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| AppError::Retrieval { operation, source }
    }

    pub(crate) fn write(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| AppError::Write { operation, source }
    }

    /// True for errors raised before touching storage or other services.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::InvalidId { .. }
                | AppError::InvalidAmount(_)
                | AppError::InvalidTransaction(_)
                | AppError::MissingField(_)
                | AppError::InvalidRange { .. }
        )
    }
}

/// Parse an identifier supplied by a caller.
pub(crate) fn parse_id(field: &'static str, value: &str) -> Result<uuid::Uuid, AppError> {
    uuid::Uuid::parse_str(value.trim()).map_err(|_| AppError::InvalidId {
        field,
        value: value.to_string(),
    })
}

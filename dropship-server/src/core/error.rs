//! Engine error classification
//!
//! Every failure inside the engine is one of these variants. The variant
//! decides whether a task queue retries it ([`EngineError::is_retryable`]) and
//! which API error code it surfaces as.

use crate::storage::StorageError;
use shared::error::{AppError, ErrorCode};
use shared::models::DropshipStatus;
use std::fmt;
use thiserror::Error;

/// One itemized stock problem found by pre-flight validation
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StockShortage {
    pub sku: String,
    pub requested: i64,
    pub available: i64,
    /// Supplier product is inactive / discontinued
    pub inactive: bool,
}

impl fmt::Display for StockShortage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inactive {
            write!(f, "{}: discontinued", self.sku)
        } else {
            write!(
                f,
                "{}: requested {}, available {}",
                self.sku, self.requested, self.available
            )
        }
    }
}

fn join_shortages(items: &[StockShortage]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing endpoint / credentials. Fatal, surfaced to admins.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection failure or non-success response. Retryable.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Per-call timeout. Retryable.
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient stock: {}", join_shortages(.0))]
    InsufficientStock(Vec<StockShortage>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Supplier could not be identified")]
    UnknownSupplier,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Illegal status transition {from} -> {to}")]
    IllegalTransition {
        from: DropshipStatus,
        to: DropshipStatus,
    },

    #[error("Order {0} already decomposed")]
    AlreadyDecomposed(i64),

    #[error("Order {0} is cancelled")]
    OrderCancelled(i64),

    #[error("Order {0} has no dropship-eligible items")]
    NotEligible(i64),

    #[error("Retry not allowed: {0}")]
    RetryRejected(String),

    #[error("Integration does not support automated sync: {0}")]
    NotAutomated(String),

    #[error("Unsupported webhook event: {0}")]
    UnsupportedEvent(String),

    #[error("Supplier {0} is not active")]
    SupplierInactive(i64),

    #[error("Mapping {0} has no pending price change")]
    NoPendingPriceChange(i64),

    /// The supplier took the order but it had already reached a terminal
    /// status here
    #[error("Dropship order {id} became {status} while it was being submitted")]
    SubmissionConflict { id: i64, status: DropshipStatus },

    #[error("Queue {0} is closed")]
    QueueClosed(&'static str),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Transient failures the task queues re-attempt with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::Storage(_)
        )
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration(_) => ErrorCode::IntegrationMisconfigured,
            Self::Transport(_) => ErrorCode::TransportFailed,
            Self::Timeout(_) => ErrorCode::TimeoutError,
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::InsufficientStock(_) => ErrorCode::InsufficientStock,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::UnknownSupplier => ErrorCode::SupplierNotFound,
            Self::InvalidSignature => ErrorCode::InvalidSignature,
            Self::IllegalTransition { .. } => ErrorCode::IllegalStatusTransition,
            Self::AlreadyDecomposed(_) => ErrorCode::OrderAlreadyDecomposed,
            Self::OrderCancelled(_) => ErrorCode::OrderCancelled,
            Self::NotEligible(_) => ErrorCode::OrderNotEligible,
            Self::RetryRejected(_) => ErrorCode::RetryNotAllowed,
            Self::NotAutomated(_) => ErrorCode::IntegrationNotAutomated,
            Self::UnsupportedEvent(_) => ErrorCode::UnsupportedEvent,
            Self::SupplierInactive(_) => ErrorCode::SupplierInactive,
            Self::NoPendingPriceChange(_) => ErrorCode::NoPendingPriceChange,
            Self::SubmissionConflict { .. } => ErrorCode::StatusConflict,
            Self::QueueClosed(_) => ErrorCode::InternalError,
            Self::Storage(StorageError::StatusConflict { .. }) => ErrorCode::StatusConflict,
            Self::Storage(StorageError::AlreadyDecomposed(_)) => ErrorCode::OrderAlreadyDecomposed,
            Self::Storage(StorageError::NotFound { .. }) => ErrorCode::NotFound,
            Self::Storage(_) => ErrorCode::DatabaseError,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let app = match &err {
            // generic text only
            EngineError::InvalidSignature => AppError::new(err.code()),
            _ => AppError::with_message(err.code(), err.to_string()),
        };
        match err {
            EngineError::InsufficientStock(items) => app.with_detail(
                "shortages",
                serde_json::to_value(items).unwrap_or_default(),
            ),
            _ => app,
        }
    }
}

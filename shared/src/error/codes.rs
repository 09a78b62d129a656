//! Unified error codes for the dropship engine
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 4xxx: Order / DropshipOrder errors
//! - 6xxx: Product / catalog errors
//! - 7xxx: Supplier / integration errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,

    // ==================== 4xxx: Order ====================
    /// Order is cancelled or refunded
    OrderCancelled = 4002,
    /// Order has already been split into dropship orders
    OrderAlreadyDecomposed = 4003,
    /// Order has no dropship-eligible items
    OrderNotEligible = 4004,
    /// Status transition is not allowed by the state machine
    IllegalStatusTransition = 4006,
    /// Status changed concurrently (compare-and-set failed)
    StatusConflict = 4007,
    /// Retry rejected (cutoff reached, wrong state, supplier inactive)
    RetryNotAllowed = 4008,

    // ==================== 6xxx: Product ====================
    /// Supplier stock is insufficient
    InsufficientStock = 6003,
    /// Mapping holds no pending price change
    NoPendingPriceChange = 6006,

    // ==================== 7xxx: Supplier ====================
    /// Supplier not found / could not be identified
    SupplierNotFound = 7001,
    /// Supplier is not active
    SupplierInactive = 7002,
    /// Integration is missing endpoint or credentials
    IntegrationMisconfigured = 7004,
    /// Integration type does not support automated sync
    IntegrationNotAutomated = 7005,
    /// Webhook signature did not verify
    InvalidSignature = 7006,
    /// Transport to the supplier failed
    TransportFailed = 7007,
    /// Webhook event type is not supported
    UnsupportedEvent = 7008,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Operation timed out
    TimeoutError = 9004,
}

impl ErrorCode {
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",

            // Order
            ErrorCode::OrderCancelled => "Order is cancelled or refunded",
            ErrorCode::OrderAlreadyDecomposed => "Order already has dropship orders",
            ErrorCode::OrderNotEligible => "Order has no dropship-eligible items",
            ErrorCode::IllegalStatusTransition => "Status transition not allowed",
            ErrorCode::StatusConflict => "Status was changed concurrently",
            ErrorCode::RetryNotAllowed => "Retry not allowed",

            // Product
            ErrorCode::InsufficientStock => "Insufficient supplier stock",
            ErrorCode::NoPendingPriceChange => "No pending price change",

            // Supplier
            ErrorCode::SupplierNotFound => "Supplier not found",
            ErrorCode::SupplierInactive => "Supplier is not active",
            ErrorCode::IntegrationMisconfigured => "Supplier integration is misconfigured",
            ErrorCode::IntegrationNotAutomated => "Integration does not support automated sync",
            ErrorCode::InvalidSignature => "Invalid webhook signature",
            ErrorCode::TransportFailed => "Supplier transport failed",
            ErrorCode::UnsupportedEvent => "Unsupported webhook event",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::TimeoutError => "Operation timed out",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),

            // Order
            4002 => Ok(ErrorCode::OrderCancelled),
            4003 => Ok(ErrorCode::OrderAlreadyDecomposed),
            4004 => Ok(ErrorCode::OrderNotEligible),
            4006 => Ok(ErrorCode::IllegalStatusTransition),
            4007 => Ok(ErrorCode::StatusConflict),
            4008 => Ok(ErrorCode::RetryNotAllowed),

            // Product
            6003 => Ok(ErrorCode::InsufficientStock),
            6006 => Ok(ErrorCode::NoPendingPriceChange),

            // Supplier
            7001 => Ok(ErrorCode::SupplierNotFound),
            7002 => Ok(ErrorCode::SupplierInactive),
            7004 => Ok(ErrorCode::IntegrationMisconfigured),
            7005 => Ok(ErrorCode::IntegrationNotAutomated),
            7006 => Ok(ErrorCode::InvalidSignature),
            7007 => Ok(ErrorCode::TransportFailed),
            7008 => Ok(ErrorCode::UnsupportedEvent),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9004 => Ok(ErrorCode::TimeoutError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

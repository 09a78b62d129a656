//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound | Self::SupplierNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::OrderAlreadyDecomposed
            | Self::StatusConflict
            | Self::OrderCancelled => StatusCode::CONFLICT,

            // 401 Unauthorized
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,

            // 422 Unprocessable
            Self::OrderNotEligible
            | Self::IllegalStatusTransition
            | Self::RetryNotAllowed
            | Self::InsufficientStock
            | Self::NoPendingPriceChange
            | Self::SupplierInactive
            | Self::IntegrationNotAutomated
            | Self::UnsupportedEvent => StatusCode::UNPROCESSABLE_ENTITY,

            // 400 Bad Request
            Self::ValidationFailed => StatusCode::BAD_REQUEST,

            // 502 Bad Gateway
            Self::TransportFailed => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            Self::TimeoutError => StatusCode::GATEWAY_TIMEOUT,

            // 500
            Self::IntegrationMisconfigured | Self::InternalError | Self::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::OrderNotFound | Self::PaymentNotFound => StatusCode::NOT_FOUND,

            Self::PaymentProviderError => StatusCode::BAD_GATEWAY,

            Self::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request (signature, validation and metadata errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

//! Unified error codes for the marketplace services
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Webhook authentication errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values so they serialize the same
/// way in webhook acknowledgements, logs and API bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Invalid format
    InvalidFormat = 6,

    // ==================== 1xxx: Webhook auth ====================
    /// Signature header missing
    SignatureMissing = 1001,
    /// Signature does not match the payload
    SignatureInvalid = 1002,
    /// Signature timestamp outside tolerance
    SignatureExpired = 1003,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Required order metadata missing from the provider payload
    OrderMetadataMissing = 4004,

    // ==================== 5xxx: Payment ====================
    /// Payment not found
    PaymentNotFound = 5001,
    /// Settlement data from the provider is incomplete
    PaymentInvalidSettlement = 5003,
    /// Payment provider request failed
    PaymentProviderError = 5004,

    // ==================== 9xxx: System ====================
    /// Database error
    DatabaseError = 9002,
}

impl ErrorCode {
    /// Numeric value of this code
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Default English message for this code
    pub const fn message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidFormat => "Invalid format",

            ErrorCode::SignatureMissing => "Webhook signature header is missing",
            ErrorCode::SignatureInvalid => "Webhook signature is invalid",
            ErrorCode::SignatureExpired => "Webhook signature timestamp is outside tolerance",

            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderMetadataMissing => "Required order metadata is missing",

            ErrorCode::PaymentNotFound => "Payment not found",
            ErrorCode::PaymentInvalidSettlement => "Settlement data is incomplete",
            ErrorCode::PaymentProviderError => "Payment provider request failed",

            ErrorCode::DatabaseError => "Database error",
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
            6 => Ok(ErrorCode::InvalidFormat),

            // Webhook auth
            1001 => Ok(ErrorCode::SignatureMissing),
            1002 => Ok(ErrorCode::SignatureInvalid),
            1003 => Ok(ErrorCode::SignatureExpired),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4004 => Ok(ErrorCode::OrderMetadataMissing),

            // Payment
            5001 => Ok(ErrorCode::PaymentNotFound),
            5003 => Ok(ErrorCode::PaymentInvalidSettlement),
            5004 => Ok(ErrorCode::PaymentProviderError),

            // System
            9002 => Ok(ErrorCode::DatabaseError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

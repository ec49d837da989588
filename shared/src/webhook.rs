//! Payment webhook acknowledgement body
//!
//! ```json
//! {"received": true}
//! {"received": true, "skipped": true, "reason": "already_processed"}
//! {"received": true, "error": {"code": 5001, "message": "Payment not found"}}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ApiResponse, AppError};

/// Reason reported when a delivery is acknowledged without processing
pub const REASON_ALREADY_PROCESSED: &str = "already_processed";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiResponse<()>>,
}

impl WebhookAck {
    /// Event accepted and processed
    pub fn received() -> Self {
        Self {
            received: true,
            skipped: false,
            reason: None,
            error: None,
        }
    }

    /// Event id already recorded in the ledger
    pub fn already_processed() -> Self {
        Self {
            received: true,
            skipped: true,
            reason: Some(REASON_ALREADY_PROCESSED.to_string()),
            error: None,
        }
    }

    /// Processing failed; `received` tells the provider whether it was accepted
    pub fn failed(received: bool, err: &AppError) -> Self {
        Self {
            received,
            skipped: false,
            reason: None,
            error: Some(ApiResponse::error(err)),
        }
    }
}

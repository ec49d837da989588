//! Cart Model

use serde::{Deserialize, Serialize};

/// Unpurchased selections of a buyer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cart {
    pub id: String,
    pub buyer_id: String,
    pub created_at: i64,
}

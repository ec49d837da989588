//! Catalog Models (workflows and packs)

use serde::{Deserialize, Serialize};

/// A sellable workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Workflow {
    pub id: String,
    pub seller_id: String,
    pub title: String,
    pub price_cents: i64,
    pub sales_count: i64,
}

/// A named bundle of workflows sold as one unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pack {
    pub id: String,
    pub seller_id: String,
    pub title: String,
    pub price_cents: i64,
    pub sales_count: i64,
    /// Member workflow ids
    pub workflow_ids: Vec<String>,
}

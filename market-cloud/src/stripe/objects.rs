//! Stripe object shapes consumed by reconciliation
//!
//! Only the fields the reconciler reads are modelled; everything else is
//! kept in the raw JSON stored alongside the payment.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

/// `checkout.session` object
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Expandable field: id string or an embedded payment intent
    #[serde(default, deserialize_with = "expandable_id")]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "metadata")]
    pub metadata: HashMap<String, String>,
}

/// `payment_intent` object
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub amount_received: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub latest_charge: Option<String>,
    #[serde(default, deserialize_with = "metadata")]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    /// Amount actually captured, falling back to the requested amount
    pub fn settled_amount(&self) -> i64 {
        self.amount_received
            .filter(|amount| *amount > 0)
            .unwrap_or(self.amount)
    }
}

/// `charge` object
#[derive(Debug, Clone, Deserialize)]
pub struct Charge {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    /// Cumulative amount refunded so far
    #[serde(default)]
    pub amount_refunded: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub payment_intent: Option<String>,
}

/// Accept `null`, `"id"` or `{"id": "...", ...}`
fn expandable_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(id)) => Some(id),
        Some(serde_json::Value::Object(obj)) => obj
            .get("id")
            .and_then(|id| id.as_str())
            .map(String::from),
        _ => None,
    })
}

/// Stripe metadata is a string map; `null` means empty
fn metadata<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<HashMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

//! Stripe REST lookups used during reconciliation

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::reconcile::{GatewayError, PaymentGateway, SettledCharge};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: impl Into<String>, api_base: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            secret_key: secret_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }
}

/// Pull the settled charge out of a payment intent with `latest_charge` expanded
fn settled_charge_from(intent: Value) -> Result<SettledCharge, GatewayError> {
    let payment_intent_id = intent["id"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| GatewayError::Decode(format!("payment intent without id: {intent}")))?;

    match intent.get("latest_charge") {
        Some(Value::Object(charge)) => {
            let charge_id = charge
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(SettledCharge {
                payment_intent_id,
                charge_id,
                raw: Value::Object(charge.clone()),
            })
        }
        Some(Value::String(charge_id)) => Ok(SettledCharge {
            payment_intent_id,
            charge_id: charge_id.clone(),
            raw: intent,
        }),
        _ => Ok(SettledCharge {
            payment_intent_id,
            charge_id: String::new(),
            raw: intent,
        }),
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn settled_charge(&self, payment_intent_id: &str) -> Result<SettledCharge, GatewayError> {
        let resp = self
            .client
            .get(format!("{}/v1/payment_intents/{payment_intent_id}", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .query(&[("expand[]", "latest_charge")])
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("no error message")
                .to_string();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        settled_charge_from(body)
    }
}

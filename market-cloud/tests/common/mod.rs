//! Shared fixtures for the integration suites
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use market_cloud::reconcile::memory::MemoryState;
use market_cloud::reconcile::notify::{BuyerOrderConfirmed, BuyerOrderRefunded, SellerNewOrder};
use market_cloud::reconcile::{
    GatewayError, MemoryStore, Notifier, NotifyError, PaymentGateway, Reconciler, SettledCharge,
    TestOrderPolicy,
};
use market_cloud::stripe;
use market_cloud::webhook::{WebhookProcessor, WebhookReply};
use serde_json::{Value, json};
use shared::models::{Cart, Order, OrderItem, OrderStatus, Pack, PackItem, Workflow};

pub const SECRET: &str = "whsec_integration";
pub const NOW: i64 = 1_700_000_000;
/// Creation time of seeded orders, epoch millis
pub const CREATED_AT: i64 = 1_699_999_000_000;

/// Resolves payment intents from a fixed table; can be switched off
#[derive(Default)]
pub struct FakeGateway {
    charges: Mutex<HashMap<String, String>>,
    down: AtomicBool,
}

impl FakeGateway {
    pub fn with_charge(self, payment_intent_id: &str, charge_id: &str) -> Self {
        self.add_charge(payment_intent_id, charge_id);
        self
    }

    pub fn add_charge(&self, payment_intent_id: &str, charge_id: &str) {
        self.charges
            .lock()
            .unwrap()
            .insert(payment_intent_id.into(), charge_id.into());
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn settled_charge(&self, payment_intent_id: &str) -> Result<SettledCharge, GatewayError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(GatewayError::Status {
                status: 503,
                message: "service unavailable".into(),
            });
        }
        let charge_id = self
            .charges
            .lock()
            .unwrap()
            .get(payment_intent_id)
            .cloned()
            .unwrap_or_default();
        Ok(SettledCharge {
            payment_intent_id: payment_intent_id.into(),
            raw: json!({"id": charge_id, "object": "charge", "payment_intent": payment_intent_id}),
            charge_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Seller(SellerNewOrder),
    Confirmed(BuyerOrderConfirmed),
    Refunded(BuyerOrderRefunded),
}

/// Records every notice; optionally fails all of them after recording
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn seller_notices(&self) -> Vec<SellerNewOrder> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Seller(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    fn push(&self, sent: Sent) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(sent);
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Status(502));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn seller_new_order(&self, notice: &SellerNewOrder) -> Result<(), NotifyError> {
        self.push(Sent::Seller(notice.clone()))
    }

    async fn buyer_order_confirmed(&self, notice: &BuyerOrderConfirmed) -> Result<(), NotifyError> {
        self.push(Sent::Confirmed(notice.clone()))
    }

    async fn buyer_order_refunded(&self, notice: &BuyerOrderRefunded) -> Result<(), NotifyError> {
        self.push(Sent::Refunded(notice.clone()))
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub processor: WebhookProcessor,
}

impl Harness {
    pub fn new(gateway: FakeGateway) -> Self {
        let store = MemoryStore::new();
        let gateway = Arc::new(gateway);
        let notifier = Arc::new(RecordingNotifier::default());
        let reconciler = Reconciler::new(
            Arc::new(store.clone()),
            gateway.clone(),
            notifier.clone(),
            TestOrderPolicy::disabled(),
        );
        let processor = WebhookProcessor::new(SECRET, 300, Arc::new(store.clone()), reconciler);
        Self {
            store,
            gateway,
            notifier,
            processor,
        }
    }

    pub async fn seed(&self, f: impl FnOnce(&mut MemoryState)) {
        self.store.seed(f).await;
    }

    /// Sign and deliver an event
    pub async fn deliver(&self, event: &Value) -> WebhookReply {
        let payload = serde_json::to_vec(event).unwrap();
        let header = sign(&payload);
        self.processor
            .process_at(&payload, Some(&header), NOW)
            .await
    }

    pub async fn state(&self) -> MemoryState {
        self.store.snapshot().await
    }
}

pub fn sign(payload: &[u8]) -> String {
    stripe::signature_header(payload, SECRET, NOW).unwrap()
}

pub fn event(id: &str, event_type: &str, object: Value) -> Value {
    json!({
        "id": id,
        "object": "event",
        "type": event_type,
        "data": {"object": object}
    })
}

/// `checkout.session.completed` for a pending order
pub fn checkout_completed(
    event_id: &str,
    session_id: &str,
    payment_intent: &str,
    amount_total: i64,
    metadata: Value,
) -> Value {
    event(
        event_id,
        "checkout.session.completed",
        json!({
            "id": session_id,
            "object": "checkout.session",
            "payment_intent": payment_intent,
            "amount_total": amount_total,
            "currency": "eur",
            "payment_status": "paid",
            "metadata": metadata
        }),
    )
}

pub fn payment_succeeded(
    event_id: &str,
    payment_intent: &str,
    charge_id: &str,
    amount: i64,
    metadata: Value,
) -> Value {
    event(
        event_id,
        "payment_intent.succeeded",
        json!({
            "id": payment_intent,
            "object": "payment_intent",
            "amount": amount,
            "amount_received": amount,
            "currency": "eur",
            "latest_charge": charge_id,
            "metadata": metadata
        }),
    )
}

pub fn charge_refunded(event_id: &str, charge_id: &str, amount: i64, refunded: i64) -> Value {
    event(
        event_id,
        "charge.refunded",
        json!({
            "id": charge_id,
            "object": "charge",
            "amount": amount,
            "amount_refunded": refunded,
            "currency": "eur",
            "refunded": amount == refunded
        }),
    )
}

pub fn workflow(id: &str, seller_id: &str, title: &str, price_cents: i64, sales: i64) -> Workflow {
    Workflow {
        id: id.into(),
        seller_id: seller_id.into(),
        title: title.into(),
        price_cents,
        sales_count: sales,
    }
}

pub fn pending_order(id: &str, buyer_id: &str, total_cents: i64, created_at: i64) -> Order {
    Order {
        id: id.into(),
        buyer_id: buyer_id.into(),
        status: OrderStatus::Pending,
        total_cents,
        currency: "eur".into(),
        provider_reference: None,
        paid_at: None,
        created_at,
    }
}

pub fn insert_workflow(state: &mut MemoryState, workflow: Workflow) {
    state.workflows.insert(workflow.id.clone(), workflow);
}

pub fn insert_order(state: &mut MemoryState, order: Order) {
    state.orders.insert(order.id.clone(), order);
}

pub fn add_item(state: &mut MemoryState, order_id: &str, workflow_id: &str, quantity: i32) {
    let unit_price_cents = state.workflows[workflow_id].price_cents;
    state.order_items.push(OrderItem {
        id: format!("oi_{order_id}_{workflow_id}"),
        order_id: order_id.into(),
        workflow_id: workflow_id.into(),
        quantity,
        unit_price_cents,
    });
}

pub fn insert_pack(state: &mut MemoryState, pack: Pack) {
    state.packs.insert(pack.id.clone(), pack);
}

pub fn add_pack_item(state: &mut MemoryState, order_id: &str, pack_id: &str, quantity: i32) {
    let unit_price_cents = state.packs[pack_id].price_cents;
    state.pack_items.push(PackItem {
        id: format!("pi_{order_id}_{pack_id}"),
        order_id: order_id.into(),
        pack_id: pack_id.into(),
        quantity,
        unit_price_cents,
    });
}

pub fn insert_cart(state: &mut MemoryState, cart_id: &str, buyer_id: &str) {
    state.carts.insert(
        cart_id.into(),
        Cart {
            id: cart_id.into(),
            buyer_id: buyer_id.into(),
            created_at: CREATED_AT,
        },
    );
}

/// Buyer `buyer_1` ("Ada") with a pending order `ord_1` for one `wf_1` (20.00 EUR)
pub fn single_workflow_order(state: &mut MemoryState) {
    state.users.insert("buyer_1".into(), "Ada".into());
    insert_workflow(state, workflow("wf_1", "seller_1", "Invoice OCR", 2000, 7));
    insert_order(state, pending_order("ord_1", "buyer_1", 2000, CREATED_AT));
    add_item(state, "ord_1", "wf_1", 1);
    insert_cart(state, "cart_1", "buyer_1");
}

pub fn ord_1_metadata() -> Value {
    json!({"order_id": "ord_1", "buyer_id": "buyer_1", "workflow_id": "wf_1", "cart_id": "cart_1"})
}

/// `payment_intent.succeeded` whose `latest_charge` is not set yet
pub fn payment_succeeded_without_charge(
    event_id: &str,
    payment_intent: &str,
    amount: i64,
    metadata: Value,
) -> Value {
    event(
        event_id,
        "payment_intent.succeeded",
        json!({
            "id": payment_intent,
            "object": "payment_intent",
            "amount": amount,
            "amount_received": amount,
            "currency": "eur",
            "latest_charge": null,
            "metadata": metadata
        }),
    )
}

/// `charge.refunded` that names the payment intent it belongs to
pub fn charge_refunded_for_intent(
    event_id: &str,
    charge_id: &str,
    payment_intent: &str,
    amount: i64,
    refunded: i64,
) -> Value {
    event(
        event_id,
        "charge.refunded",
        json!({
            "id": charge_id,
            "object": "charge",
            "amount": amount,
            "amount_refunded": refunded,
            "currency": "eur",
            "payment_intent": payment_intent,
            "refunded": amount == refunded
        }),
    )
}

/// Two pending orders from one multi-seller checkout sharing `cart_1`
pub fn two_seller_cart(state: &mut MemoryState) {
    state.users.insert("buyer_1".into(), "Ada".into());
    insert_workflow(state, workflow("wf_a", "seller_a", "Lead Scoring", 1500, 0));
    insert_workflow(state, workflow("wf_b", "seller_b", "Email Triage", 2500, 0));
    insert_order(state, pending_order("ord_a", "buyer_1", 1500, CREATED_AT));
    insert_order(state, pending_order("ord_b", "buyer_1", 2500, CREATED_AT + 1));
    add_item(state, "ord_a", "wf_a", 1);
    add_item(state, "ord_b", "wf_b", 1);
    insert_cart(state, "cart_1", "buyer_1");
}

pub fn multi_seller_metadata(order_id: &str) -> Value {
    json!({
        "order_id": order_id,
        "buyer_id": "buyer_1",
        "cart_order": "true",
        "cart_id": "cart_1",
        "multi_seller": "true"
    })
}

/// Pending order `ord_1` for one `pk_1` bundling `wf_a` (2 sales) and `wf_b` (3 sales)
pub fn pack_order(state: &mut MemoryState) {
    insert_workflow(state, workflow("wf_a", "seller_1", "Lead Scoring", 1500, 2));
    insert_workflow(state, workflow("wf_b", "seller_1", "Email Triage", 2500, 3));
    insert_pack(
        state,
        Pack {
            id: "pk_1".into(),
            seller_id: "seller_1".into(),
            title: "Sales Starter".into(),
            price_cents: 3000,
            sales_count: 0,
            workflow_ids: vec!["wf_a".into(), "wf_b".into()],
        },
    );
    insert_order(state, pending_order("ord_1", "buyer_1", 3000, CREATED_AT));
    add_pack_item(state, "ord_1", "pk_1", 1);
}

pub fn pack_metadata() -> Value {
    json!({
        "order_id": "ord_1",
        "buyer_id": "buyer_1",
        "pack_order": "true",
        "pack_id": "pk_1"
    })
}

//! End-to-end reconciliation through the webhook processor

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;
use shared::error::ErrorCode;
use shared::models::{AuditAction, OrderStatus, PaymentStatus};

#[tokio::test]
async fn test_ord_1_checkout_settles_everything() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    h.seed(single_workflow_order).await;

    let reply = h
        .deliver(&checkout_completed("evt_1", "cs_1", "pi_1", 2000, ord_1_metadata()))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.received);
    assert!(reply.body.error.is_none());

    let state = h.state().await;
    assert_eq!(state.order_status("ord_1"), Some(OrderStatus::Paid));
    let payments = state.payments_for("ord_1");
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].provider, "stripe");
    assert_eq!(payments[0].provider_charge_id, "ch_1");
    assert_eq!(payments[0].amount_cents, 2000);
    assert_eq!(payments[0].currency, "eur");
    assert_eq!(payments[0].status, PaymentStatus::Succeeded);
    assert_eq!(state.sales_count("wf_1"), Some(8));
    assert!(state.carts.is_empty());
    assert_eq!(state.audit_log.len(), 1);
    assert_eq!(state.audit_log[0].action, AuditAction::OrderCompleted);
    assert_eq!(state.audit_log[0].metadata["charge_id"], "ch_1");
    assert!(state.processed_events.contains_key("evt_1"));

    let sellers = h.notifier.seller_notices();
    assert_eq!(sellers.len(), 1);
    assert_eq!(sellers[0].seller_id, "seller_1");
    assert_eq!(sellers[0].buyer_name, "Ada");
    assert_eq!(sellers[0].item_title, "Invoice OCR");
    assert_eq!(sellers[0].amount_cents, 2000);
    assert!(h.notifier.sent().iter().any(|s| matches!(
        s,
        Sent::Confirmed(n) if n.buyer_id == "buyer_1" && n.order_id == "ord_1"
    )));
}

#[tokio::test]
async fn test_redelivery_is_skipped() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    h.seed(single_workflow_order).await;
    let event = checkout_completed("evt_1", "cs_1", "pi_1", 2000, ord_1_metadata());

    h.deliver(&event).await;
    let before = h.state().await;
    let sent_before = h.notifier.sent().len();

    let reply = h.deliver(&event).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.skipped);
    assert_eq!(reply.body.reason.as_deref(), Some("already_processed"));

    let after = h.state().await;
    assert_eq!(after.orders, before.orders);
    assert_eq!(after.payments, before.payments);
    assert_eq!(after.workflows, before.workflows);
    assert_eq!(after.audit_log.len(), before.audit_log.len());
    assert_eq!(h.notifier.sent().len(), sent_before);
}

#[tokio::test]
async fn test_new_event_for_settled_order_changes_nothing() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    h.seed(single_workflow_order).await;

    h.deliver(&checkout_completed("evt_1", "cs_1", "pi_1", 2000, ord_1_metadata()))
        .await;
    let before = h.state().await;

    // Same checkout, different event id: the ledger cannot help, the order guard must
    let reply = h
        .deliver(&checkout_completed("evt_1b", "cs_1", "pi_1", 2000, ord_1_metadata()))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.error.is_none());

    let after = h.state().await;
    assert_eq!(after.payments.len(), 1);
    assert_eq!(after.sales_count("wf_1"), before.sales_count("wf_1"));
    assert_eq!(after.audit_log.len(), 1);
    assert!(after.processed_events.contains_key("evt_1b"));
}

#[tokio::test]
async fn test_checkout_and_payment_intent_settle_once() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    h.seed(single_workflow_order).await;

    h.deliver(&payment_succeeded("evt_pi", "pi_1", "ch_1", 2000, ord_1_metadata()))
        .await;
    let reply = h
        .deliver(&checkout_completed("evt_cs", "cs_1", "pi_1", 2000, ord_1_metadata()))
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let state = h.state().await;
    assert_eq!(state.order_status("ord_1"), Some(OrderStatus::Paid));
    assert_eq!(state.payments.len(), 1);
    assert_eq!(state.sales_count("wf_1"), Some(8));
    assert_eq!(state.audit_log.len(), 1);
    assert_eq!(
        state.orders["ord_1"].provider_reference.as_deref(),
        Some("pi_1")
    );
    assert_eq!(h.notifier.seller_notices().len(), 1);
}

#[tokio::test]
async fn test_full_refund_reverses_settlement() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    h.seed(single_workflow_order).await;
    h.deliver(&checkout_completed("evt_1", "cs_1", "pi_1", 2000, ord_1_metadata()))
        .await;

    let reply = h.deliver(&charge_refunded("evt_2", "ch_1", 2000, 2000)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.error.is_none());

    let state = h.state().await;
    assert_eq!(state.order_status("ord_1"), Some(OrderStatus::Refunded));
    assert_eq!(state.payments[0].status, PaymentStatus::Refunded);
    assert_eq!(state.sales_count("wf_1"), Some(7));
    let refund_audit = state.audit_log.last().unwrap();
    assert_eq!(refund_audit.action, AuditAction::OrderRefunded);
    assert_eq!(refund_audit.actor, "system");
    assert_eq!(refund_audit.metadata["refund_amount"], 2000);
    assert!(h.notifier.sent().iter().any(|s| matches!(
        s,
        Sent::Refunded(n) if n.order_id == "ord_1" && n.amount_cents == 2000
    )));

    // A later refund notification for the same charge is a no-op
    h.deliver(&charge_refunded("evt_3", "ch_1", 2000, 2000)).await;
    let again = h.state().await;
    assert_eq!(again.sales_count("wf_1"), Some(7));
    assert_eq!(again.audit_log.len(), state.audit_log.len());
}

#[tokio::test]
async fn test_partial_then_full_refund() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    h.seed(single_workflow_order).await;
    h.deliver(&checkout_completed("evt_1", "cs_1", "pi_1", 2000, ord_1_metadata()))
        .await;

    h.deliver(&charge_refunded("evt_2", "ch_1", 2000, 500)).await;
    let state = h.state().await;
    assert_eq!(state.order_status("ord_1"), Some(OrderStatus::PartialRefund));
    assert_eq!(state.payments[0].status, PaymentStatus::PartialRefund);
    assert_eq!(state.sales_count("wf_1"), Some(8));
    assert_eq!(
        state.audit_log.last().unwrap().action,
        AuditAction::OrderPartialRefund
    );

    h.deliver(&charge_refunded("evt_3", "ch_1", 2000, 2000)).await;
    let state = h.state().await;
    assert_eq!(state.order_status("ord_1"), Some(OrderStatus::Refunded));
    assert_eq!(state.payments[0].status, PaymentStatus::Refunded);
    assert_eq!(state.sales_count("wf_1"), Some(7));
}

#[tokio::test]
async fn test_multi_seller_cart_cleared_after_last_order() {
    let h = Harness::new(
        FakeGateway::default()
            .with_charge("pi_a", "ch_a")
            .with_charge("pi_b", "ch_b"),
    );
    h.seed(two_seller_cart).await;

    h.deliver(&checkout_completed("evt_a", "cs_a", "pi_a", 1500, multi_seller_metadata("ord_a")))
        .await;
    let state = h.state().await;
    assert_eq!(state.order_status("ord_a"), Some(OrderStatus::Paid));
    assert!(state.carts.contains_key("cart_1"), "sibling order still pending");

    h.deliver(&checkout_completed("evt_b", "cs_b", "pi_b", 2500, multi_seller_metadata("ord_b")))
        .await;
    let state = h.state().await;
    assert_eq!(state.order_status("ord_b"), Some(OrderStatus::Paid));
    assert!(state.carts.is_empty());
    assert_eq!(state.payments.len(), 2);
    assert_eq!(state.sales_count("wf_a"), Some(1));
    assert_eq!(state.sales_count("wf_b"), Some(1));

    let sellers: Vec<_> = h
        .notifier
        .seller_notices()
        .into_iter()
        .map(|n| (n.seller_id, n.order_id))
        .collect();
    assert_eq!(
        sellers,
        vec![
            ("seller_a".to_string(), "ord_a".to_string()),
            ("seller_b".to_string(), "ord_b".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_one_seller_notice_per_seller_in_order() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    h.seed(|s| {
        insert_workflow(s, workflow("wf_a", "seller_a", "Lead Scoring", 1500, 0));
        insert_workflow(s, workflow("wf_b", "seller_b", "Email Triage", 2500, 0));
        insert_workflow(s, workflow("wf_c", "seller_a", "CRM Sync", 500, 0));
        insert_order(s, pending_order("ord_1", "buyer_1", 4500, CREATED_AT));
        add_item(s, "ord_1", "wf_a", 1);
        add_item(s, "ord_1", "wf_b", 1);
        add_item(s, "ord_1", "wf_c", 1);
    })
    .await;

    let metadata = json!({"order_id": "ord_1", "buyer_id": "buyer_1", "cart_order": "true"});
    h.deliver(&checkout_completed("evt_1", "cs_1", "pi_1", 4500, metadata))
        .await;

    let mut notices = h.notifier.seller_notices();
    notices.sort_by(|a, b| a.seller_id.cmp(&b.seller_id));
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[0].seller_id, "seller_a");
    assert_eq!(notices[0].amount_cents, 2000);
    assert_eq!(notices[0].buyer_name, "A customer");
    assert_eq!(notices[1].seller_id, "seller_b");
    assert_eq!(notices[1].amount_cents, 2500);
}

#[tokio::test]
async fn test_pack_purchase_counts_bundled_workflows() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    h.seed(pack_order).await;

    let reply = h
        .deliver(&checkout_completed("evt_1", "cs_1", "pi_1", 3000, pack_metadata()))
        .await;
    assert!(reply.body.error.is_none());

    let state = h.state().await;
    assert_eq!(state.order_status("ord_1"), Some(OrderStatus::Paid));
    assert_eq!(state.pack_sales_count("pk_1"), Some(1));
    assert_eq!(state.sales_count("wf_a"), Some(3));
    assert_eq!(state.sales_count("wf_b"), Some(4));
    assert_eq!(state.audit_log[0].action, AuditAction::PackPurchased);
    assert_eq!(state.audit_log[0].entity_id, "pk_1");
    assert_eq!(h.notifier.seller_notices()[0].item_title, "Sales Starter");
}

#[tokio::test]
async fn test_bad_signature_rejected_without_ledger_record() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    h.seed(single_workflow_order).await;

    let payload = serde_json::to_vec(&checkout_completed(
        "evt_1",
        "cs_1",
        "pi_1",
        2000,
        ord_1_metadata(),
    ))
    .unwrap();
    let forged = format!("t={NOW},v1={}", "ab".repeat(32));
    let reply = h.processor.process_at(&payload, Some(&forged), NOW).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(!reply.body.received);
    assert_eq!(
        reply.body.error.unwrap().code,
        Some(ErrorCode::SignatureInvalid.code())
    );
    let state = h.state().await;
    assert!(state.processed_events.is_empty());
    assert_eq!(state.order_status("ord_1"), Some(OrderStatus::Pending));
}

#[tokio::test]
async fn test_critical_failure_requests_redelivery() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    h.seed(single_workflow_order).await;
    h.gateway.set_down(true);
    let event = checkout_completed("evt_1", "cs_1", "pi_1", 2000, ord_1_metadata());

    let reply = h.deliver(&event).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!reply.body.received);
    assert_eq!(
        reply.body.error.as_ref().unwrap().code,
        Some(ErrorCode::PaymentProviderError.code())
    );
    let state = h.state().await;
    assert!(state.processed_events.is_empty());
    assert_eq!(state.order_status("ord_1"), Some(OrderStatus::Pending));

    // Provider retries once the lookup works again
    h.gateway.set_down(false);
    let reply = h.deliver(&event).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(h.state().await.order_status("ord_1"), Some(OrderStatus::Paid));
}

#[tokio::test]
async fn test_audit_failure_on_checkout_is_retried() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    h.seed(single_workflow_order).await;
    h.store.fail_audit_appends(true);

    let reply = h
        .deliver(&checkout_completed("evt_1", "cs_1", "pi_1", 2000, ord_1_metadata()))
        .await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);

    let state = h.state().await;
    assert_eq!(state.order_status("ord_1"), Some(OrderStatus::Pending));
    assert!(state.payments.is_empty());
    assert_eq!(state.sales_count("wf_1"), Some(7));
    assert!(state.carts.contains_key("cart_1"));
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_non_critical_failure_acknowledged_but_not_marked() {
    let h = Harness::new(FakeGateway::default());
    h.seed(single_workflow_order).await;

    // payment_intent without order metadata
    let reply = h
        .deliver(&payment_succeeded("evt_1", "pi_1", "ch_1", 2000, json!({})))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.received);
    assert_eq!(
        reply.body.error.unwrap().code,
        Some(ErrorCode::OrderMetadataMissing.code())
    );
    assert!(h.state().await.processed_events.is_empty());
}

#[tokio::test]
async fn test_unknown_order_on_checkout_is_acknowledged() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    let metadata = json!({"order_id": "ord_404", "buyer_id": "buyer_1", "workflow_id": "wf_1"});

    let reply = h
        .deliver(&checkout_completed("evt_1", "cs_1", "pi_1", 2000, metadata))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.body.error.unwrap().code,
        Some(ErrorCode::OrderNotFound.code())
    );
    assert!(h.state().await.processed_events.is_empty());
}

#[tokio::test]
async fn test_notification_failure_keeps_settlement() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    h.seed(single_workflow_order).await;
    h.notifier.set_failing(true);

    let reply = h
        .deliver(&checkout_completed("evt_1", "cs_1", "pi_1", 2000, ord_1_metadata()))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.error.is_none());

    let state = h.state().await;
    assert_eq!(state.order_status("ord_1"), Some(OrderStatus::Paid));
    assert!(state.processed_events.contains_key("evt_1"));
    assert_eq!(h.notifier.sent().len(), 2);
}

#[tokio::test]
async fn test_cancelled_order_is_not_settled() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    h.seed(|s| {
        single_workflow_order(s);
        if let Some(order) = s.orders.get_mut("ord_1") {
            order.status = OrderStatus::Cancelled;
        }
    })
    .await;

    let reply = h
        .deliver(&checkout_completed("evt_1", "cs_1", "pi_1", 2000, ord_1_metadata()))
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let state = h.state().await;
    assert_eq!(state.order_status("ord_1"), Some(OrderStatus::Cancelled));
    assert!(state.payments.is_empty());
    assert_eq!(state.sales_count("wf_1"), Some(7));
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_refund_of_intent_settled_order() {
    let h = Harness::new(FakeGateway::default());
    h.seed(single_workflow_order).await;

    h.deliver(&payment_succeeded_without_charge("evt_1", "pi_1", 2000, ord_1_metadata()))
        .await;
    let state = h.state().await;
    assert_eq!(state.order_status("ord_1"), Some(OrderStatus::Paid));
    assert_eq!(state.payments[0].provider_charge_id, "pi_1");
    assert_eq!(state.sales_count("wf_1"), Some(8));

    let reply = h
        .deliver(&charge_refunded_for_intent("evt_2", "ch_1", "pi_1", 2000, 2000))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.error.is_none());

    let state = h.state().await;
    assert_eq!(state.order_status("ord_1"), Some(OrderStatus::Refunded));
    assert_eq!(state.payments[0].status, PaymentStatus::Refunded);
    assert_eq!(state.sales_count("wf_1"), Some(7));
    assert!(state.processed_events.contains_key("evt_2"));
}

#[tokio::test]
async fn test_refund_naming_unknown_intent_is_not_found() {
    let h = Harness::new(FakeGateway::default());
    h.seed(single_workflow_order).await;
    h.deliver(&payment_succeeded_without_charge("evt_1", "pi_1", 2000, ord_1_metadata()))
        .await;

    let reply = h
        .deliver(&charge_refunded_for_intent("evt_2", "ch_9", "pi_9", 2000, 2000))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.body.error.unwrap().code,
        Some(ErrorCode::PaymentNotFound.code())
    );
    assert_eq!(h.state().await.order_status("ord_1"), Some(OrderStatus::Paid));
}

#[tokio::test]
async fn test_full_refund_of_pack_reverses_bundle_counters() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    h.seed(pack_order).await;
    h.deliver(&checkout_completed("evt_1", "cs_1", "pi_1", 3000, pack_metadata()))
        .await;

    h.deliver(&charge_refunded("evt_2", "ch_1", 3000, 3000)).await;
    let state = h.state().await;
    assert_eq!(state.order_status("ord_1"), Some(OrderStatus::Refunded));
    assert_eq!(state.pack_sales_count("pk_1"), Some(0));
    assert_eq!(state.sales_count("wf_a"), Some(2));
    assert_eq!(state.sales_count("wf_b"), Some(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_checkout_and_payment_intent_settle_once() {
    let h = Harness::new(FakeGateway::default().with_charge("pi_1", "ch_1"));
    h.seed(single_workflow_order).await;

    let checkout = checkout_completed("evt_cs", "cs_1", "pi_1", 2000, ord_1_metadata());
    let intent = payment_succeeded("evt_pi", "pi_1", "ch_1", 2000, ord_1_metadata());
    let (a, b) = tokio::join!(h.deliver(&checkout), h.deliver(&intent));
    assert_eq!(a.status, StatusCode::OK);
    assert_eq!(b.status, StatusCode::OK);

    let state = h.state().await;
    assert_eq!(state.order_status("ord_1"), Some(OrderStatus::Paid));
    assert_eq!(state.payments.len(), 1);
    assert_eq!(state.sales_count("wf_1"), Some(8));
    assert_eq!(state.audit_log.len(), 1);
    assert_eq!(h.notifier.seller_notices().len(), 1);
    assert_eq!(state.processed_events.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_sibling_settlements_clear_cart() {
    let h = Harness::new(
        FakeGateway::default()
            .with_charge("pi_a", "ch_a")
            .with_charge("pi_b", "ch_b"),
    );
    h.seed(two_seller_cart).await;

    let a = checkout_completed("evt_a", "cs_a", "pi_a", 1500, multi_seller_metadata("ord_a"));
    let b = checkout_completed("evt_b", "cs_b", "pi_b", 2500, multi_seller_metadata("ord_b"));
    let (ra, rb) = tokio::join!(h.deliver(&a), h.deliver(&b));
    assert_eq!(ra.status, StatusCode::OK);
    assert_eq!(rb.status, StatusCode::OK);

    let state = h.state().await;
    assert_eq!(state.order_status("ord_a"), Some(OrderStatus::Paid));
    assert_eq!(state.order_status("ord_b"), Some(OrderStatus::Paid));
    assert!(state.carts.is_empty());
    assert_eq!(state.payments.len(), 2);
    assert_eq!(state.audit_log.len(), 2);
}

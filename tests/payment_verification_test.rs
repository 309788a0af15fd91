mod common;

use assert_matches::assert_matches;
use rstest::rstest;
use rust_decimal_macros::dec;
use storefront_orders::{
    auth::AuthUser,
    entities::{
        order::{OrderStatus, PaymentMethod, PaymentStatus},
        product_variant::Size,
    },
    errors::ServiceError,
    events::Event,
    services::{
        address_resolver::AddressSelection, checkout::CheckoutRequest, inventory,
        orders::OrderResponse, payments::VerifyPaymentRequest,
    },
};
use uuid::Uuid;

use common::TestApp;

struct PendingOnline {
    actor: AuthUser,
    email: String,
    variant_id: Uuid,
    order: OrderResponse,
    gateway_order_id: String,
}

async fn pending_online_order(app: &TestApp, stock: i32, quantity: i32) -> PendingOnline {
    let (customer, actor) = app.seed_customer("Payer").await;
    app.seed_address(customer.id, "Pune", true).await;
    let variant = app.seed_variant(dec!(400), &[(Size::XXL, stock)]).await;
    app.add_to_cart(&actor, variant.id, Size::XXL, quantity).await;

    let result = app
        .state
        .services
        .checkout
        .checkout(
            &actor,
            CheckoutRequest {
                item_ids: None,
                address: AddressSelection::default(),
                payment_method: PaymentMethod::Online,
            },
        )
        .await
        .expect("online checkout");

    let gateway_order_id = result.order.gateway_order_id.clone().unwrap();
    PendingOnline {
        actor,
        email: customer.email,
        variant_id: variant.id,
        order: result.order,
        gateway_order_id,
    }
}

fn verify_request(app: &TestApp, pending: &PendingOnline, payment_id: &str) -> VerifyPaymentRequest {
    VerifyPaymentRequest {
        order_id: pending.order.id,
        gateway_payment_id: payment_id.to_string(),
        signature: app.sign(&pending.gateway_order_id, payment_id),
    }
}

#[tokio::test]
async fn valid_signature_confirms_payment_and_takes_stock() {
    let app = TestApp::new().await;
    let pending = pending_online_order(&app, 3, 2).await;
    assert_eq!(app.stock(pending.variant_id, Size::XXL).await, 3);

    let order = app
        .state
        .services
        .payments
        .verify_payment(&pending.actor, verify_request(&app, &pending, "pay_001"))
        .await
        .expect("payment verified");

    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.gateway_payment_id.as_deref(), Some("pay_001"));
    assert_eq!(app.stock(pending.variant_id, Size::XXL).await, 1);

    // One confirmation at checkout, one once the payment lands.
    assert_eq!(app.mailer.subjects_to(&pending.email).len(), 2);

    app.settle().await;
    assert!(app.events().iter().any(|e| matches!(
        e,
        Event::PaymentVerified { order_id, .. } if *order_id == pending.order.id
    )));
}

#[tokio::test]
async fn second_verification_does_not_take_stock_again() {
    let app = TestApp::new().await;
    let pending = pending_online_order(&app, 5, 2).await;
    let request = verify_request(&app, &pending, "pay_002");

    app.state
        .services
        .payments
        .verify_payment(&pending.actor, request.clone())
        .await
        .unwrap();
    let err = app
        .state
        .services
        .payments
        .verify_payment(&pending.actor, request)
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InvalidTransition(msg) if msg == "Payment already verified");
    assert_eq!(app.stock(pending.variant_id, Size::XXL).await, 3);
}

#[tokio::test]
async fn concurrent_verifications_take_stock_once() {
    let app = TestApp::new().await;
    let pending = pending_online_order(&app, 5, 2).await;
    let request = verify_request(&app, &pending, "pay_003");

    let payments = app.state.services.payments.clone();
    let (a, b) = tokio::join!(
        payments.verify_payment(&pending.actor, request.clone()),
        payments.verify_payment(&pending.actor, request.clone()),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(app.stock(pending.variant_id, Size::XXL).await, 3);
}

#[tokio::test]
async fn tampered_signature_is_rejected() {
    let app = TestApp::new().await;
    let pending = pending_online_order(&app, 3, 1).await;

    let mut request = verify_request(&app, &pending, "pay_004");
    request.gateway_payment_id = "pay_999".to_string();

    let err = app
        .state
        .services
        .payments
        .verify_payment(&pending.actor, request)
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InvalidSignature);
    assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(app.stock(pending.variant_id, Size::XXL).await, 3);

    let order = app
        .state
        .services
        .orders
        .get_order(&pending.actor, pending.order.id)
        .await
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn another_user_cannot_verify() {
    let app = TestApp::new().await;
    let pending = pending_online_order(&app, 3, 1).await;
    let (_, intruder) = app.seed_customer("Intruder").await;

    let err = app
        .state
        .services
        .payments
        .verify_payment(&intruder, verify_request(&app, &pending, "pay_005"))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::Forbidden(_));
    assert_eq!(app.stock(pending.variant_id, Size::XXL).await, 3);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;
    let (_, actor) = app.seed_customer("Ghost").await;

    let err = app
        .state
        .services
        .payments
        .verify_payment(
            &actor,
            VerifyPaymentRequest {
                order_id: Uuid::new_v4(),
                gateway_payment_id: "pay_x".to_string(),
                signature: "00".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn stock_gone_by_payment_time_keeps_payment_and_reports_shortfall() {
    let app = TestApp::new().await;
    let pending = pending_online_order(&app, 2, 2).await;
    inventory::decrement(&*app.state.db, pending.variant_id, Size::XXL, 1)
        .await
        .unwrap();

    let order = app
        .state
        .services
        .payments
        .verify_payment(&pending.actor, verify_request(&app, &pending, "pay_006"))
        .await
        .expect("payment stays confirmed");

    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(app.stock(pending.variant_id, Size::XXL).await, 1);

    app.settle().await;
    assert!(app.events().iter().any(|e| matches!(
        e,
        Event::StockShortfall { order_id, requested: 2, available: 1, .. }
            if *order_id == pending.order.id
    )));
}

#[rstest]
#[case::processing(OrderStatus::Processing)]
#[case::shipped(OrderStatus::Shipped)]
#[case::delivered(OrderStatus::Delivered)]
#[tokio::test]
async fn payment_cannot_pull_a_progressed_order_back(#[case] moved_to: OrderStatus) {
    let app = TestApp::new().await;
    let pending = pending_online_order(&app, 3, 1).await;
    let (_, admin) = app.seed_admin().await;
    app.state
        .services
        .order_status
        .update_status(&admin, pending.order.id, moved_to)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .payments
        .verify_payment(&pending.actor, verify_request(&app, &pending, "pay_007"))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidTransition(msg) if msg == "Order is no longer awaiting payment"
    );

    let order = app
        .state
        .services
        .orders
        .get_order(&pending.actor, pending.order.id)
        .await
        .unwrap();
    assert_eq!(order.status, moved_to);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(app.stock(pending.variant_id, Size::XXL).await, 3);
}

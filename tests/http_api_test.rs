mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_orders::entities::product_variant::Size;

use common::{response_json, TestApp};

#[tokio::test]
async fn health_and_status_are_public() {
    let app = TestApp::new().await;

    let (status, body) = response_json(app.request(Method::GET, "/health", None, None).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["checks"]["database"], "healthy");

    let (status, body) = response_json(app.request(Method::GET, "/status", None, None).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["service"], "storefront-orders");
}

#[tokio::test]
async fn order_routes_require_a_token() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/orders/user", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::GET, "/api/v1/orders/user", None, Some("not-a-jwt"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_reject_customers() {
    let app = TestApp::new().await;
    let (_, actor) = app.seed_customer("Curious").await;
    let token = app.token_for(&actor);

    let response = app
        .request(Method::GET, "/api/v1/orders", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", uuid::Uuid::new_v4()),
            Some(json!({ "status": "shipped" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cart_to_order_over_http() {
    let app = TestApp::new().await;
    let (customer, actor) = app.seed_customer("Web").await;
    app.seed_address(customer.id, "Pune", true).await;
    let variant = app.seed_variant(dec!(349), &[(Size::L, 3)]).await;
    let token = app.token_for(&actor);

    let (status, cart) = response_json(
        app.request(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "variant_id": variant.id, "size": "l", "quantity": 2 })),
            Some(&token),
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["success"], true);
    assert_eq!(cart["data"]["items"][0]["quantity"], 2);

    let (status, created) = response_json(
        app.request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "payment_method": "cod" })),
            Some(&token),
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["order"]["status"], "processing");
    assert_eq!(created["data"]["order"]["payment_status"], "completed");
    assert!(created["data"]["gateway_order"].is_null());
    assert!(created["meta"]["request_id"].is_string());

    let order_id = created["data"]["order"]["id"].as_str().unwrap().to_string();
    let (status, fetched) = response_json(
        app.request(
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
            Some(&token),
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["data"]["items"][0]["size"], "L");

    let (_, mine) = response_json(
        app.request(Method::GET, "/api/v1/orders/user", None, Some(&token))
            .await,
    )
    .await;
    assert_eq!(mine["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(app.stock(variant.id, Size::L).await, 1);
}

#[tokio::test]
async fn stock_errors_use_the_error_envelope() {
    let app = TestApp::new().await;
    let (customer, actor) = app.seed_customer("Late").await;
    app.seed_address(customer.id, "Pune", true).await;
    let variant = app.seed_variant(dec!(349), &[(Size::M, 1)]).await;
    let token = app.token_for(&actor);

    let (status, body) = response_json(
        app.request(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "variant_id": variant.id, "size": "M", "quantity": 3 })),
            Some(&token),
        )
        .await,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["status_code"], 400);
    assert_eq!(
        body["message"],
        format!("Insufficient stock for size M of variant {}. Available: 1", variant.id)
    );
}

#[tokio::test]
async fn malformed_input_is_a_bad_request() {
    let app = TestApp::new().await;
    let (_, actor) = app.seed_customer("Typo").await;
    let token = app.token_for(&actor);

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "payment_method": "barter" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/cancel-request",
            Some(json!({ "order_id": uuid::Uuid::new_v4(), "reason": "" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_can_ship_over_http() {
    let app = TestApp::new().await;
    let (customer, actor) = app.seed_customer("Ships").await;
    app.seed_address(customer.id, "Pune", true).await;
    let (_, admin) = app.seed_admin().await;
    let variant = app.seed_variant(dec!(50), &[(Size::XXL, 2)]).await;
    app.add_to_cart(&actor, variant.id, Size::XXL, 1).await;
    let customer_token = app.token_for(&actor);
    let admin_token = app.token_for(&admin);

    let (_, created) = response_json(
        app.request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "payment_method": "cod" })),
            Some(&customer_token),
        )
        .await,
    )
    .await;
    let order_id = created["data"]["order"]["id"].as_str().unwrap().to_string();

    let (status, shipped) = response_json(
        app.request(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "Shipped" })),
            Some(&admin_token),
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shipped["data"]["status"], "shipped");

    let (status, page) = response_json(
        app.request(
            Method::GET,
            "/api/v1/orders?status=shipped&limit=5",
            None,
            Some(&admin_token),
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["data"]["total_orders"], 1);
    assert_eq!(page["data"]["current_page"], 1);
}

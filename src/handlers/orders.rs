use axum::{
    extract::{Extension, Path, Query, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, parse_enum, success_response, validate_input};
use crate::auth::{AuthRouterExt, AuthUser, ADMIN_ROLE};
use crate::entities::order::{OrderStatus, PaymentMethod};
use crate::errors::ServiceError;
use crate::services::address_resolver::{AddressSelection, ShippingAddressInput};
use crate::services::checkout::CheckoutRequest;
use crate::services::orders::OrderFilter;
use crate::services::payments::VerifyPaymentRequest as VerifyPayment;
use crate::AppState;

/// Request to check out the cart
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    /// Cart item ids to purchase; omit to purchase the whole cart
    pub item_ids: Option<Vec<Uuid>>,
    /// Saved address to ship to
    pub address_id: Option<Uuid>,
    /// Inline address, used when no `address_id` is given
    pub shipping_address: Option<ShippingAddressInput>,
    /// `cod` or `online` (default)
    #[schema(example = "online")]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct VerifyPaymentRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, message = "gateway_payment_id is required"))]
    pub gateway_payment_id: String,
    #[validate(length(min = 1, message = "signature is required"))]
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CancelOrderRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, max = 1000, message = "reason must be 1-1000 characters"))]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    /// One of `processing`, `shipped`, `delivered`, `cancelled`
    #[validate(length(min = 1, message = "status is required"))]
    #[schema(example = "shipped")]
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    /// Filter by order status
    pub status: Option<String>,
    /// Earliest creation time (RFC 3339 or YYYY-MM-DD)
    pub start_date: Option<String>,
    /// Latest creation time (RFC 3339 or YYYY-MM-DD, inclusive)
    pub end_date: Option<String>,
    /// Page number (default: 1)
    pub page: Option<u64>,
    /// Items per page (default: 10, max: 100)
    pub limit: Option<u64>,
}

/// Creates the order routes.
pub fn order_routes() -> Router<AppState> {
    let customer = Router::new()
        .route("/", post(create_order))
        .route("/verify", post(verify_payment))
        .route("/user", get(list_my_orders))
        .route("/cancel-request", post(request_cancellation))
        .route("/:id", get(get_order))
        .with_auth();

    let admin = Router::new()
        .route("/", get(list_orders))
        .route("/:id/status", put(update_order_status))
        .with_role(ADMIN_ROLE);

    customer.merge(admin)
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Check out",
    description = "Convert the caller's cart (or selected items) into an order",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = crate::ApiResponse<crate::services::checkout::CheckoutResult>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Validation, address or stock error", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart, item or address not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;

    let payment_method = match payload.payment_method.as_deref() {
        Some(raw) if !raw.trim().is_empty() => parse_enum::<PaymentMethod>(raw, "payment method")?,
        _ => PaymentMethod::Online,
    };

    let result = state
        .services
        .checkout
        .checkout(
            &user,
            CheckoutRequest {
                item_ids: payload.item_ids,
                address: AddressSelection {
                    address_id: payload.address_id,
                    inline: payload.shipping_address,
                },
                payment_method,
            },
        )
        .await?;

    Ok(created_response(result))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/verify",
    summary = "Verify online payment",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment confirmed", body = crate::ApiResponse<crate::services::orders::OrderResponse>),
        (status = 400, description = "Invalid signature or payment already verified", body = crate::errors::ErrorResponse),
        (status = 403, description = "Order belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;

    let order = state
        .services
        .payments
        .verify_payment(
            &user,
            VerifyPayment {
                order_id: payload.order_id,
                gateway_payment_id: payload.gateway_payment_id,
                signature: payload.signature,
            },
        )
        .await?;

    Ok(success_response(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/user",
    summary = "List my orders",
    responses(
        (status = 200, description = "Caller's orders, newest first", body = crate::ApiResponse<Vec<crate::services::orders::OrderResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, ServiceError> {
    let orders = state.services.orders.list_user_orders(&user).await?;
    Ok(success_response(orders))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = crate::ApiResponse<crate::services::orders::OrderResponse>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.get_order(&user, id).await?;
    Ok(success_response(order))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/cancel-request",
    summary = "Request cancellation",
    description = "Record a cancellation request for operator review; the order status is unchanged",
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Request recorded", body = crate::ApiResponse<crate::services::orders::OrderResponse>),
        (status = 400, description = "Order cannot be cancelled or already requested", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn request_cancellation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CancelOrderRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;

    let order = state
        .services
        .cancellations
        .request_cancellation(&user, payload.order_id, &payload.reason)
        .await?;

    Ok(success_response(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders (admin)",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Page of orders", body = crate::ApiResponse<crate::services::orders::OrderPage>),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<OrderListQuery>,
) -> Result<Response, ServiceError> {
    let page = state
        .services
        .orders
        .list_orders(
            &user,
            OrderFilter {
                status: query.status,
                start_date: query.start_date,
                end_date: query.end_date,
                page: query.page,
                limit: query.limit,
            },
        )
        .await?;
    Ok(success_response(page))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status (admin)",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = crate::ApiResponse<crate::services::orders::OrderResponse>),
        (status = 400, description = "Invalid status or transition", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let status = parse_enum::<OrderStatus>(&payload.status, "status")?;

    let order = state
        .services
        .order_status
        .update_status(&user, id, status)
        .await?;
    Ok(success_response(order))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_order_request_accepts_snake_case_body() {
        let body = serde_json::json!({
            "item_ids": ["67e55044-10b1-426f-9247-bb680e5fe0c8"],
            "payment_method": "cod"
        });
        let parsed: CreateOrderRequest = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.item_ids.map(|ids| ids.len()), Some(1));
        assert_eq!(parsed.payment_method.as_deref(), Some("cod"));
        assert!(parsed.address_id.is_none());
    }

    #[test]
    fn blank_cancellation_reason_fails_validation() {
        let request = CancelOrderRequest {
            order_id: Uuid::new_v4(),
            reason: String::new(),
        };
        assert!(validate_input(&request).is_err());
    }
}

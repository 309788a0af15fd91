use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront Orders API",
        version = "0.1.0",
        description = r#"
# Storefront Orders API

Cart checkout, payment confirmation and order fulfillment for a garment storefront.

## Authentication

Every endpoint except `/health` and `/status` requires a bearer token:

```
Authorization: Bearer <your-jwt-token>
```

Order listing across customers and status updates require the `admin` role.

## Error Handling

Errors share one envelope:

```json
{
  "status_code": 400,
  "success": false,
  "error": "Bad Request",
  "message": "Insufficient stock for size M of variant ... Available: 2",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

`GET /orders` accepts `page` (default 1) and `limit` (default 10, max 100).
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Checkout, payment verification and order lifecycle"),
        (name = "cart", description = "Shopping cart")
    ),
    paths(
        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::verify_payment,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::request_cancellation,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::update_order_status,
        // Cart
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_cart_item,
        crate::handlers::carts::update_cart_item,
        crate::handlers::carts::remove_cart_item,
        crate::handlers::carts::clear_cart,
    ),
    components(
        schemas(
            crate::ResponseMeta,

            // Order types
            crate::handlers::orders::CreateOrderRequest,
            crate::handlers::orders::VerifyPaymentRequest,
            crate::handlers::orders::CancelOrderRequest,
            crate::handlers::orders::UpdateOrderStatusRequest,
            crate::services::address_resolver::ShippingAddressInput,
            crate::services::checkout::CheckoutResult,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::CancellationRequestResponse,
            crate::services::orders::OrderPage,
            crate::services::payment_gateway::GatewayOrder,
            crate::entities::order::ShippingAddress,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,
            crate::entities::order::PaymentMethod,

            // Cart types
            crate::handlers::carts::AddCartItemRequest,
            crate::handlers::carts::UpdateCartItemRequest,
            crate::services::cart::CartView,
            crate::services::cart::CartLine,
            crate::entities::product_variant::Size,

            // Error types
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_order_and_cart_paths() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Storefront Orders API"));
        assert!(json.contains("/api/v1/orders/verify"));
        assert!(json.contains("/api/v1/orders/{id}/status"));
        assert!(json.contains("/api/v1/cart/items/{item_id}"));
        assert!(json.contains("\"Bearer\""));
    }
}

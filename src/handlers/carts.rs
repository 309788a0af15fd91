use axum::{
    extract::{Extension, Path, State},
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::common::{parse_enum, success_response, validate_input};
use crate::auth::{AuthRouterExt, AuthUser};
use crate::entities::product_variant::Size;
use crate::errors::ServiceError;
use crate::services::cart::AddCartItem;
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddCartItemRequest {
    pub variant_id: Uuid,
    /// `M`, `L`, `XL` or `XXL`
    #[schema(example = "M")]
    pub size: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_cart_item))
        .route("/items/:item_id", put(update_cart_item))
        .route("/items/:item_id", delete(remove_cart_item))
        .with_auth()
}

#[utoipa::path(
    get,
    path = "/api/v1/cart",
    summary = "Get my cart",
    responses(
        (status = 200, description = "Cart contents", body = crate::ApiResponse<crate::services::cart::CartView>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, ServiceError> {
    let cart = state.services.carts.get_cart(&user).await?;
    Ok(success_response(cart))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    summary = "Add item to cart",
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = crate::ApiResponse<crate::services::cart::CartView>),
        (status = 400, description = "Invalid quantity, size or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Variant not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn add_cart_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<AddCartItemRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let size = parse_enum::<Size>(&payload.size, "size")?;

    let cart = state
        .services
        .carts
        .add_item(
            &user,
            AddCartItem {
                variant_id: payload.variant_id,
                size,
                quantity: payload.quantity,
            },
        )
        .await?;
    Ok(success_response(cart))
}

#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{item_id}",
    summary = "Change item quantity",
    params(("item_id" = Uuid, Path, description = "Cart item id")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = crate::ApiResponse<crate::services::cart::CartView>),
        (status = 400, description = "Invalid quantity or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let cart = state
        .services
        .carts
        .update_item(&user, item_id, payload.quantity)
        .await?;
    Ok(success_response(cart))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{item_id}",
    summary = "Remove item from cart",
    params(("item_id" = Uuid, Path, description = "Cart item id")),
    responses(
        (status = 200, description = "Updated cart", body = crate::ApiResponse<crate::services::cart::CartView>),
        (status = 404, description = "Cart item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(item_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let cart = state.services.carts.remove_item(&user, item_id).await?;
    Ok(success_response(cart))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    summary = "Empty my cart",
    responses(
        (status = 200, description = "Emptied cart", body = crate::ApiResponse<crate::services::cart::CartView>),
        (status = 404, description = "Cart not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, ServiceError> {
    let cart = state.services.carts.clear(&user).await?;
    Ok(success_response(cart))
}

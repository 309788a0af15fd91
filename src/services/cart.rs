use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::product_variant::Size;
use crate::entities::{cart, cart_item, product_variant, Cart, CartItem, ProductVariant};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::inventory;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub product_name: String,
    pub color_name: String,
    pub size: Size,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    #[schema(value_type = String)]
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartView {
    /// Absent until the first item is added.
    pub cart_id: Option<Uuid>,
    pub items: Vec<CartLine>,
    #[schema(value_type = String)]
    pub total: Decimal,
}

#[derive(Debug, Clone)]
pub struct AddCartItem {
    pub variant_id: Uuid,
    pub size: Size,
    pub quantity: i32,
}

/// The authenticated user's shopping cart.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn get_cart(&self, actor: &AuthUser) -> Result<CartView, ServiceError> {
        let cart = Cart::find()
            .filter(cart::Column::UserId.eq(actor.user_id))
            .one(&*self.db)
            .await?;
        match cart {
            Some(cart) => build_view(&*self.db, cart.id).await,
            None => Ok(CartView {
                cart_id: None,
                items: Vec::new(),
                total: Decimal::ZERO,
            }),
        }
    }

    /// Adds a line, merging with an existing line for the same variant and
    /// size. The merged quantity must be in stock.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn add_item(
        &self,
        actor: &AuthUser,
        input: AddCartItem,
    ) -> Result<CartView, ServiceError> {
        ensure_quantity(input.quantity)?;

        let txn = self.db.begin().await?;

        ProductVariant::find_by_id(input.variant_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Variant"))?;

        let now = Utc::now();
        let cart = match Cart::find()
            .filter(cart::Column::UserId.eq(actor.user_id))
            .one(&txn)
            .await?
        {
            Some(cart) => cart,
            None => {
                cart::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(actor.user_id),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::VariantId.eq(input.variant_id))
            .filter(cart_item::Column::Size.eq(input.size))
            .one(&txn)
            .await?;

        match existing {
            Some(item) => {
                let merged = item.quantity.checked_add(input.quantity).ok_or_else(|| {
                    ServiceError::ValidationError("Quantity is too large".to_string())
                })?;
                inventory::check_stock(&txn, input.variant_id, input.size, merged).await?;
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(merged);
                active.updated_at = Set(now);
                active.update(&txn).await?;
            }
            None => {
                inventory::check_stock(&txn, input.variant_id, input.size, input.quantity)
                    .await?;
                let position = next_position(&txn, cart.id).await?;
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    variant_id: Set(input.variant_id),
                    size: Set(input.size),
                    quantity: Set(input.quantity),
                    position: Set(position),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?;
            }
        }

        txn.commit().await?;

        info!(cart_id = %cart.id, variant_id = %input.variant_id, "item added to cart");
        self.cart_updated(actor.user_id, cart.id).await;
        build_view(&*self.db, cart.id).await
    }

    /// Sets the quantity of one line. The new quantity must be in stock.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn update_item(
        &self,
        actor: &AuthUser,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        ensure_quantity(quantity)?;

        let txn = self.db.begin().await?;
        let (cart, item) = owned_item(&txn, actor.user_id, item_id).await?;
        inventory::check_stock(&txn, item.variant_id, item.size, quantity).await?;

        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;
        txn.commit().await?;

        self.cart_updated(actor.user_id, cart.id).await;
        build_view(&*self.db, cart.id).await
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn remove_item(
        &self,
        actor: &AuthUser,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let (cart, item) = owned_item(&*self.db, actor.user_id, item_id).await?;
        CartItem::delete_by_id(item.id).exec(&*self.db).await?;

        self.cart_updated(actor.user_id, cart.id).await;
        build_view(&*self.db, cart.id).await
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn clear(&self, actor: &AuthUser) -> Result<CartView, ServiceError> {
        let cart = find_cart(&*self.db, actor.user_id).await?;
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&*self.db)
            .await?;

        self.cart_updated(actor.user_id, cart.id).await;
        Ok(CartView {
            cart_id: Some(cart.id),
            items: Vec::new(),
            total: Decimal::ZERO,
        })
    }

    async fn cart_updated(&self, user_id: Uuid, cart_id: Uuid) {
        self.event_sender
            .send_or_log(Event::CartUpdated { user_id, cart_id })
            .await;
    }
}

fn ensure_quantity(quantity: i32) -> Result<(), ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::ValidationError(
            "Quantity must be at least 1".to_string(),
        ));
    }
    Ok(())
}

async fn find_cart<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<cart::Model, ServiceError> {
    Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Cart"))
}

async fn owned_item<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    item_id: Uuid,
) -> Result<(cart::Model, cart_item::Model), ServiceError> {
    let cart = find_cart(conn, user_id).await?;
    let item = CartItem::find_by_id(item_id)
        .filter(cart_item::Column::CartId.eq(cart.id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Cart item"))?;
    Ok((cart, item))
}

async fn next_position<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> Result<i32, ServiceError> {
    let last = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .order_by_desc(cart_item::Column::Position)
        .one(conn)
        .await?;
    Ok(last.map(|item| item.position + 1).unwrap_or(0))
}

async fn build_view<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> Result<CartView, ServiceError> {
    let items = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .order_by_asc(cart_item::Column::Position)
        .all(conn)
        .await?;

    let variant_ids: Vec<Uuid> = items.iter().map(|i| i.variant_id).collect();
    let variants: HashMap<Uuid, product_variant::Model> = if variant_ids.is_empty() {
        HashMap::new()
    } else {
        ProductVariant::find()
            .filter(product_variant::Column::Id.is_in(variant_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|v| (v.id, v))
            .collect()
    };

    let mut total = Decimal::ZERO;
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let Some(variant) = variants.get(&item.variant_id) else {
            continue;
        };
        let line_total = variant.price * Decimal::from(item.quantity);
        total += line_total;
        lines.push(CartLine {
            id: item.id,
            variant_id: item.variant_id,
            product_name: variant.product_name.clone(),
            color_name: variant.color_name.clone(),
            size: item.size,
            quantity: item.quantity,
            unit_price: variant.price,
            line_total,
        });
    }

    Ok(CartView {
        cart_id: Some(cart_id),
        items: lines,
        total,
    })
}

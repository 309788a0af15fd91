//! Consistent view of a user's cart (or a selected subset of it) taken
//! inside the checkout transaction, and its later removal.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use std::collections::HashSet;
use uuid::Uuid;

use crate::entities::{cart, cart_item, Cart, CartItem};
use crate::errors::ServiceError;

#[derive(Debug, Clone)]
pub struct CartSnapshot {
    pub cart_id: Uuid,
    pub items: Vec<cart_item::Model>,
    /// `true` when only a subset of the cart was selected.
    pub partial: bool,
}

impl CartSnapshot {
    pub fn item_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|i| i.id).collect()
    }
}

/// Reads the cart lines to be purchased, in cart order.
///
/// An absent or empty `selection` means the whole cart. A non-empty selection
/// must name only lines that belong to this user's cart.
pub async fn read<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    selection: Option<&[Uuid]>,
) -> Result<CartSnapshot, ServiceError> {
    let cart = Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Cart"))?;

    let selection = selection.filter(|ids| !ids.is_empty());

    let mut query = CartItem::find().filter(cart_item::Column::CartId.eq(cart.id));
    if let Some(ids) = selection {
        query = query.filter(cart_item::Column::Id.is_in(ids.iter().copied()));
    }
    let items = query
        .order_by_asc(cart_item::Column::Position)
        .order_by_asc(cart_item::Column::CreatedAt)
        .all(conn)
        .await?;

    if let Some(ids) = selection {
        let wanted: HashSet<Uuid> = ids.iter().copied().collect();
        if items.len() != wanted.len() {
            return Err(ServiceError::NotFound(
                "Some cart items not found".to_string(),
            ));
        }
    }

    if items.is_empty() {
        return Err(ServiceError::ValidationError("Cart is empty".to_string()));
    }

    Ok(CartSnapshot {
        cart_id: cart.id,
        items,
        partial: selection.is_some(),
    })
}

/// Removes the purchased lines. Partial checkouts leave the rest of the cart.
pub async fn consume<C: ConnectionTrait>(
    conn: &C,
    snapshot: &CartSnapshot,
) -> Result<u64, ServiceError> {
    let mut delete = CartItem::delete_many().filter(cart_item::Column::CartId.eq(snapshot.cart_id));
    if snapshot.partial {
        delete = delete.filter(cart_item::Column::Id.is_in(snapshot.item_ids()));
    }
    let result = delete.exec(conn).await?;
    Ok(result.rows_affected)
}

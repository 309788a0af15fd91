//! Per-size stock ledger.
//!
//! Every function takes a generic connection so that callers can run them
//! inside the checkout or payment transaction. Decrements are a single
//! conditional `UPDATE ... WHERE quantity >= n`, so two concurrent buyers of
//! the last unit can never both succeed.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::product_variant::Size;
use crate::entities::variant_stock::{self, Entity as VariantStock};
use crate::errors::ServiceError;

fn ensure_positive(quantity: i32) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Quantity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Units on hand for a variant in one size. A missing row counts as zero.
pub async fn available<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    size: Size,
) -> Result<i32, ServiceError> {
    let row = VariantStock::find()
        .filter(variant_stock::Column::VariantId.eq(variant_id))
        .filter(variant_stock::Column::Size.eq(size))
        .one(conn)
        .await?;
    Ok(row.map(|r| r.quantity).unwrap_or(0))
}

/// Fails with `InsufficientStock` unless `quantity` units are on hand.
#[instrument(skip(conn))]
pub async fn check_stock<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    size: Size,
    quantity: i32,
) -> Result<(), ServiceError> {
    ensure_positive(quantity)?;
    let on_hand = available(conn, variant_id, size).await?;
    if on_hand < quantity {
        return Err(ServiceError::InsufficientStock {
            variant_id,
            size,
            available: on_hand,
        });
    }
    Ok(())
}

/// Atomically removes `quantity` units. Leaves the row untouched and returns
/// `InsufficientStock` with the current count when there are not enough.
#[instrument(skip(conn))]
pub async fn decrement<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    size: Size,
    quantity: i32,
) -> Result<(), ServiceError> {
    ensure_positive(quantity)?;

    let result = VariantStock::update_many()
        .col_expr(
            variant_stock::Column::Quantity,
            Expr::col(variant_stock::Column::Quantity).sub(quantity),
        )
        .col_expr(variant_stock::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(variant_stock::Column::VariantId.eq(variant_id))
        .filter(variant_stock::Column::Size.eq(size))
        .filter(variant_stock::Column::Quantity.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let on_hand = available(conn, variant_id, size).await?;
        return Err(ServiceError::InsufficientStock {
            variant_id,
            size,
            available: on_hand,
        });
    }

    debug!(%variant_id, %size, quantity, "stock decremented");
    Ok(())
}

/// Adds `quantity` units, creating the size row if it does not exist yet.
#[instrument(skip(conn))]
pub async fn restock<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    size: Size,
    quantity: i32,
) -> Result<i32, ServiceError> {
    ensure_positive(quantity)?;

    let now = Utc::now();
    let existing = VariantStock::find()
        .filter(variant_stock::Column::VariantId.eq(variant_id))
        .filter(variant_stock::Column::Size.eq(size))
        .one(conn)
        .await?;

    let updated = match existing {
        Some(row) => {
            let new_quantity = row.quantity + quantity;
            let mut active: variant_stock::ActiveModel = row.into();
            active.quantity = Set(new_quantity);
            active.updated_at = Set(now);
            active.update(conn).await?
        }
        None => {
            variant_stock::ActiveModel {
                id: Set(Uuid::new_v4()),
                variant_id: Set(variant_id),
                size: Set(size),
                quantity: Set(quantity),
                updated_at: Set(now),
            }
            .insert(conn)
            .await?
        }
    };

    Ok(updated.quantity)
}

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::order::{OrderStatus, PaymentMethod, PaymentStatus, ShippingAddress};
use crate::entities::product_variant::Size;
use crate::entities::{order, order_item, Order, OrderItem};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub size: Size,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    #[schema(value_type = String)]
    pub subtotal: Decimal,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(item: order_item::Model) -> Self {
        Self {
            subtotal: item.subtotal(),
            id: item.id,
            variant_id: item.variant_id,
            size: item.size,
            quantity: item.quantity,
            unit_price: item.unit_price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CancellationRequestResponse {
    pub requested: bool,
    pub reason: Option<String>,
    pub requested_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    pub currency: String,
    pub shipping_address: ShippingAddress,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub expected_delivery: DateTime<Utc>,
    pub cancellation_request: Option<CancellationRequestResponse>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderResponse {
    pub fn new(order: order::Model, items: Vec<order_item::Model>) -> Self {
        let cancellation_request = order.cancellation_requested.then(|| CancellationRequestResponse {
            requested: true,
            reason: order.cancellation_reason.clone(),
            requested_at: order.cancellation_requested_at,
        });
        Self {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            payment_status: order.payment_status,
            payment_method: order.payment_method,
            total_amount: order.total_amount,
            currency: order.currency,
            shipping_address: order.shipping_address,
            gateway_order_id: order.gateway_order_id,
            gateway_payment_id: order.gateway_payment_id,
            expected_delivery: order.expected_delivery,
            cancellation_request,
            items: items.into_iter().map(OrderItemResponse::from).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// Loads an order together with its lines.
pub async fn load_with_items<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> Result<OrderResponse, ServiceError> {
    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .order_by_asc(order_item::Column::CreatedAt)
        .all(conn)
        .await?;
    Ok(OrderResponse::new(order, items))
}

async fn attach_items<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<order::Model>,
) -> Result<Vec<OrderResponse>, ServiceError> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut by_order: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
    for item in OrderItem::find()
        .filter(order_item::Column::OrderId.is_in(ids))
        .order_by_asc(order_item::Column::CreatedAt)
        .all(conn)
        .await?
    {
        by_order.entry(item.order_id).or_default().push(item);
    }
    Ok(orders
        .into_iter()
        .map(|o| {
            let items = by_order.remove(&o.id).unwrap_or_default();
            OrderResponse::new(o, items)
        })
        .collect())
}

/// Raw admin filter as received on the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderPage {
    pub orders: Vec<OrderResponse>,
    pub total_orders: u64,
    pub current_page: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateBound {
    Start,
    End,
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates. A plain date
/// used as an upper bound covers the whole day.
fn parse_date(raw: &str, bound: DateBound) -> Result<DateTime<Utc>, ServiceError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ServiceError::ValidationError(format!("Invalid date: {}", raw)))?;
    let time = match bound {
        DateBound::Start => NaiveTime::MIN,
        DateBound::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
            .ok_or_else(|| ServiceError::InternalError("invalid end-of-day time".to_string()))?,
    };
    Ok(date.and_time(time).and_utc())
}

#[derive(Clone)]
pub struct OrderQueryService {
    db: Arc<DatabaseConnection>,
    default_page_size: u64,
    max_page_size: u64,
}

impl OrderQueryService {
    pub fn new(db: Arc<DatabaseConnection>, default_page_size: u64, max_page_size: u64) -> Self {
        Self {
            db,
            default_page_size: default_page_size.max(1),
            max_page_size: max_page_size.max(1),
        }
    }

    /// The caller's orders, newest first.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn list_user_orders(
        &self,
        actor: &AuthUser,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::UserId.eq(actor.user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        attach_items(&*self.db, orders).await
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn get_order(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order"))?;
        if !actor.can_access(order.user_id) {
            return Err(ServiceError::Forbidden(
                "You are not allowed to view this order".to_string(),
            ));
        }
        load_with_items(&*self.db, order).await
    }

    /// Admin listing with optional status and creation-date filters.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn list_orders(
        &self,
        actor: &AuthUser,
        filter: OrderFilter,
    ) -> Result<OrderPage, ServiceError> {
        if !actor.is_admin() {
            return Err(ServiceError::Forbidden("Admin access required".to_string()));
        }

        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter
            .limit
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);

        let mut query = Order::find();

        if let Some(status) = filter.status.as_deref().filter(|s| !s.trim().is_empty()) {
            let status = OrderStatus::from_str(status.trim())
                .map_err(|_| ServiceError::ValidationError("Invalid status filter".to_string()))?;
            query = query.filter(order::Column::Status.eq(status));
        }

        let start = filter
            .start_date
            .as_deref()
            .map(|raw| parse_date(raw, DateBound::Start))
            .transpose()?;
        let end = filter
            .end_date
            .as_deref()
            .map(|raw| parse_date(raw, DateBound::End))
            .transpose()?;

        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ServiceError::ValidationError(
                    "start_date must not be after end_date".to_string(),
                ));
            }
        }
        if let Some(start) = start {
            query = query.filter(order::Column::CreatedAt.gte(start));
        }
        if let Some(end) = end {
            query = query.filter(order::Column::CreatedAt.lte(end));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit);
        let counts = paginator.num_items_and_pages().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok(OrderPage {
            orders: attach_items(&*self.db, orders).await?,
            total_orders: counts.number_of_items,
            current_page: page,
            total_pages: counts.number_of_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn date_only_end_bound_is_inclusive() {
        let end = parse_date("2024-03-05", DateBound::End).unwrap();
        assert_eq!(end.to_rfc3339(), "2024-03-05T23:59:59.999+00:00");
        let start = parse_date("2024-03-05", DateBound::Start).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-03-05T00:00:00+00:00");
    }

    #[test]
    fn rfc3339_is_accepted() {
        let ts = parse_date("2024-03-05T10:00:00+05:30", DateBound::Start).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-05T04:30:00+00:00");
    }

    #[test]
    fn garbage_dates_are_rejected() {
        assert_matches!(
            parse_date("yesterday", DateBound::Start),
            Err(ServiceError::ValidationError(_))
        );
    }
}

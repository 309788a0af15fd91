use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::{order, order_item, product_variant, Order, OrderItem, ProductVariant, User};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::notifications::{LineSummary, OrderNotifier};
use crate::services::orders::OrderResponse;

/// Records a customer's request to cancel. The order status is left alone;
/// an operator decides through the status workflow.
#[derive(Clone)]
pub struct CancellationService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    notifier: OrderNotifier,
}

impl CancellationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender, notifier: OrderNotifier) -> Self {
        Self {
            db,
            event_sender,
            notifier,
        }
    }

    #[instrument(skip(self, actor, reason), fields(user_id = %actor.user_id, order_id = %order_id))]
    pub async fn request_cancellation(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
        reason: &str,
    ) -> Result<OrderResponse, ServiceError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "Cancellation reason is required".to_string(),
            ));
        }

        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order"))?;

        if order.user_id != actor.user_id {
            return Err(ServiceError::Forbidden(
                "You are not allowed to cancel this order".to_string(),
            ));
        }
        if order.status.is_terminal() {
            return Err(ServiceError::InvalidTransition(
                "Order cannot be cancelled".to_string(),
            ));
        }
        if order.cancellation_requested {
            return Err(ServiceError::InvalidTransition(
                "Cancellation request already submitted".to_string(),
            ));
        }

        let now = Utc::now();
        let result = Order::update_many()
            .set(order::ActiveModel {
                cancellation_requested: Set(true),
                cancellation_reason: Set(Some(reason.to_string())),
                cancellation_requested_at: Set(Some(now)),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::CancellationRequested.eq(false))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InvalidTransition(
                "Cancellation request already submitted".to_string(),
            ));
        }

        let updated = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order"))?;
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        info!("cancellation requested");
        self.event_sender
            .send_or_log(Event::CancellationRequested {
                order_id,
                user_id: actor.user_id,
            })
            .await;

        self.notify_operations(&updated, &items).await;

        Ok(OrderResponse::new(updated, items))
    }

    async fn notify_operations(&self, order: &order::Model, items: &[order_item::Model]) {
        let customer = match User::find_by_id(order.user_id).one(&*self.db).await {
            Ok(Some(customer)) => customer,
            Ok(None) => {
                warn!(order_id = %order.id, "order owner missing; cancellation mail not sent");
                return;
            }
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "could not load customer for cancellation mail");
                return;
            }
        };

        let variant_ids: Vec<Uuid> = items.iter().map(|i| i.variant_id).collect();
        let variants: HashMap<Uuid, product_variant::Model> = match ProductVariant::find()
            .filter(product_variant::Column::Id.is_in(variant_ids))
            .all(&*self.db)
            .await
        {
            Ok(rows) => rows.into_iter().map(|v| (v.id, v)).collect(),
            Err(e) => {
                warn!(error = %e, "could not load variants for cancellation mail");
                HashMap::new()
            }
        };

        let lines: Vec<LineSummary> = items
            .iter()
            .map(|item| LineSummary {
                description: variants
                    .get(&item.variant_id)
                    .map(|v| v.display_name())
                    .unwrap_or_else(|| item.variant_id.to_string()),
                size: item.size,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();

        self.notifier
            .cancellation_requested(&customer, order, &lines)
            .await;
    }
}

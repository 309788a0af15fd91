use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    entities::{order_item, OrderItem, User},
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::OrderNotifier,
    services::orders::OrderResponse,
};

/// Operator-driven order lifecycle.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    notifier: OrderNotifier,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender, notifier: OrderNotifier) -> Self {
        Self {
            db,
            event_sender,
            notifier,
        }
    }

    /// Moves an order to `new_status`. Entering `shipped` or `delivered`
    /// mails the customer; mail failures do not affect the transition.
    #[instrument(skip(self, actor), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderResponse, ServiceError> {
        if !actor.is_admin() {
            return Err(ServiceError::Forbidden("Admin access required".to_string()));
        }
        if new_status == OrderStatus::Pending {
            return Err(ServiceError::ValidationError(
                "Invalid status. Allowed values: processing, shipped, delivered, cancelled"
                    .to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order"))?;

        let old_status = order.status;
        if old_status.is_terminal() {
            return Err(ServiceError::InvalidTransition(
                "Cannot update status for this order".to_string(),
            ));
        }
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidTransition(format!(
                "Cannot transition from status '{}' to '{}'",
                old_status, new_status
            )));
        }

        // Guard against a concurrent transition between the read and the write.
        let result = OrderEntity::update_many()
            .set(order::ActiveModel {
                status: Set(new_status),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(old_status))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::InvalidTransition(
                "Order status changed concurrently; reload and retry".to_string(),
            ));
        }

        let updated = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order"))?;
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;

        txn.commit().await?;

        counter!("storefront_orders.status_transitions", 1);
        info!(%old_status, %new_status, "order status updated");

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;

        if matches!(new_status, OrderStatus::Shipped | OrderStatus::Delivered) {
            self.notify_customer(&updated).await;
        }

        Ok(OrderResponse::new(updated, items))
    }

    async fn notify_customer(&self, order: &order::Model) {
        let customer = match User::find_by_id(order.user_id).one(&*self.db).await {
            Ok(Some(customer)) => customer,
            Ok(None) => {
                warn!(order_id = %order.id, "order owner missing; status mail not sent");
                return;
            }
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "could not load customer for status mail");
                return;
            }
        };

        match order.status {
            OrderStatus::Shipped => self.notifier.order_shipped(&customer, order).await,
            OrderStatus::Delivered => self.notifier.order_delivered(&customer, order).await,
            _ => {}
        }
    }
}

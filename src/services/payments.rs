use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::order::{OrderStatus, PaymentMethod, PaymentStatus};
use crate::entities::{order, order_item, Order, OrderItem, User};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::notifications::OrderNotifier;
use crate::services::inventory;
use crate::services::orders::OrderResponse;
use crate::services::payment_gateway::SignatureVerifier;

#[derive(Debug, Clone)]
pub struct VerifyPaymentRequest {
    pub order_id: Uuid,
    pub gateway_payment_id: String,
    pub signature: String,
}

/// Confirms online payments reported by the client.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    verifier: SignatureVerifier,
    notifier: OrderNotifier,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        verifier: SignatureVerifier,
        notifier: OrderNotifier,
    ) -> Self {
        Self {
            db,
            event_sender,
            verifier,
            notifier,
        }
    }

    /// Marks an online order paid once its gateway signature checks out.
    ///
    /// The pending -> completed flip is a conditional update, so a replayed
    /// callback finds nothing to claim and is rejected before any stock moves.
    /// Stock that has run out since checkout does not undo the payment; the
    /// shortfall is logged and published as [`Event::StockShortfall`].
    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id, order_id = %request.order_id))]
    pub async fn verify_payment(
        &self,
        actor: &AuthUser,
        request: VerifyPaymentRequest,
    ) -> Result<OrderResponse, ServiceError> {
        let order = Order::find_by_id(request.order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order"))?;

        if order.user_id != actor.user_id {
            return Err(ServiceError::Forbidden(
                "You are not allowed to verify payment for this order".to_string(),
            ));
        }

        let gateway_order_id = match (&order.payment_method, &order.gateway_order_id) {
            (PaymentMethod::Online, Some(id)) => id.clone(),
            _ => {
                return Err(ServiceError::ValidationError(
                    "Order does not have an online payment to verify".to_string(),
                ))
            }
        };

        if !self
            .verifier
            .verify(&gateway_order_id, &request.gateway_payment_id, &request.signature)
        {
            counter!("storefront_payments.invalid_signature", 1);
            warn!("payment signature mismatch");
            return Err(ServiceError::InvalidSignature);
        }

        if order.payment_status == PaymentStatus::Completed {
            return Err(ServiceError::InvalidTransition(
                "Payment already verified".to_string(),
            ));
        }
        if order.status == OrderStatus::Cancelled {
            return Err(ServiceError::InvalidTransition(
                "Cannot verify payment for a cancelled order".to_string(),
            ));
        }
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidTransition(
                "Order is no longer awaiting payment".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let claimed = Order::update_many()
            .set(order::ActiveModel {
                payment_status: Set(PaymentStatus::Completed),
                status: Set(OrderStatus::Processing),
                gateway_payment_id: Set(Some(request.gateway_payment_id.clone())),
                gateway_signature: Set(Some(request.signature.clone())),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(&txn)
            .await?;

        if claimed.rows_affected == 0 {
            return Err(ServiceError::InvalidTransition(
                "Payment already verified".to_string(),
            ));
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&txn)
            .await?;

        let mut shortfalls = Vec::new();
        for item in &items {
            match inventory::decrement(&txn, item.variant_id, item.size, item.quantity).await {
                Ok(()) => {}
                Err(ServiceError::InsufficientStock {
                    variant_id,
                    size,
                    available,
                }) => {
                    error!(
                        order_id = %order.id,
                        %variant_id,
                        %size,
                        requested = item.quantity,
                        available,
                        "stock shortfall on paid order"
                    );
                    shortfalls.push(Event::StockShortfall {
                        order_id: order.id,
                        variant_id,
                        size,
                        requested: item.quantity,
                        available,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let updated = Order::find_by_id(order.id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order"))?;

        txn.commit().await?;

        counter!("storefront_payments.verified", 1);
        info!(shortfalls = shortfalls.len(), "payment verified");

        for event in shortfalls {
            self.event_sender.send_or_log(event).await;
        }
        self.event_sender
            .send_or_log(Event::PaymentVerified {
                order_id: updated.id,
                gateway_payment_id: request.gateway_payment_id,
            })
            .await;

        match User::find_by_id(updated.user_id).one(&*self.db).await {
            Ok(Some(customer)) => self.notifier.order_confirmed(&customer, &updated).await,
            Ok(None) => warn!("order owner missing; confirmation not sent"),
            Err(e) => warn!(error = %e, "could not load customer for confirmation"),
        }

        Ok(OrderResponse::new(updated, items))
    }
}

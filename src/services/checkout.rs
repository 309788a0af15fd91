//! Cart-to-order conversion.
//!
//! Everything between reading the cart and removing the purchased lines runs
//! in a single database transaction. Any error before `commit` drops the
//! transaction, which rolls back stock, order rows and cart changes together.

use chrono::{Duration as ChronoDuration, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::order::{OrderStatus, PaymentMethod, PaymentStatus};
use crate::entities::{order, order_item, ProductVariant};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::notifications::OrderNotifier;
use crate::services::address_resolver::{self, AddressSelection};
use crate::services::orders::OrderResponse;
use crate::services::payment_gateway::{
    receipt_reference, to_minor_units, GatewayOrder, GatewayOrderRequest, PaymentGateway,
};
use crate::services::{cart_snapshot, inventory};

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Cart lines to buy; `None` or empty buys the whole cart.
    pub item_ids: Option<Vec<Uuid>>,
    pub address: AddressSelection,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResult {
    pub order: OrderResponse,
    /// Present for online payments.
    pub gateway_order: Option<GatewayOrder>,
}

/// Tunables read from configuration.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub expected_delivery_days: u32,
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    gateway: Arc<dyn PaymentGateway>,
    notifier: OrderNotifier,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
        notifier: OrderNotifier,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            db,
            event_sender,
            gateway,
            notifier,
            settings,
        }
    }

    /// Converts the caller's cart (or the selected lines) into an order.
    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id, payment_method = %request.payment_method))]
    pub async fn checkout(
        &self,
        actor: &AuthUser,
        request: CheckoutRequest,
    ) -> Result<CheckoutResult, ServiceError> {
        match self.place_order(actor, request).await {
            Ok(result) => {
                counter!("storefront_checkout.completed", 1);
                Ok(result)
            }
            Err(e) => {
                counter!("storefront_checkout.failed", 1);
                warn!(error = %e, "checkout failed");
                Err(e)
            }
        }
    }

    async fn place_order(
        &self,
        actor: &AuthUser,
        request: CheckoutRequest,
    ) -> Result<CheckoutResult, ServiceError> {
        let (customer, shipping_address) =
            address_resolver::resolve(&*self.db, actor.user_id, request.address).await?;

        let txn = self.db.begin().await?;

        let snapshot =
            cart_snapshot::read(&txn, actor.user_id, request.item_ids.as_deref()).await?;

        let mut total = Decimal::ZERO;
        let mut priced = Vec::with_capacity(snapshot.items.len());
        for item in &snapshot.items {
            let variant = ProductVariant::find_by_id(item.variant_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Variant"))?;
            inventory::check_stock(&txn, item.variant_id, item.size, item.quantity).await?;
            total += variant.price * Decimal::from(item.quantity);
            priced.push((item, variant.price));
        }

        let online = request.payment_method == PaymentMethod::Online;
        let gateway_order = if online {
            let gateway_order = self
                .gateway
                .create_order(GatewayOrderRequest {
                    amount: to_minor_units(total)?,
                    currency: self.settings.currency.clone(),
                    receipt: receipt_reference(),
                })
                .await?;
            Some(gateway_order)
        } else {
            for item in &snapshot.items {
                inventory::decrement(&txn, item.variant_id, item.size, item.quantity).await?;
            }
            None
        };

        let now = Utc::now();
        let (status, payment_status) = if online {
            (OrderStatus::Pending, PaymentStatus::Pending)
        } else {
            (OrderStatus::Processing, PaymentStatus::Completed)
        };

        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(actor.user_id),
            status: Set(status),
            payment_status: Set(payment_status),
            payment_method: Set(request.payment_method),
            total_amount: Set(total),
            currency: Set(self.settings.currency.clone()),
            shipping_address: Set(shipping_address),
            gateway_order_id: Set(gateway_order.as_ref().map(|g| g.id.clone())),
            gateway_payment_id: Set(None),
            gateway_signature: Set(None),
            expected_delivery: Set(
                now + ChronoDuration::days(i64::from(self.settings.expected_delivery_days)),
            ),
            cancellation_requested: Set(false),
            cancellation_reason: Set(None),
            cancellation_requested_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(priced.len());
        for (item, unit_price) in priced {
            let line = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                variant_id: Set(item.variant_id),
                size: Set(item.size),
                quantity: Set(item.quantity),
                unit_price: Set(unit_price),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(line);
        }

        cart_snapshot::consume(&txn, &snapshot).await?;

        txn.commit().await?;

        info!(
            order_id = %order.id,
            total = %order.total_amount,
            lines = items.len(),
            "order created"
        );

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: order.id,
                user_id: order.user_id,
                total_amount: order.total_amount,
                online,
            })
            .await;
        self.notifier.order_confirmed(&customer, &order).await;

        Ok(CheckoutResult {
            order: OrderResponse::new(order, items),
            gateway_order,
        })
    }
}

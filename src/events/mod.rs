use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::entities::product_variant::Size;

/// Domain events published after a state change has been committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        total_amount: Decimal,
        online: bool,
    },
    PaymentVerified {
        order_id: Uuid,
        gateway_payment_id: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    CancellationRequested {
        order_id: Uuid,
        user_id: Uuid,
    },
    /// Stock could not be taken for a line of an order that is already paid.
    StockShortfall {
        order_id: Uuid,
        variant_id: Uuid,
        size: Size,
        requested: i32,
        available: i32,
    },
    CartUpdated {
        user_id: Uuid,
        cart_id: Uuid,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderCreated { .. } => "order_created",
            Event::PaymentVerified { .. } => "payment_verified",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::CancellationRequested { .. } => "cancellation_requested",
            Event::StockShortfall { .. } => "stock_shortfall",
            Event::CartUpdated { .. } => "cart_updated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the consumer is gone.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "event dropped");
        }
    }
}

/// Drains the event channel until every sender has been dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::StockShortfall {
                order_id,
                variant_id,
                size,
                requested,
                available,
            } => {
                warn!(
                    %order_id,
                    %variant_id,
                    %size,
                    requested,
                    available,
                    "paid order could not be fully allocated; manual follow-up required"
                );
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::CartUpdated { .. } => {
                debug!(event = ?event, "cart updated");
            }
            other => {
                info!(event = other.name(), payload = ?other, "domain event");
            }
        }
    }

    info!("Event processing loop stopped");
}

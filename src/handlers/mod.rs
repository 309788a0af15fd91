pub mod carts;
pub mod common;
pub mod orders;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::notifications::{Mailer, OrderNotifier};
use crate::services::{
    cancellation::CancellationService,
    cart::CartService,
    checkout::{CheckoutService, CheckoutSettings},
    order_status::OrderStatusService,
    orders::OrderQueryService,
    payment_gateway::{PaymentGateway, SignatureVerifier},
    payments::PaymentService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub carts: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub payments: Arc<PaymentService>,
    pub order_status: Arc<OrderStatusService>,
    pub cancellations: Arc<CancellationService>,
    pub orders: Arc<OrderQueryService>,
}

impl AppServices {
    /// Wires every service against the shared pool, event channel and the
    /// given external collaborators.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let notifier = OrderNotifier::new(mailer, config.admin_email.clone());

        let carts = Arc::new(CartService::new(db_pool.clone(), event_sender.clone()));
        let checkout = Arc::new(CheckoutService::new(
            db_pool.clone(),
            event_sender.clone(),
            gateway,
            notifier.clone(),
            CheckoutSettings {
                currency: config.payment_currency.clone(),
                expected_delivery_days: config.expected_delivery_days,
            },
        ));
        let payments = Arc::new(PaymentService::new(
            db_pool.clone(),
            event_sender.clone(),
            SignatureVerifier::new(config.payment_key_secret.clone()),
            notifier.clone(),
        ));
        let order_status = Arc::new(OrderStatusService::new(
            db_pool.clone(),
            event_sender.clone(),
            notifier.clone(),
        ));
        let cancellations = Arc::new(CancellationService::new(
            db_pool.clone(),
            event_sender,
            notifier,
        ));
        let orders = Arc::new(OrderQueryService::new(
            db_pool,
            config.api_default_page_size,
            config.api_max_page_size,
        ));

        Self {
            carts,
            checkout,
            payments,
            order_status,
            cancellations,
            orders,
        }
    }
}

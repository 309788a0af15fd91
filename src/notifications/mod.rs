//! Transactional email for order lifecycle events.
//!
//! Delivery is best-effort: `OrderNotifier` logs failed sends and never
//! returns an error to the workflow that triggered it.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::entities::order::{self, ShippingAddress};
use crate::entities::product_variant::Size;
use crate::entities::user;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("mail transport error: {0}")]
    Transport(String),
    #[error("mail relay rejected message with status {0}")]
    Rejected(u16),
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        NotificationError::Transport(err.to_string())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError>;
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts messages as JSON to an HTTP mail relay.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    relay_url: String,
    from: String,
}

impl HttpMailer {
    pub fn new(
        relay_url: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            relay_url: relay_url.into(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    #[instrument(skip(self, message), fields(to = %message.to, subject = %message.subject))]
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        let payload = RelayPayload {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
        };

        let response = self
            .client
            .post(&self.relay_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Writes messages to the log instead of delivering them.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        info!(to = %message.to, subject = %message.subject, "email (not delivered, no relay configured)");
        Ok(())
    }
}

/// One purchased line as shown to operators.
#[derive(Debug, Clone)]
pub struct LineSummary {
    pub description: String,
    pub size: Size,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Clone)]
pub struct OrderNotifier {
    mailer: Arc<dyn Mailer>,
    admin_email: String,
}

impl OrderNotifier {
    pub fn new(mailer: Arc<dyn Mailer>, admin_email: impl Into<String>) -> Self {
        Self {
            mailer,
            admin_email: admin_email.into(),
        }
    }

    pub async fn order_confirmed(&self, customer: &user::Model, order: &order::Model) {
        let body = format!(
            "<p>Hello, {name}</p>\
             <p>Thank you for shopping with us! Your order <strong>#{id}</strong> has been confirmed.</p>\
             <p>We'll notify you once it is shipped.</p>",
            name = escape_html(&customer.name),
            id = order.id,
        );
        self.dispatch(
            "order_confirmed",
            EmailMessage {
                to: customer.email.clone(),
                subject: "Your Order is Confirmed".to_string(),
                html: layout("Order Confirmed", &body),
            },
        )
        .await;
    }

    pub async fn order_shipped(&self, customer: &user::Model, order: &order::Model) {
        let body = format!(
            "<p>Hello, {name}</p>\
             <p>Good news! Your order <strong>#{id}</strong> has been shipped.</p>\
             <p>Track your package using the tracking ID: <strong>{tracking}</strong>.</p>",
            name = escape_html(&customer.name),
            id = order.id,
            tracking = order.tracking_id(),
        );
        self.dispatch(
            "order_shipped",
            EmailMessage {
                to: customer.email.clone(),
                subject: "Your Order is Shipped".to_string(),
                html: layout("Order Shipped", &body),
            },
        )
        .await;
    }

    pub async fn order_delivered(&self, customer: &user::Model, order: &order::Model) {
        let body = format!(
            "<p>Hello, {name}</p>\
             <p>Your order <strong>#{id}</strong> has been delivered.</p>\
             <p>We hope you enjoy your purchase! Don't forget to leave a review.</p>",
            name = escape_html(&customer.name),
            id = order.id,
        );
        self.dispatch(
            "order_delivered",
            EmailMessage {
                to: customer.email.clone(),
                subject: "Your Order has been Delivered".to_string(),
                html: layout("Order Delivered", &body),
            },
        )
        .await;
    }

    /// Alerts operations with everything needed to adjudicate the request.
    pub async fn cancellation_requested(
        &self,
        customer: &user::Model,
        order: &order::Model,
        lines: &[LineSummary],
    ) {
        let items: String = lines
            .iter()
            .map(|line| {
                format!(
                    "<li>{} ({}) - Quantity: {}, Price: {} {}</li>",
                    escape_html(&line.description),
                    line.size,
                    line.quantity,
                    line.unit_price,
                    order.currency
                )
            })
            .collect();

        let requested_at = order
            .cancellation_requested_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_default();

        let body = format!(
            "<p>A cancellation request has been submitted for order <strong>#{id}</strong>.</p>\
             <h3>Order Details</h3>\
             <ul>\
             <li><strong>User:</strong> {name} ({email}, {phone})</li>\
             <li><strong>Order ID:</strong> {id}</li>\
             <li><strong>Total Amount:</strong> {total} {currency}</li>\
             <li><strong>Payment Method:</strong> {method}</li>\
             <li><strong>Payment Status:</strong> {payment_status}</li>\
             <li><strong>Status:</strong> {status}</li>\
             <li><strong>Cancellation Reason:</strong> {reason}</li>\
             <li><strong>Requested At:</strong> {requested_at}</li>\
             </ul>\
             <h3>Items</h3><ul>{items}</ul>\
             <h3>Shipping Address</h3><p>{address}</p>",
            id = order.id,
            name = escape_html(&customer.name),
            email = escape_html(&customer.email),
            phone = escape_html(customer.phone.as_deref().unwrap_or("N/A")),
            total = order.total_amount,
            currency = order.currency,
            method = order.payment_method,
            payment_status = order.payment_status,
            status = order.status,
            reason = escape_html(order.cancellation_reason.as_deref().unwrap_or_default()),
            requested_at = requested_at,
            items = items,
            address = escape_address(&order.shipping_address),
        );

        self.dispatch(
            "cancellation_requested",
            EmailMessage {
                to: self.admin_email.clone(),
                subject: format!("Order Cancellation Request #{}", order.id),
                html: layout("Order Cancellation Request", &body),
            },
        )
        .await;
    }

    async fn dispatch(&self, kind: &'static str, message: EmailMessage) {
        let to = message.to.clone();
        match self.mailer.send(message).await {
            Ok(()) => {
                metrics::counter!("storefront_notifications.sent", 1);
            }
            Err(e) => {
                metrics::counter!("storefront_notifications.failed", 1);
                warn!(kind, %to, error = %e, "failed to send notification");
            }
        }
    }
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<div style=\"max-width: 600px; margin: auto; padding: 20px; font-family: Arial, sans-serif;\">\
         <h2 style=\"text-align: center;\">{}</h2>{}</div>",
        title, body
    )
}

fn escape_address(address: &ShippingAddress) -> String {
    escape_html(&address.to_string())
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::{OrderStatus, PaymentMethod, PaymentStatus};
    use crate::entities::user::UserRole;
    use chrono::Utc;
    use mockall::predicate::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn customer() -> user::Model {
        let now = Utc::now();
        user::Model {
            id: Uuid::new_v4(),
            name: "Asha <Admin>".into(),
            email: "asha@example.com".into(),
            phone: None,
            role: UserRole::Customer,
            created_at: now,
            updated_at: now,
        }
    }

    fn order_for(customer: &user::Model) -> order::Model {
        let now = Utc::now();
        order::Model {
            id: Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap(),
            user_id: customer.id,
            status: OrderStatus::Processing,
            payment_status: PaymentStatus::Completed,
            payment_method: PaymentMethod::Cod,
            total_amount: dec!(1200),
            currency: "INR".into(),
            shipping_address: ShippingAddress {
                house_number: "7".into(),
                street: "Park Street".into(),
                colony: "Central".into(),
                city: "Kolkata".into(),
                state: "WB".into(),
                country: "IN".into(),
                postal_code: "700016".into(),
            },
            gateway_order_id: None,
            gateway_payment_id: None,
            gateway_signature: None,
            expected_delivery: now,
            cancellation_requested: true,
            cancellation_reason: Some("Ordered the wrong size".into()),
            cancellation_requested_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn shipped_mail_carries_tracking_id() {
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .withf(|m| {
                m.to == "asha@example.com"
                    && m.subject == "Your Order is Shipped"
                    && m.html.contains("TRACK5FE0C8")
            })
            .times(1)
            .returning(|_| Ok(()));

        let notifier = OrderNotifier::new(Arc::new(mailer), "ops@example.com");
        let customer = customer();
        notifier.order_shipped(&customer, &order_for(&customer)).await;
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .times(1)
            .returning(|_| Err(NotificationError::Rejected(503)));

        let notifier = OrderNotifier::new(Arc::new(mailer), "ops@example.com");
        let customer = customer();
        notifier.order_delivered(&customer, &order_for(&customer)).await;
    }

    #[tokio::test]
    async fn cancellation_mail_goes_to_operations() {
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .with(function(|m: &EmailMessage| {
                m.to == "ops@example.com"
                    && m.html.contains("Ordered the wrong size")
                    && m.html.contains("Asha &lt;Admin&gt;")
                    && m.html.contains("Tee (Black) (XL) - Quantity: 2")
                    && m.html.contains("Park Street")
            }))
            .times(1)
            .returning(|_| Ok(()));

        let notifier = OrderNotifier::new(Arc::new(mailer), "ops@example.com");
        let customer = customer();
        let lines = vec![LineSummary {
            description: "Tee (Black)".into(),
            size: Size::XL,
            quantity: 2,
            unit_price: dec!(600),
        }];
        notifier
            .cancellation_requested(&customer, &order_for(&customer), &lines)
            .await;
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("<b>\"x\" & 'y'</b>"), "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;");
    }
}

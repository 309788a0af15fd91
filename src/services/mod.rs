// Stock and cart primitives
pub mod cart;
pub mod cart_snapshot;
pub mod inventory;

// Checkout and payment
pub mod address_resolver;
pub mod checkout;
pub mod payment_gateway;
pub mod payments;

// Post-purchase workflows
pub mod cancellation;
pub mod order_status;
pub mod orders;

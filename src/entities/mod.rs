//! Database entities backing the storefront order core.

pub mod cart;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod product_variant;
pub mod user;
pub mod user_address;
pub mod variant_stock;

pub use cart::Entity as Cart;
pub use cart_item::Entity as CartItem;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use product_variant::Entity as ProductVariant;
pub use user::Entity as User;
pub use user_address::Entity as UserAddress;
pub use variant_stock::Entity as VariantStock;

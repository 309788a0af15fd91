use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order created by a committed checkout. After creation only the status,
/// payment fields and the cancellation request change.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_amount: Decimal,
    pub currency: String,
    #[sea_orm(column_type = "Json")]
    pub shipping_address: ShippingAddress,
    #[sea_orm(nullable)]
    pub gateway_order_id: Option<String>,
    #[sea_orm(nullable)]
    pub gateway_payment_id: Option<String>,
    #[sea_orm(nullable)]
    pub gateway_signature: Option<String>,
    pub expected_delivery: DateTime<Utc>,
    pub cancellation_requested: bool,
    #[sea_orm(nullable)]
    pub cancellation_reason: Option<String>,
    #[sea_orm(nullable)]
    pub cancellation_requested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Shipment reference quoted to the customer: `TRACK` plus the tail of the order id.
    pub fn tracking_id(&self) -> String {
        let simple = self.id.simple().to_string();
        format!("TRACK{}", simple[simple.len() - 6..].to_ascii_uppercase())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Denormalized copy of the address an order ships to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
pub struct ShippingAddress {
    pub house_number: String,
    pub street: String,
    pub colony: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
}

impl std::fmt::Display for ShippingAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}, {} - {}",
            self.house_number,
            self.street,
            self.colony,
            self.city,
            self.state,
            self.country,
            self.postal_code
        )
    }
}

/// Order lifecycle status
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// `delivered` and `cancelled` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Position along pending -> processing -> shipped -> delivered.
    fn rank(self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Shipped => 2,
            OrderStatus::Delivered => 3,
            OrderStatus::Cancelled => u8::MAX,
        }
    }

    /// Whether an operator may move an order from `self` to `target`.
    /// Moves only go forward; `cancelled` is reachable from any non-terminal
    /// state and `pending` is never a target.
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        if self.is_terminal() || target == OrderStatus::Pending {
            return false;
        }
        match target {
            OrderStatus::Cancelled => true,
            _ => target.rank() > self.rank(),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PaymentMethod {
    /// Cash on delivery
    #[sea_orm(string_value = "cod")]
    Cod,
    #[sea_orm(string_value = "online")]
    Online,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case(OrderStatus::Pending, OrderStatus::Processing, true)]
    #[case(OrderStatus::Pending, OrderStatus::Shipped, true)]
    #[case(OrderStatus::Pending, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Processing, OrderStatus::Shipped, true)]
    #[case(OrderStatus::Processing, OrderStatus::Processing, false)]
    #[case(OrderStatus::Shipped, OrderStatus::Delivered, true)]
    #[case(OrderStatus::Shipped, OrderStatus::Processing, false)]
    #[case(OrderStatus::Shipped, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Processing, OrderStatus::Pending, false)]
    fn transition_rules(
        #[case] from: OrderStatus,
        #[case] to: OrderStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[rstest]
    fn terminal_states_reject_everything(
        #[values(OrderStatus::Delivered, OrderStatus::Cancelled)] from: OrderStatus,
        #[values(
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled
        )]
        to: OrderStatus,
    ) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn payment_method_wire_names() {
        assert_eq!(PaymentMethod::from_str("COD").unwrap(), PaymentMethod::Cod);
        assert_eq!(PaymentMethod::Online.to_string(), "online");
        assert!(PaymentMethod::from_str("card").is_err());
    }

    #[test]
    fn tracking_id_uses_order_id_tail() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        let now = Utc::now();
        let order = Model {
            id,
            user_id: Uuid::new_v4(),
            status: OrderStatus::Shipped,
            payment_status: PaymentStatus::Completed,
            payment_method: PaymentMethod::Cod,
            total_amount: Decimal::new(500, 0),
            currency: "INR".into(),
            shipping_address: ShippingAddress {
                house_number: "12".into(),
                street: "MG Road".into(),
                colony: "Indiranagar".into(),
                city: "Bengaluru".into(),
                state: "KA".into(),
                country: "IN".into(),
                postal_code: "560038".into(),
            },
            gateway_order_id: None,
            gateway_payment_id: None,
            gateway_signature: None,
            expected_delivery: now,
            cancellation_requested: false,
            cancellation_reason: None,
            cancellation_requested_at: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(order.tracking_id(), "TRACK5FE0C8");
    }
}

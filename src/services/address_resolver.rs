use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::ShippingAddress;
use crate::entities::{user, user_address, User, UserAddress};
use crate::errors::ServiceError;

/// Inline shipping address as submitted by the client. Every field is
/// required; they are optional here so that a missing one can be reported
/// by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddressInput {
    pub house_number: Option<String>,
    pub street: Option<String>,
    pub colony: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

impl ShippingAddressInput {
    fn into_snapshot(self) -> Result<ShippingAddress, ServiceError> {
        fn required(value: Option<String>, field: &str) -> Result<String, ServiceError> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "Shipping address field '{}' is required",
                        field
                    ))
                })
        }

        Ok(ShippingAddress {
            house_number: required(self.house_number, "house_number")?,
            street: required(self.street, "street")?,
            colony: required(self.colony, "colony")?,
            city: required(self.city, "city")?,
            state: required(self.state, "state")?,
            country: required(self.country, "country")?,
            postal_code: required(self.postal_code, "postal_code")?,
        })
    }
}

/// Where the shipping address for a checkout comes from. When more than one
/// source is given the first in precedence order wins: `address_id`, then
/// `inline`, then the user's default address.
#[derive(Debug, Clone, Default)]
pub struct AddressSelection {
    pub address_id: Option<Uuid>,
    pub inline: Option<ShippingAddressInput>,
}

/// Resolves the address an order ships to, as a detached snapshot.
pub async fn resolve<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    selection: AddressSelection,
) -> Result<(user::Model, ShippingAddress), ServiceError> {
    let user = User::find_by_id(user_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("User"))?;

    if let Some(address_id) = selection.address_id {
        let address = UserAddress::find_by_id(address_id)
            .filter(user_address::Column::UserId.eq(user_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Invalid Address ID".to_string()))?;
        return Ok((user, address.snapshot()));
    }

    if let Some(inline) = selection.inline {
        return Ok((user, inline.into_snapshot()?));
    }

    let default = UserAddress::find()
        .filter(user_address::Column::UserId.eq(user_id))
        .filter(user_address::Column::IsDefault.eq(true))
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::PreconditionFailed(
                "No default address set and no address provided".to_string(),
            )
        })?;

    Ok((user, default.snapshot()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn complete() -> ShippingAddressInput {
        ShippingAddressInput {
            house_number: Some("221B".into()),
            street: Some("Baker Street".into()),
            colony: Some("Marylebone".into()),
            city: Some("London".into()),
            state: Some("London".into()),
            country: Some("UK".into()),
            postal_code: Some("NW16XE".into()),
        }
    }

    #[test]
    fn complete_inline_address_is_snapshotted() {
        let snapshot = complete().into_snapshot().unwrap();
        assert_eq!(snapshot.street, "Baker Street");
        assert_eq!(snapshot.postal_code, "NW16XE");
    }

    #[test]
    fn missing_field_is_named() {
        let input = ShippingAddressInput {
            colony: None,
            ..complete()
        };
        assert_matches!(
            input.into_snapshot(),
            Err(ServiceError::ValidationError(msg)) if msg.contains("colony")
        );
    }

    #[test]
    fn blank_field_counts_as_missing() {
        let input = ShippingAddressInput {
            postal_code: Some("   ".into()),
            ..complete()
        };
        assert_matches!(input.into_snapshot(), Err(ServiceError::ValidationError(_)));
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A customer order for a single product.
///
/// `farmer_id` is denormalized from the product's owner at placement time
/// and is not re-derived when product ownership later changes; farmer-facing
/// reads go through the catalog instead (see `OrderService::list_for_farmer`).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub farmer_id: Option<Uuid>,

    pub quantity: i32,
    pub address: String,
    pub total_amount: Decimal,

    /// Holds a `PaymentStatus` in its canonical uppercase string form
    pub payment_status: String,
    /// Holds an `OrderStatus` in its canonical uppercase string form
    pub order_status: String,

    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Payment state of an order as reported by the gateway.
///
/// The gateway may report statuses this crate does not enumerate yet;
/// those are carried verbatim (uppercased) in `Other` rather than being
/// rejected, so a gateway-side vocabulary change never drops a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Other(String),
}

impl PaymentStatus {
    pub const PENDING: &'static str = "PENDING";
    pub const PAID: &'static str = "PAID";
    pub const FAILED: &'static str = "FAILED";

    /// Normalizes a gateway-reported status: case-insensitive, with
    /// `SUCCESS` treated as `PAID` and a blank/absent status as `PENDING`.
    pub fn from_reported(reported: Option<&str>) -> Self {
        let normalized = reported.map(|s| s.trim().to_uppercase()).unwrap_or_default();
        match normalized.as_str() {
            "" | Self::PENDING => PaymentStatus::Pending,
            "SUCCESS" | Self::PAID => PaymentStatus::Paid,
            Self::FAILED => PaymentStatus::Failed,
            _ => PaymentStatus::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PaymentStatus::Pending => Self::PENDING,
            PaymentStatus::Paid => Self::PAID,
            PaymentStatus::Failed => Self::FAILED,
            PaymentStatus::Other(s) => s.as_str(),
        }
    }
}

/// Fulfillment state of an order, independent of its payment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Confirmed,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reported_status_mapping() {
        assert_eq!(PaymentStatus::from_reported(Some("success")), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::from_reported(Some("PAID")), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::from_reported(Some(" failed ")), PaymentStatus::Failed);
        assert_eq!(PaymentStatus::from_reported(None), PaymentStatus::Pending);
        assert_eq!(PaymentStatus::from_reported(Some("")), PaymentStatus::Pending);
        assert_eq!(
            PaymentStatus::from_reported(Some("refunded")),
            PaymentStatus::Other("REFUNDED".to_string())
        );
    }

    #[test]
    fn order_status_round_trips_as_uppercase() {
        assert_eq!(OrderStatus::Created.to_string(), "CREATED");
        assert_eq!("CANCELLED".parse::<OrderStatus>().unwrap(), OrderStatus::Cancelled);
    }
}

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted purchase. Created exactly once by the checkout coordinator
/// inside its transaction; afterwards only `status` / `payment_status` change,
/// via the admin endpoints. Monetary fields are snapshots computed at creation
/// and never recomputed: `total == subtotal - promo_amount + shipping_fee`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Human-facing code: brand prefix + yyMMddHHmmss.
    pub order_code: String,
    pub customer_id: Option<Uuid>,
    /// Contact email of the owner: the guest email for guest checkouts, or the
    /// account email when known. Guest order lookup matches against this.
    pub email: Option<String>,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub subtotal: Decimal,
    pub promo_code_id: Option<Uuid>,
    /// Code string snapshot at time of use.
    pub promo_code: Option<String>,
    pub promo_amount: Decimal,
    pub shipping_fee: Decimal,
    pub total: Decimal,
    pub full_name: String,
    pub phone: String,
    pub province: String,
    pub district: String,
    pub ward: String,
    pub address: String,
    pub note: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Order lifecycle states.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const CONFIRMED: &str = "confirmed";
    pub const SHIPPING: &str = "shipping";
    pub const DELIVERED: &str = "delivered";
    pub const CANCELLED: &str = "cancelled";

    pub const ALL: &[&str] = &[PENDING, CONFIRMED, SHIPPING, DELIVERED, CANCELLED];
}

/// Payment lifecycle states.
pub mod payment_status {
    pub const PENDING: &str = "pending";
    pub const PAID: &str = "paid";
    pub const REFUNDED: &str = "refunded";

    pub const ALL: &[&str] = &[PENDING, PAID, REFUNDED];
}

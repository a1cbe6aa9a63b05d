use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discount type discriminator stored in `discount_type`.
pub const DISCOUNT_FIXED: &str = "fixed";
pub const DISCOUNT_PERCENTAGE: &str = "percentage";

/// A promo code: discount rule plus mutable usage counters.
///
/// `used_count` is only ever incremented by the promo ledger's conditional
/// update inside the order transaction, so `used_count <= total_usage_limit`
/// holds whenever a limit is set.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promo_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub code: String,
    /// "fixed" or "percentage".
    pub discount_type: String,
    pub value: Decimal,
    /// Cap for percentage discounts.
    pub max_amount: Option<Decimal>,
    pub is_active: bool,
    pub expires_at: Option<DateTimeUtc>,
    pub login_required: bool,
    pub per_user_limit: Option<i32>,
    pub total_usage_limit: Option<i32>,
    pub used_count: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::promo_redemption::Entity")]
    Redemptions,
}

impl Related<super::promo_redemption::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Redemptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter as StrumEnumIter, EnumString};
use uuid::Uuid;

/// The closed size vocabulary. Sizes arrive as strings at the API boundary and
/// are parsed into this enum before any stock row is touched.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    StrumEnumIter,
)]
pub enum Size {
    #[serde(rename = "M")]
    #[strum(serialize = "M")]
    M,
    #[serde(rename = "L")]
    #[strum(serialize = "L")]
    L,
    #[serde(rename = "XL")]
    #[strum(serialize = "XL")]
    Xl,
    #[serde(rename = "Hat")]
    #[strum(serialize = "Hat")]
    Hat,
}

/// Per-product, per-size available quantity. `quantity` is never negative:
/// the only mutation path is the coordinator's conditional decrement, which
/// re-checks `quantity >= requested` at write time. `out_of_stock` is true
/// exactly when `quantity == 0`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_levels")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub product_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub size: String,
    pub quantity: i32,
    pub out_of_stock: bool,
    pub updated_at: Option<DateTimeUtc>,
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn size_round_trips_through_display_and_from_str() {
        for size in [Size::M, Size::L, Size::Xl, Size::Hat] {
            assert_eq!(Size::from_str(&size.to_string()).unwrap(), size);
        }
    }

    #[test]
    fn unknown_size_is_rejected() {
        assert!(Size::from_str("XXL").is_err());
        assert!(Size::from_str("m").is_err());
    }
}

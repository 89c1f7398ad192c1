//! Usage-based tier entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

use crate::pricing::UsageTier;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "subscription_usage_based_tiers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub usage_based_price_id: Uuid,

    pub from_units: i64,

    /// `None` for the unbounded last tier
    pub to_units: Option<i64>,

    pub per_unit_price: Option<f64>,

    pub flat_fee_price: Option<f64>,
}

impl From<&Model> for UsageTier {
    fn from(model: &Model) -> Self {
        UsageTier {
            from: model.from_units,
            to: model.to_units,
            per_unit_price: model.per_unit_price,
            flat_fee_price: model.flat_fee_price,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::usage_based_price::Entity",
        from = "Column::UsageBasedPriceId",
        to = "super::usage_based_price::Column::Id"
    )]
    UsagePrice,
}

impl Related<super::usage_based_price::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UsagePrice.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

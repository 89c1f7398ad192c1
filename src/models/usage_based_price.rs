//! Usage-based price entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "subscription_usage_based_prices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub product_id: Uuid,

    /// Pricing unit name from the unit catalogue
    pub unit: String,

    pub unit_title: String,

    pub unit_title_plural: String,

    pub currency: String,

    pub billing_period: String,

    /// `graduated` or `volume`
    pub tiers_mode: String,

    /// `sum`, `max` or `last_during_period`
    pub aggregation: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::subscription_product::Entity",
        from = "Column::ProductId",
        to = "super::subscription_product::Column::Id"
    )]
    Product,
    #[sea_orm(has_many = "super::usage_based_tier::Entity")]
    Tiers,
}

impl Related<super::subscription_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::usage_based_tier::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tiers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

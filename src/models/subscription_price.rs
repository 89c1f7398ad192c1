//! Subscription price entity model
//!
//! One row per (product, billing period, currency).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "subscription_prices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub product_id: Uuid,

    /// Lowercase billing period (`once`, `monthly`, `yearly`, ...)
    pub billing_period: String,

    /// Lowercase ISO currency code
    pub currency: String,

    /// Amount in major currency units
    pub amount: f64,

    pub active: bool,

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
}

impl Related<super::subscription_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

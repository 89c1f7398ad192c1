//! Subscription product entity model
//!
//! A sellable plan. Prices live in `subscription_prices` and usage-based
//! charges in `subscription_usage_based_prices`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "subscription_products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Unique plan title, e.g. "Pro"
    #[sea_orm(unique)]
    pub title: String,

    pub description: Option<String>,

    /// Display order on pricing pages
    pub sort_order: i32,

    /// Pricing model in kebab-case (`flat-rate`, `per-seat`, ...)
    pub model: String,

    pub public: bool,

    pub active: bool,

    pub badge: Option<String>,

    /// Marketing feature list (JSON array of strings)
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub features: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::subscription_price::Entity")]
    Prices,
    #[sea_orm(has_many = "super::usage_based_price::Entity")]
    UsagePrices,
}

impl Related<super::subscription_price::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Prices.def()
    }
}

impl Related<super::usage_based_price::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UsagePrices.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

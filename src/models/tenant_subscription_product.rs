//! Tenant subscription entity model
//!
//! Links a tenant to a subscription product it is (or was) subscribed to.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenant_subscription_products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub product_id: Uuid,

    /// Inactive rows are kept for history but ignored by targeting
    pub active: bool,

    /// Seats or units purchased
    pub quantity: i32,

    pub ends_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Active and not past its end date.
    pub fn is_current(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.active && self.ends_at.is_none_or(|ends_at| ends_at > now)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,
    #[sea_orm(
        belongs_to = "super::subscription_product::Entity",
        from = "Column::ProductId",
        to = "super::subscription_product::Column::Id"
    )]
    Product,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::subscription_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

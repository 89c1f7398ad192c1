//! Tenant entity: the customer account that owns subscriptions and is
//! targeted by `tenant.*` feature flag filters.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Display name for the tenant (optional)
    pub name: Option<String>,

    /// URL-safe unique handle, targeted by `tenant.is` filters
    #[sea_orm(unique)]
    pub slug: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::tenant_subscription_product::Entity")]
    SubscriptionProducts,
}

impl Related<super::tenant_subscription_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SubscriptionProducts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

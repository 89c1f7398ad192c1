//! Feature flag filter entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "feature_flag_filters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub feature_flag_id: Uuid,

    /// Wire name of the filter type, e.g. `user.roles.contains`
    pub filter_type: String,

    pub value: Option<String>,

    pub sort_order: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::feature_flag::Entity",
        from = "Column::FeatureFlagId",
        to = "super::feature_flag::Column::Id"
    )]
    FeatureFlag,
}

impl Related<super::feature_flag::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FeatureFlag.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

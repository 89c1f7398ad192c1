//! Formula component entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "formula_components")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub formula_id: Uuid,

    /// Position of the component inside the expression
    pub sort_order: i32,

    pub component_type: String,

    pub value: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::formula::Entity",
        from = "Column::FormulaId",
        to = "super::formula::Column::Id"
    )]
    Formula,
}

impl Related<super::formula::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Formula.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

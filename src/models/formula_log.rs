//! Formula calculation log entity model
//!
//! Written after each calculation of a formula that has `with_logs` set.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "formula_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub formula_id: Uuid,

    /// The expression as evaluated, components joined by spaces
    pub expression: String,

    /// Input variables (JSON object)
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub variables: Option<JsonValue>,

    /// Rendered result, absent when the calculation failed
    pub result: Option<String>,

    pub error: Option<String>,

    pub duration_ms: i64,

    pub created_at: DateTimeWithTimeZone,
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

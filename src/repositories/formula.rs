//! # Formula Repository
//!
//! Stores formulas with their ordered components and records calculation
//! logs.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde_json::Value;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::formulas::{
    CalculationTrigger, ComponentType, FormulaComponent, FormulaDefinition, FormulaResultAs,
};
use crate::models::formula::{self, Entity as Formula, Model as FormulaModel};
use crate::models::formula_component::{self, Entity as FormulaComponentEntity};
use crate::models::formula_log::{self, Entity as FormulaLog};

/// Data for a new formula. Components must already be validated.
#[derive(Debug, Clone)]
pub struct NewFormula {
    pub name: String,
    pub description: Option<String>,
    pub result_as: FormulaResultAs,
    pub calculation_trigger: CalculationTrigger,
    pub with_logs: bool,
    pub components: Vec<FormulaComponent>,
}

/// One calculation outcome to persist.
#[derive(Debug, Clone)]
pub struct NewFormulaLog {
    pub formula_id: Uuid,
    pub expression: String,
    pub variables: Value,
    pub result: Option<String>,
    pub error: Option<String>,
    pub duration_ms: i64,
}

/// Repository for formula database operations
pub struct FormulaRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> FormulaRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create_formula(
        &self,
        formula: NewFormula,
    ) -> Result<FormulaDefinition, RepositoryError> {
        if formula.name.trim().is_empty() {
            return Err(RepositoryError::validation_error(
                "Formula name cannot be empty",
            ));
        }

        let exists = Formula::find()
            .filter(formula::Column::Name.eq(&formula.name))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?
            .is_some();
        if exists {
            return Err(RepositoryError::Conflict(format!(
                "Formula '{}' already exists",
                formula.name
            )));
        }

        let txn = self.db.begin().await.map_err(RepositoryError::database_error)?;
        let now = Utc::now();
        let id = Uuid::new_v4();

        formula::ActiveModel {
            id: Set(id),
            name: Set(formula.name.clone()),
            description: Set(formula.description.clone()),
            result_as: Set(formula.result_as.as_str().to_string()),
            calculation_trigger: Set(formula.calculation_trigger.as_str().to_string()),
            with_logs: Set(formula.with_logs),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await
        .map_err(RepositoryError::database_error)?;

        for component in &formula.components {
            formula_component::ActiveModel {
                id: Set(Uuid::new_v4()),
                formula_id: Set(id),
                sort_order: Set(component.order),
                component_type: Set(component.component_type.as_str().to_string()),
                value: Set(component.value.clone()),
            }
            .insert(&txn)
            .await
            .map_err(RepositoryError::database_error)?;
        }

        txn.commit().await.map_err(RepositoryError::database_error)?;
        tracing::info!(formula_id = %id, name = %formula.name, "Created formula");

        let mut components = formula.components;
        components.sort_by_key(|component| component.order);
        Ok(FormulaDefinition {
            id,
            name: formula.name,
            description: formula.description,
            result_as: formula.result_as,
            calculation_trigger: formula.calculation_trigger,
            with_logs: formula.with_logs,
            components,
        })
    }

    pub async fn get_formula(
        &self,
        id: Uuid,
    ) -> Result<Option<FormulaDefinition>, RepositoryError> {
        let Some(model) = Formula::find_by_id(id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?
        else {
            return Ok(None);
        };
        Ok(self.with_components(vec![model]).await?.into_iter().next())
    }

    /// Every formula, ordered by name.
    pub async fn list_formulas(&self) -> Result<Vec<FormulaDefinition>, RepositoryError> {
        let models = Formula::find()
            .order_by_asc(formula::Column::Name)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        self.with_components(models).await
    }

    pub async fn insert_log(&self, log: NewFormulaLog) -> Result<(), RepositoryError> {
        formula_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            formula_id: Set(log.formula_id),
            expression: Set(log.expression),
            variables: Set(Some(log.variables)),
            result: Set(log.result),
            error: Set(log.error),
            duration_ms: Set(log.duration_ms),
            created_at: Set(Utc::now().into()),
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)?;
        Ok(())
    }

    /// Most recent logs of a formula, newest first.
    pub async fn recent_logs(
        &self,
        formula_id: Uuid,
        limit: u64,
    ) -> Result<Vec<formula_log::Model>, RepositoryError> {
        FormulaLog::find()
            .filter(formula_log::Column::FormulaId.eq(formula_id))
            .order_by_desc(formula_log::Column::CreatedAt)
            .limit(limit)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    async fn with_components(
        &self,
        models: Vec<FormulaModel>,
    ) -> Result<Vec<FormulaDefinition>, RepositoryError> {
        if models.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = models.iter().map(|model| model.id).collect();

        let mut components: HashMap<Uuid, Vec<FormulaComponent>> = HashMap::new();
        for row in FormulaComponentEntity::find()
            .filter(formula_component::Column::FormulaId.is_in(ids))
            .order_by_asc(formula_component::Column::SortOrder)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)?
        {
            let component_type = row
                .component_type
                .parse::<ComponentType>()
                .map_err(|err| RepositoryError::validation_error(err.to_string()))?;
            components
                .entry(row.formula_id)
                .or_default()
                .push(FormulaComponent::new(row.sort_order, component_type, row.value));
        }

        models
            .into_iter()
            .map(|model| {
                Ok(FormulaDefinition {
                    result_as: model
                        .result_as
                        .parse()
                        .map_err(RepositoryError::validation_error)?,
                    calculation_trigger: model
                        .calculation_trigger
                        .parse()
                        .map_err(RepositoryError::validation_error)?,
                    components: components.remove(&model.id).unwrap_or_default(),
                    id: model.id,
                    name: model.name,
                    description: model.description,
                    with_logs: model.with_logs,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::formulas::parse_expression;

    fn new_formula(name: &str, expression: &str) -> NewFormula {
        NewFormula {
            name: name.to_string(),
            description: None,
            result_as: FormulaResultAs::Number,
            calculation_trigger: CalculationTrigger::Always,
            with_logs: true,
            components: parse_expression(expression).unwrap(),
        }
    }

    #[tokio::test]
    async fn components_load_back_in_order() {
        let db = test_db().await;
        let repo = FormulaRepository::new(&db);

        let created = repo
            .create_formula(new_formula("total", "price * (1 + tax)"))
            .await
            .unwrap();
        let loaded = repo.get_formula(created.id).await.unwrap().unwrap();

        assert_eq!(loaded, created);
        let values: Vec<&str> = loaded.components.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["price", "*", "(", "1", "+", "tax", ")"]);
    }

    #[tokio::test]
    async fn duplicate_name_is_conflict() {
        let db = test_db().await;
        let repo = FormulaRepository::new(&db);

        repo.create_formula(new_formula("total", "1")).await.unwrap();
        let again = repo.create_formula(new_formula("total", "2")).await;

        assert!(matches!(again, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn logs_are_listed_newest_first() {
        let db = test_db().await;
        let repo = FormulaRepository::new(&db);
        let formula = repo.create_formula(new_formula("total", "a + b")).await.unwrap();

        for result in ["3", "5"] {
            repo.insert_log(NewFormulaLog {
                formula_id: formula.id,
                expression: "a + b".to_string(),
                variables: serde_json::json!({ "a": 1 }),
                result: Some(result.to_string()),
                error: None,
                duration_ms: 1,
            })
            .await
            .unwrap();
        }

        let logs = repo.recent_logs(formula.id, 10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(repo.recent_logs(Uuid::new_v4(), 10).await.unwrap().is_empty());
    }
}

//! Database-backed formula calculation.

use std::time::Instant;

use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::eval::{Variables, coerce, evaluate};
use super::rpn::{CompiledFormula, compile};
use super::value::FormulaValue;
use super::{FormulaComponent, FormulaDefinition, FormulaError, FormulaResultAs};
use crate::config::FormulaConfig;
use crate::error::RepositoryError;
use crate::repositories::{FormulaRepository, NewFormula, NewFormulaLog};

#[derive(Debug, Error)]
pub enum FormulaServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Formula(#[from] FormulaError),
}

/// Outcome of [`FormulaService::calculate`].
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FormulaCalculation {
    pub formula_id: Uuid,
    pub name: String,
    #[schema(value_type = Object)]
    pub result: FormulaValue,
    pub result_as: FormulaResultAs,
    pub duration_ms: f64,
}

#[derive(Clone)]
pub struct FormulaService {
    db: DatabaseConnection,
    config: FormulaConfig,
}

impl FormulaService {
    pub fn new(db: DatabaseConnection, config: FormulaConfig) -> Self {
        Self { db, config }
    }

    /// Enforces the component limit and compiles.
    pub fn prepare(&self, components: &[FormulaComponent]) -> Result<CompiledFormula, FormulaError> {
        if components.len() > self.config.max_components {
            return Err(FormulaError::TooManyComponents {
                max: self.config.max_components,
                actual: components.len(),
            });
        }
        compile(components)
    }

    /// Evaluates components that are not stored anywhere.
    pub fn evaluate_components(
        &self,
        components: &[FormulaComponent],
        variables: &Variables,
        result_as: FormulaResultAs,
    ) -> Result<FormulaValue, FormulaError> {
        let compiled = self.prepare(components)?;
        coerce(evaluate(&compiled, variables)?, result_as)
    }

    /// Validates and stores a formula.
    pub async fn create(&self, formula: NewFormula) -> Result<FormulaDefinition, FormulaServiceError> {
        self.prepare(&formula.components)?;
        Ok(FormulaRepository::new(&self.db).create_formula(formula).await?)
    }

    /// Loads formula `formula_id`, evaluates it against `variables` and, when
    /// the formula asks for it and logging is enabled, records the outcome.
    pub async fn calculate(
        &self,
        formula_id: Uuid,
        variables: &Variables,
    ) -> Result<FormulaCalculation, FormulaServiceError> {
        let repo = FormulaRepository::new(&self.db);
        let formula = repo
            .get_formula(formula_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Formula not found"))?;

        let started = Instant::now();
        let outcome = self
            .prepare(&formula.components)
            .and_then(|compiled| evaluate(&compiled, variables))
            .and_then(|value| coerce(value, formula.result_as));
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        counter!(
            "formula_calculations_total",
            "outcome" => if outcome.is_ok() { "ok" } else { "error" }
        )
        .increment(1);
        histogram!("formula_calculation_duration_ms").record(duration_ms);

        if formula.with_logs && self.config.log_calculations {
            let log = NewFormulaLog {
                formula_id,
                expression: expression_text(&formula.components),
                variables: variables_json(variables),
                result: outcome.as_ref().ok().map(ToString::to_string),
                error: outcome.as_ref().err().map(ToString::to_string),
                duration_ms: duration_ms.round() as i64,
            };
            if let Err(err) = repo.insert_log(log).await {
                warn!(formula_id = %formula_id, error = %err, "Failed to record formula log");
            }
        }

        let result = outcome.inspect_err(|err| {
            info!(formula_id = %formula_id, error = %err, "Formula calculation failed");
        })?;
        debug!(formula_id = %formula_id, duration_ms, "Calculated formula");

        Ok(FormulaCalculation {
            formula_id,
            name: formula.name,
            result,
            result_as: formula.result_as,
            duration_ms,
        })
    }
}

/// Component values joined in evaluation order.
fn expression_text(components: &[FormulaComponent]) -> String {
    let mut sorted: Vec<&FormulaComponent> = components.iter().collect();
    sorted.sort_by_key(|component| component.order);
    sorted
        .iter()
        .map(|component| component.value.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn variables_json(variables: &Variables) -> Value {
    Value::Object(
        variables
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::formulas::{CalculationTrigger, parse_expression};

    fn new_formula(name: &str, expression: &str, result_as: FormulaResultAs) -> NewFormula {
        NewFormula {
            name: name.to_string(),
            description: None,
            result_as,
            calculation_trigger: CalculationTrigger::Always,
            with_logs: true,
            components: parse_expression(expression).unwrap(),
        }
    }

    fn vars(pairs: &[(&str, FormulaValue)]) -> Variables {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[tokio::test]
    async fn calculates_and_logs() {
        let db = test_db().await;
        let service = FormulaService::new(db.clone(), FormulaConfig::default());
        let formula = service
            .create(new_formula(
                "line_total",
                "ROUND(price * quantity * (1 - discount), 2)",
                FormulaResultAs::Number,
            ))
            .await
            .unwrap();

        let calculation = service
            .calculate(
                formula.id,
                &vars(&[
                    ("price", FormulaValue::Number(19.99)),
                    ("quantity", FormulaValue::Number(3.0)),
                    ("discount", FormulaValue::Number(0.1)),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(calculation.result, FormulaValue::Number(53.97));
        assert_eq!(calculation.name, "line_total");

        let logs = FormulaRepository::new(&db)
            .recent_logs(formula.id, 5)
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].result.as_deref(), Some("53.97"));
        assert!(logs[0].error.is_none());
    }

    #[tokio::test]
    async fn failures_are_logged_and_returned() {
        let db = test_db().await;
        let service = FormulaService::new(db.clone(), FormulaConfig::default());
        let formula = service
            .create(new_formula("ratio", "a / b", FormulaResultAs::Number))
            .await
            .unwrap();

        let result = service
            .calculate(
                formula.id,
                &vars(&[("a", FormulaValue::Number(1.0)), ("b", FormulaValue::Number(0.0))]),
            )
            .await;

        assert!(matches!(
            result,
            Err(FormulaServiceError::Formula(FormulaError::DivisionByZero))
        ));
        let logs = FormulaRepository::new(&db)
            .recent_logs(formula.id, 5)
            .await
            .unwrap();
        assert_eq!(logs[0].error.as_deref(), Some("division by zero"));
    }

    #[tokio::test]
    async fn logging_can_be_disabled_globally() {
        let db = test_db().await;
        let config = FormulaConfig {
            log_calculations: false,
            ..FormulaConfig::default()
        };
        let service = FormulaService::new(db.clone(), config);
        let formula = service
            .create(new_formula("one", "1", FormulaResultAs::String))
            .await
            .unwrap();

        let calculation = service.calculate(formula.id, &Variables::new()).await.unwrap();

        assert_eq!(calculation.result, FormulaValue::Text("1".to_string()));
        assert!(FormulaRepository::new(&db)
            .recent_logs(formula.id, 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn missing_formula_is_not_found() {
        let db = test_db().await;
        let service = FormulaService::new(db, FormulaConfig::default());

        let result = service.calculate(Uuid::new_v4(), &Variables::new()).await;

        assert!(matches!(
            result,
            Err(FormulaServiceError::Repository(RepositoryError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn component_limit_is_enforced() {
        let db = test_db().await;
        let service = FormulaService::new(
            db,
            FormulaConfig {
                max_components: 3,
                ..FormulaConfig::default()
            },
        );

        let result = service
            .create(new_formula("long", "a + b + c", FormulaResultAs::Number))
            .await;

        assert!(matches!(
            result,
            Err(FormulaServiceError::Formula(FormulaError::TooManyComponents {
                max: 3,
                actual: 5
            }))
        ));
    }

    #[test]
    fn expression_text_joins_components() {
        let components = parse_expression("IF(a > 1, 'x', 'y')").unwrap();
        assert_eq!(expression_text(&components), "IF ( a > 1 , 'x' , 'y' )");
    }

    #[test]
    fn expression_text_follows_component_order() {
        let mut components = parse_expression("price * (1 - discount)").unwrap();
        components.reverse();
        assert_eq!(expression_text(&components), "price * ( 1 - discount )");
    }
}

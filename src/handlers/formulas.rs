//! # Formulas API Handlers
//!
//! Stored formula management, calculation against variables, and ad-hoc
//! evaluation of expressions that are not stored.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, not_found, validation_error};
use crate::formulas::{
    CalculationEvent, CalculationTrigger, FormulaCalculation, FormulaComponent,
    FormulaDefinition, FormulaResultAs, FormulaValue, Variables, parse_expression,
    should_calculate,
};
use crate::handlers::ApiResponse;
use crate::repositories::{FormulaRepository, NewFormula};
use crate::server::AppState;

/// Formula body, given either as expression text or as components
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FormulaSourceDto {
    #[schema(example = "ROUND(price * quantity, 2)")]
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub components: Option<Vec<FormulaComponent>>,
}

impl FormulaSourceDto {
    fn into_components(self) -> Result<Vec<FormulaComponent>, ApiError> {
        match (self.expression, self.components) {
            (Some(expression), None) => Ok(parse_expression(&expression)?),
            (None, Some(components)) => Ok(components),
            _ => Err(validation_error(
                "Exactly one of expression or components is required",
                serde_json::json!({
                    "expression": "mutually exclusive with components",
                    "components": "mutually exclusive with expression"
                }),
            )),
        }
    }
}

/// Request payload for creating a formula
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateFormulaRequestDto {
    #[schema(example = "line_total")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub result_as: FormulaResultAs,
    #[serde(default = "default_trigger")]
    pub calculation_trigger: CalculationTrigger,
    /// Record every calculation in the formula log
    #[serde(default)]
    pub with_logs: bool,
    #[serde(flatten)]
    pub source: FormulaSourceDto,
}

fn default_trigger() -> CalculationTrigger {
    CalculationTrigger::Always
}

/// Request payload for a stored formula calculation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CalculateFormulaRequestDto {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub variables: BTreeMap<String, Value>,
    /// Lifecycle moment of the owning record; when given, the formula's
    /// trigger decides whether it is calculated at all
    #[serde(default)]
    pub event: Option<CalculationEvent>,
    /// Whether the calculated field already holds a value
    #[serde(default)]
    pub has_value: bool,
}

/// Calculation outcome; `calculation` is absent when the trigger skipped it
#[derive(Debug, Serialize, ToSchema)]
pub struct CalculateFormulaResponseDto {
    pub calculated: bool,
    pub calculation: Option<FormulaCalculation>,
}

/// Request payload for ad-hoc evaluation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EvaluateFormulaRequestDto {
    #[serde(flatten)]
    pub source: FormulaSourceDto,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default = "default_result_as")]
    pub result_as: FormulaResultAs,
}

fn default_result_as() -> FormulaResultAs {
    FormulaResultAs::String
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EvaluateFormulaResponseDto {
    #[schema(value_type = Object)]
    pub result: Value,
}

fn to_variables(raw: &BTreeMap<String, Value>) -> Variables {
    raw.iter()
        .map(|(name, value)| (name.clone(), FormulaValue::from_json(value)))
        .collect()
}

/// List stored formulas
#[utoipa::path(
    get,
    path = "/api/v1/formulas",
    security(("bearer_auth" = [])),
    params(crate::auth::TenantHeader),
    responses(
        (status = 200, description = "Formulas ordered by name", body = ApiResponse<Vec<FormulaDefinition>>)
    ),
    tag = "formulas"
)]
pub async fn list_formulas(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<ApiResponse<Vec<FormulaDefinition>>>, ApiError> {
    let formulas = FormulaRepository::new(&state.db).list_formulas().await?;
    Ok(Json(ApiResponse::new(formulas)))
}

/// Create a formula
#[utoipa::path(
    post,
    path = "/api/v1/formulas",
    security(("bearer_auth" = [])),
    params(crate::auth::TenantHeader),
    request_body = CreateFormulaRequestDto,
    responses(
        (status = 201, description = "Formula created", body = ApiResponse<FormulaDefinition>),
        (status = 400, description = "Formula does not compile", body = ApiError),
        (status = 409, description = "A formula with this name exists", body = ApiError)
    ),
    tag = "formulas"
)]
pub async fn create_formula(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<CreateFormulaRequestDto>,
) -> Result<
    (
        StatusCode,
        [(&'static str, String); 1],
        Json<ApiResponse<FormulaDefinition>>,
    ),
    ApiError,
> {
    let components = request.source.into_components()?;
    let formula = state
        .formulas
        .create(NewFormula {
            name: request.name.trim().to_string(),
            description: request.description,
            result_as: request.result_as,
            calculation_trigger: request.calculation_trigger,
            with_logs: request.with_logs,
            components,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        [("Location", format!("/api/v1/formulas/{}", formula.id))],
        Json(ApiResponse::new(formula)),
    ))
}

/// Get a formula by ID
#[utoipa::path(
    get,
    path = "/api/v1/formulas/{id}",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Formula UUID"),
        crate::auth::TenantHeader
    ),
    responses(
        (status = 200, description = "Formula with its components", body = ApiResponse<FormulaDefinition>),
        (status = 404, description = "Formula not found", body = ApiError)
    ),
    tag = "formulas"
)]
pub async fn get_formula(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(formula_id): Path<Uuid>,
) -> Result<Json<ApiResponse<FormulaDefinition>>, ApiError> {
    let formula = FormulaRepository::new(&state.db)
        .get_formula(formula_id)
        .await?
        .ok_or_else(|| not_found("Formula"))?;
    Ok(Json(ApiResponse::new(formula)))
}

/// Calculate a stored formula
#[utoipa::path(
    post,
    path = "/api/v1/formulas/{id}/calculate",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Formula UUID"),
        crate::auth::TenantHeader
    ),
    request_body = CalculateFormulaRequestDto,
    responses(
        (status = 200, description = "Calculation outcome", body = ApiResponse<CalculateFormulaResponseDto>),
        (status = 400, description = "Evaluation failed", body = ApiError),
        (status = 404, description = "Formula not found", body = ApiError)
    ),
    tag = "formulas"
)]
pub async fn calculate_formula(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(formula_id): Path<Uuid>,
    Json(request): Json<CalculateFormulaRequestDto>,
) -> Result<Json<ApiResponse<CalculateFormulaResponseDto>>, ApiError> {
    if let Some(event) = request.event {
        let formula = FormulaRepository::new(&state.db)
            .get_formula(formula_id)
            .await?
            .ok_or_else(|| not_found("Formula"))?;
        if !should_calculate(formula.calculation_trigger, event, request.has_value) {
            return Ok(Json(ApiResponse::new(CalculateFormulaResponseDto {
                calculated: false,
                calculation: None,
            })));
        }
    }

    let calculation = state
        .formulas
        .calculate(formula_id, &to_variables(&request.variables))
        .await?;

    Ok(Json(ApiResponse::new(CalculateFormulaResponseDto {
        calculated: true,
        calculation: Some(calculation),
    })))
}

/// Evaluate an expression without storing it
#[utoipa::path(
    post,
    path = "/api/v1/formulas/evaluate",
    security(("bearer_auth" = [])),
    params(crate::auth::TenantHeader),
    request_body = EvaluateFormulaRequestDto,
    responses(
        (status = 200, description = "Result", body = ApiResponse<EvaluateFormulaResponseDto>),
        (status = 400, description = "Expression does not compile or evaluate", body = ApiError)
    ),
    tag = "formulas"
)]
pub async fn evaluate_formula(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<EvaluateFormulaRequestDto>,
) -> Result<Json<ApiResponse<EvaluateFormulaResponseDto>>, ApiError> {
    let components = request.source.into_components()?;
    let result = state.formulas.evaluate_components(
        &components,
        &to_variables(&request.variables),
        request.result_as,
    )?;

    Ok(Json(ApiResponse::new(EvaluateFormulaResponseDto {
        result: result.to_json(),
    })))
}

#[cfg(test)]
mod tests {
    use crate::server::test_support::{body_json, send, test_app};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_calculate() {
        let (_state, app) = test_app().await;

        let response = send(
            &app,
            "POST",
            "/api/v1/formulas",
            Some(json!({
                "name": "line_total",
                "result_as": "number",
                "with_logs": true,
                "expression": "ROUND(price * quantity, 2)"
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let response = send(
            &app,
            "POST",
            &format!("/api/v1/formulas/{id}/calculate"),
            Some(json!({ "variables": { "price": 2.5, "quantity": 4 } })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["data"]["calculated"], true);
        assert_eq!(body["data"]["calculation"]["result"], json!(10.0));
    }

    #[tokio::test]
    async fn test_trigger_can_skip_calculation() {
        let (_state, app) = test_app().await;

        let body = body_json(
            send(
                &app,
                "POST",
                "/api/v1/formulas",
                Some(json!({
                    "name": "created_label",
                    "result_as": "string",
                    "calculation_trigger": "on_create",
                    "expression": "'new'"
                })),
            )
            .await,
        )
        .await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let body = body_json(
            send(
                &app,
                "POST",
                &format!("/api/v1/formulas/{id}/calculate"),
                Some(json!({ "event": "update" })),
            )
            .await,
        )
        .await;
        assert_eq!(body["data"]["calculated"], false);
        assert!(body["data"]["calculation"].is_null());
    }

    #[tokio::test]
    async fn test_get_unknown_formula() {
        let (_state, app) = test_app().await;

        let response = send(
            &app,
            "GET",
            &format!("/api/v1/formulas/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_evaluate_expression() {
        let (_state, app) = test_app().await;

        let response = send(
            &app,
            "POST",
            "/api/v1/formulas/evaluate",
            Some(json!({
                "expression": "IF(total > 100, 'large', 'small')",
                "variables": { "total": 250 }
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["data"]["result"], "large");
    }

    #[tokio::test]
    async fn test_evaluate_division_by_zero() {
        let (_state, app) = test_app().await;

        let response = send(
            &app,
            "POST",
            "/api/v1/formulas/evaluate",
            Some(json!({ "expression": "1 / 0", "result_as": "number" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["message"], "division by zero");
    }

    #[tokio::test]
    async fn test_expression_and_components_are_exclusive() {
        let (_state, app) = test_app().await;

        let response = send(
            &app,
            "POST",
            "/api/v1/formulas/evaluate",
            Some(json!({
                "expression": "1",
                "components": [{ "order": 0, "type": "value", "value": "1" }]
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

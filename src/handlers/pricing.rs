//! # Pricing API Handlers
//!
//! Unit catalogue, stored products, plan generation, quotes and ad-hoc usage
//! cost resolution.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, not_found};
use crate::handlers::ApiResponse;
use crate::pricing::{
    GeneratedPlan, PlanDefinition, PricingPlanGenerator, PricingUnit, Quote, QuoteRequest,
    TiersMode, UsageAggregation, UsageRecord, UsageTier, aggregate_usage, calculate_usage_cost,
    pricing_units, quote,
};
use crate::repositories::{StoredProduct, SubscriptionProductRepository};
use crate::server::AppState;

/// Query parameters for product listing
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListProductsQuery {
    /// Only products shown on the public pricing page
    #[serde(default)]
    pub public_only: bool,
}

/// Request payload for plan generation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GeneratePlansRequestDto {
    pub plans: Vec<PlanDefinition>,
    /// Overrides the configured yearly discount
    #[serde(default)]
    pub yearly_discount_pct: Option<f64>,
    /// Store the generated products
    #[serde(default)]
    pub persist: bool,
}

/// Generated plans, and the ids they were stored under when persisted
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GeneratePlansResponseDto {
    pub plans: Vec<GeneratedPlan>,
    pub persisted_ids: Vec<Uuid>,
}

/// Request payload for a quote against a stored product
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QuoteRequestDto {
    pub product_id: Uuid,
    #[serde(flatten)]
    pub request: QuoteRequest,
}

/// Request payload for a usage cost calculation. Either `units` or `records`
/// must be given; `records` are reduced with `aggregation`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsageCostRequestDto {
    pub tiers_mode: TiersMode,
    pub tiers: Vec<UsageTier>,
    #[serde(default)]
    pub units: Option<i64>,
    #[serde(default)]
    pub aggregation: Option<UsageAggregation>,
    #[serde(default)]
    pub records: Vec<UsageRecord>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsageCostResponseDto {
    pub units: i64,
    pub cost: f64,
}

/// List the metered units usage prices may charge for
#[utoipa::path(
    get,
    path = "/api/v1/pricing/units",
    security(("bearer_auth" = [])),
    params(crate::auth::TenantHeader),
    responses(
        (status = 200, description = "Unit catalogue", body = ApiResponse<Vec<PricingUnit>>)
    ),
    tag = "pricing"
)]
pub async fn list_units(_operator_auth: OperatorAuth) -> Json<ApiResponse<Vec<PricingUnit>>> {
    Json(ApiResponse::new(pricing_units().to_vec()))
}

/// List active stored products with their prices
#[utoipa::path(
    get,
    path = "/api/v1/pricing/products",
    security(("bearer_auth" = [])),
    params(ListProductsQuery, crate::auth::TenantHeader),
    responses(
        (status = 200, description = "Products ordered for display", body = ApiResponse<Vec<StoredProduct>>)
    ),
    tag = "pricing"
)]
pub async fn list_products(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<ApiResponse<Vec<StoredProduct>>>, ApiError> {
    let products = SubscriptionProductRepository::new(&state.db)
        .list_products(query.public_only)
        .await?;
    Ok(Json(ApiResponse::new(products)))
}

/// Generate priced plans from plan definitions
#[utoipa::path(
    post,
    path = "/api/v1/pricing/plans/generate",
    security(("bearer_auth" = [])),
    params(crate::auth::TenantHeader),
    request_body = GeneratePlansRequestDto,
    responses(
        (status = 200, description = "Plans generated", body = ApiResponse<GeneratePlansResponseDto>),
        (status = 400, description = "Invalid plan definition", body = ApiError),
        (status = 409, description = "A product with this title exists", body = ApiError)
    ),
    tag = "pricing"
)]
pub async fn generate_plans(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<GeneratePlansRequestDto>,
) -> Result<Json<ApiResponse<GeneratePlansResponseDto>>, ApiError> {
    let pricing = &state.config.pricing;
    let discount = request
        .yearly_discount_pct
        .unwrap_or(pricing.yearly_discount_pct);
    let plans = PricingPlanGenerator::new(pricing.supported_currencies.clone())
        .generate(&request.plans, discount)?;

    let mut persisted_ids = Vec::new();
    if request.persist {
        let repo = SubscriptionProductRepository::new(&state.db);
        for plan in &plans {
            persisted_ids.push(repo.save_plan(plan).await?.id);
        }
    }

    Ok(Json(ApiResponse::new(GeneratePlansResponseDto {
        plans,
        persisted_ids,
    })))
}

/// Quote a stored product for seats and expected usage
#[utoipa::path(
    post,
    path = "/api/v1/pricing/quote",
    security(("bearer_auth" = [])),
    params(crate::auth::TenantHeader),
    request_body = QuoteRequestDto,
    responses(
        (status = 200, description = "Quote", body = ApiResponse<Quote>),
        (status = 400, description = "No matching price or invalid usage", body = ApiError),
        (status = 404, description = "Product not found", body = ApiError)
    ),
    tag = "pricing"
)]
pub async fn quote_product(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<QuoteRequestDto>,
) -> Result<Json<ApiResponse<Quote>>, ApiError> {
    let product = SubscriptionProductRepository::new(&state.db)
        .get_product(request.product_id)
        .await?
        .filter(|product| product.active)
        .ok_or_else(|| not_found("Product"))?;

    let quote = quote(&product.plan, &request.request)?;
    Ok(Json(ApiResponse::new(quote)))
}

/// Resolve the cost of usage under a set of tiers
#[utoipa::path(
    post,
    path = "/api/v1/pricing/usage-cost",
    security(("bearer_auth" = [])),
    params(crate::auth::TenantHeader),
    request_body = UsageCostRequestDto,
    responses(
        (status = 200, description = "Cost rounded to cents", body = ApiResponse<UsageCostResponseDto>),
        (status = 400, description = "Invalid tiers or units", body = ApiError)
    ),
    tag = "pricing"
)]
pub async fn usage_cost(
    _operator_auth: OperatorAuth,
    Json(request): Json<UsageCostRequestDto>,
) -> Result<Json<ApiResponse<UsageCostResponseDto>>, ApiError> {
    let units = match request.units {
        Some(units) => units,
        None if !request.records.is_empty() => aggregate_usage(
            request.aggregation.unwrap_or(UsageAggregation::Sum),
            &request.records,
        )?,
        None => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "Either units or records is required",
            )
            .with_details(serde_json::json!({ "units": "missing", "records": "empty" })));
        }
    };

    let cost = calculate_usage_cost(request.tiers_mode, &request.tiers, units)?;
    Ok(Json(ApiResponse::new(UsageCostResponseDto { units, cost })))
}

#[cfg(test)]
mod tests {
    use crate::config::PricingConfig;
    use crate::seeds::seed_pricing_plans;
    use crate::server::test_support::{body_json, send, test_app};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_units_catalogue_order() {
        let (_state, app) = test_app().await;

        let body = body_json(send(&app, "GET", "/api/v1/pricing/units", None).await).await;
        let names: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|unit| unit["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["api", "email", "sms", "contact", "row", "storage_gb"]);
    }

    #[tokio::test]
    async fn test_generate_without_persisting() {
        let (state, app) = test_app().await;

        let response = send(
            &app,
            "POST",
            "/api/v1/pricing/plans/generate",
            Some(json!({
                "plans": [{
                    "title": "Team",
                    "model": "per-seat",
                    "monthly_prices": { "usd": 10.0 }
                }],
                "yearly_discount_pct": 0.2
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let prices = body["data"]["plans"][0]["prices"].as_array().unwrap();
        assert!(prices.iter().any(|price| price["amount"] == json!(96.0)));
        assert_eq!(body["data"]["persisted_ids"], json!([]));

        let stored = crate::repositories::SubscriptionProductRepository::new(&state.db)
            .list_products(false)
            .await
            .unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_generate_rejects_unsupported_currency() {
        let (_state, app) = test_app().await;

        let response = send(
            &app,
            "POST",
            "/api/v1/pricing/plans/generate",
            Some(json!({
                "plans": [{
                    "title": "Team",
                    "model": "flat-rate",
                    "monthly_prices": { "eur": 10.0 }
                }]
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_quote_seeded_product() {
        let (state, app) = test_app().await;
        seed_pricing_plans(&state.db, &PricingConfig::default())
            .await
            .unwrap();

        let products = body_json(send(&app, "GET", "/api/v1/pricing/products", None).await).await;
        let enterprise = products["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|product| product["title"] == "Enterprise")
            .unwrap()
            .clone();

        let response = send(
            &app,
            "POST",
            "/api/v1/pricing/quote",
            Some(json!({
                "product_id": enterprise["id"],
                "billing_period": "monthly",
                "currency": "usd",
                "usage": { "api": 20000 }
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        // 199 platform fee + 10,000 calls at 0.002
        assert_eq!(body["data"]["total"], json!(219.0));
    }

    #[tokio::test]
    async fn test_usage_cost_from_records() {
        let (_state, app) = test_app().await;

        let response = send(
            &app,
            "POST",
            "/api/v1/pricing/usage-cost",
            Some(json!({
                "tiers_mode": "volume",
                "tiers": [
                    { "from": 1, "to": 100, "per_unit_price": 1.0 },
                    { "from": 101, "per_unit_price": 0.5 }
                ],
                "aggregation": "max",
                "records": [
                    { "quantity": 40, "recorded_at": "2024-05-01T00:00:00Z" },
                    { "quantity": 150, "recorded_at": "2024-05-02T00:00:00Z" }
                ]
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["data"], json!({ "units": 150, "cost": 75.0 }));
    }

    #[tokio::test]
    async fn test_usage_cost_rejects_unrepresentable_input() {
        let (_state, app) = test_app().await;
        let unbounded = json!([{ "from": 1, "per_unit_price": 1.0 }]);

        let cases = [
            json!({
                "tiers_mode": "graduated",
                "tiers": unbounded,
                "records": [
                    { "quantity": i64::MAX, "recorded_at": "2024-05-01T00:00:00Z" },
                    { "quantity": 1, "recorded_at": "2024-05-02T00:00:00Z" }
                ]
            }),
            json!({
                "tiers_mode": "graduated",
                "tiers": unbounded,
                "records": [{ "quantity": -4, "recorded_at": "2024-05-01T00:00:00Z" }]
            }),
            json!({
                "tiers_mode": "volume",
                "tiers": [
                    { "from": 1, "to": i64::MAX, "per_unit_price": 1.0 },
                    { "from": 5, "per_unit_price": 1.0 }
                ],
                "units": 10
            }),
        ];
        for case in cases {
            let response = send(&app, "POST", "/api/v1/pricing/usage-cost", Some(case)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await;
            assert_eq!(body["details"]["engine"], "pricing");
        }
    }

    #[tokio::test]
    async fn test_usage_cost_requires_units_or_records() {
        let (_state, app) = test_app().await;

        let response = send(
            &app,
            "POST",
            "/api/v1/pricing/usage-cost",
            Some(json!({
                "tiers_mode": "graduated",
                "tiers": [{ "from": 1, "per_unit_price": 1.0 }]
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

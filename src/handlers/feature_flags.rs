//! # Feature Flags API Handlers
//!
//! Flag management and evaluation. Every write drops the cached flag snapshot.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{OperatorAuth, TenantExtension};
use crate::error::ApiError;
use crate::feature_flags::{
    EvaluationContext, FeatureFlagDefinition, FilterType, FilterTypeInfo, TenantContext,
};
use crate::handlers::ApiResponse;
use crate::repositories::{FeatureFlagRepository, TenantRepository, UpdateFeatureFlag};
use crate::server::AppState;

/// Request payload for flag evaluation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EvaluateFlagsRequestDto {
    /// Context to evaluate against. When it names no tenant, the tenant of
    /// the `X-Tenant-Id` header is used.
    #[serde(default)]
    pub context: EvaluationContext,
    /// Ad-hoc definitions to evaluate instead of the stored flags
    #[serde(default)]
    pub flags: Option<Vec<FeatureFlagDefinition>>,
}

/// Flags that are on for the evaluated context
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EvaluateFlagsResponseDto {
    /// Flag names, sorted
    pub enabled: Vec<String>,
}

/// List every stored flag
#[utoipa::path(
    get,
    path = "/api/v1/feature-flags",
    security(("bearer_auth" = [])),
    params(crate::auth::TenantHeader),
    responses(
        (status = 200, description = "Stored flags", body = ApiResponse<Vec<FeatureFlagDefinition>>),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "feature-flags"
)]
pub async fn list_flags(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<ApiResponse<Vec<FeatureFlagDefinition>>>, ApiError> {
    let flags = FeatureFlagRepository::new(&state.db).list_flags().await?;
    Ok(Json(ApiResponse::new(flags)))
}

/// Create a flag
#[utoipa::path(
    post,
    path = "/api/v1/feature-flags",
    security(("bearer_auth" = [])),
    params(crate::auth::TenantHeader),
    request_body = FeatureFlagDefinition,
    responses(
        (status = 201, description = "Flag created", body = ApiResponse<FeatureFlagDefinition>),
        (status = 400, description = "Invalid name or filter", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 409, description = "A flag with this name exists", body = ApiError)
    ),
    tag = "feature-flags"
)]
pub async fn create_flag(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(definition): Json<FeatureFlagDefinition>,
) -> Result<
    (
        StatusCode,
        [(&'static str, String); 1],
        Json<ApiResponse<FeatureFlagDefinition>>,
    ),
    ApiError,
> {
    definition.validate()?;
    let flag = FeatureFlagRepository::new(&state.db)
        .create_flag(definition)
        .await?;
    state.flags.invalidate().await;

    Ok((
        StatusCode::CREATED,
        [("Location", format!("/api/v1/feature-flags/{}", flag.name))],
        Json(ApiResponse::new(flag)),
    ))
}

/// Update a flag; `filters`, when present, replaces the whole list
#[utoipa::path(
    put,
    path = "/api/v1/feature-flags/{name}",
    security(("bearer_auth" = [])),
    params(
        ("name" = String, Path, description = "Flag name"),
        crate::auth::TenantHeader
    ),
    request_body = UpdateFeatureFlag,
    responses(
        (status = 200, description = "Flag updated", body = ApiResponse<FeatureFlagDefinition>),
        (status = 400, description = "Invalid filter", body = ApiError),
        (status = 404, description = "Flag not found", body = ApiError)
    ),
    tag = "feature-flags"
)]
pub async fn update_flag(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(name): Path<String>,
    Json(update): Json<UpdateFeatureFlag>,
) -> Result<Json<ApiResponse<FeatureFlagDefinition>>, ApiError> {
    if let Some(filters) = &update.filters {
        for filter in filters {
            filter.validate()?;
        }
    }
    let flag = FeatureFlagRepository::new(&state.db)
        .update_flag(&name, update)
        .await?;
    state.flags.invalidate().await;

    Ok(Json(ApiResponse::new(flag)))
}

/// Delete a flag and its filters
#[utoipa::path(
    delete,
    path = "/api/v1/feature-flags/{name}",
    security(("bearer_auth" = [])),
    params(
        ("name" = String, Path, description = "Flag name"),
        crate::auth::TenantHeader
    ),
    responses(
        (status = 204, description = "Flag deleted"),
        (status = 404, description = "Flag not found", body = ApiError)
    ),
    tag = "feature-flags"
)]
pub async fn delete_flag(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    FeatureFlagRepository::new(&state.db)
        .delete_flag(&name)
        .await?;
    state.flags.invalidate().await;

    Ok(StatusCode::NO_CONTENT)
}

/// Catalogue of filter types
#[utoipa::path(
    get,
    path = "/api/v1/feature-flags/filter-types",
    security(("bearer_auth" = [])),
    params(crate::auth::TenantHeader),
    responses(
        (status = 200, description = "Every filter type and whether it needs a value", body = ApiResponse<Vec<FilterTypeInfo>>)
    ),
    tag = "feature-flags"
)]
pub async fn list_filter_types(
    _operator_auth: OperatorAuth,
) -> Json<ApiResponse<Vec<FilterTypeInfo>>> {
    Json(ApiResponse::new(FilterType::all()))
}

/// Evaluate flags for a context
#[utoipa::path(
    post,
    path = "/api/v1/feature-flags/evaluate",
    security(("bearer_auth" = [])),
    params(crate::auth::TenantHeader),
    request_body = EvaluateFlagsRequestDto,
    responses(
        (status = 200, description = "Enabled flags", body = ApiResponse<EvaluateFlagsResponseDto>),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "feature-flags"
)]
pub async fn evaluate_flags(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Json(request): Json<EvaluateFlagsRequestDto>,
) -> Result<Json<ApiResponse<EvaluateFlagsResponseDto>>, ApiError> {
    let mut context = request.context;
    if context.tenant.is_none() {
        let slug = TenantRepository::new(&state.db)
            .get_tenant_by_id(tenant.0)
            .await?
            .and_then(|model| model.slug);
        context.tenant = Some(TenantContext {
            id: tenant.0,
            slug,
            subscription_products: None,
        });
    }

    let enabled = match request.flags {
        Some(flags) => state.flags.evaluate_with_context(&flags, &context).await?,
        None => state.flags.get_current_feature_flags(&context).await?,
    };

    Ok(Json(ApiResponse::new(EvaluateFlagsResponseDto { enabled })))
}

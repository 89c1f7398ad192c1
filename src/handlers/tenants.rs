//! # Tenants API Handlers
//!
//! Tenant creation, lookup and subscription management. Replacing a tenant's
//! subscription drops its cached products so flag evaluation sees the change
//! immediately.

use crate::auth::{OperatorAuth, TenantExtension};
use crate::error::ApiError;
use crate::feature_flags::SubscribedProduct;
use crate::handlers::ApiResponse;
use crate::models::tenant::Model as TenantModel;
use crate::repositories::{CreateTenantRequest, TenantRepository, TenantSubscriptionRepository};
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Request payload for creating a new tenant
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateTenantRequestDto {
    /// Display name for the tenant (required, max 255 characters)
    #[schema(example = "Acme Corp")]
    pub name: String,
    /// Optional unique handle targeted by `tenant.is` filters
    #[schema(example = "acme")]
    pub slug: Option<String>,
}

/// Tenant representation returned by the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TenantResponseDto {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    #[schema(example = "Acme Corp")]
    pub name: String,
    #[schema(example = "acme")]
    pub slug: Option<String>,
    /// Timestamp when the tenant was created (ISO 8601)
    #[schema(example = "2024-01-15T10:30:00Z")]
    pub created_at: String,
    /// Subscribed products, including ended ones
    pub subscription_products: Vec<SubscribedProduct>,
}

impl TenantResponseDto {
    fn new(tenant: TenantModel, subscription_products: Vec<SubscribedProduct>) -> Self {
        Self {
            id: tenant.id.to_string(),
            name: tenant.name.unwrap_or_default(),
            slug: tenant.slug,
            created_at: tenant.created_at.to_rfc3339(),
            subscription_products,
        }
    }
}

/// Request payload replacing a tenant's subscription
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReplaceSubscriptionRequestDto {
    /// Products the tenant is subscribed to from now on
    pub product_ids: Vec<Uuid>,
}

/// Create a new tenant
#[utoipa::path(
    post,
    path = "/api/v1/tenants",
    security(("bearer_auth" = [])),
    params(crate::auth::TenantHeader),
    request_body = CreateTenantRequestDto,
    responses(
        (status = 201, description = "Tenant created successfully", body = ApiResponse<TenantResponseDto>, headers(
            ("Location", description = "URL of the created tenant"),
            ("X-Trace-Id", description = "Trace identifier for request correlation")
        )),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 409, description = "Slug already taken", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn create_tenant(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(_tenant): TenantExtension,
    Json(request): Json<CreateTenantRequestDto>,
) -> Result<
    (
        StatusCode,
        [(&'static str, String); 1],
        Json<ApiResponse<TenantResponseDto>>,
    ),
    ApiError,
> {
    let repo = TenantRepository::new(&state.db);
    let tenant = repo
        .create_tenant(CreateTenantRequest {
            name: request.name.trim().to_string(),
            slug: request.slug,
        })
        .await?;

    let location_header = format!("/api/v1/tenants/{}", tenant.id);

    Ok((
        StatusCode::CREATED,
        [("Location", location_header)],
        Json(ApiResponse::new(TenantResponseDto::new(tenant, Vec::new()))),
    ))
}

/// Get a tenant by ID
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{id}",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Tenant UUID"),
        crate::auth::TenantHeader
    ),
    responses(
        (status = 200, description = "Tenant retrieved successfully", body = ApiResponse<TenantResponseDto>),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn get_tenant(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(_tenant): TenantExtension,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<ApiResponse<TenantResponseDto>>, ApiError> {
    let tenant = find_tenant(&state, tenant_id).await?;
    let products = TenantSubscriptionRepository::new(&state.db)
        .list_products(tenant_id)
        .await?;

    Ok(Json(ApiResponse::new(TenantResponseDto::new(
        tenant, products,
    ))))
}

/// Replace the set of products a tenant is subscribed to
#[utoipa::path(
    put,
    path = "/api/v1/tenants/{id}/subscription",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Tenant UUID"),
        crate::auth::TenantHeader
    ),
    request_body = ReplaceSubscriptionRequestDto,
    responses(
        (status = 200, description = "Subscription replaced", body = ApiResponse<Vec<SubscribedProduct>>),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Tenant or product not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn replace_subscription(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(_tenant): TenantExtension,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<ReplaceSubscriptionRequestDto>,
) -> Result<Json<ApiResponse<Vec<SubscribedProduct>>>, ApiError> {
    find_tenant(&state, tenant_id).await?;

    let products = TenantSubscriptionRepository::new(&state.db)
        .replace_subscriptions(tenant_id, &request.product_ids)
        .await?;
    state.flags.invalidate_tenant(tenant_id).await;

    Ok(Json(ApiResponse::new(products)))
}

async fn find_tenant(state: &AppState, tenant_id: Uuid) -> Result<TenantModel, ApiError> {
    TenantRepository::new(&state.db)
        .get_tenant_by_id(tenant_id)
        .await?
        .ok_or_else(|| {
            ApiError::new(StatusCode::NOT_FOUND, "TENANT_NOT_FOUND", "Tenant not found")
                .with_details(serde_json::json!({ "tenant_id": tenant_id.to_string() }))
        })
}

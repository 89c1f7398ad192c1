//! # Authentication and Authorization
//!
//! Operator bearer authentication and tenant header validation for the
//! `/api/v1` surface. Tokens are compared in constant time.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, validation_error};
use crate::server::AppState;

/// Tenant ID wrapper for type safety
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantId(pub Uuid);

/// Marker type for authenticated operator requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAuth;

/// Extractor for tenant ID from request extensions
#[derive(Debug, Clone)]
pub struct TenantExtension(pub TenantId);

/// Header naming the tenant an operator request acts for.
pub const TENANT_HEADER: &str = "X-Tenant-Id";

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Authenticates `/api/v1` requests: an operator bearer token plus the
/// `X-Tenant-Id` header naming the tenant the request acts for.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers())?;
    validate_token(&config, token)?;

    let tenant = extract_tenant_id(request.headers())?;
    tracing::debug!(tenant_id = %tenant.0, "Authenticated operator request");

    request.extensions_mut().insert(TenantExtension(tenant));
    request.extensions_mut().insert(OperatorAuth);

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))?
        .to_str()
        .map_err(|_| unauthorized(Some("Invalid Authorization header")))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
}

fn validate_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    let is_valid = config
        .operator_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        tracing::warn!("Rejected request with an unknown operator token");
        Err(unauthorized(Some("Invalid bearer token")))
    }
}

fn extract_tenant_id(headers: &HeaderMap) -> Result<TenantId, ApiError> {
    let raw = headers
        .get(TENANT_HEADER)
        .ok_or_else(|| tenant_header_error("Missing required header", "Required header is missing"))?
        .to_str()
        .map_err(|_| tenant_header_error("Invalid tenant header", "Header must be valid UTF-8"))?;

    Uuid::parse_str(raw.trim())
        .map(TenantId)
        .map_err(|_| tenant_header_error("Invalid tenant ID", "Must be a valid UUID"))
}

fn tenant_header_error(message: &str, reason: &str) -> ApiError {
    validation_error(message, serde_json::json!({ TENANT_HEADER: reason }))
}

/// OpenAPI header parameter for X-Tenant-Id
#[derive(Debug, Serialize, Deserialize, IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Header)]
pub struct TenantHeader {
    /// Tenant identifier (UUID) that scopes the request to a specific tenant
    #[serde(rename = "X-Tenant-Id")]
    #[param(rename = "X-Tenant-Id", value_type = String)]
    pub tenant_id: String,
}

impl<S> FromRequestParts<S> for TenantExtension
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantExtension>()
            .cloned()
            .ok_or_else(|| tenant_header_error("Tenant context missing", "Tenant context not present"))
    }
}

impl<S> FromRequestParts<S> for OperatorAuth
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OperatorAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Operator authentication required")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use tower::ServiceExt;

    const TENANT: &str = "6f1c2f6e-9b1d-4c39-8d5c-0f3f5d7f1a10";

    async fn tenant_echo(_operator: OperatorAuth, TenantExtension(tenant): TenantExtension) -> String {
        tenant.0.to_string()
    }

    fn router(tokens: &[&str]) -> Router {
        let config = AppConfig {
            operator_tokens: tokens.iter().map(|token| token.to_string()).collect(),
            ..Default::default()
        };
        let state = AppState::new(config, sea_orm::DatabaseConnection::default());

        Router::new()
            .route("/whoami", get(tenant_echo))
            .route_layer(axum::middleware::from_fn_with_state(
                Arc::clone(&state.config),
                auth_middleware,
            ))
            .with_state(state)
    }

    async fn call(app: Router, headers: &[(&str, &str)]) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn rejected_requests() {
        let cases: &[(&[(&str, &str)], StatusCode, &str)] = &[
            (&[("X-Tenant-Id", TENANT)], StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (
                &[("Authorization", "Basic b3BzOnNlY3JldA=="), ("X-Tenant-Id", TENANT)],
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
            ),
            (
                &[("Authorization", "Bearer stolen"), ("X-Tenant-Id", TENANT)],
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
            ),
            (
                &[("Authorization", "Bearer ops-token")],
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
            ),
            (
                &[("Authorization", "Bearer ops-token"), ("X-Tenant-Id", "acme")],
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
            ),
        ];

        for (headers, status, code) in cases {
            let (actual, body) = call(router(&["ops-token"]), headers).await;
            assert_eq!(actual, *status, "headers: {headers:?}");
            let body: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert_eq!(body["code"], *code);
        }
    }

    #[tokio::test]
    async fn tenant_reaches_the_handler() {
        let (status, body) = call(
            router(&["ops-token"]),
            &[("Authorization", "Bearer ops-token"), ("X-Tenant-Id", TENANT)],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, TENANT);
    }

    #[tokio::test]
    async fn any_configured_token_is_accepted() {
        for token in ["billing-bot", "support-console"] {
            let authorization = format!("Bearer {token}");
            let (status, _) = call(
                router(&["billing-bot", "support-console"]),
                &[
                    ("Authorization", authorization.as_str()),
                    ("X-Tenant-Id", TENANT),
                ],
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
    }
}

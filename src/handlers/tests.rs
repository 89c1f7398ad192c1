//! # Tests for Handlers
//!
//! Public endpoints and cross-cutting router behavior.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Json,
};
use tower::ServiceExt;

use crate::handlers::{healthz, root};
use crate::models::ServiceInfo;
use crate::server::test_support::{TEST_TENANT_ID, body_json, test_app};

#[tokio::test]
async fn test_root_handler_returns_expected_service_info() {
    let Json(service_info) = root().await;

    assert_eq!(service_info, ServiceInfo::default());
    assert_eq!(service_info.service, "backoffice");
    assert_eq!(service_info.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_healthz_is_ok() {
    let Json(status) = healthz().await;
    assert_eq!(status.status, "ok");
}

#[tokio::test]
async fn test_readyz_pings_database() {
    let (_state, app) = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ready");
}

#[tokio::test]
async fn test_openapi_document_lists_protected_paths() {
    let (_state, app) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let document = body_json(response).await;
    assert!(document["paths"]["/api/v1/feature-flags/evaluate"].is_object());
    assert!(document["paths"]["/api/v1/formulas/{id}/calculate"].is_object());
    assert!(document["components"]["securitySchemes"]["bearer_auth"].is_object());
}

#[tokio::test]
async fn test_api_requires_bearer_token() {
    let (_state, app) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/pricing/units")
                .header("X-Tenant-Id", TEST_TENANT_ID)
                .header("X-Trace-Id", "trace-from-client")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["X-Trace-Id"], "trace-from-client");
    assert_eq!(
        response.headers()["content-type"],
        "application/problem+json"
    );
    let body = body_json(response).await;
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(body["trace_id"], "trace-from-client");
}

//! # Server Configuration
//!
//! Router assembly, shared application state and the OpenAPI document for the
//! back-office API.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use tower_http::trace::TraceLayer;
use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::feature_flags::FeatureFlagsService;
use crate::formulas::FormulaService;
use crate::handlers::{self, feature_flags, formulas, pricing, tenants};
use crate::telemetry::trace_id_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub flags: Arc<FeatureFlagsService>,
    pub formulas: FormulaService,
}

impl AppState {
    pub fn new(config: AppConfig, db: DatabaseConnection) -> Self {
        let flags = FeatureFlagsService::from_database(db.clone(), &config.feature_flags);
        let formulas = FormulaService::new(db.clone(), config.formulas.clone());
        Self {
            config: Arc::new(config),
            db,
            flags: Arc::new(flags),
            formulas,
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/tenants", post(tenants::create_tenant))
        .route("/tenants/{id}", get(tenants::get_tenant))
        .route(
            "/tenants/{id}/subscription",
            put(tenants::replace_subscription),
        )
        .route(
            "/feature-flags",
            get(feature_flags::list_flags).post(feature_flags::create_flag),
        )
        .route(
            "/feature-flags/filter-types",
            get(feature_flags::list_filter_types),
        )
        .route("/feature-flags/evaluate", post(feature_flags::evaluate_flags))
        .route(
            "/feature-flags/{name}",
            put(feature_flags::update_flag).delete(feature_flags::delete_flag),
        )
        .route("/pricing/units", get(pricing::list_units))
        .route("/pricing/products", get(pricing::list_products))
        .route("/pricing/plans/generate", post(pricing::generate_plans))
        .route("/pricing/quote", post(pricing::quote_product))
        .route("/pricing/usage-cost", post(pricing::usage_cost))
        .route(
            "/formulas",
            get(formulas::list_formulas).post(formulas::create_formula),
        )
        .route("/formulas/evaluate", post(formulas::evaluate_formula))
        .route("/formulas/{id}", get(formulas::get_formula))
        .route("/formulas/{id}/calculate", post(formulas::calculate_formula))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .nest("/api/v1", api)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_id_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr = config
        .bind_addr()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let app = create_app(AppState::new(config, db));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::readyz,
        crate::handlers::tenants::create_tenant,
        crate::handlers::tenants::get_tenant,
        crate::handlers::tenants::replace_subscription,
        crate::handlers::feature_flags::list_flags,
        crate::handlers::feature_flags::create_flag,
        crate::handlers::feature_flags::update_flag,
        crate::handlers::feature_flags::delete_flag,
        crate::handlers::feature_flags::list_filter_types,
        crate::handlers::feature_flags::evaluate_flags,
        crate::handlers::pricing::list_units,
        crate::handlers::pricing::list_products,
        crate::handlers::pricing::generate_plans,
        crate::handlers::pricing::quote_product,
        crate::handlers::pricing::usage_cost,
        crate::handlers::formulas::list_formulas,
        crate::handlers::formulas::create_formula,
        crate::handlers::formulas::get_formula,
        crate::handlers::formulas::calculate_formula,
        crate::handlers::formulas::evaluate_formula,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthStatus,
            crate::handlers::ResponseMeta,
            crate::error::ApiError,
            crate::handlers::tenants::CreateTenantRequestDto,
            crate::handlers::tenants::TenantResponseDto,
            crate::handlers::tenants::ReplaceSubscriptionRequestDto,
            crate::feature_flags::FeatureFlagDefinition,
            crate::feature_flags::FeatureFlagFilter,
            crate::feature_flags::FilterType,
            crate::feature_flags::FilterTypeInfo,
            crate::feature_flags::EvaluationContext,
            crate::feature_flags::SubscribedProduct,
            crate::repositories::UpdateFeatureFlag,
            crate::handlers::feature_flags::EvaluateFlagsRequestDto,
            crate::handlers::feature_flags::EvaluateFlagsResponseDto,
            crate::pricing::PricingUnit,
            crate::pricing::PlanDefinition,
            crate::pricing::GeneratedPlan,
            crate::pricing::Quote,
            crate::pricing::QuoteRequest,
            crate::repositories::StoredProduct,
            crate::handlers::pricing::GeneratePlansRequestDto,
            crate::handlers::pricing::GeneratePlansResponseDto,
            crate::handlers::pricing::QuoteRequestDto,
            crate::handlers::pricing::UsageCostRequestDto,
            crate::handlers::pricing::UsageCostResponseDto,
            crate::formulas::FormulaDefinition,
            crate::formulas::FormulaComponent,
            crate::formulas::FormulaCalculation,
            crate::handlers::formulas::FormulaSourceDto,
            crate::handlers::formulas::CreateFormulaRequestDto,
            crate::handlers::formulas::CalculateFormulaRequestDto,
            crate::handlers::formulas::CalculateFormulaResponseDto,
            crate::handlers::formulas::EvaluateFormulaRequestDto,
            crate::handlers::formulas::EvaluateFormulaResponseDto,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "root", description = "Service information and probes"),
        (name = "tenants", description = "Tenants and their subscriptions"),
        (name = "feature-flags", description = "Feature flag management and evaluation"),
        (name = "pricing", description = "Plans, quotes and usage pricing"),
        (name = "formulas", description = "Calculated field formulas")
    ),
    info(
        title = "Back-office API",
        description = "Feature flags, subscription pricing and formulas for a multi-tenant SaaS",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
pub(crate) mod test_support {
    //! Router fixtures shared by handler tests.

    use axum::{
        Router,
        body::Body,
        http::{Request, Response},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{AppState, create_app};
    use crate::config::AppConfig;
    use crate::db::test_db;

    pub const TEST_TOKEN: &str = "test-token";
    pub const TEST_TENANT_ID: &str = "550e8400-e29b-41d4-a716-446655440000";

    pub async fn test_app() -> (AppState, Router) {
        let config = AppConfig {
            profile: "test".to_string(),
            operator_tokens: vec![TEST_TOKEN.to_string()],
            ..Default::default()
        };
        let state = AppState::new(config, test_db().await);
        let app = create_app(state.clone());
        (state, app)
    }

    /// Sends an authenticated request with an optional JSON body.
    pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {TEST_TOKEN}"))
            .header("X-Tenant-Id", TEST_TENANT_ID)
            .header("Content-Type", "application/json");
        let body = body.map_or_else(Body::empty, |value| Body::from(value.to_string()));

        app.clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    pub async fn body_json(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

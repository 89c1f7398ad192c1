//! Integration tests for the back-office HTTP surface, served on a real
//! socket against a migrated in-memory database.

use backoffice::seeds::{seed_feature_flags, seed_pricing_plans};
use backoffice::server::{AppState, create_app};
use reqwest::{Client, RequestBuilder, StatusCode};
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{TEST_TOKEN, create_test_tenant, setup_test_db, test_config};

struct TestServer {
    url: String,
    db: DatabaseConnection,
    client: Client,
}

impl TestServer {
    fn get(&self, path: &str, tenant_id: Uuid) -> RequestBuilder {
        self.authed(self.client.get(format!("{}{}", self.url, path)), tenant_id)
    }

    fn post(&self, path: &str, tenant_id: Uuid, body: Value) -> RequestBuilder {
        self.authed(self.client.post(format!("{}{}", self.url, path)), tenant_id)
            .json(&body)
    }

    fn put(&self, path: &str, tenant_id: Uuid, body: Value) -> RequestBuilder {
        self.authed(self.client.put(format!("{}{}", self.url, path)), tenant_id)
            .json(&body)
    }

    fn authed(&self, builder: RequestBuilder, tenant_id: Uuid) -> RequestBuilder {
        builder
            .bearer_auth(TEST_TOKEN)
            .header("X-Tenant-Id", tenant_id.to_string())
    }
}

/// Starts the router on a random local port with seeded plans and flags.
async fn start_test_server() -> TestServer {
    let db = setup_test_db().await.expect("test database");
    let config = test_config();
    seed_pricing_plans(&db, &config.pricing)
        .await
        .expect("seed pricing plans");
    seed_feature_flags(&db).await.expect("seed feature flags");

    let app = create_app(AppState::new(config, db.clone()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        url: format!("http://{addr}"),
        db,
        client: Client::new(),
    }
}

async fn enabled_flags(server: &TestServer, tenant_id: Uuid) -> Value {
    let response = server
        .post("/api/v1/feature-flags/evaluate", tenant_id, json!({}))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    body["data"]["enabled"].clone()
}

#[tokio::test]
async fn test_root_endpoint() {
    let server = start_test_server().await;

    let response = server
        .client
        .get(format!("{}/", server.url))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("X-Trace-Id"));
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["service"], "backoffice");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_openapi_endpoint() {
    let server = start_test_server().await;

    let response = server
        .client
        .get(format!("{}/openapi.json", server.url))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert!(body.get("openapi").is_some());
    assert_eq!(body["info"]["title"], "Back-office API");
    assert!(body["paths"]["/api/v1/pricing/quote"].is_object());
}

#[tokio::test]
async fn test_protected_endpoint_requires_tenant_header() {
    let server = start_test_server().await;

    let response = server
        .client
        .get(format!("{}/api/v1/feature-flags", server.url))
        .bearer_auth(TEST_TOKEN)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert!(body["details"]["X-Tenant-Id"].is_string());
}

#[tokio::test]
async fn test_subscription_drives_flag_targeting() {
    let server = start_test_server().await;
    let tenant_id = create_test_tenant(&server.db, Some("acme")).await.unwrap();

    let response = server
        .put(
            "/api/v1/feature-flags/pricing.enterprise-usage",
            tenant_id,
            json!({ "enabled": true }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(enabled_flags(&server, tenant_id).await, json!([]));

    let products: Value = server
        .get("/api/v1/pricing/products", tenant_id)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let enterprise_id = products["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|product| product["title"] == "Enterprise")
        .map(|product| product["id"].clone())
        .expect("seeded Enterprise product");

    let response = server
        .put(
            &format!("/api/v1/tenants/{tenant_id}/subscription"),
            tenant_id,
            json!({ "product_ids": [enterprise_id] }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        enabled_flags(&server, tenant_id).await,
        json!(["pricing.enterprise-usage"])
    );

    let response = server
        .put(
            &format!("/api/v1/tenants/{tenant_id}/subscription"),
            tenant_id,
            json!({ "product_ids": [] }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(enabled_flags(&server, tenant_id).await, json!([]));
}

#[tokio::test]
async fn test_unknown_tenant_subscription_is_not_found() {
    let server = start_test_server().await;
    let tenant_id = Uuid::new_v4();

    let response = server
        .put(
            &format!("/api/v1/tenants/{tenant_id}/subscription"),
            tenant_id,
            json!({ "product_ids": [] }),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "TENANT_NOT_FOUND");
}

#[tokio::test]
async fn test_formula_calculation_is_logged() {
    let server = start_test_server().await;
    let tenant_id = create_test_tenant(&server.db, None).await.unwrap();

    let response = server
        .post(
            "/api/v1/formulas",
            tenant_id,
            json!({
                "name": "Deal value",
                "result_as": "number",
                "with_logs": true,
                "expression": "ROUND(price * seats * (1 - discount), 2)"
            }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    let formula_id: Uuid = serde_json::from_value(created["data"]["id"].clone()).unwrap();

    let response = server
        .post(
            &format!("/api/v1/formulas/{formula_id}/calculate"),
            tenant_id,
            json!({ "variables": { "price": 12.5, "seats": 8, "discount": 0.1 } }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["calculated"], true);
    assert_eq!(body["data"]["calculation"]["result"], json!(90.0));

    let logs = backoffice::repositories::FormulaRepository::new(&server.db)
        .recent_logs(formula_id, 10)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].result.as_deref(), Some("90"));
    assert!(logs[0].error.is_none());
}

//! Test utilities for database testing.
//!
//! This module provides utilities for setting up in-memory SQLite databases
//! with migrations for testing purposes.

#![allow(dead_code)]

use anyhow::Result;
use backoffice::config::AppConfig;
use backoffice::repositories::{CreateTenantRequest, TenantRepository};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

pub const TEST_TOKEN: &str = "integration-token";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Configuration accepted by the router, authenticating with [`TEST_TOKEN`].
pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        operator_tokens: vec![TEST_TOKEN.to_string()],
        ..Default::default()
    }
}

/// Creates a test tenant through the repository and returns its id.
pub async fn create_test_tenant(db: &DatabaseConnection, slug: Option<&str>) -> Result<Uuid> {
    let tenant = TenantRepository::new(db)
        .create_tenant(CreateTenantRequest {
            name: "Test Tenant".to_string(),
            slug: slug.map(str::to_string),
        })
        .await?;

    Ok(tenant.id)
}

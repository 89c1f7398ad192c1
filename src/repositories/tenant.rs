//! # Tenant Repository
//!
//! This module contains the repository implementation for Tenant entities,
//! providing CRUD operations for tenant management.

use crate::error::RepositoryError;
use crate::models::tenant::{
    self, ActiveModel as TenantActiveModel, Entity as Tenant, Model as TenantModel,
};
use chrono::Utc;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::LazyLock;
use uuid::Uuid;

static SLUG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{0,62}$").expect("valid slug regex"));

/// Request data for creating a new tenant
#[derive(Debug, Clone)]
pub struct CreateTenantRequest {
    /// Display name for the tenant
    pub name: String,
    /// Optional unique slug
    pub slug: Option<String>,
}

/// Repository for Tenant database operations
pub struct TenantRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> TenantRepository<'a> {
    /// Create a new TenantRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a new tenant
    pub async fn create_tenant(
        &self,
        request: CreateTenantRequest,
    ) -> Result<TenantModel, RepositoryError> {
        self.validate_tenant_name(&request.name)?;
        if let Some(slug) = &request.slug {
            self.validate_slug(slug)?;
        }

        let tenant = TenantActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(Some(request.name)),
            slug: Set(request.slug),
            created_at: Set(Utc::now().into()),
        };

        tenant
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Get tenant by ID
    pub async fn get_tenant_by_id(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantModel>, RepositoryError> {
        Tenant::find_by_id(tenant_id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Get tenant by slug
    pub async fn get_tenant_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<TenantModel>, RepositoryError> {
        Tenant::find()
            .filter(tenant::Column::Slug.eq(slug))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// List all tenants, oldest first
    pub async fn list_tenants(&self) -> Result<Vec<TenantModel>, RepositoryError> {
        Tenant::find()
            .order_by_asc(tenant::Column::CreatedAt)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Update tenant name
    pub async fn update_tenant_name(
        &self,
        tenant_id: Uuid,
        name: String,
    ) -> Result<TenantModel, RepositoryError> {
        self.validate_tenant_name(&name)?;

        let tenant = self
            .get_tenant_by_id(tenant_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))?;

        let mut active_tenant = tenant.into_active_model();
        active_tenant.name = Set(Some(name));

        active_tenant
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Delete a tenant
    pub async fn delete_tenant(&self, tenant_id: Uuid) -> Result<(), RepositoryError> {
        let tenant = self
            .get_tenant_by_id(tenant_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))?;

        tenant
            .delete(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(())
    }

    /// Check if a tenant exists
    pub async fn tenant_exists(&self, tenant_id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self.get_tenant_by_id(tenant_id).await?.is_some())
    }

    /// Get tenant count
    pub async fn get_tenant_count(&self) -> Result<u64, RepositoryError> {
        Tenant::find()
            .count(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    fn validate_tenant_name(&self, name: &str) -> Result<(), RepositoryError> {
        if name.trim().is_empty() {
            return Err(RepositoryError::validation_error(
                "Tenant name cannot be empty",
            ));
        }

        if name.len() > 255 {
            return Err(RepositoryError::validation_error(
                "Tenant name cannot exceed 255 characters",
            ));
        }

        if !name
            .chars()
            .all(|c| c.is_alphanumeric() || c.is_whitespace() || c == '-' || c == '_')
        {
            return Err(RepositoryError::validation_error(
                "Tenant name can only contain letters, numbers, spaces, hyphens, and underscores",
            ));
        }

        Ok(())
    }

    fn validate_slug(&self, slug: &str) -> Result<(), RepositoryError> {
        if !SLUG_PATTERN.is_match(slug) {
            return Err(RepositoryError::validation_error(
                "Tenant slug must be lowercase letters, digits and hyphens (max 63 characters)",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    fn request(name: &str, slug: Option<&str>) -> CreateTenantRequest {
        CreateTenantRequest {
            name: name.to_string(),
            slug: slug.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_create_tenant_success() {
        let db = test_db().await;
        let repo = TenantRepository::new(&db);

        let tenant = repo
            .create_tenant(request("Test Tenant", Some("test-tenant")))
            .await
            .unwrap();

        assert_eq!(tenant.name, Some("Test Tenant".to_string()));
        assert_eq!(tenant.slug, Some("test-tenant".to_string()));
        assert!(tenant.created_at.timestamp() > 0);
    }

    #[tokio::test]
    async fn test_create_tenant_validation() {
        let db = test_db().await;
        let repo = TenantRepository::new(&db);

        assert!(repo.create_tenant(request("", None)).await.is_err());
        assert!(repo
            .create_tenant(request(&"a".repeat(256), None))
            .await
            .is_err());
        assert!(repo.create_tenant(request("Test@Tenant", None)).await.is_err());
        assert!(matches!(
            repo.create_tenant(request("Acme", Some("Not A Slug"))).await,
            Err(RepositoryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_conflict() {
        let db = test_db().await;
        let repo = TenantRepository::new(&db);

        repo.create_tenant(request("Acme", Some("acme"))).await.unwrap();
        let duplicate = repo.create_tenant(request("Acme Two", Some("acme"))).await;

        assert!(matches!(duplicate, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_lookup_by_id_and_slug() {
        let db = test_db().await;
        let repo = TenantRepository::new(&db);
        let created = repo
            .create_tenant(request("Acme", Some("acme")))
            .await
            .unwrap();

        let by_id = repo.get_tenant_by_id(created.id).await.unwrap();
        assert_eq!(by_id.map(|t| t.id), Some(created.id));

        let by_slug = repo.get_tenant_by_slug("acme").await.unwrap();
        assert_eq!(by_slug.map(|t| t.id), Some(created.id));

        assert!(repo.get_tenant_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_and_delete_tenant() {
        let db = test_db().await;
        let repo = TenantRepository::new(&db);
        let created = repo.create_tenant(request("Original", None)).await.unwrap();

        let updated = repo
            .update_tenant_name(created.id, "Renamed".to_string())
            .await
            .unwrap();
        assert_eq!(updated.name, Some("Renamed".to_string()));

        repo.delete_tenant(created.id).await.unwrap();
        assert!(!repo.tenant_exists(created.id).await.unwrap());
        assert!(matches!(
            repo.delete_tenant(created.id).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_tenant_count() {
        let db = test_db().await;
        let repo = TenantRepository::new(&db);

        assert_eq!(repo.get_tenant_count().await.unwrap(), 0);
        repo.create_tenant(request("Test Tenant", None)).await.unwrap();
        assert_eq!(repo.get_tenant_count().await.unwrap(), 1);
    }
}

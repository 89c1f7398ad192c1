//! # Feature Flag Repository
//!
//! Persists flags together with their ordered filters and loads them back as
//! [`FeatureFlagDefinition`]s for the targeting engine.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IntoActiveModel, ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::feature_flags::{FeatureFlagDefinition, FeatureFlagFilter, FilterType};
use crate::models::feature_flag::{self, Entity as FeatureFlag, Model as FeatureFlagModel};
use crate::models::feature_flag_filter::{self, Entity as FeatureFlagFilterEntity};

static FLAG_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9._-]*$").expect("valid flag name regex"));

const MAX_FLAG_NAME_LEN: usize = 100;

/// Changes applied by [`FeatureFlagRepository::update_flag`]. Absent fields
/// are left untouched; `filters` replaces the whole list when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateFeatureFlag {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub filters: Option<Vec<FeatureFlagFilter>>,
}

/// Repository for feature flag database operations
pub struct FeatureFlagRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> FeatureFlagRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Every flag, ordered by name.
    pub async fn list_flags(&self) -> Result<Vec<FeatureFlagDefinition>, RepositoryError> {
        let flags = FeatureFlag::find()
            .order_by_asc(feature_flag::Column::Name)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        self.with_filters(flags).await
    }

    /// Enabled flags only, ordered by name.
    pub async fn list_enabled_flags(&self) -> Result<Vec<FeatureFlagDefinition>, RepositoryError> {
        let flags = FeatureFlag::find()
            .filter(feature_flag::Column::Enabled.eq(true))
            .order_by_asc(feature_flag::Column::Name)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        self.with_filters(flags).await
    }

    pub async fn get_flag(
        &self,
        name: &str,
    ) -> Result<Option<FeatureFlagDefinition>, RepositoryError> {
        let Some(flag) = self.find_model(name).await? else {
            return Ok(None);
        };
        Ok(self.with_filters(vec![flag]).await?.into_iter().next())
    }

    /// Creates a flag and its filters in one transaction.
    pub async fn create_flag(
        &self,
        definition: FeatureFlagDefinition,
    ) -> Result<FeatureFlagDefinition, RepositoryError> {
        validate_flag_name(&definition.name)?;
        validate_filters(&definition.filters)?;

        if self.find_model(&definition.name).await?.is_some() {
            return Err(RepositoryError::Conflict(format!(
                "Feature flag '{}' already exists",
                definition.name
            )));
        }

        let txn = self.db.begin().await.map_err(RepositoryError::database_error)?;
        let now = Utc::now();
        let flag = feature_flag::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(definition.name.clone()),
            description: Set(definition.description.clone()),
            enabled: Set(definition.enabled),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await
        .map_err(RepositoryError::database_error)?;

        insert_filters(&txn, flag.id, &definition.filters).await?;
        txn.commit().await.map_err(RepositoryError::database_error)?;

        tracing::info!(flag = %definition.name, enabled = definition.enabled, "Created feature flag");
        Ok(definition)
    }

    /// Creates the flag unless one with the same name exists. Returns whether
    /// a row was written.
    pub async fn create_if_missing(
        &self,
        definition: FeatureFlagDefinition,
    ) -> Result<bool, RepositoryError> {
        if self.find_model(&definition.name).await?.is_some() {
            return Ok(false);
        }
        self.create_flag(definition).await.map(|_| true)
    }

    pub async fn update_flag(
        &self,
        name: &str,
        update: UpdateFeatureFlag,
    ) -> Result<FeatureFlagDefinition, RepositoryError> {
        if let Some(filters) = &update.filters {
            validate_filters(filters)?;
        }

        let flag = self
            .find_model(name)
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("Feature flag '{name}' not found")))?;
        let flag_id = flag.id;

        let txn = self.db.begin().await.map_err(RepositoryError::database_error)?;
        let mut active = flag.into_active_model();
        if let Some(description) = update.description {
            active.description = Set(Some(description));
        }
        if let Some(enabled) = update.enabled {
            active.enabled = Set(enabled);
        }
        active.updated_at = Set(Utc::now().into());
        active
            .update(&txn)
            .await
            .map_err(RepositoryError::database_error)?;

        if let Some(filters) = &update.filters {
            FeatureFlagFilterEntity::delete_many()
                .filter(feature_flag_filter::Column::FeatureFlagId.eq(flag_id))
                .exec(&txn)
                .await
                .map_err(RepositoryError::database_error)?;
            insert_filters(&txn, flag_id, filters).await?;
        }
        txn.commit().await.map_err(RepositoryError::database_error)?;

        tracing::info!(flag = %name, "Updated feature flag");
        self.get_flag(name)
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("Feature flag '{name}' not found")))
    }

    pub async fn delete_flag(&self, name: &str) -> Result<(), RepositoryError> {
        let flag = self
            .find_model(name)
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("Feature flag '{name}' not found")))?;

        // Filters go with the flag through the cascading foreign key; SQLite
        // test databases run without FK enforcement, so delete them explicitly.
        FeatureFlagFilterEntity::delete_many()
            .filter(feature_flag_filter::Column::FeatureFlagId.eq(flag.id))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        flag.delete(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        tracing::info!(flag = %name, "Deleted feature flag");
        Ok(())
    }

    async fn find_model(&self, name: &str) -> Result<Option<FeatureFlagModel>, RepositoryError> {
        FeatureFlag::find()
            .filter(feature_flag::Column::Name.eq(name))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Attaches ordered filters. A flag with a filter type this build does not
    /// know is skipped so it can never widen to "on for everyone".
    async fn with_filters(
        &self,
        flags: Vec<FeatureFlagModel>,
    ) -> Result<Vec<FeatureFlagDefinition>, RepositoryError> {
        if flags.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = flags.iter().map(|flag| flag.id).collect();
        let rows = FeatureFlagFilterEntity::find()
            .filter(feature_flag_filter::Column::FeatureFlagId.is_in(ids))
            .order_by_asc(feature_flag_filter::Column::SortOrder)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        let mut by_flag: HashMap<Uuid, Vec<feature_flag_filter::Model>> = HashMap::new();
        for row in rows {
            by_flag.entry(row.feature_flag_id).or_default().push(row);
        }

        let mut definitions = Vec::with_capacity(flags.len());
        'flags: for flag in flags {
            let mut filters = Vec::new();
            for row in by_flag.remove(&flag.id).unwrap_or_default() {
                match row.filter_type.parse::<FilterType>() {
                    Ok(filter_type) => filters.push(FeatureFlagFilter {
                        filter_type,
                        value: row.value,
                    }),
                    Err(err) => {
                        tracing::warn!(flag = %flag.name, error = %err, "Skipping feature flag with unreadable filter");
                        continue 'flags;
                    }
                }
            }
            definitions.push(FeatureFlagDefinition {
                name: flag.name,
                description: flag.description,
                enabled: flag.enabled,
                filters,
            });
        }

        Ok(definitions)
    }
}

async fn insert_filters(
    txn: &DatabaseTransaction,
    flag_id: Uuid,
    filters: &[FeatureFlagFilter],
) -> Result<(), RepositoryError> {
    for (index, filter) in filters.iter().enumerate() {
        feature_flag_filter::ActiveModel {
            id: Set(Uuid::new_v4()),
            feature_flag_id: Set(flag_id),
            filter_type: Set(filter.filter_type.as_str().to_string()),
            value: Set(filter.value.clone()),
            sort_order: Set(index as i32),
        }
        .insert(txn)
        .await
        .map_err(RepositoryError::database_error)?;
    }
    Ok(())
}

fn validate_flag_name(name: &str) -> Result<(), RepositoryError> {
    if name.len() > MAX_FLAG_NAME_LEN || !FLAG_NAME_PATTERN.is_match(name) {
        return Err(RepositoryError::validation_error(format!(
            "Invalid feature flag name '{name}': use lowercase letters, digits, '.', '_' or '-' (max {MAX_FLAG_NAME_LEN})"
        )));
    }
    Ok(())
}

fn validate_filters(filters: &[FeatureFlagFilter]) -> Result<(), RepositoryError> {
    filters
        .iter()
        .try_for_each(FeatureFlagFilter::validate)
        .map_err(|err| RepositoryError::validation_error(err.to_string()))
}

//! # Feature Flags Service
//!
//! Decides which flags are on for a request. Flag definitions come from a
//! [`FeatureFlagSource`] and are cached as a snapshot for a configurable
//! TTL; tenant subscription products are cached per tenant in an LRU.
//!
//! Each cache carries a generation counter bumped by invalidation. A load
//! only fills the cache if no invalidation happened while it was in flight.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::context::{EvaluationContext, SubscribedProduct};
use super::filters::{FeatureFlagFilter, FeatureFlagsFiltersService, FilterError};
use crate::config::FeatureFlagsConfig;
use crate::error::RepositoryError;
use crate::repositories::{FeatureFlagRepository, TenantSubscriptionRepository};

/// A flag with its targeting filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FeatureFlagDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub filters: Vec<FeatureFlagFilter>,
}

impl FeatureFlagDefinition {
    pub fn validate(&self) -> Result<(), FilterError> {
        self.filters.iter().try_for_each(FeatureFlagFilter::validate)
    }
}

/// Where flag definitions and tenant products are read from.
#[async_trait]
pub trait FeatureFlagSource: Send + Sync {
    async fn load_enabled_flags(&self) -> Result<Vec<FeatureFlagDefinition>, RepositoryError>;

    async fn load_tenant_products(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<SubscribedProduct>, RepositoryError>;
}

/// [`FeatureFlagSource`] backed by the service database.
#[derive(Clone)]
pub struct DatabaseFlagSource {
    db: DatabaseConnection,
}

impl DatabaseFlagSource {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FeatureFlagSource for DatabaseFlagSource {
    async fn load_enabled_flags(&self) -> Result<Vec<FeatureFlagDefinition>, RepositoryError> {
        FeatureFlagRepository::new(&self.db).list_enabled_flags().await
    }

    async fn load_tenant_products(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<SubscribedProduct>, RepositoryError> {
        TenantSubscriptionRepository::new(&self.db)
            .list_products(tenant_id)
            .await
    }
}

struct Cached<T> {
    value: T,
    loaded_at: Instant,
}

impl<T> Cached<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            loaded_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() < ttl
    }
}

/// Flag evaluation with cached definitions.
pub struct FeatureFlagsService {
    source: Arc<dyn FeatureFlagSource>,
    filters: FeatureFlagsFiltersService,
    ttl: Duration,
    snapshot: RwLock<Option<Cached<Arc<Vec<FeatureFlagDefinition>>>>>,
    snapshot_generation: AtomicU64,
    tenant_products: Arc<RwLock<LruCache<Uuid, Cached<Vec<SubscribedProduct>>>>>,
    tenant_generation: AtomicU64,
}

impl FeatureFlagsService {
    pub fn new(source: Arc<dyn FeatureFlagSource>, config: &FeatureFlagsConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            filters: FeatureFlagsFiltersService::new(),
            ttl: Duration::from_secs(config.cache_ttl_seconds),
            snapshot: RwLock::new(None),
            snapshot_generation: AtomicU64::new(0),
            tenant_products: Arc::new(RwLock::new(LruCache::new(capacity))),
            tenant_generation: AtomicU64::new(0),
        }
    }

    pub fn from_database(db: DatabaseConnection, config: &FeatureFlagsConfig) -> Self {
        Self::new(Arc::new(DatabaseFlagSource::new(db)), config)
    }

    /// Whether a single flag is on. A filter that cannot be evaluated counts
    /// as a non-match.
    pub fn flag_matches(&self, flag: &FeatureFlagDefinition, ctx: &EvaluationContext) -> bool {
        if !flag.enabled {
            return false;
        }
        if flag.filters.is_empty() {
            return true;
        }

        flag.filters.iter().any(|filter| {
            match self.filters.matches(&flag.name, filter, ctx) {
                Ok(matched) => matched,
                Err(err) => {
                    warn!(
                        flag = %flag.name,
                        filter_type = %filter.filter_type,
                        error = %err,
                        "Feature flag filter could not be evaluated"
                    );
                    false
                }
            }
        })
    }

    /// Names of the flags that are on for `ctx`, sorted.
    pub fn evaluate(&self, flags: &[FeatureFlagDefinition], ctx: &EvaluationContext) -> Vec<String> {
        let mut enabled: Vec<String> = flags
            .iter()
            .filter(|flag| {
                let on = self.flag_matches(flag, ctx);
                counter!(
                    "feature_flag_evaluations_total",
                    "result" => if on { "on" } else { "off" }
                )
                .increment(1);
                on
            })
            .map(|flag| flag.name.clone())
            .collect();
        enabled.sort();
        enabled.dedup();
        enabled
    }

    /// Names of the persisted flags that are on for `ctx`.
    pub async fn get_current_feature_flags(
        &self,
        ctx: &EvaluationContext,
    ) -> Result<Vec<String>, RepositoryError> {
        let ctx = self.enrich(ctx).await?;
        let flags = self.enabled_flags().await?;
        let enabled = self.evaluate(&flags, &ctx);
        debug!(
            evaluated = flags.len(),
            enabled = enabled.len(),
            "Evaluated feature flags"
        );
        Ok(enabled)
    }

    /// Evaluates caller-supplied definitions against `ctx` after loading the
    /// tenant's subscription products, the same way persisted flags are.
    pub async fn evaluate_with_context(
        &self,
        flags: &[FeatureFlagDefinition],
        ctx: &EvaluationContext,
    ) -> Result<Vec<String>, RepositoryError> {
        let ctx = self.enrich(ctx).await?;
        Ok(self.evaluate(flags, &ctx))
    }

    /// Whether the persisted flag `name` is on for `ctx`. Unknown or disabled
    /// flags are off.
    pub async fn is_enabled(
        &self,
        name: &str,
        ctx: &EvaluationContext,
    ) -> Result<bool, RepositoryError> {
        let flags = self.enabled_flags().await?;
        let Some(flag) = flags.iter().find(|flag| flag.name == name) else {
            return Ok(false);
        };
        let ctx = self.enrich(ctx).await?;
        Ok(self.flag_matches(flag, &ctx))
    }

    /// Drops the cached flag snapshot.
    pub async fn invalidate(&self) {
        let mut snapshot = self.snapshot.write().await;
        self.snapshot_generation.fetch_add(1, Ordering::AcqRel);
        *snapshot = None;
    }

    /// Drops the cached subscription products of one tenant.
    pub async fn invalidate_tenant(&self, tenant_id: Uuid) {
        let mut cache = self.tenant_products.write().await;
        self.tenant_generation.fetch_add(1, Ordering::AcqRel);
        cache.pop(&tenant_id);
    }

    async fn enabled_flags(&self) -> Result<Arc<Vec<FeatureFlagDefinition>>, RepositoryError> {
        {
            let snapshot = self.snapshot.read().await;
            if let Some(cached) = snapshot.as_ref()
                && cached.is_fresh(self.ttl)
            {
                return Ok(Arc::clone(&cached.value));
            }
        }

        let generation = self.snapshot_generation.load(Ordering::Acquire);
        let flags = Arc::new(self.source.load_enabled_flags().await?);
        if !self.ttl.is_zero() {
            let mut snapshot = self.snapshot.write().await;
            if self.snapshot_generation.load(Ordering::Acquire) == generation {
                *snapshot = Some(Cached::new(Arc::clone(&flags)));
            }
        }
        debug!(count = flags.len(), "Loaded feature flag snapshot");
        Ok(flags)
    }

    /// Fills in tenant subscription products when the caller gave only the
    /// tenant identity.
    async fn enrich(&self, ctx: &EvaluationContext) -> Result<EvaluationContext, RepositoryError> {
        let mut ctx = ctx.clone();
        let Some(tenant) = ctx.tenant.as_mut() else {
            return Ok(ctx);
        };
        if tenant.subscription_products.is_some() {
            return Ok(ctx);
        }

        {
            let mut cache = self.tenant_products.write().await;
            if let Some(cached) = cache.get(&tenant.id)
                && cached.is_fresh(self.ttl)
            {
                tenant.subscription_products = Some(cached.value.clone());
                return Ok(ctx);
            }
        }

        let generation = self.tenant_generation.load(Ordering::Acquire);
        let products = self.source.load_tenant_products(tenant.id).await?;
        if !self.ttl.is_zero() {
            let mut cache = self.tenant_products.write().await;
            if self.tenant_generation.load(Ordering::Acquire) == generation {
                cache.put(tenant.id, Cached::new(products.clone()));
            }
        }
        tenant.subscription_products = Some(products);
        Ok(ctx)
    }
}

//! # Tenant Subscription Repository
//!
//! Reads and replaces the set of subscription products a tenant is
//! subscribed to. Targeting filters on `tenant.subscription.*` consume the
//! [`SubscribedProduct`] view produced here.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::feature_flags::SubscribedProduct;
use crate::models::subscription_product::{self, Entity as SubscriptionProduct};
use crate::models::tenant_subscription_product::{
    self, ActiveModel as TenantSubscriptionActiveModel, Entity as TenantSubscriptionProduct,
};

/// Repository for tenant subscription links
pub struct TenantSubscriptionRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> TenantSubscriptionRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Products linked to the tenant. `active` reflects whether the link is
    /// current (active flag set and not past `ends_at`).
    pub async fn list_products(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<SubscribedProduct>, RepositoryError> {
        let links = TenantSubscriptionProduct::find()
            .filter(tenant_subscription_product::Column::TenantId.eq(tenant_id))
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        if links.is_empty() {
            return Ok(Vec::new());
        }

        let product_ids: Vec<Uuid> = links.iter().map(|link| link.product_id).collect();
        let titles: HashMap<Uuid, String> = SubscriptionProduct::find()
            .filter(subscription_product::Column::Id.is_in(product_ids))
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)?
            .into_iter()
            .map(|product| (product.id, product.title))
            .collect();

        let now = Utc::now();
        let mut products: Vec<SubscribedProduct> = links
            .iter()
            .filter_map(|link| {
                titles.get(&link.product_id).map(|title| SubscribedProduct {
                    id: link.product_id,
                    title: title.clone(),
                    active: link.is_current(now),
                })
            })
            .collect();
        products.sort_by(|a, b| a.title.cmp(&b.title));

        Ok(products)
    }

    /// Replaces the tenant's subscriptions with `product_ids`, all active.
    pub async fn replace_subscriptions(
        &self,
        tenant_id: Uuid,
        product_ids: &[Uuid],
    ) -> Result<Vec<SubscribedProduct>, RepositoryError> {
        let known = SubscriptionProduct::find()
            .filter(subscription_product::Column::Id.is_in(product_ids.to_vec()))
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        if let Some(missing) = product_ids
            .iter()
            .find(|id| !known.iter().any(|product| product.id == **id))
        {
            return Err(RepositoryError::not_found(format!(
                "Subscription product {missing} not found"
            )));
        }

        let txn = self
            .db
            .begin()
            .await
            .map_err(RepositoryError::database_error)?;

        TenantSubscriptionProduct::delete_many()
            .filter(tenant_subscription_product::Column::TenantId.eq(tenant_id))
            .exec(&txn)
            .await
            .map_err(RepositoryError::database_error)?;

        let now = Utc::now();
        let mut seen = Vec::with_capacity(product_ids.len());
        for product_id in product_ids {
            if seen.contains(product_id) {
                continue;
            }
            seen.push(*product_id);

            TenantSubscriptionActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(tenant_id),
                product_id: Set(*product_id),
                active: Set(true),
                quantity: Set(1),
                ends_at: Set(None),
                created_at: Set(now.into()),
            }
            .insert(&txn)
            .await
            .map_err(RepositoryError::database_error)?;
        }

        txn.commit()
            .await
            .map_err(RepositoryError::database_error)?;

        tracing::info!(
            tenant_id = %tenant_id,
            products = seen.len(),
            "Replaced tenant subscriptions"
        );

        self.list_products(tenant_id).await
    }
}

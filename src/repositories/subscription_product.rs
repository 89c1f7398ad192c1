//! # Subscription Product Repository
//!
//! Persists generated pricing plans (product, fixed prices, usage prices and
//! their tiers) and reads them back in the shape the quote engine consumes.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::subscription_price::{self, Entity as SubscriptionPrice};
use crate::models::subscription_product::{
    self, Entity as SubscriptionProduct, Model as SubscriptionProductModel,
};
use crate::models::usage_based_price::{self, Entity as UsageBasedPrice};
use crate::models::usage_based_tier::{self, Entity as UsageBasedTier};
use crate::pricing::{
    BillingPeriod, GeneratedPlan, GeneratedPrice, GeneratedUsagePrice, PricingModel, TiersMode,
    UsageAggregation,
};

/// A persisted product with its prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StoredProduct {
    pub id: Uuid,
    pub active: bool,
    #[serde(flatten)]
    pub plan: GeneratedPlan,
}

/// Repository for subscription products and their prices
pub struct SubscriptionProductRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> SubscriptionProductRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Writes a generated plan with all of its prices in one transaction.
    pub async fn save_plan(&self, plan: &GeneratedPlan) -> Result<StoredProduct, RepositoryError> {
        if self.find_by_title(&plan.title).await?.is_some() {
            return Err(RepositoryError::Conflict(format!(
                "Subscription product '{}' already exists",
                plan.title
            )));
        }

        let txn = self.db.begin().await.map_err(RepositoryError::database_error)?;
        let now = Utc::now();
        let product_id = Uuid::new_v4();

        subscription_product::ActiveModel {
            id: Set(product_id),
            title: Set(plan.title.clone()),
            description: Set(plan.description.clone()),
            sort_order: Set(plan.order),
            model: Set(plan.model.as_str().to_string()),
            public: Set(plan.public),
            active: Set(true),
            badge: Set(plan.badge.clone()),
            features: Set(Some(serde_json::json!(plan.features))),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await
        .map_err(RepositoryError::database_error)?;

        for price in &plan.prices {
            subscription_price::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(product_id),
                billing_period: Set(price.billing_period.as_str().to_string()),
                currency: Set(price.currency.clone()),
                amount: Set(price.amount),
                active: Set(true),
                created_at: Set(now.into()),
            }
            .insert(&txn)
            .await
            .map_err(RepositoryError::database_error)?;
        }

        for usage in &plan.usage_prices {
            let usage_price_id = Uuid::new_v4();
            usage_based_price::ActiveModel {
                id: Set(usage_price_id),
                product_id: Set(product_id),
                unit: Set(usage.unit.clone()),
                unit_title: Set(usage.unit_title.clone()),
                unit_title_plural: Set(usage.unit_title_plural.clone()),
                currency: Set(usage.currency.clone()),
                billing_period: Set(usage.billing_period.as_str().to_string()),
                tiers_mode: Set(usage.tiers_mode.as_str().to_string()),
                aggregation: Set(usage.aggregation.as_str().to_string()),
                created_at: Set(now.into()),
            }
            .insert(&txn)
            .await
            .map_err(RepositoryError::database_error)?;

            for tier in &usage.tiers {
                usage_based_tier::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    usage_based_price_id: Set(usage_price_id),
                    from_units: Set(tier.from),
                    to_units: Set(tier.to),
                    per_unit_price: Set(tier.per_unit_price),
                    flat_fee_price: Set(tier.flat_fee_price),
                }
                .insert(&txn)
                .await
                .map_err(RepositoryError::database_error)?;
            }
        }

        txn.commit().await.map_err(RepositoryError::database_error)?;
        tracing::info!(
            product_id = %product_id,
            title = %plan.title,
            prices = plan.prices.len(),
            usage_prices = plan.usage_prices.len(),
            "Saved subscription product"
        );

        Ok(StoredProduct {
            id: product_id,
            active: true,
            plan: plan.clone(),
        })
    }

    /// Saves the plan unless a product with the same title exists. Returns
    /// whether a product was written.
    pub async fn create_if_missing(&self, plan: &GeneratedPlan) -> Result<bool, RepositoryError> {
        if self.find_by_title(&plan.title).await?.is_some() {
            return Ok(false);
        }
        self.save_plan(plan).await.map(|_| true)
    }

    /// Products ordered by display order, optionally public ones only.
    pub async fn list_products(
        &self,
        public_only: bool,
    ) -> Result<Vec<StoredProduct>, RepositoryError> {
        let mut query = SubscriptionProduct::find()
            .filter(subscription_product::Column::Active.eq(true))
            .order_by_asc(subscription_product::Column::SortOrder)
            .order_by_asc(subscription_product::Column::Title);
        if public_only {
            query = query.filter(subscription_product::Column::Public.eq(true));
        }
        let products = query
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        self.load_prices(products).await
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Option<StoredProduct>, RepositoryError> {
        let Some(product) = SubscriptionProduct::find_by_id(id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?
        else {
            return Ok(None);
        };
        Ok(self.load_prices(vec![product]).await?.into_iter().next())
    }

    async fn find_by_title(
        &self,
        title: &str,
    ) -> Result<Option<SubscriptionProductModel>, RepositoryError> {
        SubscriptionProduct::find()
            .filter(subscription_product::Column::Title.eq(title))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    async fn load_prices(
        &self,
        products: Vec<SubscriptionProductModel>,
    ) -> Result<Vec<StoredProduct>, RepositoryError> {
        if products.is_empty() {
            return Ok(Vec::new());
        }
        let product_ids: Vec<Uuid> = products.iter().map(|product| product.id).collect();

        let mut prices: HashMap<Uuid, Vec<GeneratedPrice>> = HashMap::new();
        for row in SubscriptionPrice::find()
            .filter(subscription_price::Column::ProductId.is_in(product_ids.clone()))
            .filter(subscription_price::Column::Active.eq(true))
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)?
        {
            prices.entry(row.product_id).or_default().push(GeneratedPrice {
                billing_period: parse_column::<BillingPeriod>("billing_period", &row.billing_period)?,
                currency: row.currency,
                amount: row.amount,
            });
        }

        let usage_rows = UsageBasedPrice::find()
            .filter(usage_based_price::Column::ProductId.is_in(product_ids))
            .order_by_asc(usage_based_price::Column::Unit)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        let usage_ids: Vec<Uuid> = usage_rows.iter().map(|row| row.id).collect();
        let mut tiers: HashMap<Uuid, Vec<usage_based_tier::Model>> = HashMap::new();
        if !usage_ids.is_empty() {
            for tier in UsageBasedTier::find()
                .filter(usage_based_tier::Column::UsageBasedPriceId.is_in(usage_ids))
                .order_by_asc(usage_based_tier::Column::FromUnits)
                .all(self.db)
                .await
                .map_err(RepositoryError::database_error)?
            {
                tiers.entry(tier.usage_based_price_id).or_default().push(tier);
            }
        }

        let mut usage_prices: HashMap<Uuid, Vec<GeneratedUsagePrice>> = HashMap::new();
        for row in usage_rows {
            let row_tiers = tiers.remove(&row.id).unwrap_or_default();
            usage_prices.entry(row.product_id).or_default().push(GeneratedUsagePrice {
                tiers_mode: parse_column::<TiersMode>("tiers_mode", &row.tiers_mode)?,
                aggregation: parse_column::<UsageAggregation>("aggregation", &row.aggregation)?,
                billing_period: parse_column::<BillingPeriod>("billing_period", &row.billing_period)?,
                unit: row.unit,
                unit_title: row.unit_title,
                unit_title_plural: row.unit_title_plural,
                currency: row.currency,
                tiers: row_tiers.iter().map(Into::into).collect(),
            });
        }

        products
            .into_iter()
            .map(|product| {
                let features = product
                    .features
                    .as_ref()
                    .and_then(|value| serde_json::from_value::<Vec<String>>(value.clone()).ok())
                    .unwrap_or_default();
                Ok(StoredProduct {
                    id: product.id,
                    active: product.active,
                    plan: GeneratedPlan {
                        model: parse_column::<PricingModel>("model", &product.model)?,
                        prices: prices.remove(&product.id).unwrap_or_default(),
                        usage_prices: usage_prices.remove(&product.id).unwrap_or_default(),
                        title: product.title,
                        description: product.description,
                        order: product.sort_order,
                        badge: product.badge,
                        public: product.public,
                        features,
                    },
                })
            })
            .collect()
    }
}

fn parse_column<T>(column: &str, raw: &str) -> Result<T, RepositoryError>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse::<T>().map_err(|err| {
        RepositoryError::validation_error(format!("Stored {column} is invalid: {err}"))
    })
}

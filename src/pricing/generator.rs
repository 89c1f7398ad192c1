//! Turns plan definitions into products with concrete prices.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use super::model::{BillingPeriod, PricingModel, TiersMode, UsageAggregation, UsageTier};
use super::tiers::validate_tiers;
use super::units::find_unit;
use super::{PricingError, round_money};

/// Metered component of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UsageDefinition {
    /// Catalogue unit name (see `pricing_units`)
    pub unit: String,
    pub currency: String,
    #[serde(default = "default_usage_period")]
    pub billing_period: BillingPeriod,
    pub tiers_mode: TiersMode,
    #[serde(default = "default_aggregation")]
    pub aggregation: UsageAggregation,
    pub tiers: Vec<UsageTier>,
}

fn default_usage_period() -> BillingPeriod {
    BillingPeriod::Monthly
}

fn default_aggregation() -> UsageAggregation {
    UsageAggregation::Sum
}

/// A plan as authored by an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlanDefinition {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order: i32,
    pub model: PricingModel,
    #[serde(default)]
    pub badge: Option<String>,
    #[serde(default = "default_public")]
    pub public: bool,
    /// Monthly amount per currency
    #[serde(default)]
    pub monthly_prices: BTreeMap<String, f64>,
    /// One-time amount per currency
    #[serde(default)]
    pub one_time_prices: BTreeMap<String, f64>,
    #[serde(default)]
    pub usage: Vec<UsageDefinition>,
    #[serde(default)]
    pub features: Vec<String>,
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeneratedPrice {
    pub billing_period: BillingPeriod,
    pub currency: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeneratedUsagePrice {
    pub unit: String,
    pub unit_title: String,
    pub unit_title_plural: String,
    pub currency: String,
    pub billing_period: BillingPeriod,
    pub tiers_mode: TiersMode,
    pub aggregation: UsageAggregation,
    pub tiers: Vec<UsageTier>,
}

/// A product ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeneratedPlan {
    pub title: String,
    pub description: Option<String>,
    pub order: i32,
    pub model: PricingModel,
    pub badge: Option<String>,
    pub public: bool,
    pub features: Vec<String>,
    pub prices: Vec<GeneratedPrice>,
    pub usage_prices: Vec<GeneratedUsagePrice>,
}

pub struct PricingPlanGenerator {
    supported_currencies: Vec<String>,
}

impl PricingPlanGenerator {
    pub fn new(supported_currencies: Vec<String>) -> Self {
        Self {
            supported_currencies,
        }
    }

    /// Validates every definition and expands it into priced plans, ordered by `order`.
    pub fn generate(
        &self,
        definitions: &[PlanDefinition],
        yearly_discount_pct: f64,
    ) -> Result<Vec<GeneratedPlan>, PricingError> {
        if !(0.0..1.0).contains(&yearly_discount_pct) {
            return Err(PricingError::InvalidDiscount(yearly_discount_pct));
        }

        let mut seen = HashSet::new();
        let mut plans = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if !seen.insert(definition.title.trim().to_lowercase()) {
                return Err(invalid(definition, "duplicate plan title"));
            }
            plans.push(self.generate_plan(definition, yearly_discount_pct)?);
        }

        plans.sort_by_key(|plan| plan.order);
        debug!(plans = plans.len(), "Generated pricing plans");
        Ok(plans)
    }

    fn generate_plan(
        &self,
        definition: &PlanDefinition,
        yearly_discount_pct: f64,
    ) -> Result<GeneratedPlan, PricingError> {
        if definition.title.trim().is_empty() {
            return Err(invalid(definition, "title cannot be empty"));
        }
        self.check_model_shape(definition)?;

        let mut prices = Vec::new();
        for (currency, amount) in &definition.monthly_prices {
            self.check_amount(definition, currency, *amount)?;
            prices.push(GeneratedPrice {
                billing_period: BillingPeriod::Monthly,
                currency: currency.clone(),
                amount: round_money(*amount),
            });
            prices.push(GeneratedPrice {
                billing_period: BillingPeriod::Yearly,
                currency: currency.clone(),
                amount: round_money(amount * 12.0 * (1.0 - yearly_discount_pct)),
            });
        }
        for (currency, amount) in &definition.one_time_prices {
            self.check_amount(definition, currency, *amount)?;
            prices.push(GeneratedPrice {
                billing_period: BillingPeriod::Once,
                currency: currency.clone(),
                amount: round_money(*amount),
            });
        }

        let mut usage_prices = Vec::with_capacity(definition.usage.len());
        for usage in &definition.usage {
            let unit = find_unit(&usage.unit)
                .ok_or_else(|| PricingError::UnknownUnit(usage.unit.clone()))?;
            if !self.supports(&usage.currency) {
                return Err(PricingError::UnsupportedCurrency(usage.currency.clone()));
            }
            if usage.billing_period == BillingPeriod::Once {
                return Err(invalid(definition, "usage cannot be billed once"));
            }
            validate_tiers(&usage.tiers)?;
            usage_prices.push(GeneratedUsagePrice {
                unit: unit.name.to_string(),
                unit_title: unit.title.to_string(),
                unit_title_plural: unit.title_plural.to_string(),
                currency: usage.currency.clone(),
                billing_period: usage.billing_period,
                tiers_mode: usage.tiers_mode,
                aggregation: usage.aggregation,
                tiers: usage.tiers.clone(),
            });
        }

        Ok(GeneratedPlan {
            title: definition.title.trim().to_string(),
            description: definition.description.clone(),
            order: definition.order,
            model: definition.model,
            badge: definition.badge.clone(),
            public: definition.public,
            features: definition.features.clone(),
            prices,
            usage_prices,
        })
    }

    fn check_model_shape(&self, definition: &PlanDefinition) -> Result<(), PricingError> {
        let model = definition.model;
        let has_monthly = !definition.monthly_prices.is_empty();
        let has_once = !definition.one_time_prices.is_empty();
        let has_usage = !definition.usage.is_empty();

        if model.has_recurring_amount() && !has_monthly {
            return Err(invalid(definition, "a monthly price is required"));
        }
        if !model.has_recurring_amount() && has_monthly {
            return Err(invalid(definition, "monthly prices are not allowed"));
        }
        if model.has_usage() && !has_usage {
            return Err(invalid(definition, "at least one usage price is required"));
        }
        if !model.has_usage() && has_usage {
            return Err(invalid(definition, "usage prices are not allowed"));
        }
        match (model == PricingModel::OneTime, has_once) {
            (true, false) => Err(invalid(definition, "a one-time price is required")),
            (false, true) => Err(invalid(definition, "one-time prices are not allowed")),
            _ => Ok(()),
        }
    }

    fn check_amount(
        &self,
        definition: &PlanDefinition,
        currency: &str,
        amount: f64,
    ) -> Result<(), PricingError> {
        if !self.supports(currency) {
            return Err(PricingError::UnsupportedCurrency(currency.to_string()));
        }
        if !amount.is_finite() || amount < 0.0 {
            return Err(invalid(definition, "amounts must be non-negative"));
        }
        Ok(())
    }

    fn supports(&self, currency: &str) -> bool {
        self.supported_currencies.iter().any(|c| c == currency)
    }
}

fn invalid(definition: &PlanDefinition, reason: &str) -> PricingError {
    PricingError::InvalidPlan {
        title: definition.title.clone(),
        reason: reason.to_string(),
    }
}

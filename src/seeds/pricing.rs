//! Pricing plan seeding
//!
//! Creates the default Starter, Pro and Enterprise products through the plan
//! generator. Products are matched by title, so running the seed twice is a
//! no-op.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use sea_orm::DatabaseConnection;

use crate::config::PricingConfig;
use crate::pricing::{
    BillingPeriod, PlanDefinition, PricingModel, PricingPlanGenerator, TiersMode,
    UsageAggregation, UsageDefinition, UsageTier,
};
use crate::repositories::SubscriptionProductRepository;

/// Seeds the default plans in the configured default currency. Returns the
/// number of products created.
pub async fn seed_pricing_plans(db: &DatabaseConnection, config: &PricingConfig) -> Result<usize> {
    let generator = PricingPlanGenerator::new(config.supported_currencies.clone());
    let plans = generator
        .generate(
            &default_plan_definitions(&config.default_currency),
            config.yearly_discount_pct,
        )
        .context("generating default pricing plans")?;

    let repo = SubscriptionProductRepository::new(db);
    let mut created = 0;
    for plan in &plans {
        if repo.create_if_missing(plan).await? {
            log::info!("Created subscription product: {}", plan.title);
            created += 1;
        } else {
            log::info!("Subscription product '{}' already exists, skipping", plan.title);
        }
    }

    log::info!("Pricing seeding completed ({} created)", created);
    Ok(created)
}

/// The default catalogue priced in `currency`.
pub fn default_plan_definitions(currency: &str) -> Vec<PlanDefinition> {
    let monthly = |amount: f64| BTreeMap::from([(currency.to_string(), amount)]);

    vec![
        PlanDefinition {
            title: "Starter".to_string(),
            description: Some("For individuals getting started".to_string()),
            order: 1,
            model: PricingModel::FlatRate,
            badge: None,
            public: true,
            monthly_prices: monthly(19.0),
            one_time_prices: BTreeMap::new(),
            usage: Vec::new(),
            features: vec![
                "1 workspace".to_string(),
                "Email support".to_string(),
            ],
        },
        PlanDefinition {
            title: "Pro".to_string(),
            description: Some("For growing teams, billed per seat".to_string()),
            order: 2,
            model: PricingModel::PerSeat,
            badge: Some("Most popular".to_string()),
            public: true,
            monthly_prices: monthly(12.0),
            one_time_prices: BTreeMap::new(),
            usage: Vec::new(),
            features: vec![
                "Unlimited workspaces".to_string(),
                "Role-based permissions".to_string(),
                "Priority support".to_string(),
            ],
        },
        PlanDefinition {
            title: "Enterprise".to_string(),
            description: Some("Platform fee plus metered API usage".to_string()),
            order: 3,
            model: PricingModel::FlatRateUsageBased,
            badge: None,
            public: true,
            monthly_prices: monthly(199.0),
            one_time_prices: BTreeMap::new(),
            usage: vec![UsageDefinition {
                unit: "api".to_string(),
                currency: currency.to_string(),
                billing_period: BillingPeriod::Monthly,
                tiers_mode: TiersMode::Graduated,
                aggregation: UsageAggregation::Sum,
                tiers: vec![
                    UsageTier {
                        from: 1,
                        to: Some(10_000),
                        per_unit_price: Some(0.0),
                        flat_fee_price: None,
                    },
                    UsageTier {
                        from: 10_001,
                        to: Some(100_000),
                        per_unit_price: Some(0.002),
                        flat_fee_price: None,
                    },
                    UsageTier {
                        from: 100_001,
                        to: None,
                        per_unit_price: Some(0.001),
                        flat_fee_price: Some(25.0),
                    },
                ],
            }],
            features: vec![
                "SSO".to_string(),
                "Audit log".to_string(),
                "10,000 API calls included".to_string(),
            ],
        },
    ]
}

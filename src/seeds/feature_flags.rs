//! Feature flag seeding
//!
//! Creates a handful of example flags, all disabled, so operators can see
//! the filter shapes without turning anything on.

use anyhow::Result;
use sea_orm::DatabaseConnection;

use crate::feature_flags::{FeatureFlagDefinition, FeatureFlagFilter, FilterType};
use crate::repositories::FeatureFlagRepository;

/// Seeds the example flags. Returns the number of flags created.
pub async fn seed_feature_flags(db: &DatabaseConnection) -> Result<usize> {
    let repo = FeatureFlagRepository::new(db);
    let mut created = 0;

    for flag in example_flags() {
        let name = flag.name.clone();
        if repo.create_if_missing(flag).await? {
            log::info!("Created feature flag: {}", name);
            created += 1;
        } else {
            log::info!("Feature flag '{}' already exists, skipping", name);
        }
    }

    log::info!("Feature flag seeding completed ({} created)", created);
    Ok(created)
}

fn example_flags() -> Vec<FeatureFlagDefinition> {
    let flag = |name: &str, description: &str, filters: Vec<FeatureFlagFilter>| {
        FeatureFlagDefinition {
            name: name.to_string(),
            description: Some(description.to_string()),
            enabled: false,
            filters,
        }
    };

    vec![
        flag(
            "admin.beta-dashboard",
            "New analytics dashboard for admins",
            vec![FeatureFlagFilter::new(FilterType::UserAdmin, None)],
        ),
        flag(
            "checkout.new-flow",
            "Gradual rollout of the redesigned checkout",
            vec![FeatureFlagFilter::new(FilterType::Percentage, Some("10"))],
        ),
        flag(
            "pricing.enterprise-usage",
            "Usage dashboard for Enterprise subscribers",
            vec![FeatureFlagFilter::new(
                FilterType::TenantSubscriptionProductsHas,
                Some("Enterprise"),
            )],
        ),
        flag(
            "marketing.spring-campaign",
            "Campaign banner for visitors arriving from the spring newsletter",
            vec![
                FeatureFlagFilter::new(FilterType::AnalyticsUtmCampaign, Some("spring")),
                FeatureFlagFilter::new(FilterType::PageStartsWith, Some("/pricing")),
            ],
        ),
    ]
}

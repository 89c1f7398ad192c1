//! # Data Models
//!
//! SeaORM entities for the back office plus a few shared response types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod feature_flag;
pub mod feature_flag_filter;
pub mod formula;
pub mod formula_component;
pub mod formula_log;
pub mod subscription_price;
pub mod subscription_product;
pub mod tenant;
pub mod tenant_subscription_product;
pub mod usage_based_price;
pub mod usage_based_tier;

pub use feature_flag::Entity as FeatureFlag;
pub use feature_flag_filter::Entity as FeatureFlagFilter;
pub use formula::Entity as Formula;
pub use formula_component::Entity as FormulaComponent;
pub use formula_log::Entity as FormulaLog;
pub use subscription_price::Entity as SubscriptionPrice;
pub use subscription_product::Entity as SubscriptionProduct;
pub use tenant::Entity as Tenant;
pub use tenant_subscription_product::Entity as TenantSubscriptionProduct;
pub use usage_based_price::Entity as UsageBasedPrice;
pub use usage_based_tier::Entity as UsageBasedTier;

/// Basic service information response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "backoffice".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

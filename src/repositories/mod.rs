//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM operations
//! for the back-office entities.

pub mod feature_flag;
pub mod formula;
pub mod subscription_product;
pub mod tenant;
pub mod tenant_subscription;

pub use feature_flag::{FeatureFlagRepository, UpdateFeatureFlag};
pub use formula::{FormulaRepository, NewFormula, NewFormulaLog};
pub use subscription_product::{StoredProduct, SubscriptionProductRepository};
pub use tenant::{CreateTenantRequest, TenantRepository};
pub use tenant_subscription::TenantSubscriptionRepository;

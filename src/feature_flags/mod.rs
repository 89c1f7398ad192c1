//! # Feature Flags
//!
//! Targeting engine that decides which feature flags are on for a request.
//! Flags carry an ordered list of filters; each filter compares one facet of
//! the [`EvaluationContext`] (session, user, tenant, analytics visitor or the
//! clock) against the filter value.

mod bucket;
pub mod context;
pub mod filters;
pub mod service;


pub use bucket::rollout_bucket;
pub use context::{
    AnalyticsContext, EvaluationContext, SessionContext, SubscribedProduct, TenantContext,
    UserContext,
};
pub use filters::{
    FeatureFlagFilter, FeatureFlagsFiltersService, FilterError, FilterType, FilterTypeInfo,
};
pub use service::{
    DatabaseFlagSource, FeatureFlagDefinition, FeatureFlagSource, FeatureFlagsService,
};

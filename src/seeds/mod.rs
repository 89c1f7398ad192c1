//! Database seeding functionality
//!
//! Idempotent seeds for the default pricing catalogue and example feature
//! flags. Both can be re-run safely; existing rows are left untouched.

pub mod feature_flags;
pub mod pricing;

pub use feature_flags::seed_feature_flags;
pub use pricing::{default_plan_definitions, seed_pricing_plans};

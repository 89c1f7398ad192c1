//! # Pricing
//!
//! Subscription pricing: the usage unit catalogue, tiered usage cost
//! resolution, plan generation from plan definitions, and quotes.

pub mod generator;
pub mod model;
pub mod quote;
pub mod tiers;
pub mod units;

use thiserror::Error;

pub use generator::{
    GeneratedPlan, GeneratedPrice, GeneratedUsagePrice, PlanDefinition, PricingPlanGenerator,
    UsageDefinition,
};
pub use model::{BillingPeriod, PricingModel, TiersMode, UsageAggregation, UsageTier};
pub use quote::{Quote, QuoteLine, QuoteRequest, quote};
pub use tiers::{UsageRecord, aggregate_usage, calculate_usage_cost, validate_tiers};
pub use units::{PricingUnit, find_unit, pricing_units};

/// Errors raised by the pricing engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PricingError {
    #[error("at least one usage tier is required")]
    EmptyTiers,
    #[error("first tier must start at 0 or 1, got {from}")]
    InvalidFirstTier { from: i64 },
    #[error("tier {index} must start at {expected}, got {actual}")]
    TierGap {
        index: usize,
        expected: i64,
        actual: i64,
    },
    #[error("tier {index} ends before it starts ({from}..{to})")]
    InvertedTier { index: usize, from: i64, to: i64 },
    #[error("only the last tier may be unbounded (tier {index})")]
    UnboundedTier { index: usize },
    #[error("tier {index} needs a per-unit or flat fee price")]
    UnpricedTier { index: usize },
    #[error("tier {index} has a negative price")]
    NegativePrice { index: usize },
    #[error("usage of {units} units exceeds the last tier (up to {max})")]
    UnitsExceedTiers { units: i64, max: i64 },
    #[error("usage cannot be negative, got {units}")]
    NegativeUnits { units: i64 },
    #[error("total usage does not fit in a 64-bit counter")]
    UsageOverflow,
    #[error("unknown pricing unit '{0}'")]
    UnknownUnit(String),
    #[error("plan '{title}': {reason}")]
    InvalidPlan { title: String, reason: String },
    #[error("currency '{0}' is not supported")]
    UnsupportedCurrency(String),
    #[error("no {billing_period} price in '{currency}' for this product")]
    MissingPrice {
        billing_period: BillingPeriod,
        currency: String,
    },
    #[error("seats must be at least 1, got {0}")]
    InvalidSeats(i64),
    #[error("yearly discount must be in [0, 1), got {0}")]
    InvalidDiscount(f64),
}

/// Rounds a monetary amount to cents.
pub fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

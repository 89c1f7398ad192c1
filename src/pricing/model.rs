//! Pricing vocabulary shared by plans, prices and quotes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How a subscription product is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum PricingModel {
    FlatRate,
    PerSeat,
    UsageBased,
    FlatRateUsageBased,
    OneTime,
}

impl PricingModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingModel::FlatRate => "flat-rate",
            PricingModel::PerSeat => "per-seat",
            PricingModel::UsageBased => "usage-based",
            PricingModel::FlatRateUsageBased => "flat-rate-usage-based",
            PricingModel::OneTime => "one-time",
        }
    }

    /// Whether the model carries a recurring fixed amount.
    pub fn has_recurring_amount(&self) -> bool {
        matches!(
            self,
            PricingModel::FlatRate | PricingModel::PerSeat | PricingModel::FlatRateUsageBased
        )
    }

    /// Whether the model carries metered usage prices.
    pub fn has_usage(&self) -> bool {
        matches!(
            self,
            PricingModel::UsageBased | PricingModel::FlatRateUsageBased
        )
    }
}

impl fmt::Display for PricingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PricingModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat-rate" => Ok(PricingModel::FlatRate),
            "per-seat" => Ok(PricingModel::PerSeat),
            "usage-based" => Ok(PricingModel::UsageBased),
            "flat-rate-usage-based" => Ok(PricingModel::FlatRateUsageBased),
            "one-time" => Ok(PricingModel::OneTime),
            other => Err(format!("unknown pricing model '{other}'")),
        }
    }
}

/// Billing interval of a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Once,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriod::Once => "once",
            BillingPeriod::Daily => "daily",
            BillingPeriod::Weekly => "weekly",
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Quarterly => "quarterly",
            BillingPeriod::Yearly => "yearly",
        }
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(BillingPeriod::Once),
            "daily" => Ok(BillingPeriod::Daily),
            "weekly" => Ok(BillingPeriod::Weekly),
            "monthly" => Ok(BillingPeriod::Monthly),
            "quarterly" => Ok(BillingPeriod::Quarterly),
            "yearly" => Ok(BillingPeriod::Yearly),
            other => Err(format!("unknown billing period '{other}'")),
        }
    }
}

/// How tiered usage is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TiersMode {
    /// Each tier prices only the units that fall inside it
    Graduated,
    /// All units are priced at the tier the total falls into
    Volume,
}

impl TiersMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TiersMode::Graduated => "graduated",
            TiersMode::Volume => "volume",
        }
    }
}

impl FromStr for TiersMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graduated" => Ok(TiersMode::Graduated),
            "volume" => Ok(TiersMode::Volume),
            other => Err(format!("unknown tiers mode '{other}'")),
        }
    }
}

/// How usage records of a billing period are reduced to a billable quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UsageAggregation {
    Sum,
    Max,
    LastDuringPeriod,
}

impl UsageAggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageAggregation::Sum => "sum",
            UsageAggregation::Max => "max",
            UsageAggregation::LastDuringPeriod => "last_during_period",
        }
    }
}

impl FromStr for UsageAggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(UsageAggregation::Sum),
            "max" => Ok(UsageAggregation::Max),
            "last_during_period" => Ok(UsageAggregation::LastDuringPeriod),
            other => Err(format!("unknown usage aggregation '{other}'")),
        }
    }
}

/// One band of a tiered usage price. `to == None` means unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UsageTier {
    pub from: i64,
    #[serde(default)]
    pub to: Option<i64>,
    #[serde(default)]
    pub per_unit_price: Option<f64>,
    #[serde(default)]
    pub flat_fee_price: Option<f64>,
}

impl UsageTier {
    pub fn contains(&self, units: i64) -> bool {
        units >= self.from && self.to.is_none_or(|to| units <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_parse_back() {
        for model in [
            PricingModel::FlatRate,
            PricingModel::PerSeat,
            PricingModel::UsageBased,
            PricingModel::FlatRateUsageBased,
            PricingModel::OneTime,
        ] {
            assert_eq!(model.as_str().parse::<PricingModel>(), Ok(model));
            assert_eq!(
                serde_json::to_value(model).unwrap(),
                serde_json::json!(model.as_str())
            );
        }
        assert_eq!(
            serde_json::to_value(UsageAggregation::LastDuringPeriod).unwrap(),
            serde_json::json!("last_during_period")
        );
        assert!("fortnightly".parse::<BillingPeriod>().is_err());
    }

    #[test]
    fn tier_contains_respects_bounds() {
        let tier = UsageTier {
            from: 11,
            to: Some(100),
            per_unit_price: Some(0.5),
            flat_fee_price: None,
        };
        assert!(!tier.contains(10));
        assert!(tier.contains(11));
        assert!(tier.contains(100));
        assert!(!tier.contains(101));

        let open = UsageTier { to: None, ..tier };
        assert!(open.contains(1_000_000));
    }
}

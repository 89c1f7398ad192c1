//! Tiered usage pricing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::model::{TiersMode, UsageAggregation, UsageTier};
use super::{PricingError, round_money};

/// A single usage measurement reported during a billing period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UsageRecord {
    pub quantity: i64,
    pub recorded_at: DateTime<Utc>,
}

/// Checks that tiers are contiguous, ordered and priced.
pub fn validate_tiers(tiers: &[UsageTier]) -> Result<(), PricingError> {
    let first = tiers.first().ok_or(PricingError::EmptyTiers)?;
    if first.from != 0 && first.from != 1 {
        return Err(PricingError::InvalidFirstTier { from: first.from });
    }

    let last_index = tiers.len() - 1;
    for (index, tier) in tiers.iter().enumerate() {
        if index > 0 {
            // The previous tier is bounded, checked on the previous iteration.
            // One ending at i64::MAX leaves no room for a successor.
            let expected = tiers[index - 1]
                .to
                .and_then(|to| to.checked_add(1))
                .ok_or(PricingError::UnboundedTier { index: index - 1 })?;
            if tier.from != expected {
                return Err(PricingError::TierGap {
                    index,
                    expected,
                    actual: tier.from,
                });
            }
        }

        match tier.to {
            Some(to) if to < tier.from => {
                return Err(PricingError::InvertedTier {
                    index,
                    from: tier.from,
                    to,
                });
            }
            None if index != last_index => return Err(PricingError::UnboundedTier { index }),
            _ => {}
        }

        if tier.per_unit_price.is_none() && tier.flat_fee_price.is_none() {
            return Err(PricingError::UnpricedTier { index });
        }
        if tier.per_unit_price.is_some_and(|p| p < 0.0)
            || tier.flat_fee_price.is_some_and(|p| p < 0.0)
        {
            return Err(PricingError::NegativePrice { index });
        }
    }

    Ok(())
}

/// Cost of `units` under the given tiers, rounded to cents.
///
/// Graduated pricing charges every tier the usage reaches for the units that
/// fall into it, plus that tier's flat fee. Volume pricing charges every unit
/// at the rate of the single tier the total falls into.
pub fn calculate_usage_cost(
    mode: TiersMode,
    tiers: &[UsageTier],
    units: i64,
) -> Result<f64, PricingError> {
    validate_tiers(tiers)?;

    if units < 0 {
        return Err(PricingError::NegativeUnits { units });
    }
    if units == 0 {
        return Ok(0.0);
    }

    if let Some(max) = tiers.last().and_then(|tier| tier.to)
        && units > max
    {
        return Err(PricingError::UnitsExceedTiers { units, max });
    }

    let cost = match mode {
        TiersMode::Graduated => tiers
            .iter()
            .take_while(|tier| tier.from <= units)
            .map(|tier| {
                let start = tier.from.max(1);
                let end = tier.to.map_or(units, |to| to.min(units));
                let quantity = (end - start + 1).max(0);
                if quantity == 0 {
                    return 0.0;
                }
                quantity as f64 * tier.per_unit_price.unwrap_or(0.0)
                    + tier.flat_fee_price.unwrap_or(0.0)
            })
            .sum(),
        TiersMode::Volume => {
            let tier = tiers
                .iter()
                .find(|tier| tier.contains(units))
                .ok_or(PricingError::UnitsExceedTiers {
                    units,
                    max: tiers.last().and_then(|tier| tier.to).unwrap_or(i64::MAX),
                })?;
            units as f64 * tier.per_unit_price.unwrap_or(0.0) + tier.flat_fee_price.unwrap_or(0.0)
        }
    };

    Ok(round_money(cost))
}

/// Reduces a period's usage records to the billable quantity. Records with a
/// negative quantity are rejected.
pub fn aggregate_usage(
    aggregation: UsageAggregation,
    records: &[UsageRecord],
) -> Result<i64, PricingError> {
    if let Some(record) = records.iter().find(|record| record.quantity < 0) {
        return Err(PricingError::NegativeUnits {
            units: record.quantity,
        });
    }

    let units = match aggregation {
        UsageAggregation::Sum => records
            .iter()
            .try_fold(0i64, |total, record| total.checked_add(record.quantity))
            .ok_or(PricingError::UsageOverflow)?,
        UsageAggregation::Max => records
            .iter()
            .map(|record| record.quantity)
            .max()
            .unwrap_or(0),
        UsageAggregation::LastDuringPeriod => records
            .iter()
            .max_by_key(|record| record.recorded_at)
            .map(|record| record.quantity)
            .unwrap_or(0),
    };
    Ok(units)
}

//! Price quotes for a product given seats and expected usage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::generator::GeneratedPlan;
use super::model::{BillingPeriod, PricingModel};
use super::tiers::calculate_usage_cost;
use super::{PricingError, round_money};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QuoteRequest {
    pub billing_period: BillingPeriod,
    pub currency: String,
    #[serde(default = "default_seats")]
    pub seats: i64,
    /// Expected units per catalogue unit name
    #[serde(default)]
    pub usage: BTreeMap<String, i64>,
}

fn default_seats() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QuoteLine {
    pub description: String,
    pub quantity: i64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Quote {
    pub currency: String,
    pub billing_period: BillingPeriod,
    pub lines: Vec<QuoteLine>,
    pub total: f64,
}

/// Prices `request` against a product's prices.
///
/// Usage prices are matched by currency only; each is billed on its own period.
pub fn quote(product: &GeneratedPlan, request: &QuoteRequest) -> Result<Quote, PricingError> {
    if request.seats < 1 {
        return Err(PricingError::InvalidSeats(request.seats));
    }

    let mut lines = Vec::new();

    if product.model.has_recurring_amount() || product.model == PricingModel::OneTime {
        let price = product
            .prices
            .iter()
            .find(|price| {
                price.billing_period == request.billing_period && price.currency == request.currency
            })
            .ok_or_else(|| PricingError::MissingPrice {
                billing_period: request.billing_period,
                currency: request.currency.clone(),
            })?;

        let quantity = if product.model == PricingModel::PerSeat {
            request.seats
        } else {
            1
        };
        lines.push(QuoteLine {
            description: format!("{} ({})", product.title, price.billing_period),
            quantity,
            amount: round_money(price.amount * quantity as f64),
        });
    }

    if product.model.has_usage() {
        let usage_prices: Vec<_> = product
            .usage_prices
            .iter()
            .filter(|usage| usage.currency == request.currency)
            .collect();
        if usage_prices.is_empty() {
            return Err(PricingError::MissingPrice {
                billing_period: request.billing_period,
                currency: request.currency.clone(),
            });
        }

        for usage in usage_prices {
            let units = request.usage.get(&usage.unit).copied().unwrap_or(0);
            let amount = calculate_usage_cost(usage.tiers_mode, &usage.tiers, units)?;
            let title = if units == 1 {
                &usage.unit_title
            } else {
                &usage.unit_title_plural
            };
            lines.push(QuoteLine {
                description: format!("{units} {title} ({})", usage.billing_period),
                quantity: units,
                amount,
            });
        }
    }

    let total = round_money(lines.iter().map(|line| line.amount).sum());
    Ok(Quote {
        currency: request.currency.clone(),
        billing_period: request.billing_period,
        lines,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::generator::{GeneratedPrice, GeneratedUsagePrice};
    use crate::pricing::model::{TiersMode, UsageAggregation, UsageTier};

    fn product(model: PricingModel) -> GeneratedPlan {
        GeneratedPlan {
            title: "Pro".to_string(),
            description: None,
            order: 1,
            model,
            badge: None,
            public: true,
            features: Vec::new(),
            prices: vec![
                GeneratedPrice {
                    billing_period: BillingPeriod::Monthly,
                    currency: "usd".to_string(),
                    amount: 12.5,
                },
                GeneratedPrice {
                    billing_period: BillingPeriod::Yearly,
                    currency: "usd".to_string(),
                    amount: 124.5,
                },
            ],
            usage_prices: Vec::new(),
        }
    }

    fn request(period: BillingPeriod, seats: i64) -> QuoteRequest {
        QuoteRequest {
            billing_period: period,
            currency: "usd".to_string(),
            seats,
            usage: BTreeMap::new(),
        }
    }

    #[test]
    fn per_seat_multiplies_by_seats() {
        let quote = quote(&product(PricingModel::PerSeat), &request(BillingPeriod::Monthly, 4))
            .unwrap();
        assert_eq!(quote.lines.len(), 1);
        assert_eq!(quote.lines[0].quantity, 4);
        assert_eq!(quote.total, 50.0);
    }

    #[test]
    fn flat_rate_ignores_seats() {
        let quote = quote(&product(PricingModel::FlatRate), &request(BillingPeriod::Yearly, 9))
            .unwrap();
        assert_eq!(quote.total, 124.5);
        assert_eq!(quote.lines[0].description, "Pro (yearly)");
    }

    #[test]
    fn usage_lines_are_added() {
        let mut product = product(PricingModel::FlatRateUsageBased);
        product.usage_prices.push(GeneratedUsagePrice {
            unit: "api".to_string(),
            unit_title: "API call".to_string(),
            unit_title_plural: "API calls".to_string(),
            currency: "usd".to_string(),
            billing_period: BillingPeriod::Monthly,
            tiers_mode: TiersMode::Volume,
            aggregation: UsageAggregation::Sum,
            tiers: vec![UsageTier {
                from: 0,
                to: None,
                per_unit_price: Some(0.01),
                flat_fee_price: None,
            }],
        });

        let mut req = request(BillingPeriod::Monthly, 1);
        req.usage.insert("api".to_string(), 1500);

        let quote = quote(&product, &req).unwrap();
        assert_eq!(quote.lines.len(), 2);
        assert_eq!(quote.lines[1].description, "1500 API calls (monthly)");
        assert_eq!(quote.lines[1].amount, 15.0);
        assert_eq!(quote.total, 27.5);
    }

    #[test]
    fn missing_price_and_bad_seats_fail() {
        let mut req = request(BillingPeriod::Monthly, 1);
        req.currency = "mxn".to_string();
        assert_eq!(
            quote(&product(PricingModel::FlatRate), &req),
            Err(PricingError::MissingPrice {
                billing_period: BillingPeriod::Monthly,
                currency: "mxn".to_string(),
            })
        );

        assert_eq!(
            quote(&product(PricingModel::PerSeat), &request(BillingPeriod::Monthly, 0)),
            Err(PricingError::InvalidSeats(0))
        );
    }
}

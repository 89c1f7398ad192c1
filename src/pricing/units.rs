//! Catalogue of metered units a usage-based price may charge for.

use serde::Serialize;
use utoipa::ToSchema;

/// A unit usage can be measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PricingUnit {
    pub name: &'static str,
    pub title: &'static str,
    pub title_plural: &'static str,
}

const PRICING_UNITS: [PricingUnit; 6] = [
    PricingUnit {
        name: "api",
        title: "API call",
        title_plural: "API calls",
    },
    PricingUnit {
        name: "email",
        title: "email",
        title_plural: "emails",
    },
    PricingUnit {
        name: "sms",
        title: "SMS",
        title_plural: "SMS",
    },
    PricingUnit {
        name: "contact",
        title: "contact",
        title_plural: "contacts",
    },
    PricingUnit {
        name: "row",
        title: "row",
        title_plural: "rows",
    },
    PricingUnit {
        name: "storage_gb",
        title: "GB of storage",
        title_plural: "GB of storage",
    },
];

/// The fixed unit catalogue, in display order.
pub fn pricing_units() -> &'static [PricingUnit] {
    &PRICING_UNITS
}

pub fn find_unit(name: &str) -> Option<&'static PricingUnit> {
    PRICING_UNITS.iter().find(|unit| unit.name == name)
}

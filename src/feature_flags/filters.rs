//! # Feature Flag Filters
//!
//! Filter catalogue and the matcher that compares a single filter against an
//! [`EvaluationContext`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::bucket::rollout_bucket;
use super::context::EvaluationContext;

/// Errors raised while interpreting a filter definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unknown filter type '{0}'")]
    UnknownType(String),
    #[error("filter '{filter_type}' requires a value")]
    MissingValue { filter_type: &'static str },
    #[error("invalid value '{value}' for filter '{filter_type}': {reason}")]
    InvalidValue {
        filter_type: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Every supported targeting rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum FilterType {
    #[serde(rename = "percentage")]
    Percentage,
    #[serde(rename = "session.logged_in")]
    SessionLoggedIn,
    #[serde(rename = "session.logged_out")]
    SessionLoggedOut,
    #[serde(rename = "session.darkMode")]
    SessionDarkMode,
    #[serde(rename = "session.lightMode")]
    SessionLightMode,
    #[serde(rename = "session.language")]
    SessionLanguage,
    #[serde(rename = "page.is")]
    PageIs,
    #[serde(rename = "page.startsWith")]
    PageStartsWith,
    #[serde(rename = "analytics.visitor.new")]
    AnalyticsVisitorNew,
    #[serde(rename = "analytics.visitor.returning")]
    AnalyticsVisitorReturning,
    #[serde(rename = "analytics.via.utm_source")]
    AnalyticsUtmSource,
    #[serde(rename = "analytics.via.utm_medium")]
    AnalyticsUtmMedium,
    #[serde(rename = "analytics.via.utm_campaign")]
    AnalyticsUtmCampaign,
    #[serde(rename = "analytics.via.referrer")]
    AnalyticsReferrer,
    #[serde(rename = "analytics.browser")]
    AnalyticsBrowser,
    #[serde(rename = "analytics.os")]
    AnalyticsOs,
    #[serde(rename = "analytics.device")]
    AnalyticsDevice,
    #[serde(rename = "analytics.country")]
    AnalyticsCountry,
    #[serde(rename = "analytics.region")]
    AnalyticsRegion,
    #[serde(rename = "analytics.city")]
    AnalyticsCity,
    #[serde(rename = "user.is")]
    UserIs,
    #[serde(rename = "user.language")]
    UserLanguage,
    #[serde(rename = "user.email.domain")]
    UserEmailDomain,
    #[serde(rename = "user.admin")]
    UserAdmin,
    #[serde(rename = "user.createdAfter")]
    UserCreatedAfter,
    #[serde(rename = "user.createdBefore")]
    UserCreatedBefore,
    #[serde(rename = "user.roles.contains")]
    UserRolesContains,
    #[serde(rename = "user.roles.notContains")]
    UserRolesNotContains,
    #[serde(rename = "tenant.is")]
    TenantIs,
    #[serde(rename = "tenant.subscription.products.has")]
    TenantSubscriptionProductsHas,
    #[serde(rename = "tenant.subscription.active")]
    TenantSubscriptionActive,
    #[serde(rename = "tenant.subscription.inactive")]
    TenantSubscriptionInactive,
    #[serde(rename = "date.after")]
    DateAfter,
    #[serde(rename = "date.before")]
    DateBefore,
}

impl FilterType {
    /// All filter types in catalogue order.
    pub const ALL: [FilterType; 34] = [
        FilterType::Percentage,
        FilterType::SessionLoggedIn,
        FilterType::SessionLoggedOut,
        FilterType::SessionDarkMode,
        FilterType::SessionLightMode,
        FilterType::SessionLanguage,
        FilterType::PageIs,
        FilterType::PageStartsWith,
        FilterType::AnalyticsVisitorNew,
        FilterType::AnalyticsVisitorReturning,
        FilterType::AnalyticsUtmSource,
        FilterType::AnalyticsUtmMedium,
        FilterType::AnalyticsUtmCampaign,
        FilterType::AnalyticsReferrer,
        FilterType::AnalyticsBrowser,
        FilterType::AnalyticsOs,
        FilterType::AnalyticsDevice,
        FilterType::AnalyticsCountry,
        FilterType::AnalyticsRegion,
        FilterType::AnalyticsCity,
        FilterType::UserIs,
        FilterType::UserLanguage,
        FilterType::UserEmailDomain,
        FilterType::UserAdmin,
        FilterType::UserCreatedAfter,
        FilterType::UserCreatedBefore,
        FilterType::UserRolesContains,
        FilterType::UserRolesNotContains,
        FilterType::TenantIs,
        FilterType::TenantSubscriptionProductsHas,
        FilterType::TenantSubscriptionActive,
        FilterType::TenantSubscriptionInactive,
        FilterType::DateAfter,
        FilterType::DateBefore,
    ];

    /// Wire name stored in the database and accepted by the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterType::Percentage => "percentage",
            FilterType::SessionLoggedIn => "session.logged_in",
            FilterType::SessionLoggedOut => "session.logged_out",
            FilterType::SessionDarkMode => "session.darkMode",
            FilterType::SessionLightMode => "session.lightMode",
            FilterType::SessionLanguage => "session.language",
            FilterType::PageIs => "page.is",
            FilterType::PageStartsWith => "page.startsWith",
            FilterType::AnalyticsVisitorNew => "analytics.visitor.new",
            FilterType::AnalyticsVisitorReturning => "analytics.visitor.returning",
            FilterType::AnalyticsUtmSource => "analytics.via.utm_source",
            FilterType::AnalyticsUtmMedium => "analytics.via.utm_medium",
            FilterType::AnalyticsUtmCampaign => "analytics.via.utm_campaign",
            FilterType::AnalyticsReferrer => "analytics.via.referrer",
            FilterType::AnalyticsBrowser => "analytics.browser",
            FilterType::AnalyticsOs => "analytics.os",
            FilterType::AnalyticsDevice => "analytics.device",
            FilterType::AnalyticsCountry => "analytics.country",
            FilterType::AnalyticsRegion => "analytics.region",
            FilterType::AnalyticsCity => "analytics.city",
            FilterType::UserIs => "user.is",
            FilterType::UserLanguage => "user.language",
            FilterType::UserEmailDomain => "user.email.domain",
            FilterType::UserAdmin => "user.admin",
            FilterType::UserCreatedAfter => "user.createdAfter",
            FilterType::UserCreatedBefore => "user.createdBefore",
            FilterType::UserRolesContains => "user.roles.contains",
            FilterType::UserRolesNotContains => "user.roles.notContains",
            FilterType::TenantIs => "tenant.is",
            FilterType::TenantSubscriptionProductsHas => "tenant.subscription.products.has",
            FilterType::TenantSubscriptionActive => "tenant.subscription.active",
            FilterType::TenantSubscriptionInactive => "tenant.subscription.inactive",
            FilterType::DateAfter => "date.after",
            FilterType::DateBefore => "date.before",
        }
    }

    /// Whether the filter compares against a configured value.
    pub fn requires_value(&self) -> bool {
        !matches!(
            self,
            FilterType::SessionLoggedIn
                | FilterType::SessionLoggedOut
                | FilterType::SessionDarkMode
                | FilterType::SessionLightMode
                | FilterType::AnalyticsVisitorNew
                | FilterType::AnalyticsVisitorReturning
                | FilterType::UserAdmin
                | FilterType::TenantSubscriptionActive
                | FilterType::TenantSubscriptionInactive
        )
    }

    /// Every filter type with its value requirement, in catalogue order.
    pub fn all() -> Vec<FilterTypeInfo> {
        FilterType::ALL
            .iter()
            .map(|filter_type| FilterTypeInfo {
                name: filter_type.as_str(),
                requires_value: filter_type.requires_value(),
            })
            .collect()
    }
}

/// Catalogue entry returned by [`FilterType::all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct FilterTypeInfo {
    pub name: &'static str,
    pub requires_value: bool,
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterType {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterType::ALL
            .iter()
            .copied()
            .find(|filter_type| filter_type.as_str() == s)
            .ok_or_else(|| FilterError::UnknownType(s.to_string()))
    }
}

/// A single targeting rule attached to a flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FeatureFlagFilter {
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    #[serde(default)]
    pub value: Option<String>,
}

impl FeatureFlagFilter {
    pub fn new(filter_type: FilterType, value: Option<&str>) -> Self {
        Self {
            filter_type,
            value: value.map(str::to_string),
        }
    }

    /// Checks the value shape without evaluating it against a context.
    pub fn validate(&self) -> Result<(), FilterError> {
        if !self.filter_type.requires_value() {
            return Ok(());
        }
        let value = self.required_value()?;
        match self.filter_type {
            FilterType::Percentage => parse_percentage(value).map(|_| ()),
            FilterType::UserCreatedAfter
            | FilterType::UserCreatedBefore
            | FilterType::DateAfter
            | FilterType::DateBefore => parse_date_value(self.filter_type, value).map(|_| ()),
            _ => Ok(()),
        }
    }

    fn required_value(&self) -> Result<&str, FilterError> {
        self.value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(FilterError::MissingValue {
                filter_type: self.filter_type.as_str(),
            })
    }
}

/// Evaluates filters against an evaluation context.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureFlagsFiltersService;

impl FeatureFlagsFiltersService {
    pub fn new() -> Self {
        Self
    }

    /// Returns whether `filter`, attached to the flag `flag_name`, matches `ctx`.
    pub fn matches(
        &self,
        flag_name: &str,
        filter: &FeatureFlagFilter,
        ctx: &EvaluationContext,
    ) -> Result<bool, FilterError> {
        let filter_type = filter.filter_type;
        let value = if filter_type.requires_value() {
            Some(filter.required_value()?)
        } else {
            None
        };
        let value = value.unwrap_or_default();

        let matched = match filter_type {
            FilterType::Percentage => {
                let percentage = parse_percentage(value)?;
                match ctx.rollout_subject() {
                    Some(subject) => rollout_bucket(flag_name, subject) < percentage,
                    None => false,
                }
            }

            FilterType::SessionLoggedIn => ctx.is_logged_in(),
            FilterType::SessionLoggedOut => !ctx.is_logged_in(),
            FilterType::SessionDarkMode => ctx.session.dark_mode == Some(true),
            FilterType::SessionLightMode => ctx.session.dark_mode == Some(false),
            FilterType::SessionLanguage => eq_opt(ctx.session.language.as_deref(), value),

            FilterType::PageIs => ctx
                .session
                .path
                .as_deref()
                .map(|path| normalize_path(path) == normalize_path(value))
                .unwrap_or(false),
            FilterType::PageStartsWith => ctx
                .session
                .path
                .as_deref()
                .map(|path| normalize_path(path).starts_with(&normalize_path(value)))
                .unwrap_or(false),

            FilterType::AnalyticsVisitorNew => ctx
                .analytics
                .as_ref()
                .map(|analytics| analytics.page_views <= 1)
                .unwrap_or(false),
            FilterType::AnalyticsVisitorReturning => ctx
                .analytics
                .as_ref()
                .map(|analytics| analytics.page_views > 1)
                .unwrap_or(false),
            FilterType::AnalyticsUtmSource => {
                analytics_eq(ctx, value, |a| a.utm_source.as_deref())
            }
            FilterType::AnalyticsUtmMedium => {
                analytics_eq(ctx, value, |a| a.utm_medium.as_deref())
            }
            FilterType::AnalyticsUtmCampaign => {
                analytics_eq(ctx, value, |a| a.utm_campaign.as_deref())
            }
            FilterType::AnalyticsReferrer => ctx
                .analytics
                .as_ref()
                .and_then(|analytics| analytics.referrer.as_deref())
                .map(|referrer| referrer.to_lowercase().contains(&value.to_lowercase()))
                .unwrap_or(false),
            FilterType::AnalyticsBrowser => analytics_eq(ctx, value, |a| a.browser.as_deref()),
            FilterType::AnalyticsOs => analytics_eq(ctx, value, |a| a.os.as_deref()),
            FilterType::AnalyticsDevice => analytics_eq(ctx, value, |a| a.device.as_deref()),
            FilterType::AnalyticsCountry => analytics_eq(ctx, value, |a| a.country.as_deref()),
            FilterType::AnalyticsRegion => analytics_eq(ctx, value, |a| a.region.as_deref()),
            FilterType::AnalyticsCity => analytics_eq(ctx, value, |a| a.city.as_deref()),

            FilterType::UserIs => ctx
                .user
                .as_ref()
                .map(|user| user.id == value || user.email.eq_ignore_ascii_case(value))
                .unwrap_or(false),
            FilterType::UserLanguage => ctx
                .user
                .as_ref()
                .map(|user| eq_opt(user.language.as_deref(), value))
                .unwrap_or(false),
            FilterType::UserEmailDomain => ctx
                .user
                .as_ref()
                .and_then(|user| user.email.rsplit_once('@'))
                .map(|(_, domain)| domain.eq_ignore_ascii_case(value.trim_start_matches('@')))
                .unwrap_or(false),
            FilterType::UserAdmin => ctx.user.as_ref().map(|user| user.is_admin).unwrap_or(false),
            FilterType::UserCreatedAfter => {
                let threshold = parse_date_value(filter_type, value)?;
                ctx.user
                    .as_ref()
                    .and_then(|user| user.created_at)
                    .map(|created_at| created_at > threshold)
                    .unwrap_or(false)
            }
            FilterType::UserCreatedBefore => {
                let threshold = parse_date_value(filter_type, value)?;
                ctx.user
                    .as_ref()
                    .and_then(|user| user.created_at)
                    .map(|created_at| created_at < threshold)
                    .unwrap_or(false)
            }
            FilterType::UserRolesContains => ctx
                .user
                .as_ref()
                .map(|user| user.roles.iter().any(|role| role.eq_ignore_ascii_case(value)))
                .unwrap_or(false),
            FilterType::UserRolesNotContains => ctx
                .user
                .as_ref()
                .map(|user| !user.roles.iter().any(|role| role.eq_ignore_ascii_case(value)))
                .unwrap_or(false),

            FilterType::TenantIs => ctx
                .tenant
                .as_ref()
                .map(|tenant| {
                    tenant.id.to_string().eq_ignore_ascii_case(value)
                        || tenant.slug.as_deref() == Some(value)
                })
                .unwrap_or(false),
            FilterType::TenantSubscriptionProductsHas => ctx
                .tenant
                .as_ref()
                .map(|tenant| {
                    tenant.active_products().any(|product| {
                        product.id.to_string().eq_ignore_ascii_case(value)
                            || product.title.eq_ignore_ascii_case(value)
                    })
                })
                .unwrap_or(false),
            FilterType::TenantSubscriptionActive => ctx
                .tenant
                .as_ref()
                .map(|tenant| tenant.active_products().next().is_some())
                .unwrap_or(false),
            FilterType::TenantSubscriptionInactive => ctx
                .tenant
                .as_ref()
                .map(|tenant| tenant.active_products().next().is_none())
                .unwrap_or(false),

            FilterType::DateAfter => ctx.now > parse_date_value(filter_type, value)?,
            FilterType::DateBefore => ctx.now < parse_date_value(filter_type, value)?,
        };

        Ok(matched)
    }
}

fn eq_opt(actual: Option<&str>, expected: &str) -> bool {
    actual
        .map(|actual| actual.trim().eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

fn analytics_eq<F>(ctx: &EvaluationContext, expected: &str, field: F) -> bool
where
    F: Fn(&super::context::AnalyticsContext) -> Option<&str>,
{
    ctx.analytics
        .as_ref()
        .map(|analytics| eq_opt(field(analytics), expected))
        .unwrap_or(false)
}

fn parse_percentage(value: &str) -> Result<u8, FilterError> {
    let parsed: u8 = value
        .trim_end_matches('%')
        .parse()
        .map_err(|_| FilterError::InvalidValue {
            filter_type: FilterType::Percentage.as_str(),
            value: value.to_string(),
            reason: "expected an integer between 0 and 100",
        })?;
    if parsed > 100 {
        return Err(FilterError::InvalidValue {
            filter_type: FilterType::Percentage.as_str(),
            value: value.to_string(),
            reason: "expected an integer between 0 and 100",
        });
    }
    Ok(parsed)
}

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates (midnight UTC).
fn parse_date_value(filter_type: FilterType, value: &str) -> Result<DateTime<Utc>, FilterError> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| FilterError::InvalidValue {
            filter_type: filter_type.as_str(),
            value: value.to_string(),
            reason: "expected an RFC 3339 timestamp or YYYY-MM-DD date",
        })
}

/// Reduces a path or absolute URL to a comparable path without trailing slash.
fn normalize_path(raw: &str) -> String {
    let path = match url::Url::parse(raw) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_type_round_trips_wire_names() {
        for filter_type in FilterType::ALL {
            assert_eq!(filter_type.as_str().parse::<FilterType>(), Ok(filter_type));
            let json = serde_json::to_string(&filter_type).unwrap();
            assert_eq!(json, format!("\"{}\"", filter_type.as_str()));
        }
    }

    #[test]
    fn catalogue_lists_value_requirements() {
        let all = FilterType::all();
        assert_eq!(all.len(), 34);
        assert_eq!(
            all[0],
            FilterTypeInfo {
                name: "percentage",
                requires_value: true
            }
        );
        let logged_in = all.iter().find(|info| info.name == "session.logged_in");
        assert_eq!(logged_in.map(|info| info.requires_value), Some(false));
    }

    #[test]
    fn unknown_filter_type_is_rejected() {
        assert_eq!(
            "user.favoriteColor".parse::<FilterType>(),
            Err(FilterError::UnknownType("user.favoriteColor".to_string()))
        );
    }

    #[test]
    fn normalize_path_handles_urls_and_slashes() {
        assert_eq!(normalize_path("https://acme.io/pricing/?plan=pro"), "/pricing");
        assert_eq!(normalize_path("/pricing/"), "/pricing");
        assert_eq!(normalize_path("pricing"), "/pricing");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/Docs#intro"), "/Docs");
    }

    #[test]
    fn parse_date_value_accepts_both_formats() {
        let day = parse_date_value(FilterType::DateAfter, "2025-01-31").unwrap();
        assert_eq!(day.to_rfc3339(), "2025-01-31T00:00:00+00:00");

        let ts = parse_date_value(FilterType::DateAfter, "2025-01-31T10:00:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-01-31T08:00:00+00:00");

        assert!(parse_date_value(FilterType::DateAfter, "31/01/2025").is_err());
    }

    #[test]
    fn validate_rejects_bad_percentages() {
        let ok = FeatureFlagFilter::new(FilterType::Percentage, Some("30"));
        assert!(ok.validate().is_ok());

        let too_big = FeatureFlagFilter::new(FilterType::Percentage, Some("130"));
        assert!(matches!(too_big.validate(), Err(FilterError::InvalidValue { .. })));

        let missing = FeatureFlagFilter::new(FilterType::Percentage, None);
        assert_eq!(
            missing.validate(),
            Err(FilterError::MissingValue {
                filter_type: "percentage"
            })
        );
    }

    #[test]
    fn value_less_filters_validate_without_value() {
        let filter = FeatureFlagFilter::new(FilterType::SessionLoggedIn, None);
        assert!(filter.validate().is_ok());
    }
}

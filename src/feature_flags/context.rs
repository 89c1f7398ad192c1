//! Evaluation context handed to the filter matcher.
//!
//! Every facet is optional: a filter that targets a facet the caller did not
//! provide simply does not match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Request/session facts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SessionContext {
    /// Identifier of the logged-in user, absent for anonymous sessions
    #[serde(default)]
    pub user_id: Option<String>,
    /// Whether the visitor uses the dark color scheme
    #[serde(default)]
    pub dark_mode: Option<bool>,
    /// Active UI language (e.g. "en", "es")
    #[serde(default)]
    pub language: Option<String>,
    /// Path or absolute URL of the page being rendered
    #[serde(default)]
    pub path: Option<String>,
}

/// The logged-in user, as already fetched by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserContext {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Role names assigned to the user in the current tenant
    #[serde(default)]
    pub roles: Vec<String>,
}

/// A product the tenant is (or was) subscribed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SubscribedProduct {
    pub id: Uuid,
    pub title: String,
    pub active: bool,
}

/// The tenant the request is scoped to.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TenantContext {
    pub id: Uuid,
    #[serde(default)]
    pub slug: Option<String>,
    /// Subscription products; `None` means "not loaded yet" and lets the
    /// service fill them from the database.
    #[serde(default)]
    pub subscription_products: Option<Vec<SubscribedProduct>>,
}

impl TenantContext {
    /// Products whose subscription is currently active.
    pub fn active_products(&self) -> impl Iterator<Item = &SubscribedProduct> {
        self.subscription_products
            .iter()
            .flatten()
            .filter(|product| product.active)
    }
}

/// Unique-visitor analytics record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AnalyticsContext {
    /// Anonymous visitor identifier (analytics cookie)
    pub visitor_id: String,
    /// Page views recorded for this visitor, including the current one
    #[serde(default)]
    pub page_views: u32,
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

/// Everything a filter may look at.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EvaluationContext {
    #[serde(default)]
    pub session: SessionContext,
    #[serde(default)]
    pub user: Option<UserContext>,
    #[serde(default)]
    pub tenant: Option<TenantContext>,
    #[serde(default)]
    pub analytics: Option<AnalyticsContext>,
    /// Evaluation instant, defaults to the current time
    #[serde(default = "Utc::now")]
    pub now: DateTime<Utc>,
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self {
            session: SessionContext::default(),
            user: None,
            tenant: None,
            analytics: None,
            now: Utc::now(),
        }
    }
}

impl EvaluationContext {
    /// Identity used for percentage rollouts: the user, then the session's
    /// user id, then the analytics visitor.
    pub fn rollout_subject(&self) -> Option<&str> {
        self.user
            .as_ref()
            .map(|user| user.id.as_str())
            .or(self.session.user_id.as_deref())
            .or_else(|| {
                self.analytics
                    .as_ref()
                    .map(|analytics| analytics.visitor_id.as_str())
                    .filter(|id| !id.is_empty())
            })
    }

    /// Whether the session belongs to a logged-in user.
    pub fn is_logged_in(&self) -> bool {
        self.session.user_id.is_some() || self.user.is_some()
    }
}

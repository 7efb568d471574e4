//! Per-user subscription records.
//!
//! Billing reconciliation happens outside this service; these records are
//! maintained through the admin surface and read to resolve a team's plan.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::plan::PlanTier;

/// Billing status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    /// Payment failed; plan benefits continue during the grace period
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's subscription. A missing record means the free tier.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UserSubscription {
    /// Subscriber user ID
    pub user_id: String,

    /// Paid-for plan tier
    #[serde(default)]
    pub plan: PlanTier,

    /// Billing status
    #[serde(default)]
    pub status: SubscriptionStatus,

    /// End of the current billing period, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl UserSubscription {
    pub fn new(user_id: impl Into<String>, plan: PlanTier) -> Self {
        Self {
            user_id: user_id.into(),
            plan,
            status: SubscriptionStatus::Active,
            current_period_end: None,
            updated_at: Utc::now(),
        }
    }

    /// The plan that actually applies: canceled subscriptions drop to Free,
    /// past-due keeps its plan for the grace period.
    pub fn effective_plan(&self) -> PlanTier {
        match self.status {
            SubscriptionStatus::Active | SubscriptionStatus::PastDue => self.plan,
            SubscriptionStatus::Canceled => PlanTier::Free,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_plan_for_active() {
        let sub = UserSubscription::new("user-1", PlanTier::Pro);
        assert_eq!(sub.effective_plan(), PlanTier::Pro);
    }

    #[test]
    fn test_effective_plan_drops_on_cancel() {
        let mut sub = UserSubscription::new("user-1", PlanTier::Studio);
        sub.status = SubscriptionStatus::Canceled;
        assert_eq!(sub.effective_plan(), PlanTier::Free);
    }

    #[test]
    fn test_past_due_keeps_plan() {
        let mut sub = UserSubscription::new("user-1", PlanTier::Pro);
        sub.status = SubscriptionStatus::PastDue;
        assert_eq!(sub.effective_plan(), PlanTier::Pro);
    }
}

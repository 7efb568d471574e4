//! Subscription handler.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use adreel_firestore::SubscriptionRepository;
use adreel_models::{PlanTier, SubscriptionStatus};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct SubscriptionResponse {
    pub plan: PlanTier,
    pub status: SubscriptionStatus,
    /// Plan after applying the subscription status (canceled drops to free)
    pub effective_plan: PlanTier,
    pub monthly_credits: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The caller's subscription. No stored record means the free tier.
pub async fn get_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<SubscriptionResponse>> {
    let record = SubscriptionRepository::new((*state.firestore).clone())
        .get(&user.uid)
        .await?;

    let response = match record {
        Some(sub) => {
            let effective = sub.effective_plan();
            SubscriptionResponse {
                plan: sub.plan,
                status: sub.status,
                effective_plan: effective,
                monthly_credits: effective.monthly_credits(),
                current_period_end: sub.current_period_end,
                updated_at: Some(sub.updated_at),
            }
        }
        None => SubscriptionResponse {
            plan: PlanTier::Free,
            status: SubscriptionStatus::Active,
            effective_plan: PlanTier::Free,
            monthly_credits: PlanTier::Free.monthly_credits(),
            current_period_end: None,
            updated_at: None,
        },
    };

    Ok(Json(response))
}

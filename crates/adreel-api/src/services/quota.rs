//! Plan resolution and credit reservation.
//!
//! A team's allowance comes from its owner's subscription. Credits are
//! reserved before a job is enqueued and are not refunded on failure.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use adreel_firestore::{
    CreditChargeOutcome, CreditChargeResult, FirestoreClient, SubscriptionRepository,
    TeamRepository,
};
use adreel_models::{PlanTier, Team};

use crate::error::{ApiError, ApiResult};

/// A team's usage against its monthly allowance.
#[derive(Debug, Clone, Serialize)]
pub struct TeamUsage {
    pub plan: PlanTier,
    pub monthly_credits: u32,
    pub credits_used: u32,
    pub credits_remaining: u32,
    /// Month the counter belongs to ("YYYY-MM")
    pub month: String,
}

/// Quota service resolving plans and reserving credits.
#[derive(Clone)]
pub struct QuotaService {
    firestore: Arc<FirestoreClient>,
}

impl QuotaService {
    pub fn new(firestore: Arc<FirestoreClient>) -> Self {
        Self { firestore }
    }

    /// The plan that applies to a team, via its owner's subscription.
    pub async fn plan_for_team(&self, team: &Team) -> ApiResult<PlanTier> {
        let subs = SubscriptionRepository::new((*self.firestore).clone());
        Ok(subs.plan_for(&team.owner_id).await?)
    }

    /// Reserve credits against the team's monthly allowance.
    ///
    /// Fails with 402 when the allowance would be exceeded. The reservation
    /// is atomic with respect to concurrent requests for the same team.
    pub async fn reserve_credits(
        &self,
        team: &Team,
        credits: u32,
    ) -> ApiResult<CreditChargeResult> {
        let plan = self.plan_for_team(team).await?;
        let limit = plan.monthly_credits();

        let teams = TeamRepository::new((*self.firestore).clone());
        match teams.charge_credits(&team.team_id, credits, limit).await? {
            CreditChargeOutcome::Charged(result) => {
                info!(
                    team_id = %team.team_id,
                    plan = %plan,
                    credits = credits,
                    used_after = result.credits_used_after,
                    "Reserved render credits"
                );
                Ok(result)
            }
            CreditChargeOutcome::InsufficientCredits {
                used,
                requested,
                limit,
            } => Err(ApiError::payment_required(format!(
                "Monthly credit allowance exhausted: {} of {} used, {} requested",
                used, limit, requested
            ))),
        }
    }

    /// Current usage summary for a team.
    pub async fn usage(&self, team: &Team) -> ApiResult<TeamUsage> {
        let plan = self.plan_for_team(team).await?;
        let limit = plan.monthly_credits();

        let teams = TeamRepository::new((*self.firestore).clone());
        let used = teams.credits_used(&team.team_id).await?;

        Ok(TeamUsage {
            plan,
            monthly_credits: limit,
            credits_used: used,
            credits_remaining: limit.saturating_sub(used),
            month: adreel_models::current_usage_month(),
        })
    }
}

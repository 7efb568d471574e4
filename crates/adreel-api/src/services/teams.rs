//! Team membership and access checks.

use std::sync::Arc;

use tracing::{debug, info};

use adreel_firestore::{FirestoreClient, TeamRepository};
use adreel_models::{Team, TeamId, TeamMember, TeamRole};

use crate::error::{ApiError, ApiResult};

/// Team service for membership resolution and access control.
///
/// Non-members get "not found" rather than "forbidden" so that team IDs
/// cannot be probed.
#[derive(Clone)]
pub struct TeamService {
    firestore: Arc<FirestoreClient>,
}

impl TeamService {
    pub fn new(firestore: Arc<FirestoreClient>) -> Self {
        Self { firestore }
    }

    fn repo(&self) -> TeamRepository {
        TeamRepository::new((*self.firestore).clone())
    }

    /// Get the user's personal team, creating it on first touch.
    pub async fn ensure_personal_team(&self, uid: &str, email: Option<&str>) -> ApiResult<Team> {
        let repo = self.repo();

        let teams = repo.teams_for_user(uid).await?;
        if let Some(team) = teams.into_iter().find(|t| t.personal && t.owner_id == uid) {
            return Ok(team);
        }

        let team = Team::personal(uid);
        let owner = TeamMember::new(uid, email.unwrap_or_default(), TeamRole::Owner);
        repo.create_with_owner(&team, &owner).await?;
        info!(uid = %uid, team_id = %team.team_id, "Created personal team");
        Ok(team)
    }

    /// All teams the user belongs to.
    pub async fn teams_for_user(&self, uid: &str) -> ApiResult<Vec<Team>> {
        Ok(self.repo().teams_for_user(uid).await?)
    }

    /// Load a team and the caller's membership, or 404.
    pub async fn require_member(
        &self,
        team_id: &TeamId,
        uid: &str,
    ) -> ApiResult<(Team, TeamMember)> {
        let repo = self.repo();

        let team = repo
            .get(team_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Team not found"))?;

        let member = repo
            .get_member(team_id, uid)
            .await?
            .ok_or_else(|| {
                debug!(team_id = %team_id, uid = %uid, "Membership check failed");
                ApiError::not_found("Team not found")
            })?;

        Ok((team, member))
    }

    /// Like [`require_member`](Self::require_member), but the caller must
    /// hold a role that can manage the team.
    pub async fn require_manager(
        &self,
        team_id: &TeamId,
        uid: &str,
    ) -> ApiResult<(Team, TeamMember)> {
        let (team, member) = self.require_member(team_id, uid).await?;
        if !member.role.can_manage() {
            return Err(ApiError::forbidden("Team admin role required"));
        }
        Ok((team, member))
    }

    /// Resolve the team a request targets: an explicit `team_id` must be a
    /// team the caller belongs to; otherwise the personal team is used.
    pub async fn resolve_team(
        &self,
        uid: &str,
        email: Option<&str>,
        team_id: Option<&str>,
    ) -> ApiResult<Team> {
        match team_id {
            Some(id) => {
                let (team, _) = self.require_member(&TeamId::from_string(id), uid).await?;
                Ok(team)
            }
            None => self.ensure_personal_team(uid, email).await,
        }
    }

    /// Add a member to a team (used on invitation acceptance).
    pub async fn add_member(&self, team_id: &TeamId, member: &TeamMember) -> ApiResult<()> {
        self.repo().add_member(team_id, member).await?;
        Ok(())
    }

    /// Remove a member. Owners cannot be removed, and members can only be
    /// removed by a manager or by themselves (leaving).
    pub async fn remove_member(
        &self,
        team_id: &TeamId,
        caller: &TeamMember,
        target_user_id: &str,
    ) -> ApiResult<()> {
        let repo = self.repo();

        let target = repo
            .get_member(team_id, target_user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Member not found"))?;

        if target.role == TeamRole::Owner {
            return Err(ApiError::bad_request("The team owner cannot be removed"));
        }

        let removing_self = caller.user_id == target_user_id;
        if !removing_self && !caller.role.can_manage() {
            return Err(ApiError::forbidden("Team admin role required"));
        }

        repo.remove_member(team_id, target_user_id).await?;
        info!(
            team_id = %team_id,
            removed = %target_user_id,
            by = %caller.user_id,
            "Removed team member"
        );
        Ok(())
    }

    /// List members of a team.
    pub async fn list_members(&self, team_id: &TeamId) -> ApiResult<Vec<TeamMember>> {
        Ok(self.repo().list_members(team_id).await?)
    }
}

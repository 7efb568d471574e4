//! Team management handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use adreel_firestore::TeamRepository;
use adreel_models::{Team, TeamId, TeamMember, TeamRole};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::services::TeamUsage;
use crate::state::AppState;

const MAX_TEAM_NAME_LENGTH: usize = 100;

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct TeamResponse {
    #[serde(flatten)]
    pub team: Team,
    /// Caller's role in the team
    pub role: String,
}

/// Create a team with the caller as owner.
pub async fn create_team(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateTeamRequest>,
) -> ApiResult<Json<TeamResponse>> {
    let name = validate_team_name(&request.name)?;

    let team = Team::new(name, user.uid.clone());
    let owner = TeamMember::new(
        user.uid.clone(),
        user.email.clone().unwrap_or_default(),
        TeamRole::Owner,
    );

    TeamRepository::new((*state.firestore).clone())
        .create_with_owner(&team, &owner)
        .await?;

    info!(team_id = %team.team_id, owner = %user.uid, name = %team.name, "Created team");

    Ok(Json(TeamResponse {
        team,
        role: TeamRole::Owner.as_str().to_string(),
    }))
}

#[derive(Serialize)]
pub struct TeamListResponse {
    pub teams: Vec<Team>,
}

/// List the caller's teams, creating the personal team on first touch.
pub async fn list_teams(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<TeamListResponse>> {
    state
        .teams
        .ensure_personal_team(&user.uid, user.email.as_deref())
        .await?;
    let teams = state.teams.teams_for_user(&user.uid).await?;
    Ok(Json(TeamListResponse { teams }))
}

/// Fetch one team the caller belongs to.
pub async fn get_team(
    State(state): State<AppState>,
    user: AuthUser,
    Path(team_id): Path<String>,
) -> ApiResult<Json<TeamResponse>> {
    let (team, member) = state
        .teams
        .require_member(&TeamId::from_string(team_id), &user.uid)
        .await?;

    Ok(Json(TeamResponse {
        team,
        role: member.role.as_str().to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeamRequest {
    pub name: String,
}

/// Rename a team. Managers only.
pub async fn update_team(
    State(state): State<AppState>,
    user: AuthUser,
    Path(team_id): Path<String>,
    Json(request): Json<UpdateTeamRequest>,
) -> ApiResult<Json<TeamResponse>> {
    let name = validate_team_name(&request.name)?;

    let (mut team, member) = state
        .teams
        .require_manager(&TeamId::from_string(team_id), &user.uid)
        .await?;

    TeamRepository::new((*state.firestore).clone())
        .rename(&team.team_id, &name)
        .await?;
    team.name = name;

    info!(team_id = %team.team_id, by = %user.uid, name = %team.name, "Renamed team");

    Ok(Json(TeamResponse {
        team,
        role: member.role.as_str().to_string(),
    }))
}

#[derive(Serialize)]
pub struct MemberListResponse {
    pub members: Vec<TeamMember>,
}

/// List a team's members.
pub async fn list_team_members(
    State(state): State<AppState>,
    user: AuthUser,
    Path(team_id): Path<String>,
) -> ApiResult<Json<MemberListResponse>> {
    let team_id = TeamId::from_string(team_id);
    state.teams.require_member(&team_id, &user.uid).await?;
    let members = state.teams.list_members(&team_id).await?;
    Ok(Json(MemberListResponse { members }))
}

/// Remove a member from a team, or leave it yourself.
pub async fn remove_team_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path((team_id, target_user_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let team_id = TeamId::from_string(team_id);
    let (_, caller) = state.teams.require_member(&team_id, &user.uid).await?;
    state
        .teams
        .remove_member(&team_id, &caller, &target_user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// A team's credit usage for the current month.
pub async fn get_team_usage(
    State(state): State<AppState>,
    user: AuthUser,
    Path(team_id): Path<String>,
) -> ApiResult<Json<TeamUsage>> {
    let (team, _) = state
        .teams
        .require_member(&TeamId::from_string(team_id), &user.uid)
        .await?;
    let usage = state.quota.usage(&team).await?;
    Ok(Json(usage))
}

fn validate_team_name(raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Team name must not be empty"));
    }
    if name.len() > MAX_TEAM_NAME_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Team name exceeds {} characters",
            MAX_TEAM_NAME_LENGTH
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_name_trimmed() {
        assert_eq!(validate_team_name("  Growth Team  ").unwrap(), "Growth Team");
    }

    #[test]
    fn test_team_name_rejects_empty() {
        assert!(validate_team_name("   ").is_err());
    }

    #[test]
    fn test_team_name_rejects_oversized() {
        assert!(validate_team_name(&"x".repeat(101)).is_err());
    }
}

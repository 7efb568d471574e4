//! Team invitation handlers.
//!
//! Invitations are created by team managers, delivered by email, and acted
//! on by the invitee. The invitee is identified by the verified email in
//! their token, not by user id, since the account may not exist yet when
//! the invitation goes out.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use adreel_firestore::{FirestoreError, InvitationRepository};
use adreel_models::{
    normalize_email, InvitationId, InvitationStatus, TeamId, TeamInvitation, TeamMember, TeamRole,
};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateInvitationRequest {
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Serialize)]
pub struct InvitationResponse {
    #[serde(flatten)]
    pub invitation: TeamInvitation,
    pub email_sent: bool,
}

/// Invite an email address to a team. Managers only.
pub async fn create_invitation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(team_id): Path<String>,
    Json(request): Json<CreateInvitationRequest>,
) -> ApiResult<Json<InvitationResponse>> {
    let email = normalize_email(&request.email);
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email address"));
    }

    let role = match request.role.as_deref() {
        None => TeamRole::Member,
        Some(raw) => match raw.to_lowercase().as_str() {
            "member" => TeamRole::Member,
            "admin" => TeamRole::Admin,
            _ => {
                return Err(ApiError::bad_request(
                    "Role must be \"admin\" or \"member\"",
                ))
            }
        },
    };

    let team_id = TeamId::from_string(team_id);
    let (team, _) = state.teams.require_manager(&team_id, &user.uid).await?;

    if team.personal {
        return Err(ApiError::bad_request(
            "Personal teams cannot have additional members",
        ));
    }

    if state
        .teams
        .list_members(&team_id)
        .await?
        .iter()
        .any(|m| normalize_email(&m.email) == email)
    {
        return Err(ApiError::conflict("Already a member of this team"));
    }

    let repo = InvitationRepository::new((*state.firestore).clone());
    if repo.find_pending(&team_id, &email).await?.is_some() {
        return Err(ApiError::conflict(
            "A pending invitation for this email already exists",
        ));
    }

    let invitation = TeamInvitation::new(
        team_id.clone(),
        team.name.clone(),
        &email,
        role,
        user.uid.clone(),
    );
    repo.create(&invitation).await?;

    let accept_url = format!(
        "{}/invitations/{}",
        state.config.public_base_url.trim_end_matches('/'),
        invitation.invitation_id
    );
    let email_sent = match state.email.send_invitation(&invitation, &accept_url).await {
        Ok(message_id) => {
            metrics::record_invitation_sent();
            info!(
                invitation_id = %invitation.invitation_id,
                message_id = %message_id,
                "Sent invitation email"
            );
            true
        }
        Err(e) => {
            // The invitation still exists; delivery can be retried by
            // revoking and re-inviting.
            warn!(
                invitation_id = %invitation.invitation_id,
                error = %e,
                "Failed to send invitation email"
            );
            false
        }
    };

    info!(
        team_id = %team_id,
        invitation_id = %invitation.invitation_id,
        role = role.as_str(),
        by = %user.uid,
        "Created invitation"
    );

    Ok(Json(InvitationResponse {
        invitation,
        email_sent,
    }))
}

#[derive(Serialize)]
pub struct InvitationListResponse {
    pub invitations: Vec<TeamInvitation>,
}

/// List a team's invitations, all statuses. Managers only.
pub async fn list_team_invitations(
    State(state): State<AppState>,
    user: AuthUser,
    Path(team_id): Path<String>,
) -> ApiResult<Json<InvitationListResponse>> {
    let team_id = TeamId::from_string(team_id);
    state.teams.require_manager(&team_id, &user.uid).await?;

    let invitations = InvitationRepository::new((*state.firestore).clone())
        .list_for_team(&team_id)
        .await?;
    Ok(Json(InvitationListResponse { invitations }))
}

/// Revoke a pending invitation. Managers only.
pub async fn revoke_invitation(
    State(state): State<AppState>,
    user: AuthUser,
    Path((team_id, invitation_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let team_id = TeamId::from_string(team_id);
    state.teams.require_manager(&team_id, &user.uid).await?;

    let repo = InvitationRepository::new((*state.firestore).clone());
    let invitation_id = InvitationId::from_string(invitation_id);
    let invitation = repo
        .get(&invitation_id)
        .await?
        .filter(|inv| inv.team_id == team_id)
        .ok_or_else(|| ApiError::not_found("Invitation not found"))?;

    if !invitation.is_pending() {
        return Err(ApiError::conflict("Invitation is no longer pending"));
    }

    repo.set_status(&invitation_id, InvitationStatus::Revoked)
        .await?;
    info!(invitation_id = %invitation_id, by = %user.uid, "Revoked invitation");
    Ok(StatusCode::NO_CONTENT)
}

/// Pending invitations addressed to the caller's email.
pub async fn list_my_invitations(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<InvitationListResponse>> {
    let Some(email) = user.email.as_deref() else {
        return Ok(Json(InvitationListResponse {
            invitations: Vec::new(),
        }));
    };

    let now = chrono::Utc::now();
    let invitations = InvitationRepository::new((*state.firestore).clone())
        .pending_for_email(email)
        .await?
        .into_iter()
        .filter(|inv| !inv.is_expired(now))
        .collect();
    Ok(Json(InvitationListResponse { invitations }))
}

#[derive(Serialize)]
pub struct AcceptInvitationResponse {
    pub team_id: String,
    pub team_name: String,
    pub role: String,
}

/// Accept an invitation addressed to the caller's email.
pub async fn accept_invitation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(invitation_id): Path<String>,
) -> ApiResult<Json<AcceptInvitationResponse>> {
    let repo = InvitationRepository::new((*state.firestore).clone());
    let invitation_id = InvitationId::from_string(invitation_id);
    let invitation = load_for_invitee(&repo, &invitation_id, &user).await?;

    if invitation.is_expired(chrono::Utc::now()) {
        return Err(ApiError::Gone("Invitation has expired".to_string()));
    }

    let member = TeamMember::new(
        user.uid.clone(),
        invitation.email.clone(),
        invitation.role,
    );
    match state.teams.add_member(&invitation.team_id, &member).await {
        Ok(()) => {}
        Err(ApiError::Firestore(FirestoreError::AlreadyExists(_))) => {
            // Already in the team; the invitation is spent either way.
            repo.set_status(&invitation_id, InvitationStatus::Accepted)
                .await?;
            return Err(ApiError::conflict("Already a member of this team"));
        }
        Err(e) => return Err(e),
    }

    repo.set_status(&invitation_id, InvitationStatus::Accepted)
        .await?;
    info!(
        invitation_id = %invitation_id,
        team_id = %invitation.team_id,
        uid = %user.uid,
        "Accepted invitation"
    );

    Ok(Json(AcceptInvitationResponse {
        team_id: invitation.team_id.to_string(),
        team_name: invitation.team_name,
        role: invitation.role.as_str().to_string(),
    }))
}

/// Decline an invitation addressed to the caller's email.
pub async fn decline_invitation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(invitation_id): Path<String>,
) -> ApiResult<StatusCode> {
    let repo = InvitationRepository::new((*state.firestore).clone());
    let invitation_id = InvitationId::from_string(invitation_id);
    load_for_invitee(&repo, &invitation_id, &user).await?;

    repo.set_status(&invitation_id, InvitationStatus::Declined)
        .await?;
    info!(invitation_id = %invitation_id, uid = %user.uid, "Declined invitation");
    Ok(StatusCode::NO_CONTENT)
}

/// Load a pending invitation and check it is addressed to the caller.
///
/// A mismatched email is a 403, not a 404: the id was valid, the caller
/// just is not the invitee.
async fn load_for_invitee(
    repo: &InvitationRepository,
    invitation_id: &InvitationId,
    user: &AuthUser,
) -> ApiResult<TeamInvitation> {
    let invitation = repo
        .get(invitation_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Invitation not found"))?;

    let caller_email = user
        .email
        .as_deref()
        .map(normalize_email)
        .ok_or_else(|| ApiError::forbidden("Token carries no email address"))?;
    if caller_email != invitation.email {
        return Err(ApiError::forbidden(
            "Invitation is addressed to a different email",
        ));
    }

    if !invitation.is_pending() {
        return Err(ApiError::conflict("Invitation is no longer pending"));
    }

    Ok(invitation)
}

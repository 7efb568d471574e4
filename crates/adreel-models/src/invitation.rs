//! Team invitations.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::string_id;
use crate::team::{TeamId, TeamRole};

/// How long an invitation stays accept-able.
pub const INVITATION_TTL_DAYS: i64 = 7;

/// Normalize an invitee email for storage and comparison.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

string_id! {
    /// Unique identifier for an invitation.
    pub struct InvitationId
}

/// Lifecycle of an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
    Revoked,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An email invitation to join a team.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TeamInvitation {
    /// Unique invitation ID
    pub invitation_id: InvitationId,

    /// Team being joined
    pub team_id: TeamId,

    /// Team name at invite time (for the email and the invitee's list)
    pub team_name: String,

    /// Invitee email, trimmed and lowercased
    pub email: String,

    /// Role granted on acceptance
    #[serde(default)]
    pub role: TeamRole,

    /// User who sent the invitation
    pub invited_by: String,

    /// Lifecycle status
    #[serde(default)]
    pub status: InvitationStatus,

    pub created_at: DateTime<Utc>,

    /// When the invitation stops being accept-able
    pub expires_at: DateTime<Utc>,
}

impl TeamInvitation {
    /// Create a pending invitation expiring after `INVITATION_TTL_DAYS`.
    pub fn new(
        team_id: TeamId,
        team_name: impl Into<String>,
        email: &str,
        role: TeamRole,
        invited_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            invitation_id: InvitationId::new(),
            team_id,
            team_name: team_name.into(),
            email: normalize_email(email),
            role,
            invited_by: invited_by.into(),
            status: InvitationStatus::Pending,
            created_at: now,
            expires_at: now + Duration::days(INVITATION_TTL_DAYS),
        }
    }

    /// Whether the invitation has passed its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether the invitation can still be acted on.
    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }

    /// Mark accepted.
    pub fn accept(mut self) -> Self {
        self.status = InvitationStatus::Accepted;
        self
    }

    /// Mark declined.
    pub fn decline(mut self) -> Self {
        self.status = InvitationStatus::Declined;
        self
    }

    /// Mark revoked by a team admin.
    pub fn revoke(mut self) -> Self {
        self.status = InvitationStatus::Revoked;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite() -> TeamInvitation {
        TeamInvitation::new(
            TeamId::from_string("team-1"),
            "Acme",
            "  Jordan@Example.COM ",
            TeamRole::Member,
            "user-1",
        )
    }

    #[test]
    fn test_email_is_normalized() {
        assert_eq!(invite().email, "jordan@example.com");
        assert_eq!(normalize_email("  A@B.c "), "a@b.c");
    }

    #[test]
    fn test_expiry_window() {
        let inv = invite();
        assert!(!inv.is_expired(Utc::now()));
        assert!(!inv.is_expired(inv.created_at + Duration::days(INVITATION_TTL_DAYS)));
        assert!(inv.is_expired(inv.created_at + Duration::days(INVITATION_TTL_DAYS) + Duration::seconds(1)));
    }

    #[test]
    fn test_lifecycle_transitions() {
        assert_eq!(invite().accept().status, InvitationStatus::Accepted);
        assert_eq!(invite().decline().status, InvitationStatus::Declined);
        assert_eq!(invite().revoke().status, InvitationStatus::Revoked);
    }

    #[test]
    fn test_new_invitation_is_pending() {
        let inv = invite();
        assert!(inv.is_pending());
        assert_eq!(inv.status.as_str(), "pending");
    }
}

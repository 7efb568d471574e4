//! Teams, members, and monthly usage counters.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::string_id;

string_id! {
    /// Unique identifier for a team.
    pub struct TeamId
}

/// Role of a member within a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    /// Team creator; exactly one per team
    Owner,
    /// Can manage members and invitations
    Admin,
    /// Can create and view videos
    #[default]
    Member,
}

impl TeamRole {
    /// Parse from string (case-insensitive); unknown values fall back to Member.
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "owner" => Self::Owner,
            "admin" => Self::Admin,
            _ => Self::Member,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    /// Whether this role can manage members and invitations.
    pub fn can_manage(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

impl fmt::Display for TeamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The month key used for lazy usage resets, e.g. "2026-08".
pub fn current_usage_month() -> String {
    Utc::now().format("%Y-%m").to_string()
}

/// A team account. Usage counters live here and are updated under an
/// optimistic-lock precondition; the allowance itself comes from the
/// owner's subscription plan.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Team {
    /// Unique team ID
    pub team_id: TeamId,

    /// Display name
    pub name: String,

    /// User who owns the team (their subscription sets the plan)
    pub owner_id: String,

    /// Whether this is the implicit single-member team created on signup
    #[serde(default)]
    pub personal: bool,

    /// Credits consumed in `usage_reset_month`
    #[serde(default)]
    pub credits_used_this_month: u32,

    /// Month the usage counter belongs to ("YYYY-MM")
    #[serde(default)]
    pub usage_reset_month: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    /// Create a new team.
    pub fn new(name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            team_id: TeamId::new(),
            name: name.into(),
            owner_id: owner_id.into(),
            personal: false,
            credits_used_this_month: 0,
            usage_reset_month: current_usage_month(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create the implicit personal team for a fresh account.
    pub fn personal(owner_id: impl Into<String>) -> Self {
        let mut team = Self::new("Personal", owner_id);
        team.personal = true;
        team
    }

    /// Credits used this month, treating a stale month key as zero.
    pub fn effective_credits_used(&self, current_month: &str) -> u32 {
        if self.usage_reset_month == current_month {
            self.credits_used_this_month
        } else {
            0
        }
    }
}

/// Membership record, stored under the team document.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TeamMember {
    /// Member user ID
    pub user_id: String,

    /// Member email at join time
    pub email: String,

    /// Role within the team
    #[serde(default)]
    pub role: TeamRole,

    /// When the member joined
    pub joined_at: DateTime<Utc>,
}

impl TeamMember {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>, role: TeamRole) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            role,
            joined_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_permissions() {
        assert!(TeamRole::Owner.can_manage());
        assert!(TeamRole::Admin.can_manage());
        assert!(!TeamRole::Member.can_manage());
    }

    #[test]
    fn test_role_from_string() {
        assert_eq!(TeamRole::from_str("owner"), TeamRole::Owner);
        assert_eq!(TeamRole::from_str("Admin"), TeamRole::Admin);
        assert_eq!(TeamRole::from_str("anything"), TeamRole::Member);
    }

    #[test]
    fn test_personal_team() {
        let team = Team::personal("user-1");
        assert!(team.personal);
        assert_eq!(team.owner_id, "user-1");
        assert_eq!(team.credits_used_this_month, 0);
    }

    #[test]
    fn test_effective_usage_resets_on_month_change() {
        let mut team = Team::new("Acme", "user-1");
        team.credits_used_this_month = 7;
        team.usage_reset_month = "2026-07".to_string();

        assert_eq!(team.effective_credits_used("2026-07"), 7);
        assert_eq!(team.effective_credits_used("2026-08"), 0);
    }

    #[test]
    fn test_current_usage_month_format() {
        let month = current_usage_month();
        assert_eq!(month.len(), 7);
        assert_eq!(&month[4..5], "-");
    }
}

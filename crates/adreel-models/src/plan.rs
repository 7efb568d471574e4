//! Plan tiers and their monthly credit allowances.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Subscription tier. Stored lowercase in Firestore and API payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Studio,
}

impl PlanTier {
    /// One credit buys one 8-second segment render.
    pub const FREE_MONTHLY_CREDITS: u32 = 12;
    pub const PRO_MONTHLY_CREDITS: u32 = 120;
    pub const STUDIO_MONTHLY_CREDITS: u32 = 480;

    /// Parse a stored tier name. Unknown or legacy values downgrade to
    /// Free rather than failing the whole document.
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "pro" => Self::Pro,
            "studio" => Self::Studio,
            _ => Self::Free,
        }
    }

    /// Monthly video-generation credit allowance.
    pub fn monthly_credits(&self) -> u32 {
        match self {
            Self::Free => Self::FREE_MONTHLY_CREDITS,
            Self::Pro => Self::PRO_MONTHLY_CREDITS,
            Self::Studio => Self::STUDIO_MONTHLY_CREDITS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Studio => "studio",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::MAX_SEGMENTS;

    #[test]
    fn test_tier_parsing_is_lenient() {
        assert_eq!(PlanTier::from_str("pro"), PlanTier::Pro);
        assert_eq!(PlanTier::from_str("STUDIO"), PlanTier::Studio);
        assert_eq!(PlanTier::from_str("enterprise"), PlanTier::Free);
        assert_eq!(PlanTier::from_str(""), PlanTier::Free);
    }

    #[test]
    fn test_monthly_credits_are_ordered() {
        assert!(PlanTier::Free.monthly_credits() < PlanTier::Pro.monthly_credits());
        assert!(PlanTier::Pro.monthly_credits() < PlanTier::Studio.monthly_credits());
    }

    #[test]
    fn test_free_tier_affords_at_least_one_full_video() {
        // The free allowance must cover at least one maximum-length video.
        assert!(PlanTier::Free.monthly_credits() >= MAX_SEGMENTS);
    }

    #[test]
    fn test_plan_tier_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PlanTier::Pro).unwrap(), "\"pro\"");
        assert_eq!(
            serde_json::from_str::<PlanTier>("\"studio\"").unwrap(),
            PlanTier::Studio
        );
    }
}
